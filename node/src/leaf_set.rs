//! The `L` live nodes numerically nearest the owner, split into halves
//! below (`Lmin`) and above (`Lmax`) (§3 "Leaf-set invariant").

use std::collections::HashSet;

use identifier::{common_prefix_length, Identifier};

fn distance(owner: &Identifier, other: &Identifier) -> u64 {
    owner.numeric().abs_diff(other.numeric())
}

fn sort_by_closeness(half: &mut [Identifier], owner: &Identifier) {
    half.sort_by_key(|id| distance(owner, id));
}

/// `candidate` is strictly better than `worst` as a leaf: a larger shared
/// prefix with the owner wins; ties are broken by smaller numeric distance
/// (§4.5 step 3, the chosen resolution of §9's open question).
fn is_better(owner: &Identifier, candidate: &Identifier, worst: &Identifier) -> bool {
    let cpl_candidate = common_prefix_length(owner, candidate);
    let cpl_worst = common_prefix_length(owner, worst);
    if cpl_candidate != cpl_worst {
        cpl_candidate > cpl_worst
    } else {
        distance(owner, candidate) < distance(owner, worst)
    }
}

fn try_insert(half: &mut Vec<Identifier>, owner: &Identifier, candidate: Identifier, capacity: usize) -> bool {
    if half.contains(&candidate) {
        return false;
    }
    if half.len() < capacity {
        half.push(candidate);
        sort_by_closeness(half, owner);
        return true;
    }
    let worst = half.last().cloned().expect("non-empty by len check above");
    if is_better(owner, &candidate, &worst) {
        half.pop();
        half.push(candidate);
        sort_by_closeness(half, owner);
        true
    } else {
        false
    }
}

#[derive(Debug, Clone)]
pub struct LeafSet {
    owner: Identifier,
    capacity_per_half: usize,
    lmin: Vec<Identifier>,
    lmax: Vec<Identifier>,
}

impl LeafSet {
    pub fn new(owner: Identifier, capacity_per_half: usize) -> Self {
        Self {
            owner,
            capacity_per_half,
            lmin: Vec::new(),
            lmax: Vec::new(),
        }
    }

    pub fn lmin(&self) -> &[Identifier] {
        &self.lmin
    }

    pub fn lmax(&self) -> &[Identifier] {
        &self.lmax
    }

    pub fn capacity_per_half(&self) -> usize {
        self.capacity_per_half
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.lmin.contains(id) || self.lmax.contains(id)
    }

    /// Admits `candidate` into whichever half it belongs to, replacing the
    /// half's worst member if full and the candidate is strictly better.
    /// Returns whether the candidate was admitted.
    pub fn try_admit(&mut self, candidate: Identifier) -> bool {
        if candidate == self.owner {
            return false;
        }
        if candidate.numeric() < self.owner.numeric() {
            try_insert(&mut self.lmin, &self.owner, candidate, self.capacity_per_half)
        } else {
            try_insert(&mut self.lmax, &self.owner, candidate, self.capacity_per_half)
        }
    }

    pub fn remove(&mut self, id: &Identifier) {
        self.lmin.retain(|x| x != id);
        self.lmax.retain(|x| x != id);
    }

    /// Fully recomputes both halves from the current set of live peers
    /// (§4.7 "Recomputes Lmin as the up-to-L/2 live IDs numerically less
    /// than R.id, ordered by ascending R.id - id; Lmax symmetrically").
    pub fn rebuild(&mut self, live_ids: &[Identifier]) {
        let mut below: Vec<Identifier> = live_ids
            .iter()
            .filter(|id| id.numeric() < self.owner.numeric())
            .cloned()
            .collect();
        let mut above: Vec<Identifier> = live_ids
            .iter()
            .filter(|id| id.numeric() > self.owner.numeric())
            .cloned()
            .collect();
        sort_by_closeness(&mut below, &self.owner);
        sort_by_closeness(&mut above, &self.owner);
        below.truncate(self.capacity_per_half);
        above.truncate(self.capacity_per_half);
        self.lmin = below;
        self.lmax = above;
    }

    /// Whether `key` falls within `[min(Lmin), max(Lmax)]`, or is itself a
    /// member of the leaf set.
    pub fn span_contains(&self, key: &Identifier) -> bool {
        if self.contains(key) {
            return true;
        }
        let low = self.lmin.iter().min_by_key(|id| id.numeric());
        let high = self.lmax.iter().max_by_key(|id| id.numeric());
        match (low, high) {
            (Some(low), Some(high)) => key.numeric() >= low.numeric() && key.numeric() <= high.numeric(),
            (Some(low), None) => key.numeric() >= low.numeric() && key.numeric() <= self.owner.numeric(),
            (None, Some(high)) => key.numeric() <= high.numeric() && key.numeric() >= self.owner.numeric(),
            (None, None) => key == &self.owner,
        }
    }

    /// The leaf (or the owner) numerically closest to `key`, ties broken
    /// by larger shared-prefix length with `key` (§4.4 step 1).
    pub fn closest_to(&self, key: &Identifier) -> Identifier {
        let mut best = self.owner.clone();
        for candidate in self.lmin.iter().chain(self.lmax.iter()) {
            let better = {
                let d_best = best.numeric().abs_diff(key.numeric());
                let d_candidate = candidate.numeric().abs_diff(key.numeric());
                if d_candidate != d_best {
                    d_candidate < d_best
                } else {
                    common_prefix_length(candidate, key) > common_prefix_length(&best, key)
                }
            };
            if better {
                best = candidate.clone();
            }
        }
        best
    }

    pub fn known_ids(&self) -> HashSet<Identifier> {
        self.lmin.iter().chain(self.lmax.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> Identifier {
        Identifier::new(s, 4).unwrap()
    }

    #[test]
    fn fresh_leaf_set_is_empty() {
        let leaves = LeafSet::new(id("4b19"), 2);
        assert!(leaves.lmin().is_empty());
        assert!(leaves.lmax().is_empty());
    }

    #[test]
    fn admits_lower_and_higher_ids_to_the_correct_half() {
        let mut leaves = LeafSet::new(id("4b19"), 2);
        assert!(leaves.try_admit(id("1111")));
        assert!(leaves.try_admit(id("a3f1")));
        assert_eq!(leaves.lmin(), &[id("1111")]);
        assert_eq!(leaves.lmax(), &[id("a3f1")]);
    }

    #[test]
    fn owner_id_is_never_admitted() {
        let mut leaves = LeafSet::new(id("4b19"), 2);
        assert!(!leaves.try_admit(id("4b19")));
    }

    #[test]
    fn full_half_rejects_a_strictly_worse_candidate() {
        let mut leaves = LeafSet::new(id("4b19"), 1);
        assert!(leaves.try_admit(id("4b18"))); // distance 1
        assert!(!leaves.try_admit(id("0000"))); // much farther, same prefix length (0)
        assert_eq!(leaves.lmin(), &[id("4b18")]);
    }

    #[test]
    fn full_half_accepts_a_strictly_better_candidate() {
        let mut leaves = LeafSet::new(id("4b19"), 1);
        assert!(leaves.try_admit(id("0000")));
        assert!(leaves.try_admit(id("4b18"))); // closer, replaces worst
        assert_eq!(leaves.lmin(), &[id("4b18")]);
    }

    #[test]
    fn span_contains_bridges_across_owner_when_one_half_is_empty() {
        let mut leaves = LeafSet::new(id("4b19"), 2);
        leaves.try_admit(id("a3f1"));
        assert!(leaves.span_contains(&id("6000")));
        assert!(!leaves.span_contains(&id("c000")));
    }

    #[test]
    fn rebuild_picks_closest_live_ids_on_each_side() {
        let mut leaves = LeafSet::new(id("5000"), 1);
        leaves.rebuild(&[id("1000"), id("4999"), id("9000"), id("5001")]);
        assert_eq!(leaves.lmin(), &[id("4999")]);
        assert_eq!(leaves.lmax(), &[id("5001")]);
    }
}
