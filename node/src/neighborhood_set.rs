//! The `M` live nodes topologically nearest the owner by `|Δposition|`
//! (§3 "Neighborhood-set invariant", §9 "topological distance... use
//! `|p1 - p2|` on the `[0,1)` line").

use std::collections::HashSet;

use identifier::Identifier;

#[derive(Debug, Clone)]
struct Member {
    id: Identifier,
    position: f64,
}

#[derive(Debug, Clone)]
pub struct NeighborhoodSet {
    owner_position: f64,
    capacity: usize,
    members: Vec<Member>,
}

impl NeighborhoodSet {
    pub fn new(owner_position: f64, capacity: usize) -> Self {
        Self {
            owner_position,
            capacity,
            members: Vec::new(),
        }
    }

    pub fn topological_distance(&self, other_position: f64) -> f64 {
        (self.owner_position - other_position).abs()
    }

    fn sort(&mut self) {
        let owner_position = self.owner_position;
        self.members.sort_by(|a, b| {
            let da = (owner_position - a.position).abs();
            let db = (owner_position - b.position).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    /// Admits `id` at `position`, replacing the topologically farthest
    /// member if the set is full and the candidate is strictly closer.
    pub fn try_admit(&mut self, id: Identifier, position: f64) -> bool {
        if self.contains(&id) {
            return false;
        }
        if self.members.len() < self.capacity {
            self.members.push(Member { id, position });
            self.sort();
            return true;
        }
        let worst_distance = self
            .members
            .last()
            .map(|m| self.topological_distance(m.position))
            .unwrap_or(f64::INFINITY);
        let candidate_distance = self.topological_distance(position);
        if candidate_distance < worst_distance {
            self.members.pop();
            self.members.push(Member { id, position });
            self.sort();
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: &Identifier) {
        self.members.retain(|m| &m.id != id);
    }

    /// Fully recomputes the set from the current live peers, each paired
    /// with its position (§4.7).
    pub fn rebuild(&mut self, live: &[(Identifier, f64)]) {
        let mut members: Vec<Member> = live
            .iter()
            .map(|(id, position)| Member {
                id: id.clone(),
                position: *position,
            })
            .collect();
        let owner_position = self.owner_position;
        members.sort_by(|a, b| {
            let da = (owner_position - a.position).abs();
            let db = (owner_position - b.position).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        members.truncate(self.capacity);
        self.members = members;
    }

    pub fn ids(&self) -> Vec<Identifier> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn known_ids(&self) -> HashSet<Identifier> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
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
    fn admits_up_to_capacity_sorted_by_topological_distance() {
        let mut neighbors = NeighborhoodSet::new(0.5, 2);
        assert!(neighbors.try_admit(id("1111"), 0.9));
        assert!(neighbors.try_admit(id("2222"), 0.51));
        assert_eq!(neighbors.ids(), vec![id("2222"), id("1111")]);
    }

    #[test]
    fn full_set_rejects_a_farther_candidate() {
        let mut neighbors = NeighborhoodSet::new(0.5, 1);
        assert!(neighbors.try_admit(id("1111"), 0.51));
        assert!(!neighbors.try_admit(id("2222"), 0.9));
        assert_eq!(neighbors.ids(), vec![id("1111")]);
    }

    #[test]
    fn full_set_accepts_a_closer_candidate() {
        let mut neighbors = NeighborhoodSet::new(0.5, 1);
        assert!(neighbors.try_admit(id("1111"), 0.9));
        assert!(neighbors.try_admit(id("2222"), 0.51));
        assert_eq!(neighbors.ids(), vec![id("2222")]);
    }
}
