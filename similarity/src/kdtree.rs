//! Per-node 3-dimensional index over stored points, tagged by country key.
//!
//! The tree is rebuilt wholesale on every insert, update or delete, which is
//! acceptable at the scale this system targets (§4.2, §9 "KD-Tree churn").

use identifier::Identifier;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use types::Point;

const DIMENSIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub point: Point,
    pub review: String,
    pub country_key: Identifier,
    pub country_name: String,
}

#[derive(Debug)]
struct KdNode {
    index: usize,
    axis: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

fn axis_value(point: &Point, axis: usize) -> f64 {
    point.coords()[axis]
}

fn build(mut indices: Vec<usize>, records: &[StoredRecord], depth: usize) -> Option<Box<KdNode>> {
    if indices.is_empty() {
        return None;
    }
    let axis = depth % DIMENSIONS;
    indices.sort_by(|&a, &b| {
        axis_value(&records[a].point, axis)
            .partial_cmp(&axis_value(&records[b].point, axis))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mid = indices.len() / 2;
    let median_index = indices[mid];
    let left = build(indices[..mid].to_vec(), records, depth + 1);
    let right = build(indices[mid + 1..].to_vec(), records, depth + 1);
    Some(Box::new(KdNode {
        index: median_index,
        axis,
        left,
        right,
    }))
}

/// Collect the indices of every node whose point lies within `[lower, upper]`
/// on the node's splitting axis, pruning subtrees that cannot possibly
/// contain a match (bounding-box search over the balanced tree).
///
/// `build` sorts each level by `axis` before splitting, so every index to
/// the left of the median has an axis value `<=` the median's and every
/// index to the right has one `>=` it; that ordering is what lets a whole
/// subtree be skipped instead of visited.
fn collect_in_box(node: &Option<Box<KdNode>>, records: &[StoredRecord], lower: &Point, upper: &Point, out: &mut Vec<usize>) {
    let Some(node) = node else { return };
    out.push(node.index);
    let node_value = axis_value(&records[node.index].point, node.axis);
    let lo = axis_value(lower, node.axis);
    let hi = axis_value(upper, node.axis);
    if lo <= node_value {
        collect_in_box(&node.left, records, lower, upper, out);
    }
    if hi >= node_value {
        collect_in_box(&node.right, records, lower, upper, out);
    }
}

#[derive(Debug, Default)]
pub struct KdTree {
    records: Vec<StoredRecord>,
    root: Option<Box<KdNode>>,
}

impl KdTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild(&mut self) {
        let indices: Vec<usize> = (0..self.records.len()).collect();
        self.root = build(indices, &self.records, 0);
    }

    /// Append a point and its metadata; rebuilds the tree.
    #[tracing::instrument(skip(self, review))]
    pub fn insert(&mut self, point: Point, review: String, country_key: Identifier, country_name: String) {
        self.records.push(StoredRecord {
            point,
            review,
            country_key,
            country_name,
        });
        self.rebuild();
    }

    /// Every stored point within the inclusive axis-aligned box
    /// `[lower, upper]`, together with its review, in insertion order.
    #[tracing::instrument(skip(self))]
    pub fn search(&self, lower: &Point, upper: &Point) -> (Vec<Point>, Vec<String>) {
        if self.records.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let mut candidates = Vec::new();
        collect_in_box(&self.root, &self.records, lower, upper, &mut candidates);
        let lo = lower.coords();
        let hi = upper.coords();
        let matching: Vec<usize> = candidates
            .into_iter()
            .filter(|&idx| {
                let p = self.records[idx].point.coords();
                (0..DIMENSIONS).all(|axis| p[axis] >= lo[axis] && p[axis] <= hi[axis])
            })
            .sorted_unstable()
            .dedup()
            .collect();
        let points = matching.iter().map(|&i| self.records[i].point).collect();
        let reviews = matching.iter().map(|&i| self.records[i].review.clone()).collect();
        (points, reviews)
    }

    fn matches_criteria(point: &Point, criteria: &types::Criteria) -> bool {
        criteria.year.map_or(true, |y| point.year == y)
            && criteria.rating.map_or(true, |r| (point.rating - r).abs() < f32::EPSILON)
            && criteria.price.map_or(true, |p| (point.price - p).abs() < f32::EPSILON)
    }

    /// Among points tagged `country_key` and matching every field in
    /// `criteria` (all fields if `criteria` is `None`), overwrite the fields
    /// named in `update_fields`. Returns the number of points updated.
    #[tracing::instrument(skip(self, update_fields))]
    pub fn update_points(
        &mut self,
        country_key: &Identifier,
        criteria: Option<&types::Criteria>,
        update_fields: &types::UpdateFields,
    ) -> usize {
        let mut updated = 0;
        for record in self.records.iter_mut() {
            if &record.country_key != country_key {
                continue;
            }
            if let Some(criteria) = criteria {
                if !Self::matches_criteria(&record.point, criteria) {
                    continue;
                }
            }
            if let Some(year) = update_fields.year {
                record.point.year = year;
            }
            if let Some(rating) = update_fields.rating {
                record.point.rating = rating;
            }
            if let Some(price) = update_fields.price {
                record.point.price = price;
            }
            if let Some(review) = &update_fields.review {
                record.review = review.clone();
            }
            updated += 1;
        }
        if updated > 0 {
            self.rebuild();
        }
        updated
    }

    /// Remove every record tagged `country_key`. Returns the number removed.
    #[tracing::instrument(skip(self))]
    pub fn delete_points(&mut self, country_key: &Identifier) -> usize {
        let before = self.records.len();
        self.records.retain(|r| &r.country_key != country_key);
        let removed = before - self.records.len();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    /// The set of country keys currently stored, each with the most
    /// recently associated country name.
    pub fn unique_country_keys(&self) -> Vec<(Identifier, String)> {
        let mut seen: Vec<(Identifier, String)> = Vec::new();
        for record in &self.records {
            if let Some(existing) = seen.iter_mut().find(|(k, _)| *k == record.country_key) {
                existing.1 = record.country_name.clone();
            } else {
                seen.push((record.country_key.clone(), record.country_name.clone()));
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
