pub mod kdtree;
pub mod lsh;

pub use kdtree::{KdTree, StoredRecord};
pub use lsh::{LshIndex, SimilarPair};
