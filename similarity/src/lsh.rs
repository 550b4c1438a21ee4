//! TF-IDF vectorization plus a banded LSH signature index, used by lookup to
//! pick the most similar reviews among the candidate set a KD-Tree range
//! search returned (§4.3).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::num::NonZeroUsize;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed: lookups must be reproducible given the same candidate set
/// (§5 "Determinism for tests").
const PROJECTION_SEED: u64 = 0x5077_5354_4259_5445;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn tf_idf_vectors(documents: &[String]) -> (Vec<String>, Vec<HashMap<usize, f64>>) {
    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

    let mut vocab: Vec<String> = Vec::new();
    let mut vocab_index: HashMap<String, usize> = HashMap::new();
    for doc in &tokenized {
        for term in doc {
            if !vocab_index.contains_key(term) {
                vocab_index.insert(term.clone(), vocab.len());
                vocab.push(term.clone());
            }
        }
    }

    let doc_count = documents.len() as f64;
    let mut document_frequency = vec![0usize; vocab.len()];
    for doc in &tokenized {
        let mut seen = vec![false; vocab.len()];
        for term in doc {
            let idx = vocab_index[term];
            if !seen[idx] {
                document_frequency[idx] += 1;
                seen[idx] = true;
            }
        }
    }

    let vectors = tokenized
        .iter()
        .map(|doc| {
            let mut term_counts: HashMap<usize, usize> = HashMap::new();
            for term in doc {
                *term_counts.entry(vocab_index[term]).or_insert(0) += 1;
            }
            let total = doc.len().max(1) as f64;
            term_counts
                .into_iter()
                .map(|(idx, count)| {
                    let tf = count as f64 / total;
                    let idf = (doc_count / (1.0 + document_frequency[idx] as f64)).ln() + 1.0;
                    (idx, tf * idf)
                })
                .collect::<HashMap<usize, f64>>()
        })
        .collect();

    (vocab, vectors)
}

fn cosine_similarity(a: &HashMap<usize, f64>, b: &HashMap<usize, f64>) -> f64 {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = shorter
        .iter()
        .filter_map(|(idx, value)| longer.get(idx).map(|other| value * other))
        .sum();
    let norm_a: f64 = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A random-hyperplane (SimHash-style) banded signature, grouping documents
/// whose TF-IDF vectors project to the same sign pattern within a band.
struct Bands {
    hyperplanes: Vec<HashMap<usize, f64>>,
    num_bands: usize,
    num_rows: usize,
}

impl Bands {
    fn new(vocab_size: usize, num_bands: usize, num_rows: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(PROJECTION_SEED);
        let hyperplanes = (0..num_bands * num_rows)
            .map(|_| {
                (0..vocab_size.max(1))
                    .map(|idx| (idx, rng.gen_range(-1.0..1.0)))
                    .collect::<HashMap<usize, f64>>()
            })
            .collect();
        Self {
            hyperplanes,
            num_bands,
            num_rows,
        }
    }

    fn signature(&self, vector: &HashMap<usize, f64>) -> Vec<u64> {
        (0..self.num_bands)
            .map(|band| {
                let mut bits: u64 = 0;
                for row in 0..self.num_rows {
                    let plane = &self.hyperplanes[band * self.num_rows + row];
                    let dot: f64 = vector
                        .iter()
                        .filter_map(|(idx, value)| plane.get(idx).map(|p| p * value))
                        .sum();
                    if dot >= 0.0 {
                        bits |= 1 << row;
                    }
                }
                bits
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimilarPair {
    pub first: String,
    pub second: String,
    pub score: f64,
}

#[derive(Debug)]
struct ScoredPair(usize, usize, f64);

impl PartialEq for ScoredPair {
    fn eq(&self, other: &Self) -> bool {
        self.2 == other.2
    }
}
impl Eq for ScoredPair {}
impl PartialOrd for ScoredPair {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScoredPair {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.2.partial_cmp(&other.2).unwrap_or(std::cmp::Ordering::Less)
    }
}

fn pop_n<T: Ord>(heap: &mut BinaryHeap<T>, n: usize) -> Vec<T> {
    (0..n).filter_map(|_| heap.pop()).collect()
}

/// A banded LSH index built fresh from one lookup's candidate reviews.
pub struct LshIndex {
    documents: Vec<String>,
    pairs: Vec<ScoredPair>,
}

impl LshIndex {
    #[tracing::instrument(skip(documents))]
    pub fn from_documents(documents: &[String], num_bands: usize, num_rows: usize) -> Self {
        let documents: Vec<String> = documents.to_vec();
        if documents.len() < 2 {
            return Self {
                documents,
                pairs: Vec::new(),
            };
        }

        let (vocab, vectors) = tf_idf_vectors(&documents);
        let bands = Bands::new(vocab.len(), num_bands.max(1), num_rows.max(1));
        let signatures: Vec<Vec<u64>> = vectors.iter().map(|v| bands.signature(v)).collect();

        let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
        for (doc_idx, signature) in signatures.iter().enumerate() {
            for (band_idx, bucket_key) in signature.iter().enumerate() {
                buckets.entry((band_idx, *bucket_key)).or_default().push(doc_idx);
            }
        }

        let mut candidate_pairs: std::collections::HashSet<(usize, usize)> = std::collections::HashSet::new();
        for members in buckets.values() {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let (a, b) = (members[i].min(members[j]), members[i].max(members[j]));
                    candidate_pairs.insert((a, b));
                }
            }
        }

        let pairs = candidate_pairs
            .into_iter()
            .map(|(a, b)| {
                let score = cosine_similarity(&vectors[a], &vectors[b]);
                ScoredPair(a, b, score)
            })
            .collect();

        Self { documents, pairs }
    }

    /// The top-`n` most similar document pairs, highest score first. Returns
    /// every available pair if fewer than `n` candidates exist.
    pub fn find_similar_pairs(&mut self, n: NonZeroUsize) -> Vec<SimilarPair> {
        let mut heap: BinaryHeap<ScoredPair> = self.pairs.drain(..).collect();
        pop_n(&mut heap, n.get())
            .into_iter()
            .map(|ScoredPair(a, b, score)| SimilarPair {
                first: self.documents[a].clone(),
                second: self.documents[b].clone(),
                score,
            })
            .collect()
    }

    /// Flattens the top-`n` pairs into a deduplicated list of document
    /// texts, used as the `similar` field of a lookup response.
    pub fn find_similar_docs(&mut self, n: NonZeroUsize) -> Vec<String> {
        let mut texts = Vec::new();
        for pair in self.find_similar_pairs(n) {
            if !texts.contains(&pair.first) {
                texts.push(pair.first);
            }
            if texts.len() >= n.get() {
                break;
            }
            if !texts.contains(&pair.second) {
                texts.push(pair.second);
            }
            if texts.len() >= n.get() {
                break;
            }
        }
        if texts.is_empty() {
            texts = self.documents.iter().take(n.get()).cloned().collect();
        }
        texts.truncate(n.get());
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fewer_than_n_candidates_returns_all_available() {
        let docs = vec!["only one review".to_string()];
        let mut index = LshIndex::from_documents(&docs, 4, 5);
        let similar = index.find_similar_docs(NonZeroUsize::new(5).unwrap());
        assert_eq!(similar, vec!["only one review".to_string()]);
    }

    #[test]
    fn identical_reviews_are_maximally_similar() {
        let docs = vec![
            "bright acidic coffee with floral notes".to_string(),
            "bright acidic coffee with floral notes".to_string(),
            "heavy earthy dark roast".to_string(),
        ];
        let mut index = LshIndex::from_documents(&docs, 4, 5);
        let pairs = index.find_similar_pairs(NonZeroUsize::new(1).unwrap());
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].score > 0.9);
    }

    #[test]
    fn empty_candidate_set_returns_empty() {
        let docs: Vec<String> = Vec::new();
        let mut index = LshIndex::from_documents(&docs, 4, 5);
        assert!(index.find_similar_docs(NonZeroUsize::new(3).unwrap()).is_empty());
    }
}
