//! Pairwise semantic similarity over a paper corpus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use papergraph_core::{AppConfig, LinkExport, PaperRecord, SimilarityEdge};
use serde::Serialize;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{Result, ScienceError};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Counters for one graph build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub corpus: usize,
    pub eligible: usize,
    pub pairs_scored: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    pub edges: Vec<SimilarityEdge>,
    pub stats: GraphStats,
}

/// Builds the thresholded similarity graph.
///
/// Only records with a non-blank abstract take part. Every unordered pair is
/// scored once, in corpus order (`i < j`), and an edge is emitted when the
/// score is strictly greater than the threshold.
pub struct SimilarityGraphBuilder {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
    batch_size: usize,
}

impl SimilarityGraphBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&threshold) {
            return Err(ScienceError::InvalidThreshold(threshold));
        }
        Ok(Self {
            embedder,
            threshold,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn from_config(embedder: Arc<dyn Embedder>, config: &AppConfig) -> Result<Self> {
        Ok(Self::new(embedder, config.linking.threshold)?
            .with_batch_size(config.embedding.batch_size))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn build(&self, corpus: &[PaperRecord]) -> Result<SimilarityGraph> {
        let eligible = eligible_records(corpus);
        let mut stats = GraphStats {
            corpus: corpus.len(),
            eligible: eligible.len(),
            ..GraphStats::default()
        };

        if eligible.len() < 2 {
            info!(corpus = stats.corpus, eligible = stats.eligible, "not enough papers to link");
            return Ok(SimilarityGraph {
                edges: Vec::new(),
                stats,
            });
        }

        let texts: Vec<String> = eligible
            .iter()
            .filter_map(|record| record.embedding_text())
            .collect();
        let vectors = self.embed_all(&texts).await?;

        let mut edges = Vec::new();
        for i in 0..eligible.len() {
            for j in (i + 1)..eligible.len() {
                let score = cosine_similarity(&vectors[i], &vectors[j]);
                stats.pairs_scored += 1;
                if score > self.threshold {
                    edges.push(SimilarityEdge::new(
                        eligible[i].external_id.clone(),
                        eligible[j].external_id.clone(),
                        score,
                    ));
                }
            }
        }
        stats.edges = edges.len();

        info!(
            model = self.embedder.model_name(),
            eligible = stats.eligible,
            pairs = stats.pairs_scored,
            edges = stats.edges,
            threshold = self.threshold,
            "similarity graph built"
        );
        Ok(SimilarityGraph { edges, stats })
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = n, size = batch.len(), "embedding batch");
            let embedded = self
                .embedder
                .embed_batch(batch)
                .await
                .map_err(|e| match e {
                    ScienceError::EmbeddingUnavailable(_) => e,
                    other => ScienceError::EmbeddingUnavailable(other.to_string()),
                })?;
            if embedded.len() != batch.len() {
                return Err(ScienceError::EmbeddingUnavailable(format!(
                    "{} returned {} vectors for {} texts",
                    self.embedder.model_name(),
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        if let Some(first) = vectors.first() {
            let dim = first.len();
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(ScienceError::EmbeddingUnavailable(format!(
                    "inconsistent embedding dimensions: {dim} and {}",
                    bad.len()
                )));
            }
        }
        Ok(vectors)
    }
}

/// Records with a non-blank abstract, first occurrence of each id only.
pub fn eligible_records(corpus: &[PaperRecord]) -> Vec<&PaperRecord> {
    let mut seen = HashSet::new();
    corpus
        .iter()
        .filter(|record| record.is_eligible())
        .filter(|record| {
            let fresh = seen.insert(record.external_id.as_str());
            if !fresh {
                debug!(id = %record.external_id, "duplicate record ignored for linking");
            }
            fresh
        })
        .collect()
}

/// Cosine similarity accumulated in `f64` and clamped into [-1, 1].
/// A zero vector is dissimilar to everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Rows for `graph_links.json`, titles looked up from the corpus.
pub fn export_links(edges: &[SimilarityEdge], corpus: &[PaperRecord]) -> Vec<LinkExport> {
    let titles: HashMap<&str, &str> = corpus
        .iter()
        .rev()
        .map(|record| (record.external_id.as_str(), record.title.as_str()))
        .collect();
    edges
        .iter()
        .map(|edge| {
            let source = titles.get(edge.source_id.as_str()).copied().unwrap_or("");
            let target = titles.get(edge.target_id.as_str()).copied().unwrap_or("");
            LinkExport::from_edge(edge, source, target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed vector per embedding text.
    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        batches: Mutex<Vec<usize>>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
                batches: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(texts.len());
            texts
                .iter()
                .map(|text| {
                    self.vectors
                        .get(text)
                        .cloned()
                        .ok_or_else(|| ScienceError::EmbeddingUnavailable(text.clone()))
                })
                .collect()
        }
    }

    struct BrokenEmbedder {
        short: bool,
    }

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.short {
                Ok(vec![vec![1.0]; texts.len().saturating_sub(1)])
            } else {
                Err(ScienceError::ApiError("model".into(), "HTTP 500".into()))
            }
        }
    }

    fn paper(id: &str, title: &str, abstract_text: &str) -> PaperRecord {
        PaperRecord::new(id, title).with_abstract(abstract_text)
    }

    fn hashed() -> Arc<dyn Embedder> {
        Arc::new(HashedEmbedder::new(128))
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        for bad in [-0.1, 1.0, 1.5, f64::NAN] {
            assert!(matches!(
                SimilarityGraphBuilder::new(hashed(), bad),
                Err(ScienceError::InvalidThreshold(_))
            ));
        }
        assert!(SimilarityGraphBuilder::new(hashed(), 0.0).is_ok());
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0, 0.0], &[1.0, 1.0, 1.0, 1.0]), 0.5);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
        let v = [0.3f32, 0.4, 0.5];
        assert!(cosine_similarity(&v, &v) <= 1.0);
    }

    #[tokio::test]
    async fn score_equal_to_threshold_is_not_an_edge() {
        let embedder = Arc::new(FixedEmbedder::new(&[
            ("a x", vec![1.0, 0.0, 0.0, 0.0]),
            ("b x", vec![1.0, 1.0, 1.0, 1.0]),
        ]));
        let builder = SimilarityGraphBuilder::new(embedder, 0.5).unwrap();
        let graph = builder
            .build(&[paper("W1", "a", "x"), paper("W2", "b", "x")])
            .await
            .unwrap();
        assert!(graph.edges.is_empty());
        assert_eq!(graph.stats.pairs_scored, 1);
    }

    #[tokio::test]
    async fn score_just_above_threshold_is_an_edge() {
        let embedder = Arc::new(FixedEmbedder::new(&[
            ("a x", vec![1.0, 0.0, 0.0, 0.0]),
            ("b x", vec![1.0002, 1.0, 1.0, 1.0]),
        ]));
        let builder = SimilarityGraphBuilder::new(embedder, 0.5).unwrap();
        let graph = builder
            .build(&[paper("W1", "a", "x"), paper("W2", "b", "x")])
            .await
            .unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source_id, "W1");
        assert_eq!(graph.edges[0].target_id, "W2");
        assert!(graph.edges[0].score > 0.5);
    }

    #[tokio::test]
    async fn identical_texts_link_every_pair() {
        let corpus: Vec<_> = (1..=4)
            .map(|n| paper(&format!("W{n}"), "Graphs", "message passing networks"))
            .collect();
        let builder = SimilarityGraphBuilder::new(hashed(), 0.9).unwrap();
        let graph = builder.build(&corpus).await.unwrap();

        assert_eq!(graph.edges.len(), 6);
        for edge in &graph.edges {
            assert!((edge.score - 1.0).abs() < 1e-9);
            assert_ne!(edge.source_id, edge.target_id);
        }
        let order: Vec<_> = graph
            .edges
            .iter()
            .map(|e| (e.source_id.as_str(), e.target_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("W1", "W2"),
                ("W1", "W3"),
                ("W1", "W4"),
                ("W2", "W3"),
                ("W2", "W4"),
                ("W3", "W4")
            ]
        );
    }

    #[tokio::test]
    async fn paper_without_abstract_never_gets_an_edge() {
        let same = vec![0.2, 0.4, 0.4, 0.8];
        let embedder = Arc::new(FixedEmbedder::new(&[
            ("A x y z", same.clone()),
            ("B x y z", same),
        ]));
        let corpus = vec![
            paper("W1", "A", "x y z"),
            paper("W2", "B", "x y z"),
            PaperRecord::new("W3", "C"),
        ];
        let builder = SimilarityGraphBuilder::new(embedder, 0.5).unwrap();
        let graph = builder.build(&corpus).await.unwrap();

        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert!(edge.connects("W1", "W2"));
        assert!((edge.score - 1.0).abs() < 1e-9);
        assert_eq!(graph.stats.eligible, 2);
    }

    #[tokio::test]
    async fn edges_are_bounded_and_reproducible() {
        let corpus = vec![
            paper("W1", "Protein folding", "alpha helices and beta sheets"),
            paper("W2", "Protein design", "beta sheets in designed proteins"),
            paper("W3", "Graph theory", "planar graphs and colorings"),
            paper("W4", "Graph coloring", "four color theorem for planar graphs"),
            paper("W5", "Cooking", "bread and butter"),
        ];
        let builder = SimilarityGraphBuilder::new(hashed(), 0.0).unwrap();
        let first = builder.build(&corpus).await.unwrap();
        let second = builder.build(&corpus).await.unwrap();

        assert_eq!(first.edges, second.edges);
        assert_eq!(first.stats.pairs_scored, 10);
        assert!(first.edges.len() <= 10);
        let mut seen = HashSet::new();
        for edge in &first.edges {
            assert_ne!(edge.source_id, edge.target_id);
            assert!(seen.insert(edge.pair_key()));
        }
    }

    #[tokio::test]
    async fn ineligible_and_duplicate_records_are_skipped() {
        let embedder = Arc::new(FixedEmbedder::new(&[]));
        let builder = SimilarityGraphBuilder::new(embedder.clone(), 0.5).unwrap();
        let corpus = vec![
            paper("W1", "a", "x"),
            paper("W1", "a", "x"),
            PaperRecord::new("W2", "no abstract"),
            paper("W3", "blank", "   "),
        ];
        let graph = builder.build(&corpus).await.unwrap();
        assert!(graph.edges.is_empty());
        assert_eq!(
            graph.stats,
            GraphStats {
                corpus: 4,
                eligible: 1,
                pairs_scored: 0,
                edges: 0
            }
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embeds_in_order_preserving_batches() {
        let pairs: Vec<(String, Vec<f32>)> = (0..5)
            .map(|n| (format!("t{n} x"), vec![1.0, n as f32, 0.0, 0.0]))
            .collect();
        let refs: Vec<(&str, Vec<f32>)> =
            pairs.iter().map(|(t, v)| (t.as_str(), v.clone())).collect();
        let embedder = Arc::new(FixedEmbedder::new(&refs));
        let corpus: Vec<_> = (0..5)
            .map(|n| paper(&format!("W{n}"), &format!("t{n}"), "x"))
            .collect();

        let builder = SimilarityGraphBuilder::new(embedder.clone(), 0.0)
            .unwrap()
            .with_batch_size(2);
        let graph = builder.build(&corpus).await.unwrap();
        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(graph.stats.pairs_scored, 10);
    }

    #[tokio::test]
    async fn embedder_failure_aborts_the_build() {
        let corpus = vec![paper("W1", "a", "x"), paper("W2", "b", "y")];
        for short in [false, true] {
            let builder =
                SimilarityGraphBuilder::new(Arc::new(BrokenEmbedder { short }), 0.5).unwrap();
            assert!(matches!(
                builder.build(&corpus).await,
                Err(ScienceError::EmbeddingUnavailable(_))
            ));
        }
    }

    #[test]
    fn export_uses_corpus_titles() {
        let corpus = vec![paper("W1", "First", "x"), paper("W2", "Second", "y")];
        let rows = export_links(&[SimilarityEdge::new("W1", "W2", 0.912_345)], &corpus);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_title, "First");
        assert_eq!(rows[0].target_title, "Second");
        assert_eq!(rows[0].score, 0.9123);
    }
}
