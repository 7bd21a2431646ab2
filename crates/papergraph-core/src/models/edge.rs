use serde::{Deserialize, Serialize};

/// Undirected, weighted link between two papers of one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source_id: String,
    pub target_id: String,
    pub score: f64,
}

impl SimilarityEdge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, score: f64) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            score,
        }
    }

    /// Order-independent key of the endpoint pair.
    pub fn pair_key(&self) -> (&str, &str) {
        let (a, b) = (self.source_id.as_str(), self.target_id.as_str());
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }
}

/// Row of the `graph_links.json` export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkExport {
    pub source_openalex_id: String,
    pub target_openalex_id: String,
    pub source_title: String,
    pub target_title: String,
    pub score: f64,
}

impl LinkExport {
    pub fn from_edge(edge: &SimilarityEdge, source_title: &str, target_title: &str) -> Self {
        Self {
            source_openalex_id: edge.source_id.clone(),
            target_openalex_id: edge.target_id.clone(),
            source_title: source_title.to_string(),
            target_title: target_title.to_string(),
            score: round_score(edge.score),
        }
    }
}

/// Display rounding for exported scores (4 decimals).
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}
