pub mod edge;
pub mod paper;

pub use edge::{LinkExport, SimilarityEdge, round_score};
pub use paper::{MAX_TOPICS, PaperRecord, UNKNOWN_AUTHOR, short_id};
