//! OpenAlex harvesting, abstract reconstruction, embedding similarity
//! graphs and store synchronisation.

pub mod embedding;
pub mod error;
pub mod graph;
pub mod harvest;
pub mod http;
pub mod normalize;
pub mod pipeline;
pub mod reconstruct;
pub mod sources;
pub mod sync;

pub use embedding::{Embedder, HashedEmbedder, create_embedder};
pub use error::{Result, ScienceError};
pub use graph::{GraphStats, SimilarityGraph, SimilarityGraphBuilder, cosine_similarity};
pub use harvest::{CorpusHarvester, Harvest, HarvestStats};
pub use pipeline::{HarvestOutcome, RunReport, harvest_to_cache, link_and_export, run_pipeline};
pub use sources::openalex::OpenAlexSource;
pub use sources::{AuthorMatch, WorksCatalog};
pub use sync::{MemoryStore, PaperStore, RemoteId, StrapiStore, SyncCoordinator, SyncReport};
