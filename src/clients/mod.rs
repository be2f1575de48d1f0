pub mod backend_client;
pub mod collaborators;

pub use backend_client::BackendClient;
pub use collaborators::{PageAnalyzer, PageExtractor, Scorer};
