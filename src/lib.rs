pub mod catalog;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod index;
mod metrics;
pub mod query;
pub mod searcher;
pub mod server;
pub mod utils;

pub use config::Opts;
pub use error::SearchError;
pub use query::Query;
pub use searcher::{SearchResult, Searcher};
