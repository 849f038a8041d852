//! Evidence store backends and corpus retrieval for deepdive.

pub mod corpus;
pub mod file_backend;
pub mod in_memory;
pub mod retriever;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use corpus::{CorpusEntry, InMemoryCorpus};
pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use retriever::IndexRetriever;
pub use vector::{cosine_similarity, merge_best, vector_search};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
