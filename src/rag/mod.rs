//! Retrieval-augmented generation building blocks.
//!
//! - `Chunker`: splits documents into overlapping, boundary-aware chunks
//! - `RetrievalIndex`: embeds chunks and answers similarity queries
//! - `ContextBuilder`: turns retrieved material into a chat request

pub mod chunker;
pub mod context_builder;
pub mod index;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use chunker::{Chunk, Chunker};
pub use context_builder::ContextBuilder;
pub use index::{RetrievalIndex, SearchResult, SourceLiveness, UploadDirLiveness};
pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;
pub use store::{IndexedVector, SourceFilter, VectorIndex, VectorMatch};
