//! Vector similarity indices for corpusdb: a LanceDB table adapter and an
//! exhaustive in-memory index.
pub mod lance;
pub mod memory;
pub mod schema;
pub mod table;

pub use lance::LanceVectorIndex;
pub use memory::{cosine, MemoryVectorIndex};
