//! Vellum Store - Documents, chunks and the per-document advisory lock.
//!
//! Chunk rows are only ever written through a [`LockedDocument`], which is
//! obtained from [`VectorStore::acquire_lock`]. Holding one means every other
//! process asking for the same document either waits ([`LockMode::Blocking`])
//! or is turned away ([`LockMode::NonBlocking`]).

mod error;
mod memory;
mod postgres;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryVectorStore;
pub use postgres::PgVectorStore;
pub use store::{LockMode, LockedDocument, VectorStore};
