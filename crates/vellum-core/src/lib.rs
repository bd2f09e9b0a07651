//! Vellum Core - Domain types shared by every stage of the ingestion pipeline.

mod classification;
mod error;
mod types;

pub use classification::*;
pub use error::{Error, Result};
pub use types::*;
