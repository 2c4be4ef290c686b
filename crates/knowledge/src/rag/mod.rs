//! Retrieval for grounded answering.

pub mod retriever;

pub use retriever::{rank, Retriever};
