//! Part planning.
//!
//! Splits a file into one byte range per presigned URL using a fixed chunk
//! size; the final part absorbs the remainder. Non-final parts are never
//! smaller than the multipart protocol floor (`MIN_CHUNK_SIZE`).

mod range;

pub use range::{plan_parts, PartRange, PlanError, MIN_CHUNK_SIZE};
