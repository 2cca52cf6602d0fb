//! Domain entities and their invariants.

pub mod articles;
pub mod error;
