//! Application services and error mapping.

pub mod articles;
pub mod error;
pub mod pagination;
