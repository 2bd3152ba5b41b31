//! Application layer: route composition and error mapping.

pub mod blog;
pub mod error;
