//! Content types shared by the upstream client and the page renderers.

pub mod blog;
