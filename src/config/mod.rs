// src/config/mod.rs
pub mod digest;
pub mod sources;

pub use digest::DigestConfig;
pub use sources::{default_sources, load_sources, load_sources_from};
