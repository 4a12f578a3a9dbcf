//! Request canonicalization and per-gateway signature computation

pub mod canonical;
pub mod engine;
pub mod policies;

pub use engine::{sign, verify, SignatureSpec, SigningKeys};
