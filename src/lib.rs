//! Card payment orchestration for Turkish virtual POS gateways: request
//! signing, 3-D Secure round trips and normalized results.

pub mod api;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
