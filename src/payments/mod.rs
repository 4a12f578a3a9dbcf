//! Card payments through several acquiring gateways with 3-D Secure.

pub mod attempt;
pub mod audit;
pub mod callback;
pub mod error;
pub mod factory;
pub mod normalizer;
pub mod provider;
pub mod providers;
pub mod redirect;
pub mod session;
pub mod signing;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{PaymentError, PaymentResult};
pub use factory::ProviderRegistry;
pub use provider::PaymentProvider;
pub use session::ProviderSession;
