//! Services module for business logic

pub mod checkout;

pub use checkout::CheckoutService;
