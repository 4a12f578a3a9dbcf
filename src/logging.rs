//! Tracing initialisation and log-field masking helpers

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber from environment configuration.
///
/// `RUST_LOG` wins over `LOG_LEVEL` when both are set.
pub fn init_tracing() {
    let config = LoggingConfig::from_env().unwrap_or_default();
    init_tracing_with(&config);
}

pub fn init_tracing_with(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry.with(fmt::layer().with_target(false)).try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Keep only the last four digits of a card number.
pub fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "****".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), tail)
}

/// Show a short prefix of an opaque token so log lines stay correlatable.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 6 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(6).collect();
    format!("{}***", prefix)
}
