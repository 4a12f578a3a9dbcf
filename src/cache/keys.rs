//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod callback {
    use super::*;

    pub const NAMESPACE: &str = "callback";

    /// Serialized transaction context behind a 3-D callback token.
    #[derive(Debug, Clone)]
    pub struct TokenKey {
        pub token: String,
    }

    impl TokenKey {
        pub fn new(token: impl Into<String>) -> Self {
            Self {
                token: token.into(),
            }
        }
    }

    impl fmt::Display for TokenKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:token:{}", VERSION, NAMESPACE, self.token)
        }
    }
}
