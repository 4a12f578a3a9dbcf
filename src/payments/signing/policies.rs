//! Signing policy of every supported gateway.
//!
//! Each constant mirrors the gateway's own canonicalization rule. The golden
//! vectors below pin sort order, escaping and secret placement per gateway.

use crate::payments::signing::canonical::{CanonicalRules, KeyOrder, SecretBoundary};
use crate::payments::signing::engine::{
    CaseRule, HashFn, OutputEncoding, SignatureSpec, Stage, StageInput,
};
use crate::payments::types::ProviderName;

/// Field names a Turkpay `Concat` stage reads.
pub mod turkpay_fields {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const SECRET_CODE: &str = "secretcode";
    pub const TRANSACTION_ID: &str = "transactionid";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SECURITY_TOKEN: &str = "securitytoken";
}

pub const ESTPOS_RULES: CanonicalRules = CanonicalRules {
    excluded_keys: &["hash", "encoding", "storekey"],
    key_order: KeyOrder::CaseInsensitive,
    secret_boundary: SecretBoundary::Bare,
};

/// Store-key hash, "ver3": SHA-512 over the canonical string, base64.
pub const ESTPOS: SignatureSpec = SignatureSpec {
    provider: ProviderName::Estpos,
    stages: &[Stage {
        input: StageInput::Canonical(ESTPOS_RULES),
        hash: HashFn::Sha512,
        encoding: OutputEncoding::Base64,
        case: CaseRule::Lower,
        output_key: None,
    }],
};

pub const PAYLINK_RULES: CanonicalRules = CanonicalRules {
    excluded_keys: &["signature"],
    key_order: KeyOrder::CaseSensitive,
    secret_boundary: SecretBoundary::Terminated,
};

/// HMAC-SHA-512 keyed with the API secret, lowercase hex, sent as `x-signature`.
pub const PAYLINK: SignatureSpec = SignatureSpec {
    provider: ProviderName::Paylink,
    stages: &[Stage {
        input: StageInput::Canonical(PAYLINK_RULES),
        hash: HashFn::HmacSha512,
        encoding: OutputEncoding::Hex,
        case: CaseRule::Lower,
        output_key: None,
    }],
};

/// Two-stage SHA-256: the uppercase security token feeds the final hash,
/// whose lowercase hex text is base64-encoded.
pub const TURKPAY: SignatureSpec = SignatureSpec {
    provider: ProviderName::Turkpay,
    stages: &[
        Stage {
            input: StageInput::Concat(&[turkpay_fields::PASSWORD, turkpay_fields::USERNAME]),
            hash: HashFn::Sha256,
            encoding: OutputEncoding::Hex,
            case: CaseRule::Upper,
            output_key: Some(turkpay_fields::SECURITY_TOKEN),
        },
        Stage {
            input: StageInput::Concat(&[
                turkpay_fields::USERNAME,
                turkpay_fields::TRANSACTION_ID,
                turkpay_fields::TIMESTAMP,
                turkpay_fields::SECRET_CODE,
                turkpay_fields::SECURITY_TOKEN,
            ]),
            hash: HashFn::Sha256,
            encoding: OutputEncoding::HexThenBase64,
            case: CaseRule::Lower,
            output_key: None,
        },
    ],
};

pub fn for_provider(provider: ProviderName) -> &'static SignatureSpec {
    match provider {
        ProviderName::Estpos => &ESTPOS,
        ProviderName::Paylink => &PAYLINK,
        ProviderName::Turkpay => &TURKPAY,
    }
}
