use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signing::canonical::{canonicalize, CanonicalRules};
use crate::payments::types::ProviderName;
use crate::payments::utils::secure_eq;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFn {
    Sha256,
    Sha512,
    /// Keyed with [`SigningKeys::secret`].
    HmacSha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Hex,
    /// Base64 of the raw digest bytes.
    Base64,
    /// Base64 of the ASCII hex digest.
    HexThenBase64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseRule {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy)]
pub enum StageInput {
    /// Canonical pipe string of the request parameters plus the secret.
    Canonical(CanonicalRules),
    /// Plain concatenation of named values, no separators.
    Concat(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub input: StageInput,
    pub hash: HashFn,
    pub encoding: OutputEncoding,
    /// Applied to the hex text before any base64 repacking.
    pub case: CaseRule,
    /// Name under which later stages can read this stage's output.
    pub output_key: Option<&'static str>,
}

/// Fixed signing policy of one gateway. Changing a constant of this type
/// invalidates every 3-D session signed under the previous policy.
#[derive(Debug, Clone, Copy)]
pub struct SignatureSpec {
    pub provider: ProviderName,
    pub stages: &'static [Stage],
}

/// Secret material that is never sent on the wire.
#[derive(Clone, Default)]
pub struct SigningKeys {
    pub secret: String,
    /// Credential values a `Concat` stage may reference (username, password, ...).
    pub material: BTreeMap<String, String>,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("secret", &"***")
            .field("material", &self.material.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SigningKeys {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            material: BTreeMap::new(),
        }
    }

    pub fn with_material(mut self, key: &str, value: impl Into<String>) -> Self {
        self.material.insert(key.to_string(), value.into());
        self
    }
}

fn digest(provider: &str, hash: HashFn, input: &[u8], secret: &str) -> PaymentResult<Vec<u8>> {
    match hash {
        HashFn::Sha256 => Ok(Sha256::digest(input).to_vec()),
        HashFn::Sha512 => Ok(Sha512::digest(input).to_vec()),
        HashFn::HmacSha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
                .map_err(|e| PaymentError::signing(provider, e.to_string()))?;
            mac.update(input);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

fn encode(bytes: &[u8], encoding: OutputEncoding, case: CaseRule) -> String {
    let cased_hex = || {
        let hex = hex::encode(bytes);
        match case {
            CaseRule::Lower => hex,
            CaseRule::Upper => hex.to_uppercase(),
        }
    };
    match encoding {
        OutputEncoding::Hex => cased_hex(),
        OutputEncoding::Base64 => BASE64.encode(bytes),
        OutputEncoding::HexThenBase64 => BASE64.encode(cased_hex().as_bytes()),
    }
}

/// Computes `spec`'s signature over `params`.
pub fn sign(
    spec: &SignatureSpec,
    params: &BTreeMap<String, String>,
    keys: &SigningKeys,
) -> PaymentResult<String> {
    sign_inner(spec, params, keys).map_err(|e| {
        error!(provider = %spec.provider, error = %e, "request signing failed");
        e
    })
}

fn sign_inner(
    spec: &SignatureSpec,
    params: &BTreeMap<String, String>,
    keys: &SigningKeys,
) -> PaymentResult<String> {
    let provider = spec.provider.as_str();
    let mut threaded: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut last = None;

    for (idx, stage) in spec.stages.iter().enumerate() {
        let input = match stage.input {
            StageInput::Canonical(rules) => canonicalize(params, &keys.secret, &rules),
            StageInput::Concat(names) => {
                let mut joined = String::new();
                for name in names {
                    let value = threaded
                        .get(name)
                        .or_else(|| keys.material.get(*name))
                        .or_else(|| params.get(*name))
                        .ok_or_else(|| {
                            PaymentError::signing(
                                provider,
                                format!("stage {} references missing value '{}'", idx + 1, name),
                            )
                        })?;
                    joined.push_str(value);
                }
                joined
            }
        };

        let bytes = digest(provider, stage.hash, input.as_bytes(), &keys.secret)?;
        let encoded = encode(&bytes, stage.encoding, stage.case);

        if let Some(key) = stage.output_key {
            if threaded.contains_key(key)
                || keys.material.contains_key(key)
                || params.contains_key(key)
            {
                return Err(PaymentError::signing(
                    provider,
                    format!("stage output '{}' would shadow an existing value", key),
                ));
            }
            threaded.insert(key, encoded.clone());
        }
        last = Some(encoded);
    }

    last.ok_or_else(|| PaymentError::signing(provider, "signature spec has no stages"))
}

/// Recomputes the signature and compares it in constant time.
pub fn verify(
    spec: &SignatureSpec,
    params: &BTreeMap<String, String>,
    keys: &SigningKeys,
    presented: &str,
) -> PaymentResult<bool> {
    let expected = sign(spec, params, keys)?;
    Ok(secure_eq(expected.as_bytes(), presented.trim().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::signing::canonical::{KeyOrder, SecretBoundary};

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const RULES: CanonicalRules = CanonicalRules {
        excluded_keys: &["hash"],
        key_order: KeyOrder::CaseSensitive,
        secret_boundary: SecretBoundary::Bare,
    };

    #[test]
    fn encodings_are_not_interchangeable() {
        let bytes = Sha256::digest(b"abc").to_vec();
        let hex = encode(&bytes, OutputEncoding::Hex, CaseRule::Lower);
        let b64 = encode(&bytes, OutputEncoding::Base64, CaseRule::Lower);
        let hex_b64 = encode(&bytes, OutputEncoding::HexThenBase64, CaseRule::Lower);
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(b64, "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
        assert_eq!(
            hex_b64,
            BASE64.encode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        let upper_b64 = encode(&bytes, OutputEncoding::HexThenBase64, CaseRule::Upper);
        assert_ne!(hex_b64, upper_b64);
    }

    #[test]
    fn missing_concat_value_is_a_signing_error() {
        const STAGES: &[Stage] = &[Stage {
            input: StageInput::Concat(&["username", "password"]),
            hash: HashFn::Sha256,
            encoding: OutputEncoding::Hex,
            case: CaseRule::Lower,
            output_key: None,
        }];
        let spec = SignatureSpec {
            provider: ProviderName::Turkpay,
            stages: STAGES,
        };
        let keys = SigningKeys::new("s").with_material("username", "u");
        let err = sign(&spec, &BTreeMap::new(), &keys).unwrap_err();
        assert!(matches!(err, PaymentError::SigningError { .. }));
    }

    #[test]
    fn stage_output_cannot_be_injected_by_request_params() {
        const STAGES: &[Stage] = &[
            Stage {
                input: StageInput::Concat(&["password"]),
                hash: HashFn::Sha256,
                encoding: OutputEncoding::Hex,
                case: CaseRule::Upper,
                output_key: Some("token"),
            },
            Stage {
                input: StageInput::Concat(&["token"]),
                hash: HashFn::Sha256,
                encoding: OutputEncoding::Hex,
                case: CaseRule::Lower,
                output_key: None,
            },
        ];
        let spec = SignatureSpec {
            provider: ProviderName::Turkpay,
            stages: STAGES,
        };
        let keys = SigningKeys::new("s").with_material("password", "p");
        assert!(sign(&spec, &BTreeMap::new(), &keys).is_ok());
        let forged = params(&[("token", "attacker-chosen")]);
        assert!(sign(&spec, &forged, &keys).is_err());
    }

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        const STAGES: &[Stage] = &[Stage {
            input: StageInput::Canonical(RULES),
            hash: HashFn::Sha512,
            encoding: OutputEncoding::Base64,
            case: CaseRule::Lower,
            output_key: None,
        }];
        let spec = SignatureSpec {
            provider: ProviderName::Estpos,
            stages: STAGES,
        };
        let keys = SigningKeys::new("store-key");
        let mut p = params(&[("amount", "1.00"), ("oid", "A1")]);
        let signature = sign(&spec, &p, &keys).unwrap();
        p.insert("hash".to_string(), signature.clone());
        assert!(verify(&spec, &p, &keys, &signature).unwrap());

        p.insert("amount".to_string(), "100.00".to_string());
        assert!(!verify(&spec, &p, &keys, &signature).unwrap());
    }

    #[test]
    fn empty_spec_is_rejected() {
        let spec = SignatureSpec {
            provider: ProviderName::Paylink,
            stages: &[],
        };
        assert!(sign(&spec, &BTreeMap::new(), &SigningKeys::new("s")).is_err());
    }
}
