//! Per-venue request authentication
//!
//! Two signature schemes, one per venue, behind a single closed dispatch
//! enum. Signing is a pure function of message content and key material:
//! no I/O, no mutable state, safe to call concurrently from multiple
//! callers sharing the same signer.

pub mod starkex;
pub mod typed_data;

pub use starkex::StarkexSigner;
pub use typed_data::TypedDataSigner;

use crate::venues::Venue;
use num_bigint::BigUint;
use num_traits::Zero;
use starknet_crypto::{ecdsa_sign, ecdsa_verify, get_public_key, rfc6979_generate_k, Signature};
use starknet_types_core::felt::Felt;
use std::fmt;

/// Order of the Stark curve's generator point
const EC_ORDER_HEX: &str = "800000000000010ffffffffffffffffb781126dcae7b2321e66a241adc64d2f";

/// Request-signing failures
#[derive(thiserror::Error, Debug)]
pub enum SigningError {
    /// Private key is zero, outside the curve order, or malformed hex
    #[error("Invalid key material for {venue}: {reason}")]
    InvalidKeyMaterial {
        /// Venue the key belongs to
        venue: Venue,
        /// What was wrong with the key
        reason: String,
    },

    /// Derived public key does not match the account's on-record public key
    #[error("Public key on record for {venue} does not match the key derived from the private key")]
    PublicKeyMismatch {
        /// Venue the key belongs to
        venue: Venue,
    },

    /// Post-signature self-verification did not hold
    #[error("Signature self-verification failed for {venue}")]
    SignatureVerificationMismatch {
        /// Venue the signature was produced for
        venue: Venue,
    },

    /// Message could not be brought into signable form
    #[error("Unsignable message for {venue}: {reason}")]
    UnsignableMessage {
        /// Venue the message was built for
        venue: Venue,
        /// Why the message cannot be signed
        reason: String,
    },

    /// Failure inside the curve arithmetic backend
    #[error("Signing backend error for {venue}: {reason}")]
    Backend {
        /// Venue the operation ran for
        venue: Venue,
        /// Backend-reported reason
        reason: String,
    },
}

/// ECDSA nonce generation mode.
///
/// Deterministic RFC-6979 nonces make signatures reproducible for
/// golden-vector tests; randomized seeds are available for venues that
/// require unique nonces per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonceMode {
    /// RFC-6979 deterministic nonce (default)
    #[default]
    Deterministic,
    /// RFC-6979 with a random per-call seed
    Randomized,
}

impl std::str::FromStr for NonceMode {
    type Err = crate::ArbitrageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deterministic" => Ok(NonceMode::Deterministic),
            "randomized" => Ok(NonceMode::Randomized),
            _ => Err(crate::ArbitrageError::Config(format!(
                "Unknown nonce mode: {}",
                s
            ))),
        }
    }
}

/// Venue key material: private key, derived public key, account identity.
///
/// Loaded once at startup and held for the process lifetime. The raw
/// private key never leaves this struct and is redacted from debug output.
pub struct SigningKeyMaterial {
    venue: Venue,
    private_key: Felt,
    public_key: Felt,
    account: String,
}

impl SigningKeyMaterial {
    /// Parse and validate key material.
    ///
    /// The private key must be nonzero, below the curve order, and valid
    /// hex. When an on-record public key is supplied it must equal the key
    /// derived from the private key; this pairing check is the dominant
    /// real-world failure mode for venue authentication and runs before
    /// first use.
    pub fn load(
        venue: Venue,
        account: &str,
        private_key_hex: &str,
        on_record_public_key_hex: Option<&str>,
    ) -> Result<Self, SigningError> {
        let private_key = parse_private_key(venue, private_key_hex)?;
        let public_key = get_public_key(&private_key);

        if let Some(expected_hex) = on_record_public_key_hex {
            let expected = parse_felt(venue, expected_hex, "public key")?;
            if expected != public_key {
                return Err(SigningError::PublicKeyMismatch { venue });
            }
        }

        Ok(Self {
            venue,
            private_key,
            public_key,
            account: account.to_string(),
        })
    }

    /// Venue this key material belongs to
    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Derived public key
    pub fn public_key(&self) -> &Felt {
        &self.public_key
    }

    /// Account id / address as configured at the venue
    pub fn account(&self) -> &str {
        &self.account
    }

    pub(crate) fn private_key(&self) -> &Felt {
        &self.private_key
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("venue", &self.venue)
            .field("account", &self.account)
            .field("public_key", &format!("0x{:x}", self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A request in the venue-neutral shape handed to a signer
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Target venue
    pub venue: Venue,
    /// HTTP method, any case
    pub method: String,
    /// Request path, e.g. `/api/v1/private/order`
    pub path: String,
    /// Query / form parameters in arbitrary order
    pub query: Vec<(String, String)>,
    /// JSON body forwarded to the executor
    pub body: String,
    /// Request timestamp, epoch milliseconds
    pub timestamp_ms: i64,
}

/// A signed request ready for submission.
///
/// Ephemeral: produced per call and consumed immediately by the order
/// executor.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Target venue
    pub venue: Venue,
    /// Canonical message (or typed-data hash) the signature covers
    pub message: String,
    /// Venue-specific signature encoding
    pub signature: String,
    /// Timestamp the signature covers, epoch milliseconds
    pub timestamp_ms: i64,
    /// Authentication headers, in venue-contract order
    pub headers: Vec<(String, String)>,
    /// JSON body forwarded to the executor
    pub body: String,
}

/// Closed set of per-venue signing schemes, dispatched by venue identity
#[derive(Debug)]
pub enum RequestSigner {
    /// StarkEx-style ECDSA over a modulus-reduced SHA3 digest (edgeX)
    Starkex(StarkexSigner),
    /// StarkNet typed-data signature (Paradex)
    TypedData(TypedDataSigner),
}

impl RequestSigner {
    /// Venue this signer authenticates against
    pub fn venue(&self) -> Venue {
        match self {
            RequestSigner::Starkex(s) => s.venue(),
            RequestSigner::TypedData(s) => s.venue(),
        }
    }

    /// Produce a signed request for the target venue
    pub fn sign_request(&self, request: &OutboundRequest) -> Result<SignedRequest, SigningError> {
        match self {
            RequestSigner::Starkex(s) => s.sign_request(request),
            RequestSigner::TypedData(s) => s.sign_request(request),
        }
    }

    /// Derived public key, 0x-prefixed hex
    pub fn public_key_hex(&self) -> String {
        match self {
            RequestSigner::Starkex(s) => s.public_key_hex(),
            RequestSigner::TypedData(s) => s.public_key_hex(),
        }
    }

    /// Sign-and-verify smoke test over a fixed probe request.
    ///
    /// Run at startup; a failure here means the key/account pairing is
    /// unusable and must surface before any order is placed.
    pub fn self_check(&self) -> Result<(), SigningError> {
        let probe = OutboundRequest {
            venue: self.venue(),
            method: "GET".to_string(),
            path: "/ping".to_string(),
            query: vec![],
            body: String::new(),
            timestamp_ms: 0,
        };
        self.sign_request(&probe).map(|_| ())
    }
}

/// Sign a message hash and self-verify the result.
///
/// The verification step is mandatory: a mismatch means the key material
/// and account pairing cannot produce venue-accepted signatures and must
/// never be silently ignored.
pub(crate) fn sign_hash(
    keys: &SigningKeyMaterial,
    hash: &Felt,
    mode: NonceMode,
) -> Result<(Felt, Felt), SigningError> {
    let venue = keys.venue();
    let backend = |e: &dyn fmt::Display| SigningError::Backend {
        venue,
        reason: e.to_string(),
    };

    let signature = match mode {
        NonceMode::Deterministic => {
            let extended = ecdsa_sign(keys.private_key(), hash).map_err(|e| backend(&e))?;
            Signature {
                r: extended.r,
                s: extended.s,
            }
        }
        NonceMode::Randomized => {
            let mut attempts = 0u32;
            loop {
                let seed_bytes: [u8; 32] = rand::random();
                let seed = Felt::from_bytes_be_slice(&seed_bytes);
                let k = rfc6979_generate_k(hash, keys.private_key(), Some(&seed));
                match starknet_crypto::sign(keys.private_key(), hash, &k) {
                    Ok(extended) => {
                        break Signature {
                            r: extended.r,
                            s: extended.s,
                        }
                    }
                    Err(e) if attempts >= 8 => return Err(backend(&e)),
                    Err(_) => attempts += 1,
                }
            }
        }
    };

    let verified =
        ecdsa_verify(keys.public_key(), hash, &signature).map_err(|e| backend(&e))?;
    if !verified {
        return Err(SigningError::SignatureVerificationMismatch { venue });
    }

    Ok((signature.r, signature.s))
}

/// Order of the Stark curve as a big unsigned integer
pub(crate) fn curve_order() -> BigUint {
    BigUint::parse_bytes(EC_ORDER_HEX.as_bytes(), 16)
        .expect("curve order constant is valid hex")
}

fn parse_private_key(venue: Venue, hex_str: &str) -> Result<Felt, SigningError> {
    let value = parse_biguint(venue, hex_str, "private key")?;
    if value.is_zero() {
        return Err(SigningError::InvalidKeyMaterial {
            venue,
            reason: "private key is zero".to_string(),
        });
    }
    if value >= curve_order() {
        return Err(SigningError::InvalidKeyMaterial {
            venue,
            reason: "private key is not below the curve order".to_string(),
        });
    }
    Ok(Felt::from_bytes_be_slice(&value.to_bytes_be()))
}

pub(crate) fn parse_felt(venue: Venue, hex_str: &str, what: &str) -> Result<Felt, SigningError> {
    let value = parse_biguint(venue, hex_str, what)?;
    Ok(Felt::from_bytes_be_slice(&value.to_bytes_be()))
}

fn parse_biguint(venue: Venue, hex_str: &str, what: &str) -> Result<BigUint, SigningError> {
    let trimmed = hex_str.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(SigningError::InvalidKeyMaterial {
            venue,
            reason: format!("{} is empty", what),
        });
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(|| SigningError::InvalidKeyMaterial {
        venue,
        reason: format!("{} is malformed hex", what),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x3c1e9550e66958296d11b60f8e8e7a7ad990d07fa65d5f7652c4a6c87d4e3cc";

    #[test]
    fn test_load_valid_key_material() {
        let keys = SigningKeyMaterial::load(Venue::Edgex, "acct-1", TEST_KEY, None).unwrap();
        assert_eq!(keys.venue(), Venue::Edgex);
        assert_ne!(*keys.public_key(), Felt::ZERO);
    }

    #[test]
    fn test_zero_private_key_rejected() {
        let err = SigningKeyMaterial::load(Venue::Edgex, "acct-1", "0x0", None).unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyMaterial { .. }));
    }

    #[test]
    fn test_out_of_range_private_key_rejected() {
        // exactly the curve order
        let key = format!("0x{}", EC_ORDER_HEX);
        let err = SigningKeyMaterial::load(Venue::Edgex, "acct-1", &key, None).unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyMaterial { .. }));
    }

    #[test]
    fn test_malformed_hex_rejected() {
        let err =
            SigningKeyMaterial::load(Venue::Edgex, "acct-1", "0xnot-hex", None).unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyMaterial { .. }));
    }

    #[test]
    fn test_public_key_pairing_check() {
        let keys = SigningKeyMaterial::load(Venue::Paradex, "0xabc", TEST_KEY, None).unwrap();
        let on_record = format!("0x{:x}", keys.public_key());

        // matching on-record key is accepted
        assert!(
            SigningKeyMaterial::load(Venue::Paradex, "0xabc", TEST_KEY, Some(&on_record)).is_ok()
        );

        // a different on-record key is a pairing failure
        let err = SigningKeyMaterial::load(Venue::Paradex, "0xabc", TEST_KEY, Some("0x1234"))
            .unwrap_err();
        assert!(matches!(err, SigningError::PublicKeyMismatch { .. }));
    }

    #[test]
    fn test_sign_hash_deterministic_and_verified() {
        let keys = SigningKeyMaterial::load(Venue::Edgex, "acct-1", TEST_KEY, None).unwrap();
        let hash = Felt::from(123456789u64);

        let first = sign_hash(&keys, &hash, NonceMode::Deterministic).unwrap();
        let second = sign_hash(&keys, &hash, NonceMode::Deterministic).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sign_hash_randomized_still_verifies() {
        let keys = SigningKeyMaterial::load(Venue::Edgex, "acct-1", TEST_KEY, None).unwrap();
        let hash = Felt::from(987654321u64);

        // randomized nonces give valid (if non-reproducible) signatures
        assert!(sign_hash(&keys, &hash, NonceMode::Randomized).is_ok());
    }

    #[test]
    fn test_key_material_debug_redacts_private_key() {
        let keys = SigningKeyMaterial::load(Venue::Edgex, "acct-1", TEST_KEY, None).unwrap();
        let rendered = format!("{:?}", keys);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(TEST_KEY.trim_start_matches("0x")));
    }
}
