//! StarkEx-style request signing for edgeX
//!
//! Canonical message `{timestamp}{METHOD}{path}{sortedParams}` is hashed
//! with SHA3-256, the digest is reduced modulo the Stark field prime, and
//! the reduced value is ECDSA-signed on the Stark curve. The signature is
//! emitted as `r‖s`, two zero-left-padded 64-hex-character fields with no
//! recovery byte.

use super::{sign_hash, NonceMode, OutboundRequest, SignedRequest, SigningError, SigningKeyMaterial};
use crate::venues::Venue;
use num_bigint::BigUint;
use sha3::{Digest, Sha3_256};
use starknet_types_core::felt::Felt;

/// Stark field prime: 2^251 + 17 * 2^192 + 1.
///
/// Reducing the digest modulo this prime is what distinguishes the scheme
/// from vanilla ECDSA; the venue rejects signatures over unreduced hashes.
const STARK_FIELD_PRIME_HEX: &str =
    "800000000000011000000000000000000000000000000000000000000000001";

/// Timestamp header name (venue contract)
pub const TIMESTAMP_HEADER: &str = "X-Edgex-Api-Timestamp";
/// Signature header name (venue contract)
pub const SIGNATURE_HEADER: &str = "X-Edgex-Api-Signature";

/// Signer for the edgeX StarkEx-style authentication scheme
#[derive(Debug)]
pub struct StarkexSigner {
    keys: SigningKeyMaterial,
    nonce_mode: NonceMode,
}

impl StarkexSigner {
    /// Build a signer from validated key material
    pub fn new(keys: SigningKeyMaterial, nonce_mode: NonceMode) -> Self {
        Self { keys, nonce_mode }
    }

    /// Venue this signer authenticates against
    pub fn venue(&self) -> Venue {
        self.keys.venue()
    }

    /// Derived public key, 0x-prefixed hex
    pub fn public_key_hex(&self) -> String {
        format!("0x{:x}", self.keys.public_key())
    }

    /// Sign an outbound request and attach the venue's auth headers
    pub fn sign_request(&self, request: &OutboundRequest) -> Result<SignedRequest, SigningError> {
        let message = canonical_message(
            request.timestamp_ms,
            &request.method,
            &request.path,
            &request.query,
        );
        let hash = reduced_message_hash(&message);
        let (r, s) = sign_hash(&self.keys, &hash, self.nonce_mode)?;
        let signature = encode_signature(&r, &s);

        Ok(SignedRequest {
            venue: self.keys.venue(),
            timestamp_ms: request.timestamp_ms,
            headers: vec![
                (TIMESTAMP_HEADER.to_string(), request.timestamp_ms.to_string()),
                (SIGNATURE_HEADER.to_string(), signature.clone()),
            ],
            message,
            signature,
            body: request.body.clone(),
        })
    }
}

/// Build the canonical message string.
///
/// Parameters render as `key=value` pairs joined by `&`, keys sorted
/// lexicographically ascending, with no leading `?`; an empty parameter
/// set contributes nothing. Pinned by contract test against the venue's
/// documented convention.
pub fn canonical_message(
    timestamp_ms: i64,
    method: &str,
    path: &str,
    query: &[(String, String)],
) -> String {
    let mut sorted: Vec<&(String, String)> = query.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let params = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}{}{}{}", timestamp_ms, method.to_uppercase(), path, params)
}

/// SHA3-256 the message and reduce the digest modulo the Stark field prime.
///
/// The reduction is idempotent: reducing an already-reduced value yields
/// the same field element.
pub fn reduced_message_hash(message: &str) -> Felt {
    let digest = Sha3_256::digest(message.as_bytes());
    let reduced = BigUint::from_bytes_be(&digest) % stark_field_prime();
    Felt::from_bytes_be_slice(&reduced.to_bytes_be())
}

/// Stark field prime as a big unsigned integer
pub fn stark_field_prime() -> BigUint {
    BigUint::parse_bytes(STARK_FIELD_PRIME_HEX.as_bytes(), 16)
        .expect("stark field prime constant is valid hex")
}

fn encode_signature(r: &Felt, s: &Felt) -> String {
    format!("{}{}", hex::encode(r.to_bytes_be()), hex::encode(s.to_bytes_be()))
}
