//! StarkNet typed-data request signing for Paradex
//!
//! The authentication intent is hashed as domain-separated structured data:
//! a Pedersen hash chain over the `"StarkNet Message"` prefix, the domain
//! struct hash (name, chain id, version), the account address, and the
//! request struct hash. The result is ECDSA-signed on the Stark curve with
//! the account key.

use super::{parse_felt, sign_hash, NonceMode, OutboundRequest, SignedRequest, SigningError, SigningKeyMaterial};
use crate::venues::Venue;
use sha3::{Digest, Keccak256};
use starknet_crypto::pedersen_hash;
use starknet_types_core::felt::Felt;

/// Account header name (venue contract)
pub const ACCOUNT_HEADER: &str = "Paradex-Starknet-Account";
/// Signature header name (venue contract)
pub const SIGNATURE_HEADER: &str = "Paradex-Starknet-Signature";
/// Timestamp header name (venue contract)
pub const TIMESTAMP_HEADER: &str = "Paradex-Timestamp";

const MESSAGE_PREFIX: &str = "StarkNet Message";
const DOMAIN_NAME: &str = "Paradex";
const DOMAIN_VERSION: &str = "1";
const DOMAIN_TYPE: &str = "StarkNetDomain(name:felt,chainId:felt,version:felt)";
const REQUEST_TYPE: &str = "Request(method:felt,path:felt,bodyHash:felt,timestamp:felt)";

/// Signer for the Paradex StarkNet typed-data authentication scheme
#[derive(Debug)]
pub struct TypedDataSigner {
    keys: SigningKeyMaterial,
    account: Felt,
    domain_hash: Felt,
}

impl TypedDataSigner {
    /// Build a signer from validated key material and the venue chain id
    /// (a Cairo short string, e.g. `PRIVATE_SN_PARACLEAR_MAINNET`)
    pub fn new(keys: SigningKeyMaterial, chain_id: &str) -> Result<Self, SigningError> {
        let venue = keys.venue();
        let account = parse_felt(venue, keys.account(), "account address")?;
        let chain_id_felt = short_string_to_felt(venue, chain_id)?;
        let domain_hash = hash_on_elements(&[
            type_selector(DOMAIN_TYPE),
            short_string_to_felt(venue, DOMAIN_NAME)?,
            chain_id_felt,
            short_string_to_felt(venue, DOMAIN_VERSION)?,
        ]);

        Ok(Self {
            keys,
            account,
            domain_hash,
        })
    }

    /// Venue this signer authenticates against
    pub fn venue(&self) -> Venue {
        self.keys.venue()
    }

    /// Derived public key, 0x-prefixed hex
    pub fn public_key_hex(&self) -> String {
        format!("0x{:x}", self.keys.public_key())
    }

    /// Domain-separated typed-data hash of an authentication intent
    pub fn message_hash(
        &self,
        method: &str,
        path: &str,
        body: &str,
        timestamp_ms: i64,
    ) -> Result<Felt, SigningError> {
        let venue = self.keys.venue();
        let struct_hash = hash_on_elements(&[
            type_selector(REQUEST_TYPE),
            short_string_to_felt(venue, &method.to_uppercase())?,
            starknet_keccak(path.as_bytes()),
            starknet_keccak(body.as_bytes()),
            Felt::from(timestamp_ms.max(0) as u64),
        ]);

        Ok(hash_on_elements(&[
            short_string_to_felt(venue, MESSAGE_PREFIX)?,
            self.domain_hash,
            self.account,
            struct_hash,
        ]))
    }

    /// Sign an outbound request and attach the venue's auth headers
    pub fn sign_request(&self, request: &OutboundRequest) -> Result<SignedRequest, SigningError> {
        let hash = self.message_hash(
            &request.method,
            &request.path,
            &request.body,
            request.timestamp_ms,
        )?;
        // typed-data flow is deterministic; the venue accepts RFC-6979 nonces
        let (r, s) = sign_hash(&self.keys, &hash, NonceMode::Deterministic)?;
        let signature = format!(
            "[\"0x{}\",\"0x{}\"]",
            hex::encode(r.to_bytes_be()),
            hex::encode(s.to_bytes_be())
        );

        Ok(SignedRequest {
            venue: self.keys.venue(),
            message: format!("0x{}", hex::encode(hash.to_bytes_be())),
            timestamp_ms: request.timestamp_ms,
            headers: vec![
                (ACCOUNT_HEADER.to_string(), self.keys.account().to_string()),
                (SIGNATURE_HEADER.to_string(), signature.clone()),
                (TIMESTAMP_HEADER.to_string(), request.timestamp_ms.to_string()),
            ],
            signature,
            body: request.body.clone(),
        })
    }
}

/// Pedersen hash chain with length finalization, the StarkNet
/// `compute_hash_on_elements` construction
pub fn hash_on_elements(elements: &[Felt]) -> Felt {
    let mut acc = Felt::ZERO;
    for element in elements {
        acc = pedersen_hash(&acc, element);
    }
    pedersen_hash(&acc, &Felt::from(elements.len() as u64))
}

/// Keccak-256 truncated to its low 250 bits, the StarkNet selector hash
pub fn starknet_keccak(data: &[u8]) -> Felt {
    let mut digest: [u8; 32] = Keccak256::digest(data).into();
    // keep the low 250 bits so the value is a valid field element
    digest[0] &= 0x03;
    Felt::from_bytes_be(&digest)
}

/// Encode an ASCII string of at most 31 characters as a field element
pub fn short_string_to_felt(venue: Venue, s: &str) -> Result<Felt, SigningError> {
    if s.len() > 31 || !s.is_ascii() {
        return Err(SigningError::UnsignableMessage {
            venue,
            reason: format!("'{}' is not a Cairo short string", s),
        });
    }
    Ok(Felt::from_bytes_be_slice(s.as_bytes()))
}

fn type_selector(type_string: &str) -> Felt {
    starknet_keccak(type_string.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starknet_crypto::{ecdsa_verify, Signature};

    const TEST_KEY: &str = "0x57c2d22f9a8f387b6bfdfd9e3b431e22ab6503056b10e828b4fe8cbe2dbb53b";
    const TEST_ACCOUNT: &str = "0x129f6e9a19b4a6b6b06fb9c85bf22bf5c25bfbb1195e3fcd8e0b3f96b3f7dee";
    const CHAIN_ID: &str = "PRIVATE_SN_PARACLEAR_MAINNET";

    fn signer() -> TypedDataSigner {
        let keys =
            SigningKeyMaterial::load(Venue::Paradex, TEST_ACCOUNT, TEST_KEY, None).unwrap();
        TypedDataSigner::new(keys, CHAIN_ID).unwrap()
    }

    fn request(body: &str) -> OutboundRequest {
        OutboundRequest {
            venue: Venue::Paradex,
            method: "POST".to_string(),
            path: "/orders".to_string(),
            query: vec![],
            body: body.to_string(),
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_short_string_round_trip() {
        let felt = short_string_to_felt(Venue::Paradex, "Paradex").unwrap();
        assert_eq!(felt, Felt::from_bytes_be_slice("Paradex".as_bytes()));
    }

    #[test]
    fn test_short_string_length_limit() {
        let too_long = "a".repeat(32);
        assert!(short_string_to_felt(Venue::Paradex, &too_long).is_err());
        assert!(short_string_to_felt(Venue::Paradex, &"a".repeat(31)).is_ok());
    }

    #[test]
    fn test_starknet_keccak_fits_in_250_bits() {
        let felt = starknet_keccak(b"Request(method:felt)");
        let bytes = felt.to_bytes_be();
        assert_eq!(bytes[0] & 0xfc, 0);
    }

    #[test]
    fn test_hash_on_elements_depends_on_length() {
        let a = hash_on_elements(&[Felt::from(1u64)]);
        let b = hash_on_elements(&[Felt::from(1u64), Felt::ZERO]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_hash_is_domain_separated() {
        let s = signer();
        let keys_other =
            SigningKeyMaterial::load(Venue::Paradex, TEST_ACCOUNT, TEST_KEY, None).unwrap();
        let other_domain = TypedDataSigner::new(keys_other, "SN_SEPOLIA").unwrap();

        let hash_a = s.message_hash("POST", "/orders", "{}", 1).unwrap();
        let hash_b = other_domain.message_hash("POST", "/orders", "{}", 1).unwrap();
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_message_hash_changes_with_body() {
        let s = signer();
        let a = s.message_hash("POST", "/orders", "{\"size\":1}", 1).unwrap();
        let b = s.message_hash("POST", "/orders", "{\"size\":2}", 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sign_request_verifies_and_sets_headers() {
        let s = signer();
        let signed = s.sign_request(&request("{\"market\":\"BTC-USD-PERP\"}")).unwrap();

        assert_eq!(signed.headers[0].0, ACCOUNT_HEADER);
        assert_eq!(signed.headers[0].1, TEST_ACCOUNT);
        assert_eq!(signed.headers[1].0, SIGNATURE_HEADER);
        assert!(signed.headers[1].1.starts_with("[\"0x"));
        assert_eq!(signed.headers[2].0, TIMESTAMP_HEADER);

        // signature round-trips against the derived public key
        let keys =
            SigningKeyMaterial::load(Venue::Paradex, TEST_ACCOUNT, TEST_KEY, None).unwrap();
        let hash = s
            .message_hash("POST", "/orders", "{\"market\":\"BTC-USD-PERP\"}", 1_700_000_000_123)
            .unwrap();
        let parts: Vec<String> = serde_json::from_str(&signed.signature).unwrap();
        let r = Felt::from_hex(&parts[0]).unwrap();
        let sig_s = Felt::from_hex(&parts[1]).unwrap();
        assert!(ecdsa_verify(keys.public_key(), &hash, &Signature { r, s: sig_s }).unwrap());
    }

    #[test]
    fn test_signature_deterministic_for_fixed_request() {
        let s = signer();
        let first = s.sign_request(&request("{}")).unwrap();
        let second = s.sign_request(&request("{}")).unwrap();
        assert_eq!(first.signature, second.signature);
    }
}
