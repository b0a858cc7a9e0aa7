//! Address codec.
//!
//! Encodes/decodes a 20-byte account identifier as a bech32 string under a
//! configurable human-readable prefix (default `lakha`). Two textual
//! identifiers, `genesis` and `stake_pool`, are accepted anywhere an address
//! is required without going through the codec, but are never produced by
//! `encode`.

use bech32::{self, FromBase32, ToBase32, Variant};

use crate::error::{NodeError, Result};

pub const DEFAULT_HRP: &str = "lakha";
pub const GENESIS: &str = "genesis";
pub const STAKE_POOL: &str = "stake_pool";

/// A bech32 address codec bound to one human-readable prefix.
#[derive(Debug, Clone)]
pub struct AddressCodec {
    hrp: String,
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self::new(DEFAULT_HRP)
    }
}

impl AddressCodec {
    pub fn new(hrp: impl Into<String>) -> Self {
        Self { hrp: hrp.into() }
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    /// Encodes a 20-byte identifier under this codec's prefix.
    pub fn encode(&self, id: &[u8; 20]) -> Result<String> {
        bech32::encode(&self.hrp, id.to_base32(), Variant::Bech32)
            .map_err(|e| NodeError::InvalidAddress(e.to_string()))
    }

    /// Decodes and validates an address string, rejecting anything that
    /// isn't under this codec's prefix or doesn't carry exactly 20 bytes.
    /// Reserved identifiers are rejected here deliberately: callers that
    /// accept reserved identifiers must check `is_reserved` first.
    pub fn decode(&self, address: &str) -> Result<[u8; 20]> {
        let (hrp, data, variant) = bech32::decode(address)
            .map_err(|e| NodeError::InvalidAddress(e.to_string()))?;
        if hrp != self.hrp || variant != Variant::Bech32 {
            return Err(NodeError::InvalidAddress(address.to_string()));
        }
        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| NodeError::InvalidAddress(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| NodeError::InvalidAddress(address.to_string()))
    }

    /// True if `address` is a reserved identifier that bypasses codec checks.
    pub fn is_reserved(address: &str) -> bool {
        address == GENESIS || address == STAKE_POOL
    }

    /// True if `address` is either reserved or a codec-valid address under
    /// this prefix. This is the check used everywhere an address
    /// must be usable as a transaction endpoint.
    pub fn is_usable(&self, address: &str) -> bool {
        !address.is_empty() && (Self::is_reserved(address) || self.decode(address).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bech32() {
        let codec = AddressCodec::default();
        let id = [7u8; 20];
        let encoded = codec.encode(&id).unwrap();
        assert!(encoded.starts_with("lakha1"));
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn rejects_wrong_prefix() {
        let codec = AddressCodec::new("other");
        let id = [1u8; 20];
        let encoded = bech32::encode("lakha", id.to_base32(), Variant::Bech32).unwrap();
        assert!(codec.decode(&encoded).is_err());
    }

    #[test]
    fn reserved_identifiers_bypass_codec() {
        let codec = AddressCodec::default();
        assert!(codec.is_usable(GENESIS));
        assert!(codec.is_usable(STAKE_POOL));
        assert!(!codec.is_usable("not-bech32-and-not-reserved"));
    }

    #[test]
    fn reserved_identifiers_never_produced_by_encoder() {
        // The encoder only ever emits strings under the configured HRP,
        // which never collides with the reserved textual identifiers.
        let codec = AddressCodec::default();
        let encoded = codec.encode(&[0u8; 20]).unwrap();
        assert_ne!(encoded, GENESIS);
        assert_ne!(encoded, STAKE_POOL);
    }
}
