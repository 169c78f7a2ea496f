// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Server Key Pinning
//!
//! Pins are SHA-256 fingerprints of the server's static public key as
//! presented by the secure stream during its handshake.

use ring::digest;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A pinned server key fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedKey {
    /// SHA-256 fingerprint of the raw static key.
    pub sha256_fingerprint: [u8; 32],
}

impl PinnedKey {
    /// Creates a pin from a known SHA-256 fingerprint.
    pub fn new(sha256_fingerprint: [u8; 32]) -> Self {
        PinnedKey { sha256_fingerprint }
    }

    /// Fingerprints a raw static key.
    pub fn from_key(static_key: &[u8]) -> Self {
        let hash = digest::digest(&digest::SHA256, static_key);
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(hash.as_ref());
        PinnedKey {
            sha256_fingerprint: fingerprint,
        }
    }

    /// Parses a hex-encoded fingerprint.
    pub fn from_hex(fingerprint: &str) -> Option<Self> {
        let bytes = hex::decode(fingerprint.trim()).ok()?;
        let fingerprint: [u8; 32] = bytes.try_into().ok()?;
        Some(PinnedKey::new(fingerprint))
    }

    /// Returns the fingerprint as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.sha256_fingerprint)
    }
}

impl Serialize for PinnedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PinnedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PinnedKey::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}

/// Verifies a presented static key against the pin list.
///
/// An empty pin list accepts every key; pinning is opt-in.
pub fn verify_pin(static_key: &[u8], pins: &[PinnedKey]) -> bool {
    if pins.is_empty() {
        return true;
    }

    let presented = PinnedKey::from_key(static_key);
    pins.iter().any(|pin| pin == &presented)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_key_from_key_deterministic() {
        let key = b"server static key";
        assert_eq!(PinnedKey::from_key(key), PinnedKey::from_key(key));
        assert_ne!(PinnedKey::from_key(key), PinnedKey::from_key(b"other key"));
    }

    #[test]
    fn test_verify_pin_matching() {
        let key = b"server static key";
        assert!(verify_pin(key, &[PinnedKey::from_key(key)]));
    }

    #[test]
    fn test_verify_pin_no_match() {
        assert!(!verify_pin(b"server static key", &[PinnedKey::new([0xFF; 32])]));
    }

    #[test]
    fn test_verify_pin_empty_list_accepts() {
        assert!(verify_pin(b"anything", &[]));
    }

    #[test]
    fn test_verify_pin_multiple_pins() {
        let key = b"rotating key";
        let pins = [PinnedKey::new([0x11; 32]), PinnedKey::from_key(key)];
        assert!(verify_pin(key, &pins));
    }

    #[test]
    fn test_hex_roundtrip_and_rejects_short_input() {
        let pin = PinnedKey::from_key(b"k");
        assert_eq!(PinnedKey::from_hex(&pin.to_hex()), Some(pin));
        assert_eq!(PinnedKey::from_hex("abcd"), None);
        assert_eq!(PinnedKey::from_hex("not hex"), None);
    }

    #[test]
    fn test_from_key_uses_sha256() {
        let key = b"verify SHA-256 consistency";
        let expected = digest::digest(&digest::SHA256, key);
        assert_eq!(
            PinnedKey::from_key(key).sha256_fingerprint.as_slice(),
            expected.as_ref()
        );
    }
}
