use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable content-derived key for a normalized district.
///
/// The id is the leading 16 bytes of the SHA-256 over the district's
/// canonical jurisdiction path, normalized local name, and canonical
/// geometry bytes. Ids sort lexicographically over the raw bytes; that
/// ordering is part of the commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistrictId(pub [u8; 16]);

impl DistrictId {
    pub const LEN: usize = 16;

    /// Truncate a full 32-byte digest to a district id.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        Self(id)
    }

    /// Parse from a 32-character lowercase hex string.
    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(s)?;
        let id: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("district id must be 16 bytes, got {}", bytes.len()))?;
        Ok(Self(id))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Hex in JSON, raw bytes everywhere else.
impl Serialize for DistrictId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DistrictId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DistrictId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = DistrictId([0xab; 16]);
        assert_eq!(DistrictId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn ordering_is_lexicographic_over_bytes() {
        let lo = DistrictId([0x00; 16]);
        let hi = DistrictId([0xff; 16]);
        assert!(lo < hi);
    }
}
