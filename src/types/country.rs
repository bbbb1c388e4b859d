use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// ISO 3166-1 alpha-2 country code, uppercase ASCII.
///
/// Country codes key the shard layout and the global Merkle index, so they
/// are stored as two raw bytes and sort byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub fn new(code: &str) -> anyhow::Result<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            anyhow::bail!("invalid ISO 3166-1 alpha-2 code: {code:?}");
        }
        Ok(Self([bytes[0], bytes[1]]))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Constructor enforces ASCII.
        std::str::from_utf8(&self.0).unwrap()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CountryCode::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_alpha2() {
        assert!(CountryCode::new("USA").is_err());
        assert!(CountryCode::new("us").is_err());
        assert!(CountryCode::new("U1").is_err());
        assert!(CountryCode::new("US").is_ok());
    }
}
