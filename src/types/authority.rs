use serde::{Deserialize, Serialize};

/// Institutional precedence of a source.
///
/// Lower tier wins when multiple sources describe the same jurisdiction;
/// ties break on newer observation timestamp, then lexicographic response
/// hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    Federal,    // 0
    State,      // 1
    County,     // 2
    Municipal,  // 3
    Regional,   // 4 (regional/special-purpose)
    Unverified, // 5
}

impl AuthorityTier {
    pub fn to_str(&self) -> &'static str {
        match self {
            AuthorityTier::Federal => "federal",
            AuthorityTier::State => "state",
            AuthorityTier::County => "county",
            AuthorityTier::Municipal => "municipal",
            AuthorityTier::Regional => "regional",
            AuthorityTier::Unverified => "unverified",
        }
    }

    #[inline]
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}
