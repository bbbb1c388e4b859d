use serde::{Deserialize, Serialize};

/// Per-district quality label derived from validator outcomes.
///
/// Only Gold/Silver/Bronze enter the Merkle tree and the spatial index.
/// Utility marks administrative overlays kept for the provenance report;
/// Reject marks districts excluded by a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityTier {
    Gold,
    Silver,
    Bronze,
    Utility,
    Reject,
}

impl QualityTier {
    pub fn to_str(&self) -> &'static str {
        match self {
            QualityTier::Gold => "GOLD",
            QualityTier::Silver => "SILVER",
            QualityTier::Bronze => "BRONZE",
            QualityTier::Utility => "UTILITY",
            QualityTier::Reject => "REJECT",
        }
    }

    #[inline]
    pub fn commits(&self) -> bool {
        matches!(self, QualityTier::Gold | QualityTier::Silver | QualityTier::Bronze)
    }
}
