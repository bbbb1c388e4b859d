use serde::{Deserialize, Serialize};

/// Closed, universal district-type taxonomy.
///
/// Every country-specific local type maps to exactly one of these tags; the
/// mapping lives in the reference tables, not in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniversalType {
    CityCouncil,
    CountyCommission,
    StateLegislativeUpper,
    StateLegislativeLower,
    FederalLegislative,
    SchoolDistrict,
    PolicePrecinct,
    FireDistrict,
    WaterDistrict,
    TransitDistrict,
    SanitationDistrict,
    HousingAuthority,
    CommunityBoard,
    BusinessImprovementDistrict,
    Other,
}

impl UniversalType {
    pub const ALL: [UniversalType; 15] = [
        UniversalType::CityCouncil,
        UniversalType::CountyCommission,
        UniversalType::StateLegislativeUpper,
        UniversalType::StateLegislativeLower,
        UniversalType::FederalLegislative,
        UniversalType::SchoolDistrict,
        UniversalType::PolicePrecinct,
        UniversalType::FireDistrict,
        UniversalType::WaterDistrict,
        UniversalType::TransitDistrict,
        UniversalType::SanitationDistrict,
        UniversalType::HousingAuthority,
        UniversalType::CommunityBoard,
        UniversalType::BusinessImprovementDistrict,
        UniversalType::Other,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            UniversalType::CityCouncil => "city_council",
            UniversalType::CountyCommission => "county_commission",
            UniversalType::StateLegislativeUpper => "state_legislative_upper",
            UniversalType::StateLegislativeLower => "state_legislative_lower",
            UniversalType::FederalLegislative => "federal_legislative",
            UniversalType::SchoolDistrict => "school_district",
            UniversalType::PolicePrecinct => "police_precinct",
            UniversalType::FireDistrict => "fire_district",
            UniversalType::WaterDistrict => "water_district",
            UniversalType::TransitDistrict => "transit_district",
            UniversalType::SanitationDistrict => "sanitation_district",
            UniversalType::HousingAuthority => "housing_authority",
            UniversalType::CommunityBoard => "community_board",
            UniversalType::BusinessImprovementDistrict => "business_improvement_district",
            UniversalType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        UniversalType::ALL.iter().copied().find(|ty| ty.to_str() == s)
    }

    /// Stable single-byte tag used in binary codecs.
    pub fn to_tag(&self) -> u8 {
        UniversalType::ALL.iter().position(|ty| ty == self).unwrap() as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        UniversalType::ALL.get(tag as usize).copied()
    }

    /// Administrative overlays that never enter the commitment, only the
    /// provenance report.
    pub fn is_utility_overlay(&self) -> bool {
        matches!(
            self,
            UniversalType::SanitationDistrict
                | UniversalType::HousingAuthority
                | UniversalType::BusinessImprovementDistrict
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for ty in UniversalType::ALL {
            assert_eq!(UniversalType::from_tag(ty.to_tag()), Some(ty));
            assert_eq!(UniversalType::from_str(ty.to_str()), Some(ty));
        }
    }
}
