mod authority;
mod country;
mod district_id;
mod jurisdiction;
mod quality;
mod universal;

pub use authority::AuthorityTier;
pub use country::CountryCode;
pub use district_id::DistrictId;
pub use jurisdiction::JurisdictionPath;
pub use quality::QualityTier;
pub use universal::UniversalType;
