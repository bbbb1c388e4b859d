mod counts;
mod geographic;
mod semantic;

pub use counts::CountValidator;
pub use geographic::{GeoValidation, GeographicValidator};
pub use semantic::{SemanticScore, SemanticValidator};
