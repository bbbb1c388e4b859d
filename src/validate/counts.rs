//! Reference count comparison. Advisory only: reference counts can lag
//! redistricting, so a mismatch warns and never rejects.

use crate::provenance::PipelineWarning;
use crate::reference::ReferenceData;
use crate::types::{JurisdictionPath, UniversalType};

pub struct CountValidator<'a> {
    refs: &'a ReferenceData,
    tolerance: usize,
}

impl<'a> CountValidator<'a> {
    pub fn new(refs: &'a ReferenceData, tolerance: usize) -> Self {
        Self { refs, tolerance }
    }

    /// Compare the normalized feature count against the authoritative
    /// reference count, when one exists.
    pub fn check(
        &self,
        jurisdiction: &JurisdictionPath,
        universal_type: UniversalType,
        actual: usize,
    ) -> Option<PipelineWarning> {
        let expected = match self.refs.expected_count(jurisdiction, universal_type) {
            Some(expected) => expected,
            None => return Some(PipelineWarning::NoReferenceCount),
        };
        let deviation = expected.abs_diff(actual);
        (deviation > self.tolerance).then(|| PipelineWarning::ReferenceCountMismatch {
            expected,
            actual,
            tolerance: self.tolerance,
        })
    }
}
