use geo::Rect;
use rstar::{RTreeObject, AABB};

use crate::types::DistrictId;

/// A district bounding box in the R-tree, keyed by district id.
#[derive(Debug, Clone)]
pub(super) struct IndexEntry {
    id: DistrictId,
    bbox: Rect<f64>,
}

impl IndexEntry {
    pub(super) fn new(id: DistrictId, bbox: Rect<f64>) -> Self {
        Self { id, bbox }
    }

    /// District id of the entry.
    pub(super) fn id(&self) -> DistrictId { self.id }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}
