//! Reprojection of declared source CRS into WGS84 lon/lat.
//!
//! The supported CRS table is deliberately small: geographic CRS that are
//! WGS84-compatible pass through, NAD83 gets a datum shift, and Web Mercator
//! is inverted. Anything else rejects the dataset (unknown CRS is a
//! dataset-level failure, not a guess).

use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";
const NAD83_PROJ4: &str = "+proj=longlat +datum=NAD83 +no_defs +type=crs";
const WEB_MERCATOR_PROJ4: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs";

/// Declared CRS resolved against the supported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCrs {
    /// Already WGS84 lon/lat (EPSG:4326 / CRS84); no transform.
    Wgs84,
    /// NAD83 geographic (EPSG:4269); datum shift, degrees in and out.
    Nad83,
    /// Web Mercator (EPSG:3857); meters in, degrees out.
    WebMercator,
}

impl SourceCrs {
    /// Resolve a declared CRS string. None means unsupported.
    pub fn parse(declared: &str) -> Option<Self> {
        let normalized = declared.trim().to_ascii_uppercase();
        let code = normalized
            .rsplit(|c| c == ':' || c == ' ')
            .next()
            .unwrap_or(&normalized);
        match code {
            "4326" | "CRS84" | "WGS84" => Some(SourceCrs::Wgs84),
            "4269" | "NAD83" => Some(SourceCrs::Nad83),
            "3857" | "900913" => Some(SourceCrs::WebMercator),
            _ => None,
        }
    }
}

/// Reproject a MultiPolygon into WGS84 lon/lat degrees.
pub fn to_wgs84(geometry: &MultiPolygon<f64>, crs: SourceCrs) -> Result<MultiPolygon<f64>> {
    match crs {
        SourceCrs::Wgs84 => Ok(geometry.clone()),
        SourceCrs::Nad83 => transform_geographic(geometry, NAD83_PROJ4),
        SourceCrs::WebMercator => transform_projected(geometry, WEB_MERCATOR_PROJ4),
    }
}

/// Geographic source: degrees → radians in, radians → degrees out.
fn transform_geographic(geometry: &MultiPolygon<f64>, source: &str) -> Result<MultiPolygon<f64>> {
    let from = Proj4::from_proj_string(source)
        .with_context(|| anyhow!("failed to build source PROJ.4: {source}"))?;
    let to = Proj4::from_proj_string(WGS84_PROJ4).context("failed to build WGS84 PROJ.4")?;

    geometry.try_map_coords(|coord: Coord<f64>| {
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        transform(&from, &to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed: {e:?}"))?;
        Ok(Coord { x: point.0.to_degrees(), y: point.1.to_degrees() })
    })
}

/// Projected source: projection units in, radians → degrees out.
fn transform_projected(geometry: &MultiPolygon<f64>, source: &str) -> Result<MultiPolygon<f64>> {
    let from = Proj4::from_proj_string(source)
        .with_context(|| anyhow!("failed to build source PROJ.4: {source}"))?;
    let to = Proj4::from_proj_string(WGS84_PROJ4).context("failed to build WGS84 PROJ.4")?;

    geometry.try_map_coords(|coord: Coord<f64>| {
        let mut point = (coord.x, coord.y, 0.0);
        transform(&from, &to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed: {e:?}"))?;
        Ok(Coord { x: point.0.to_degrees(), y: point.1.to_degrees() })
    })
}
