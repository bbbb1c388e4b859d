use std::fmt;

use serde::{Deserialize, Serialize};

use super::CountryCode;

/// Ordered administrative path uniquely identifying a governing unit:
/// country, then subdivisions from broadest to narrowest, e.g.
/// `US/KY/lexington`.
///
/// The canonical text form (lowercased segments joined by `/`, country code
/// kept uppercase) feeds the district id hash, so segment normalization here
/// is part of the commitment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JurisdictionPath {
    country: CountryCode,
    segments: Vec<String>,
}

impl JurisdictionPath {
    pub fn new(country: CountryCode, segments: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            country,
            segments: segments
                .into_iter()
                .map(|s| canonical_segment(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parse `US/KY/lexington` form. The leading segment must be a valid
    /// alpha-2 country code.
    pub fn parse(path: &str) -> anyhow::Result<Self> {
        let mut parts = path.split('/').filter(|p| !p.trim().is_empty());
        let country = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty jurisdiction path"))?;
        let country = CountryCode::new(country.trim().to_ascii_uppercase().as_str())?;
        Ok(Self::new(country, parts))
    }

    #[inline]
    pub fn country(&self) -> CountryCode {
        self.country
    }

    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First-level subdivision (state/province) segment, if present,
    /// uppercased to match the reference tables.
    pub fn subdivision(&self) -> Option<String> {
        self.segments.first().map(|s| s.to_ascii_uppercase())
    }

    /// Path of the parent jurisdiction, or None at the country level.
    pub fn parent(&self) -> Option<JurisdictionPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            country: self.country,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Canonical text form used in hashing and artifact keys.
    pub fn canonical(&self) -> String {
        let mut out = self.country.as_str().to_string();
        for seg in &self.segments {
            out.push('/');
            out.push_str(seg);
        }
        out
    }
}

impl fmt::Display for JurisdictionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Lowercase, trim, collapse internal whitespace to single underscores.
fn canonical_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_gap = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_gap = true;
            continue;
        }
        if pending_gap && !out.is_empty() {
            out.push('_');
        }
        pending_gap = false;
        for lc in ch.to_lowercase() {
            out.push(lc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_canonicalizes_segments() {
        let path = JurisdictionPath::parse("US/ky/  Lexington  Fayette ").unwrap();
        assert_eq!(path.canonical(), "US/ky/lexington_fayette");
        assert_eq!(path.subdivision().as_deref(), Some("KY"));
    }

    #[test]
    fn parent_walks_up_to_country() {
        let path = JurisdictionPath::parse("US/KY/lexington").unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.canonical(), "US/ky");
        assert_eq!(parent.parent().unwrap().canonical(), "US");
        assert!(parent.parent().unwrap().parent().is_none());
    }

    #[test]
    fn rejects_bad_country() {
        assert!(JurisdictionPath::parse("USA/KY").is_err());
        assert!(JurisdictionPath::parse("").is_err());
    }
}
