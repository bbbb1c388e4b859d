//! Semantic layer-type screening.
//!
//! Government portals expose many polygonal layers under district-adjacent
//! names; this stage scores the declared title and property keys against a
//! weighted keyword set and rejects datasets that are evidently the wrong
//! layer type (zoning, canopy, parcels, thematic overlays). Pure function of
//! dataset metadata; never raises.

use regex::Regex;

use crate::raw::RawDataset;

struct KeywordRule {
    pattern: Regex,
    label: &'static str,
    weight: i32,
    /// Forced rules clamp the score to zero regardless of positives.
    forced_reject: bool,
}

fn rule(keyword: &'static str, weight: i32, forced_reject: bool) -> KeywordRule {
    // Multi-word keywords match as phrases; single words on word boundaries.
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(keyword)))
        .expect("static keyword pattern");
    KeywordRule { pattern, label: keyword, weight, forced_reject }
}

/// Outcome of semantic scoring, preserved in provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticScore {
    pub score: i32,
    pub reasons: Vec<String>,
    /// First forced-reject keyword that fired, if any.
    pub forced_keyword: Option<String>,
}

/// Weighted keyword scorer over dataset titles and property keys.
pub struct SemanticValidator {
    threshold: i32,
    rules: Vec<KeywordRule>,
}

impl SemanticValidator {
    pub fn new(threshold: i32) -> Self {
        let rules = vec![
            // Positive signals: representation-district vocabulary.
            rule("city council", 50, false),
            rule("council", 40, false),
            rule("ward", 35, false),
            rule("alderman", 35, false),
            rule("aldermanic", 35, false),
            rule("commission", 30, false),
            rule("legislative", 30, false),
            rule("congressional", 30, false),
            rule("school district", 30, false),
            rule("senate", 25, false),
            rule("assembly", 25, false),
            rule("community board", 25, false),
            rule("trustee", 20, false),
            rule("board", 15, false),
            rule("district", 10, false),
            // Negative signals: thematic and cadastral layers.
            rule("precinct", -40, false),
            rule("zip code", -40, false),
            rule("flood", -30, false),
            rule("overlay", -20, false),
            rule("canopy", 0, true),
            rule("zoning", 0, true),
            rule("parcel", 0, true),
            rule("census tract", 0, true),
            rule("census block", 0, true),
        ];
        Self { threshold, rules }
    }

    #[inline]
    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    /// Score the dataset. Deterministic over the title, declared geometry
    /// type, and the property keys of the first feature.
    pub fn score(&self, dataset: &RawDataset) -> SemanticScore {
        let mut text = dataset.title.to_lowercase();
        if let Some(declared) = &dataset.provenance.declared_geometry_type {
            text.push(' ');
            text.push_str(&declared.to_lowercase());
        }
        if let Some(feature) = dataset.features.first() {
            for key in feature.properties.keys() {
                text.push(' ');
                text.push_str(&key.to_lowercase().replace('_', " "));
            }
        }

        let mut score = 0i32;
        let mut forced: Option<String> = None;
        let mut reasons = Vec::new();
        for rule in &self.rules {
            if !rule.pattern.is_match(&text) {
                continue;
            }
            if rule.forced_reject {
                forced.get_or_insert_with(|| rule.label.to_string());
                reasons.push(format!("negative_keyword:{}", rule.label));
            } else if rule.weight < 0 {
                score += rule.weight;
                reasons.push(format!("negative_keyword:{}:{}", rule.label, rule.weight));
            } else {
                score += rule.weight;
                reasons.push(format!("positive_keyword:{}:+{}", rule.label, rule.weight));
            }
        }

        let score = if forced.is_some() { 0 } else { score.clamp(0, 100) };
        SemanticScore { score, reasons, forced_keyword: forced }
    }

    #[inline]
    pub fn passes(&self, score: &SemanticScore) -> bool {
        score.score >= self.threshold
    }
}
