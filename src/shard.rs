//! Country shard assembly and multi-source conflict resolution.
//!
//! When several datasets describe the same jurisdiction and district type,
//! exactly one may commit: lowest authority tier wins, ties break on newer
//! observation timestamp, then on lexicographically smaller response hash.
//! Both the winner and every superseded source appear in provenance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::district::NormalizedDistrict;
use crate::provenance::{ProvenanceRecord, RejectionReason};
use crate::types::{CountryCode, UniversalType};

/// A dataset that survived validation and normalization, pending conflict
/// resolution.
#[derive(Debug, Clone)]
pub struct DatasetCandidate {
    pub universal_type: UniversalType,
    pub provenance: ProvenanceRecord,
    pub districts: Vec<NormalizedDistrict>,
}

impl DatasetCandidate {
    /// Conflict key: jurisdiction plus district type.
    fn claim(&self) -> (String, UniversalType) {
        (self.provenance.jurisdiction.canonical(), self.universal_type)
    }
}

/// Record of a resolved conflict for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub jurisdiction: String,
    pub universal_type: UniversalType,
    pub winner_response_hash: String,
    pub superseded_response_hash: String,
}

/// Pick one winner per claim. Returns winners plus superseded datasets with
/// their rejection reason and the conflict records.
pub fn resolve_conflicts(
    candidates: Vec<DatasetCandidate>,
) -> (
    Vec<DatasetCandidate>,
    Vec<(DatasetCandidate, RejectionReason)>,
    Vec<ConflictRecord>,
) {
    let mut by_claim: BTreeMap<(String, UniversalType), Vec<DatasetCandidate>> = BTreeMap::new();
    for candidate in candidates {
        by_claim.entry(candidate.claim()).or_default().push(candidate);
    }

    let mut winners = Vec::new();
    let mut superseded = Vec::new();
    let mut conflicts = Vec::new();
    for ((jurisdiction, universal_type), mut group) in by_claim {
        group.sort_by(|a, b| {
            a.provenance
                .authority_tier
                .cmp(&b.provenance.authority_tier)
                .then(b.provenance.observation_timestamp.cmp(&a.provenance.observation_timestamp))
                .then(a.provenance.response_hash.cmp(&b.provenance.response_hash))
        });
        let mut group = group.into_iter();
        let winner = group.next().expect("claim group is non-empty");
        for loser in group {
            conflicts.push(ConflictRecord {
                jurisdiction: jurisdiction.clone(),
                universal_type,
                winner_response_hash: winner.provenance.response_hash.clone(),
                superseded_response_hash: loser.provenance.response_hash.clone(),
            });
            superseded.push((loser, RejectionReason::LowerAuthoritySuperseded));
        }
        winners.push(winner);
    }
    (winners, superseded, conflicts)
}

/// Ordered sequence of districts sharing one country code. The lexicographic
/// ordering over district ids is part of the commitment.
#[derive(Debug, Clone)]
pub struct CountryShard {
    pub country: CountryCode,
    pub districts: Vec<NormalizedDistrict>,
}

impl CountryShard {
    #[inline]
    pub fn len(&self) -> usize {
        self.districts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}

/// Group committed districts into country shards, sorted by district id.
/// Ids are unique by construction (the identity builder aborts on collision
/// and coalesces duplicates), so the ordering is total.
pub fn build_shards(districts: Vec<NormalizedDistrict>) -> BTreeMap<CountryCode, CountryShard> {
    let mut shards: BTreeMap<CountryCode, CountryShard> = BTreeMap::new();
    for district in districts {
        let country = district.jurisdiction.country();
        shards
            .entry(country)
            .or_insert_with(|| CountryShard { country, districts: Vec::new() })
            .districts
            .push(district);
    }
    for shard in shards.values_mut() {
        shard.districts.sort_by(|a, b| a.district_id.cmp(&b.district_id));
        shard.districts.dedup_by(|a, b| a.district_id == b.district_id);
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candidate_fixture, district_fixture};
    use crate::types::AuthorityTier;
    use chrono::{TimeZone, Utc};

    #[test]
    fn lower_tier_wins() {
        let municipal = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "aa", 2024);
        let unverified = candidate_fixture("US/KY/lexington", AuthorityTier::Unverified, "bb", 2025);
        let (winners, superseded, conflicts) = resolve_conflicts(vec![unverified, municipal]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].provenance.authority_tier, AuthorityTier::Municipal);
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].1, RejectionReason::LowerAuthoritySuperseded);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].winner_response_hash, "aa");
    }

    #[test]
    fn equal_tier_newer_observation_wins() {
        let mut older = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "aa", 2024);
        let mut newer = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "bb", 2024);
        older.provenance.observation_timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        newer.provenance.observation_timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let (winners, _, _) = resolve_conflicts(vec![older, newer]);
        assert_eq!(winners[0].provenance.response_hash, "bb");
    }

    #[test]
    fn full_tie_breaks_on_response_hash() {
        let a = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "aa", 2024);
        let b = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "bb", 2024);
        let (winners, _, _) = resolve_conflicts(vec![b, a]);
        assert_eq!(winners[0].provenance.response_hash, "aa");
    }

    #[test]
    fn different_claims_do_not_conflict() {
        let lex = candidate_fixture("US/KY/lexington", AuthorityTier::Municipal, "aa", 2024);
        let lou = candidate_fixture("US/KY/louisville", AuthorityTier::Unverified, "bb", 2024);
        let (winners, superseded, _) = resolve_conflicts(vec![lex, lou]);
        assert_eq!(winners.len(), 2);
        assert!(superseded.is_empty());
    }

    #[test]
    fn shards_sort_by_district_id() {
        let d1 = district_fixture("US/HI/honolulu", "District 1", (-157.9, 21.4));
        let d2 = district_fixture("US/HI/honolulu", "District 2", (-157.8, 21.45));
        let d3 = district_fixture("GB/ENG/london", "Ward 1", (-0.1, 51.5));
        let shards = build_shards(vec![d2.clone(), d1.clone(), d3.clone()]);
        assert_eq!(shards.len(), 2);
        let us = &shards[&d1.jurisdiction.country()];
        assert_eq!(us.len(), 2);
        assert!(us.districts[0].district_id < us.districts[1].district_id);
    }
}
