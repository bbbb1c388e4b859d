//! Binary artifact codecs: the canonical district dump, the Merkle tree
//! files, and the batched proof file. Each carries magic bytes, a version,
//! and a gzipped payload; every writer is byte-deterministic for a given
//! logical content so artifacts content-address reproducibly.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::district::NormalizedDistrict;
use crate::merkle::{Hash32, MerkleProof, MerkleTree};
use crate::types::{CountryCode, DistrictId, UniversalType};

const DISTRICTS_MAGIC: &[u8] = b"BMDS";
const MERKLE_MAGIC: &[u8] = b"BMMT";
const GLOBAL_MAGIC: &[u8] = b"BMGI";
const PROOFS_MAGIC: &[u8] = b"BMPF";
const VERSION: u8 = 1;

/// Lean district record carried by `districts.bin`; provenance lives in the
/// sibling `provenance.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictRecord {
    pub district_id: DistrictId,
    pub universal_type: UniversalType,
    pub jurisdiction: String,
    pub local_name: String,
    pub canonical_name: String,
    pub bbox: [f64; 4],
    pub geometry: MultiPolygon<f64>,
}

impl From<&NormalizedDistrict> for DistrictRecord {
    fn from(d: &NormalizedDistrict) -> Self {
        Self {
            district_id: d.district_id,
            universal_type: d.universal_type,
            jurisdiction: d.jurisdiction.canonical(),
            local_name: d.local_name.clone(),
            canonical_name: d.canonical_name.clone(),
            bbox: d.bbox,
            geometry: d.geometry.clone(),
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    anyhow::ensure!(bytes.len() <= u16::MAX as usize, "string too long for codec");
    out.write_all(&(bytes.len() as u16).to_le_bytes())?;
    out.write_all(bytes)?;
    Ok(())
}

fn read_str(cursor: &mut std::io::Cursor<&[u8]>) -> Result<String> {
    let mut len_bytes = [0u8; 2];
    cursor.read_exact(&mut len_bytes)?;
    let mut buf = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    cursor.read_exact(&mut buf)?;
    String::from_utf8(buf).context("invalid utf8 in district record")
}

/// Write one MultiPolygon: polygon count, then per polygon ring count and
/// per ring point count plus little-endian coordinate pairs.
fn write_multipolygon(out: &mut Vec<u8>, mp: &MultiPolygon<f64>) -> Result<()> {
    out.write_all(&(mp.0.len() as u32).to_le_bytes())?;
    for polygon in &mp.0 {
        let rings = 1 + polygon.interiors().len();
        out.write_all(&(rings as u32).to_le_bytes())?;
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors().iter()) {
            out.write_all(&(ring.0.len() as u32).to_le_bytes())?;
            for coord in &ring.0 {
                out.write_all(&coord.x.to_le_bytes())?;
                out.write_all(&coord.y.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

fn read_u32(cursor: &mut std::io::Cursor<&[u8]>) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64(cursor: &mut std::io::Cursor<&[u8]>) -> Result<f64> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_multipolygon(cursor: &mut std::io::Cursor<&[u8]>) -> Result<MultiPolygon<f64>> {
    let polygon_count = read_u32(cursor)?;
    let mut polygons = Vec::with_capacity(polygon_count as usize);
    for _ in 0..polygon_count {
        let ring_count = read_u32(cursor)?;
        anyhow::ensure!(ring_count >= 1, "polygon must have at least one ring");
        let mut rings = Vec::with_capacity(ring_count as usize);
        for _ in 0..ring_count {
            let point_count = read_u32(cursor)?;
            let mut coords = Vec::with_capacity(point_count as usize);
            for _ in 0..point_count {
                let x = read_f64(cursor)?;
                let y = read_f64(cursor)?;
                coords.push(Coord { x, y });
            }
            rings.push(LineString(coords));
        }
        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap();
        polygons.push(Polygon::new(exterior, rings.collect()));
    }
    Ok(MultiPolygon(polygons))
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).context("failed to compress payload")?;
    encoder.finish().context("failed to finish compression")
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).context("failed to decompress payload")?;
    Ok(out)
}

fn check_header(cursor: &mut std::io::Cursor<&[u8]>, magic: &[u8]) -> Result<()> {
    let mut got = [0u8; 4];
    cursor.read_exact(&mut got).context("failed to read magic bytes")?;
    anyhow::ensure!(got == magic, "bad magic bytes");
    let mut version = [0u8; 1];
    cursor.read_exact(&mut version).context("failed to read version")?;
    anyhow::ensure!(version[0] == VERSION, "unsupported version: {}", version[0]);
    Ok(())
}

/// Canonical binary dump of a country's districts, in district id order.
pub fn write_districts_bytes(districts: &[&NormalizedDistrict]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for district in districts {
        payload.write_all(district.district_id.as_bytes())?;
        payload.push(district.universal_type.to_tag());
        write_str(&mut payload, &district.jurisdiction.canonical())?;
        write_str(&mut payload, &district.local_name)?;
        write_str(&mut payload, &district.canonical_name)?;
        for value in district.bbox {
            payload.write_all(&value.to_le_bytes())?;
        }
        write_multipolygon(&mut payload, &district.geometry)?;
    }

    let mut out = Vec::new();
    out.write_all(DISTRICTS_MAGIC)?;
    out.push(VERSION);
    out.write_all(&(districts.len() as u32).to_le_bytes())?;
    out.write_all(&gzip(&payload)?)?;
    Ok(out)
}

pub fn read_districts_bytes(bytes: &[u8]) -> Result<Vec<DistrictRecord>> {
    let mut cursor = std::io::Cursor::new(bytes);
    check_header(&mut cursor, DISTRICTS_MAGIC).context("[snapshot::codec] districts.bin")?;
    let count = read_u32(&mut cursor)? as usize;
    let mut compressed = Vec::new();
    cursor.read_to_end(&mut compressed)?;
    let payload = gunzip(&compressed)?;

    let mut cursor = std::io::Cursor::new(payload.as_slice());
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let mut id = [0u8; 16];
        cursor.read_exact(&mut id)?;
        let mut tag = [0u8; 1];
        cursor.read_exact(&mut tag)?;
        let universal_type = UniversalType::from_tag(tag[0])
            .with_context(|| format!("unknown district type tag: {}", tag[0]))?;
        let jurisdiction = read_str(&mut cursor)?;
        let local_name = read_str(&mut cursor)?;
        let canonical_name = read_str(&mut cursor)?;
        let mut bbox = [0f64; 4];
        for value in &mut bbox {
            *value = read_f64(&mut cursor)?;
        }
        let geometry = read_multipolygon(&mut cursor)?;
        records.push(DistrictRecord {
            district_id: DistrictId(id),
            universal_type,
            jurisdiction,
            local_name,
            canonical_name,
            bbox,
            geometry,
        });
    }
    Ok(records)
}

fn write_levels(payload: &mut Vec<u8>, tree: &MerkleTree) -> Result<()> {
    payload.push(tree.levels().len() as u8);
    for level in tree.levels() {
        payload.write_all(&(level.len() as u32).to_le_bytes())?;
        for hash in level {
            payload.write_all(hash)?;
        }
    }
    Ok(())
}

fn read_levels(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Vec<Vec<Hash32>>> {
    let mut level_count = [0u8; 1];
    cursor.read_exact(&mut level_count)?;
    let mut levels = Vec::with_capacity(level_count[0] as usize);
    for _ in 0..level_count[0] {
        let count = read_u32(cursor)? as usize;
        let mut level = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; 32];
            cursor.read_exact(&mut hash)?;
            level.push(hash);
        }
        levels.push(level);
    }
    Ok(levels)
}

/// Country Merkle tree: sorted leaves plus every level of hashes.
pub fn write_merkle_bytes(tree: &MerkleTree) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    write_levels(&mut payload, tree)?;
    let mut out = Vec::new();
    out.write_all(MERKLE_MAGIC)?;
    out.push(VERSION);
    out.write_all(&gzip(&payload)?)?;
    Ok(out)
}

pub fn read_merkle_bytes(bytes: &[u8]) -> Result<Vec<Vec<Hash32>>> {
    let mut cursor = std::io::Cursor::new(bytes);
    check_header(&mut cursor, MERKLE_MAGIC).context("[snapshot::codec] merkle.bin")?;
    let mut compressed = Vec::new();
    cursor.read_to_end(&mut compressed)?;
    let payload = gunzip(&compressed)?;
    read_levels(&mut std::io::Cursor::new(payload.as_slice()))
}

/// Global index tree plus the country codes its leaves commit, in order.
pub fn write_global_index_bytes(
    countries: &[CountryCode],
    tree: &MerkleTree,
) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload.write_all(&(countries.len() as u16).to_le_bytes())?;
    for country in countries {
        payload.write_all(country.as_bytes())?;
    }
    write_levels(&mut payload, tree)?;

    let mut out = Vec::new();
    out.write_all(GLOBAL_MAGIC)?;
    out.push(VERSION);
    out.write_all(&gzip(&payload)?)?;
    Ok(out)
}

pub fn read_global_index_bytes(bytes: &[u8]) -> Result<(Vec<CountryCode>, Vec<Vec<Hash32>>)> {
    let mut cursor = std::io::Cursor::new(bytes);
    check_header(&mut cursor, GLOBAL_MAGIC).context("[snapshot::codec] global_index.bin")?;
    let mut compressed = Vec::new();
    cursor.read_to_end(&mut compressed)?;
    let payload = gunzip(&compressed)?;

    let mut cursor = std::io::Cursor::new(payload.as_slice());
    let mut count_bytes = [0u8; 2];
    cursor.read_exact(&mut count_bytes)?;
    let count = u16::from_le_bytes(count_bytes) as usize;
    let mut countries = Vec::with_capacity(count);
    for _ in 0..count {
        let mut code = [0u8; 2];
        cursor.read_exact(&mut code)?;
        countries.push(CountryCode::new(std::str::from_utf8(&code)?)?);
    }
    let levels = read_levels(&mut cursor)?;
    Ok((countries, levels))
}

/// Batched proofs keyed by district id.
pub fn write_proofs_bytes(proofs: &BTreeMap<DistrictId, MerkleProof>) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(proofs).context("failed to serialize proofs")?;
    let mut out = Vec::new();
    out.write_all(PROOFS_MAGIC)?;
    out.push(VERSION);
    out.write_all(&(proofs.len() as u32).to_le_bytes())?;
    out.write_all(&gzip(&json)?)?;
    Ok(out)
}

pub fn read_proofs_bytes(bytes: &[u8]) -> Result<BTreeMap<DistrictId, MerkleProof>> {
    let mut cursor = std::io::Cursor::new(bytes);
    check_header(&mut cursor, PROOFS_MAGIC).context("[snapshot::codec] proofs.bin")?;
    let count = read_u32(&mut cursor)? as usize;
    let mut compressed = Vec::new();
    cursor.read_to_end(&mut compressed)?;
    let json = gunzip(&compressed)?;
    let proofs: BTreeMap<DistrictId, MerkleProof> =
        serde_json::from_slice(&json).context("failed to parse proofs")?;
    anyhow::ensure!(proofs.len() == count, "proof count mismatch");
    Ok(proofs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::{build_commitment, keccak256};
    use crate::shard::build_shards;
    use crate::test_support::district_fixture;

    #[test]
    fn districts_bin_round_trip() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
        ];
        let refs: Vec<&NormalizedDistrict> = districts.iter().collect();
        let bytes = write_districts_bytes(&refs).unwrap();
        let records = read_districts_bytes(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].district_id, districts[0].district_id);
        assert_eq!(records[0].geometry, districts[0].geometry);
        assert_eq!(records[1].local_name, "District 2");
        assert_eq!(records[1].jurisdiction, "US/hi/honolulu");
    }

    #[test]
    fn merkle_and_global_round_trip() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("GB/ENG/london", "Ward 1", (-0.10, 51.50)),
        ];
        let commitment = build_commitment(&build_shards(districts)).unwrap();

        for country in commitment.countries.values() {
            let bytes = write_merkle_bytes(&country.tree).unwrap();
            let levels = read_merkle_bytes(&bytes).unwrap();
            assert_eq!(levels.as_slice(), country.tree.levels());
        }

        let countries: Vec<CountryCode> = commitment.countries.keys().copied().collect();
        let bytes = write_global_index_bytes(&countries, &commitment.global_tree).unwrap();
        let (codes, levels) = read_global_index_bytes(&bytes).unwrap();
        assert_eq!(codes, countries);
        assert_eq!(levels.last().unwrap()[0], commitment.global_root);
    }

    #[test]
    fn proofs_round_trip_and_verify() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
        ];
        let commitment = build_commitment(&build_shards(districts)).unwrap();
        let bytes = write_proofs_bytes(&commitment.proofs).unwrap();
        let proofs = read_proofs_bytes(&bytes).unwrap();
        assert_eq!(proofs.len(), 2);
        for proof in proofs.values() {
            assert!(proof.verify_against(&commitment.global_root));
        }
    }

    #[test]
    fn bad_headers_fail() {
        assert!(read_districts_bytes(b"nope").is_err());
        assert!(read_merkle_bytes(b"nope").is_err());
        let mut bytes = write_merkle_bytes(
            &crate::merkle::MerkleTree::build(vec![keccak256(b"x")]).unwrap(),
        )
        .unwrap();
        bytes[0] = b'X';
        assert!(read_merkle_bytes(&bytes).is_err());
    }
}
