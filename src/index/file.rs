//! On-disk codec for the spatial index.
//!
//! Layout: magic, version, district count, content hash, then the gzipped
//! JSON of the district rows in id order. The R-tree is rebuilt by bulk load
//! on read; only the logical district set is the contract, and the sorted
//! serialization keeps the bytes reproducible for content addressing.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::district::NormalizedDistrict;

use super::SpatialIndex;

/// Magic bytes for the index file format: "BMIX" (BoundMark IndeX)
const MAGIC: &[u8] = b"BMIX";
/// Format version (currently 1)
const VERSION: u8 = 1;

/// Serialize an index to its file bytes.
pub fn write_index_bytes(index: &SpatialIndex) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_all(MAGIC)
        .context("[index::file] Failed to write magic bytes")?;
    out.write_all(&[VERSION])
        .context("[index::file] Failed to write version")?;
    out.write_all(&(index.len() as u32).to_le_bytes())
        .context("[index::file] Failed to write district count")?;
    out.write_all(index.content_hash())
        .context("[index::file] Failed to write content hash")?;

    let rows: Vec<&NormalizedDistrict> = index.districts().collect();
    let json = serde_json::to_vec(&rows).context("[index::file] Failed to serialize districts")?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .context("[index::file] Failed to compress district rows")?;
    let compressed = encoder
        .finish()
        .context("[index::file] Failed to finish compression")?;
    out.write_all(&compressed)?;
    Ok(out)
}

/// Parse index file bytes, rebuild the R-tree, and verify the stored content
/// hash and count against the rebuilt index.
pub fn read_index_bytes(bytes: &[u8]) -> Result<SpatialIndex> {
    let mut cursor = std::io::Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .context("[index::file] Failed to read magic bytes")?;
    if magic != MAGIC {
        anyhow::bail!("[index::file] Invalid index file: bad magic bytes");
    }

    let mut version = [0u8; 1];
    cursor
        .read_exact(&mut version)
        .context("[index::file] Failed to read version")?;
    if version[0] != VERSION {
        anyhow::bail!("[index::file] Unsupported index file version: {}", version[0]);
    }

    let mut count_bytes = [0u8; 4];
    cursor
        .read_exact(&mut count_bytes)
        .context("[index::file] Failed to read district count")?;
    let count = u32::from_le_bytes(count_bytes) as usize;

    let mut stored_hash = [0u8; 32];
    cursor
        .read_exact(&mut stored_hash)
        .context("[index::file] Failed to read content hash")?;

    let mut compressed = Vec::new();
    cursor
        .read_to_end(&mut compressed)
        .context("[index::file] Failed to read district rows")?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .context("[index::file] Failed to decompress district rows")?;

    let rows: Vec<NormalizedDistrict> =
        serde_json::from_slice(&json).context("[index::file] Failed to parse district rows")?;
    if rows.len() != count {
        anyhow::bail!(
            "[index::file] District count mismatch: header says {count}, file has {}",
            rows.len()
        );
    }

    let index = SpatialIndex::build(rows)?;
    if index.content_hash() != &stored_hash {
        anyhow::bail!("[index::file] Content hash mismatch: index file is corrupt or tampered");
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::district_fixture;

    #[test]
    fn file_round_trip_preserves_index() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
        ];
        let index = SpatialIndex::build(districts).unwrap();
        let bytes = write_index_bytes(&index).unwrap();
        let back = read_index_bytes(&bytes).unwrap();
        assert_eq!(back.len(), index.len());
        assert_eq!(back.content_hash(), index.content_hash());
        assert_eq!(back.locate(-157.90, 21.40).len(), 1);
    }

    #[test]
    fn file_bytes_are_deterministic() {
        let districts = vec![
            district_fixture("US/HI/honolulu", "District 1", (-157.90, 21.40)),
            district_fixture("US/HI/honolulu", "District 2", (-157.80, 21.45)),
        ];
        let a = write_index_bytes(&SpatialIndex::build(districts.clone()).unwrap()).unwrap();
        let mut reversed = districts;
        reversed.reverse();
        let b = write_index_bytes(&SpatialIndex::build(reversed).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn corrupted_bytes_fail() {
        let index = SpatialIndex::build(vec![district_fixture(
            "US/HI/honolulu",
            "District 1",
            (-157.90, 21.40),
        )])
        .unwrap();
        let mut bytes = write_index_bytes(&index).unwrap();
        bytes[9] ^= 0xff; // flip a content-hash byte
        assert!(read_index_bytes(&bytes).is_err());
        assert!(read_index_bytes(b"not an index").is_err());
    }
}
