// Versioned binary record for a persisted region.
//
// Layout (all integers little-endian):
//
//   magic        4 bytes  b"WMRG"
//   version      u16      FORMAT_VERSION
//   dimension    i32
//   region x/y/z i32 x 3
//   encoding     u8       0 = dense, 1 = run-length
//   payload_len  u32
//   payload      payload_len bytes
//   crc32        u32      CRC-32 of every byte before it
//
// Dense payload: the known mask (64 words, 512 bytes) followed by the packed
// class array (1024 bytes). Run-length payload: `(symbol u8, run u16)`
// triples, symbols 0..=3 for observed tags and 4 for unknown, runs summing
// to exactly `REGION_VOLUME`. The encoder writes whichever payload is
// smaller; mostly-uniform regions (open air, solid rock) compress to a
// handful of bytes.
//
// Decoding fails closed: a record from a newer version, with a bad checksum,
// or whose header names a different region than requested is an error, and
// the cache treats every error as a miss.

use crate::grid::RegionGrid;
use crate::types::{Classification, DimensionId, REGION_VOLUME, RegionCoord};

pub const MAGIC: [u8; 4] = *b"WMRG";
pub const FORMAT_VERSION: u16 = 1;

const ENCODING_DENSE: u8 = 0;
const ENCODING_RLE: u8 = 1;

/// magic + version + dimension + coord + encoding + payload_len.
const HEADER_LEN: usize = 4 + 2 + 4 + 12 + 1 + 4;
const TRAILER_LEN: usize = 4;
const DENSE_PAYLOAD_LEN: usize = REGION_VOLUME / 64 * 8 + REGION_VOLUME / 4;

/// Reasons a stored region record cannot be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record truncated: {0} bytes")]
    Truncated(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("record is for {found_dimension} {found_coord}, expected {expected_dimension} {expected_coord}")]
    HeaderMismatch {
        expected_dimension: DimensionId,
        expected_coord: RegionCoord,
        found_dimension: DimensionId,
        found_coord: RegionCoord,
    },

    #[error("unknown payload encoding {0}")]
    UnknownEncoding(u8),

    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// Serialize a region grid into a self-describing record.
pub fn encode_region(dimension: DimensionId, coord: RegionCoord, grid: &RegionGrid) -> Vec<u8> {
    let rle = encode_rle(grid);
    let (encoding, payload) = if rle.len() < DENSE_PAYLOAD_LEN {
        (ENCODING_RLE, rle)
    } else {
        (ENCODING_DENSE, encode_dense(grid))
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dimension.0.to_le_bytes());
    out.extend_from_slice(&coord.x.to_le_bytes());
    out.extend_from_slice(&coord.y.to_le_bytes());
    out.extend_from_slice(&coord.z.to_le_bytes());
    out.push(encoding);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Parse a record, checking it belongs to `(dimension, coord)`.
pub fn decode_region(
    bytes: &[u8],
    dimension: DimensionId,
    coord: RegionCoord,
) -> Result<RegionGrid, CodecError> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if bytes[0..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let mut reader = Reader::new(&bytes[4..]);
    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let body_len = bytes.len() - TRAILER_LEN;
    let stored = u32::from_le_bytes([
        bytes[body_len],
        bytes[body_len + 1],
        bytes[body_len + 2],
        bytes[body_len + 3],
    ]);
    let computed = crc32fast::hash(&bytes[..body_len]);
    if stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }

    let found_dimension = DimensionId(reader.i32()?);
    let found_coord = RegionCoord::new(reader.i32()?, reader.i32()?, reader.i32()?);
    if found_dimension != dimension || found_coord != coord {
        return Err(CodecError::HeaderMismatch {
            expected_dimension: dimension,
            expected_coord: coord,
            found_dimension,
            found_coord,
        });
    }

    let encoding = reader.u8()?;
    let payload_len = reader.u32()? as usize;
    if HEADER_LEN + payload_len != body_len {
        return Err(CodecError::Malformed("payload length disagrees with record size"));
    }
    let payload = &bytes[HEADER_LEN..body_len];

    match encoding {
        ENCODING_DENSE => decode_dense(payload),
        ENCODING_RLE => decode_rle(payload),
        other => Err(CodecError::UnknownEncoding(other)),
    }
}

fn encode_dense(grid: &RegionGrid) -> Vec<u8> {
    let mut out = Vec::with_capacity(DENSE_PAYLOAD_LEN);
    for word in grid.known_words() {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(grid.class_bytes());
    out
}

fn decode_dense(payload: &[u8]) -> Result<RegionGrid, CodecError> {
    if payload.len() != DENSE_PAYLOAD_LEN {
        return Err(CodecError::Malformed("dense payload has wrong length"));
    }
    let mask_len = REGION_VOLUME / 8;
    let known = payload[..mask_len]
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    let classes = payload[mask_len..].to_vec();
    RegionGrid::from_raw(classes, known).ok_or(CodecError::Malformed("dense payload has wrong length"))
}

fn encode_rle(grid: &RegionGrid) -> Vec<u8> {
    let mut out = Vec::new();
    let mut run_symbol = grid.get(0).symbol();
    let mut run_len: u16 = 0;
    for (_, class) in grid.iter() {
        let symbol = class.symbol();
        if symbol == run_symbol && run_len < u16::MAX {
            run_len += 1;
        } else {
            out.push(run_symbol);
            out.extend_from_slice(&run_len.to_le_bytes());
            run_symbol = symbol;
            run_len = 1;
        }
    }
    out.push(run_symbol);
    out.extend_from_slice(&run_len.to_le_bytes());
    out
}

fn decode_rle(payload: &[u8]) -> Result<RegionGrid, CodecError> {
    if payload.len() % 3 != 0 {
        return Err(CodecError::Malformed("run-length payload is not a whole number of runs"));
    }
    let mut grid = RegionGrid::new();
    let mut index = 0usize;
    for run in payload.chunks_exact(3) {
        let class = Classification::from_symbol(run[0])
            .ok_or(CodecError::Malformed("run-length symbol out of range"))?;
        let len = u16::from_le_bytes([run[1], run[2]]) as usize;
        if len == 0 {
            return Err(CodecError::Malformed("zero-length run"));
        }
        if index + len > REGION_VOLUME {
            return Err(CodecError::Malformed("runs overflow the region"));
        }
        if class != Classification::Unknown {
            for i in index..index + len {
                grid.set(i, class);
            }
        }
        index += len;
    }
    if index != REGION_VOLUME {
        return Err(CodecError::Malformed("runs do not cover the region"));
    }
    Ok(grid)
}

/// Minimal cursor over little-endian header fields.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(CodecError::Truncated(self.bytes.len()))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: DimensionId = DimensionId(0);
    const COORD: RegionCoord = RegionCoord::new(1, -2, 3);

    /// Floor of solid at the bottom layer, air above, one water voxel.
    fn layered_grid() -> RegionGrid {
        let mut grid = RegionGrid::new();
        for z in 0..16 {
            for x in 0..16 {
                grid.set(RegionCoord::local_index(x, 0, z), Classification::Solid);
                for y in 1..16 {
                    grid.set(RegionCoord::local_index(x, y, z), Classification::Air);
                }
            }
        }
        grid.set(RegionCoord::local_index(3, 1, 3), Classification::Water);
        grid
    }

    /// Checkerboard defeats run-length encoding, forcing the dense path.
    fn noisy_grid() -> RegionGrid {
        let mut grid = RegionGrid::new();
        for i in 0..REGION_VOLUME {
            let class = match i % 5 {
                0 => Classification::Air,
                1 => Classification::Solid,
                2 => Classification::Water,
                3 => Classification::Avoid,
                _ => Classification::Unknown,
            };
            grid.set(i, class);
        }
        grid
    }

    #[test]
    fn uniform_region_uses_run_length() {
        let grid = layered_grid();
        let bytes = encode_region(DIM, COORD, &grid);
        assert_eq!(bytes[HEADER_LEN - 5], ENCODING_RLE);
        assert!(bytes.len() < 100, "layered region encoded to {} bytes", bytes.len());
        assert_eq!(decode_region(&bytes, DIM, COORD).unwrap(), grid);
    }

    #[test]
    fn noisy_region_uses_dense() {
        let grid = noisy_grid();
        let bytes = encode_region(DIM, COORD, &grid);
        assert_eq!(bytes[HEADER_LEN - 5], ENCODING_DENSE);
        assert_eq!(decode_region(&bytes, DIM, COORD).unwrap(), grid);
    }

    #[test]
    fn empty_region_roundtrips_as_unknown() {
        let grid = RegionGrid::new();
        let bytes = encode_region(DIM, COORD, &grid);
        let decoded = decode_region(&bytes, DIM, COORD).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn unknown_version_fails_closed() {
        let mut bytes = encode_region(DIM, COORD, &layered_grid());
        bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(
            decode_region(&bytes, DIM, COORD),
            Err(CodecError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = encode_region(DIM, COORD, &layered_grid());
        bytes[HEADER_LEN] ^= 0xFF;
        assert!(matches!(
            decode_region(&bytes, DIM, COORD),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn record_for_other_region_is_rejected() {
        let bytes = encode_region(DIM, COORD, &layered_grid());
        assert!(matches!(
            decode_region(&bytes, DIM, RegionCoord::new(0, 0, 0)),
            Err(CodecError::HeaderMismatch { .. })
        ));
        assert!(matches!(
            decode_region(&bytes, DimensionId(-1), COORD),
            Err(CodecError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn truncated_and_garbage_inputs_are_errors() {
        assert_eq!(decode_region(&[], DIM, COORD), Err(CodecError::Truncated(0)));
        let garbage = vec![0xAB; 64];
        assert_eq!(decode_region(&garbage, DIM, COORD), Err(CodecError::BadMagic));
    }

    #[test]
    fn runs_that_do_not_cover_region_are_malformed() {
        // One run of 10 air voxels, correctly framed and checksummed.
        let payload = [0u8, 10, 0];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&DIM.0.to_le_bytes());
        bytes.extend_from_slice(&COORD.x.to_le_bytes());
        bytes.extend_from_slice(&COORD.y.to_le_bytes());
        bytes.extend_from_slice(&COORD.z.to_le_bytes());
        bytes.push(ENCODING_RLE);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        assert_eq!(
            decode_region(&bytes, DIM, COORD),
            Err(CodecError::Malformed("runs do not cover the region"))
        );
    }
}
