//! Binary framing for snapshot files.
//!
//! A snapshot file is a single frame:
//! - Magic bytes to identify Kyroid files
//! - Version byte for forward compatibility
//! - Length-prefixed JSON body
//! - CRC32 checksum for corruption detection

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Magic bytes to identify Kyroid snapshot files.
pub const MAGIC: [u8; 4] = *b"KYID";

/// Reject bodies above 256 MB before allocating for them.
const MAX_BODY_SIZE: usize = 256 * 1024 * 1024;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes a value into a framed, checksummed buffer.
///
/// Format:
/// ```text
/// [magic: 4 bytes][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;
    if data.len() > MAX_BODY_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("snapshot size {} exceeds maximum {MAX_BODY_SIZE}", data.len()),
        ));
    }
    let len = u32::try_from(data.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "snapshot too large to frame"))?;

    let mut out = Vec::with_capacity(MAGIC.len() + 1 + 4 + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Deserializes a framed value, verifying magic, version and checksum.
///
/// # Errors
/// - Returns error if the magic bytes or version are wrong
/// - Returns error if checksum fails (corruption detected)
/// - Returns error if deserialization fails
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "unsupported codec version: {} (expected {CODEC_VERSION})",
                version[0]
            ),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_BODY_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("snapshot size {len} exceeds maximum {MAX_BODY_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);
    let computed_crc = checksum(&data);
    if stored_crc != computed_crc {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x} (data corrupted)"
            ),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::snapshot::Snapshot;

    fn sample() -> Snapshot {
        Snapshot {
            identities: vec![Identity::with_aliases("Ann Lee", ["A.Lee"])],
            performance_records: Vec::new(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[..4], &MAGIC);
        let decoded: Snapshot = decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded.identities[0].canonical_name, "Ann Lee");
        assert_eq!(decoded.identities[0].aliases, vec!["A.Lee".to_string()]);
    }

    #[test]
    fn test_crc_detects_corruption() {
        let mut bytes = encode(&sample()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = decode::<Snapshot>(&mut bytes.as_slice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        let err = decode::<Snapshot>(&mut bytes.as_slice()).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let bytes = encode(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert!(decode::<Snapshot>(&mut &truncated[..]).is_err());
    }
}
