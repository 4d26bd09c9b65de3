//! On-disk encoding of the record store
//!
//! # File Format
//!
//! ```text
//! [Magic: b"UDEVDB"][Version: u16 (big-endian)]
//! [Length: u32 (big-endian)][CRC32: u32 (big-endian)][postcard DeviceRecord]
//! [Length: u32 (big-endian)][CRC32: u32 (big-endian)][postcard DeviceRecord]
//! ...
//! ```
//!
//! The checksum covers the postcard bytes of a single record. Any
//! mismatch, truncation or trailing garbage is reported as corruption.

use crate::DeviceRecord;
use crate::error::{Result, StoreError};

/// File magic
pub const MAGIC: &[u8; 6] = b"UDEVDB";

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Maximum size of a single encoded record (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

const HEADER_LEN: usize = MAGIC.len() + 2;
const FRAME_HEADER_LEN: usize = 8;

/// Encode a single record into a checksummed frame
pub fn encode_frame(record: &DeviceRecord) -> Result<Vec<u8>> {
    let bytes = postcard::to_allocvec(record)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(StoreError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + bytes.len());
    frame.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&crc32fast::hash(&bytes).to_be_bytes());
    frame.extend_from_slice(&bytes);
    Ok(frame)
}

/// Encode a complete store image
pub fn encode_store<'a, I>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a DeviceRecord>,
{
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    for record in records {
        out.extend_from_slice(&encode_frame(record)?);
    }
    Ok(out)
}

/// Decode a complete store image
///
/// An empty image is a valid, empty store.
pub fn decode_store(image: &[u8]) -> Result<Vec<DeviceRecord>> {
    if image.is_empty() {
        return Ok(Vec::new());
    }
    if image.len() < HEADER_LEN || &image[..MAGIC.len()] != MAGIC {
        return Err(StoreError::Corrupt("missing store header".to_string()));
    }

    let version = u16::from_be_bytes([image[6], image[7]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::IncompatibleVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let mut records = Vec::new();
    let mut rest = &image[HEADER_LEN..];
    while !rest.is_empty() {
        if rest.len() < FRAME_HEADER_LEN {
            return Err(StoreError::Corrupt(format!(
                "truncated frame header after {} records",
                records.len()
            )));
        }

        let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let checksum = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
        if length > MAX_FRAME_SIZE {
            return Err(StoreError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        let body = &rest[FRAME_HEADER_LEN..];
        if body.len() < length {
            return Err(StoreError::Corrupt(format!(
                "truncated record {}: expected {} bytes, got {}",
                records.len(),
                length,
                body.len()
            )));
        }

        let bytes = &body[..length];
        let computed = crc32fast::hash(bytes);
        if computed != checksum {
            return Err(StoreError::Corrupt(format!(
                "checksum mismatch in record {}: expected {:#010x}, computed {:#010x}",
                records.len(),
                checksum,
                computed
            )));
        }

        records.push(postcard::from_bytes(bytes)?);
        rest = &body[length..];
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str, name: &str) -> DeviceRecord {
        DeviceRecord {
            path: path.to_string(),
            name: name.to_string(),
            symlink: "modem".to_string(),
            owner: "root".to_string(),
            group: "dialout".to_string(),
            mode: 0o660,
            major: 188,
            minor: 0,
        }
    }

    #[test]
    fn test_store_roundtrip_preserves_order() {
        let records = vec![
            sample("/class/tty/ttyUSB0", "ttyUSB0"),
            sample("/block/sda", "sda"),
        ];
        let image = encode_store(&records).unwrap();
        assert_eq!(&image[..6], MAGIC);
        assert_eq!(decode_store(&image).unwrap(), records);
    }

    #[test]
    fn test_empty_image_is_empty_store() {
        assert!(decode_store(&[]).unwrap().is_empty());
        let header_only = encode_store(std::iter::empty()).unwrap();
        assert!(decode_store(&header_only).unwrap().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let err = decode_store(b"NOTADB\x00\x01").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_version_mismatch() {
        let mut image = encode_store(std::iter::empty()).unwrap();
        image[7] = 9;
        let err = decode_store(&image).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IncompatibleVersion {
                found: 9,
                expected: FORMAT_VERSION
            }
        ));
    }

    #[test]
    fn test_flipped_byte_detected() {
        let records = vec![sample("/class/tty/ttyS0", "ttyS0")];
        let mut image = encode_store(&records).unwrap();
        let last = image.len() - 1;
        image[last] ^= 0xff;
        assert!(matches!(
            decode_store(&image).unwrap_err(),
            StoreError::Corrupt(_)
        ));
    }

    #[test]
    fn test_truncated_record_detected() {
        let records = vec![sample("/class/tty/ttyS0", "ttyS0")];
        let image = encode_store(&records).unwrap();
        let err = decode_store(&image[..image.len() - 3]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut image = encode_store(std::iter::empty()).unwrap();
        image.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes());
        image.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            decode_store(&image).unwrap_err(),
            StoreError::FrameTooLarge { .. }
        ));
    }
}
