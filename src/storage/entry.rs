//! Log entry wire formats and checksums.
//!
//! Three entry kinds flow through the log:
//! - `OBJECT`: a key-value pair plus its version and timestamp
//! - `TOMBSTONE`: a deletion marker naming the version it supersedes and
//!   the log segment that held the superseded object
//! - `SAFEVERSION`: a marker raising the version floor during recovery
//!
//! Layouts are fixed byte-for-byte, little-endian, and carry a crc32c
//! checksum computed over the serialized entry with the checksum field
//! zeroed. The index stores references; these codecs are the only place
//! that interprets entry bytes.

use crate::core::error::{StrataError, StrataResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Reserved version sentinel; never assigned to an object.
pub const VERSION_NONEXISTENT: u64 = 0;

/// A key: table id plus raw key bytes.
///
/// Equality is by table id and byte-exact key. The 64-bit hash is
/// computed once at construction and selects the hash index bucket, the
/// stripe lock, and the tablet key-hash range.
#[derive(Debug, Clone)]
pub struct Key {
    table_id: u64,
    key: Bytes,
    hash: u64,
}

impl Key {
    /// Create a key, computing its hash.
    pub fn new(table_id: u64, key: impl Into<Bytes>) -> Self {
        let key = key.into();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&table_id.to_le_bytes());
        hasher.write(&key);
        let hash = hasher.finish();
        Self {
            table_id,
            key,
            hash,
        }
    }

    /// The table this key belongs to.
    pub fn table_id(&self) -> u64 {
        self.table_id
    }

    /// The raw key bytes.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// The 64-bit key hash.
    pub fn key_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id && self.key == other.key
    }
}

impl Eq for Key {}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}, {}>",
            self.table_id,
            String::from_utf8_lossy(&self.key)
        )
    }
}

/// Discriminant for entries stored in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEntryType {
    Object,
    Tombstone,
    SafeVersion,
}

impl LogEntryType {
    /// Wire discriminant for segment framing.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Object => 1,
            Self::Tombstone => 2,
            Self::SafeVersion => 3,
        }
    }

    /// Decode a wire discriminant.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Tombstone),
            3 => Some(Self::SafeVersion),
            _ => None,
        }
    }
}

// OBJECT layout:
//   table_id: u64 | key_length: u16 | version: u64 | timestamp: u32 |
//   checksum: u32 | key bytes | value bytes
const OBJECT_HEADER_LEN: usize = 26;
const OBJECT_CHECKSUM_OFFSET: usize = 22;

// TOMBSTONE layout:
//   table_id: u64 | key_length: u16 | segment_id: u64 | object_version: u64 |
//   timestamp: u32 | checksum: u32 | key bytes
const TOMBSTONE_HEADER_LEN: usize = 34;
const TOMBSTONE_CHECKSUM_OFFSET: usize = 30;

// SAFEVERSION layout: safe_version: u64 | checksum: u32
const SAFE_VERSION_LEN: usize = 12;
const SAFE_VERSION_CHECKSUM_OFFSET: usize = 8;

/// crc32c over `raw` with the four checksum bytes at `offset` zeroed.
fn checksum_with_hole(raw: &[u8], offset: usize) -> u32 {
    let crc = crc32c::crc32c(&raw[..offset]);
    let crc = crc32c::crc32c_append(crc, &[0u8; 4]);
    crc32c::crc32c_append(crc, &raw[offset + 4..])
}

fn read_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(raw[offset..offset + 2].try_into().unwrap())
}

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap())
}

fn read_u64(raw: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(raw[offset..offset + 8].try_into().unwrap())
}

/// Serialize an OBJECT entry.
pub fn encode_object(key: &Key, value: &[u8], version: u64, timestamp: u32) -> Bytes {
    let key_bytes = key.key_bytes();
    let mut buf = BytesMut::with_capacity(OBJECT_HEADER_LEN + key_bytes.len() + value.len());
    buf.put_u64_le(key.table_id());
    buf.put_u16_le(key_bytes.len() as u16);
    buf.put_u64_le(version);
    buf.put_u32_le(timestamp);
    buf.put_u32_le(0);
    buf.put_slice(key_bytes);
    buf.put_slice(value);

    let crc = checksum_with_hole(&buf, OBJECT_CHECKSUM_OFFSET);
    buf[OBJECT_CHECKSUM_OFFSET..OBJECT_CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    buf.freeze()
}

/// Serialize a TOMBSTONE entry superseding `object`, which currently
/// resides in log segment `segment_id`.
pub fn encode_tombstone(object: &ObjectView, segment_id: u64, timestamp: u32) -> Bytes {
    let key_bytes = object.key_bytes();
    let mut buf = BytesMut::with_capacity(TOMBSTONE_HEADER_LEN + key_bytes.len());
    buf.put_u64_le(object.table_id());
    buf.put_u16_le(key_bytes.len() as u16);
    buf.put_u64_le(segment_id);
    buf.put_u64_le(object.version());
    buf.put_u32_le(timestamp);
    buf.put_u32_le(0);
    buf.put_slice(&key_bytes);

    let crc = checksum_with_hole(&buf, TOMBSTONE_CHECKSUM_OFFSET);
    buf[TOMBSTONE_CHECKSUM_OFFSET..TOMBSTONE_CHECKSUM_OFFSET + 4]
        .copy_from_slice(&crc.to_le_bytes());
    buf.freeze()
}

/// Serialize a SAFEVERSION marker.
pub fn encode_safe_version(safe_version: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(SAFE_VERSION_LEN);
    buf.put_u64_le(safe_version);
    buf.put_u32_le(0);

    let crc = checksum_with_hole(&buf, SAFE_VERSION_CHECKSUM_OFFSET);
    buf[SAFE_VERSION_CHECKSUM_OFFSET..SAFE_VERSION_CHECKSUM_OFFSET + 4]
        .copy_from_slice(&crc.to_le_bytes());
    buf.freeze()
}

/// Typed view over a serialized OBJECT entry.
///
/// Holds the entry bytes by refcount; slices returned from accessors
/// share the same backing allocation, which the cleaner's liveness check
/// relies on.
#[derive(Debug, Clone)]
pub struct ObjectView {
    raw: Bytes,
}

impl ObjectView {
    /// Parse an OBJECT entry, validating lengths only. Checksums are
    /// verified separately where policy requires it.
    pub fn parse(raw: Bytes) -> StrataResult<Self> {
        if raw.len() < OBJECT_HEADER_LEN {
            return Err(StrataError::CorruptEntry {
                reason: "object entry shorter than header",
            });
        }
        let key_len = read_u16(&raw, 8) as usize;
        if OBJECT_HEADER_LEN + key_len > raw.len() {
            return Err(StrataError::CorruptEntry {
                reason: "object key length exceeds entry",
            });
        }
        Ok(Self { raw })
    }

    pub fn table_id(&self) -> u64 {
        read_u64(&self.raw, 0)
    }

    pub fn key_length(&self) -> u16 {
        read_u16(&self.raw, 8)
    }

    pub fn version(&self) -> u64 {
        read_u64(&self.raw, 10)
    }

    pub fn timestamp(&self) -> u32 {
        read_u32(&self.raw, 18)
    }

    pub fn checksum(&self) -> u32 {
        read_u32(&self.raw, OBJECT_CHECKSUM_OFFSET)
    }

    /// The key bytes, sharing the entry's backing allocation.
    pub fn key_bytes(&self) -> Bytes {
        self.raw
            .slice(OBJECT_HEADER_LEN..OBJECT_HEADER_LEN + self.key_length() as usize)
    }

    /// The value bytes, sharing the entry's backing allocation.
    pub fn value(&self) -> Bytes {
        self.raw.slice(OBJECT_HEADER_LEN + self.key_length() as usize..)
    }

    /// Reconstruct the full key.
    pub fn to_key(&self) -> Key {
        Key::new(self.table_id(), self.key_bytes())
    }

    /// Recompute and compare the stored checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum_with_hole(&self.raw, OBJECT_CHECKSUM_OFFSET) == self.checksum()
    }

    /// The underlying entry bytes.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

/// Typed view over a serialized TOMBSTONE entry.
#[derive(Debug, Clone)]
pub struct TombstoneView {
    raw: Bytes,
}

impl TombstoneView {
    /// Parse a TOMBSTONE entry, validating lengths only.
    pub fn parse(raw: Bytes) -> StrataResult<Self> {
        if raw.len() < TOMBSTONE_HEADER_LEN {
            return Err(StrataError::CorruptEntry {
                reason: "tombstone entry shorter than header",
            });
        }
        let key_len = read_u16(&raw, 8) as usize;
        if TOMBSTONE_HEADER_LEN + key_len != raw.len() {
            return Err(StrataError::CorruptEntry {
                reason: "tombstone key length does not match entry",
            });
        }
        Ok(Self { raw })
    }

    pub fn table_id(&self) -> u64 {
        read_u64(&self.raw, 0)
    }

    pub fn key_length(&self) -> u16 {
        read_u16(&self.raw, 8)
    }

    /// The log segment holding the object this tombstone supersedes.
    /// Sole criterion for tombstone liveness during cleaning.
    pub fn segment_id(&self) -> u64 {
        read_u64(&self.raw, 10)
    }

    /// Version of the superseded object.
    pub fn object_version(&self) -> u64 {
        read_u64(&self.raw, 18)
    }

    pub fn timestamp(&self) -> u32 {
        read_u32(&self.raw, 26)
    }

    pub fn checksum(&self) -> u32 {
        read_u32(&self.raw, TOMBSTONE_CHECKSUM_OFFSET)
    }

    /// The key bytes, sharing the entry's backing allocation.
    pub fn key_bytes(&self) -> Bytes {
        self.raw.slice(TOMBSTONE_HEADER_LEN..)
    }

    /// Reconstruct the full key.
    pub fn to_key(&self) -> Key {
        Key::new(self.table_id(), self.key_bytes())
    }

    /// Recompute and compare the stored checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum_with_hole(&self.raw, TOMBSTONE_CHECKSUM_OFFSET) == self.checksum()
    }

    /// The underlying entry bytes.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

/// Typed view over a serialized SAFEVERSION marker.
#[derive(Debug, Clone)]
pub struct SafeVersionView {
    raw: Bytes,
}

impl SafeVersionView {
    /// Parse a SAFEVERSION marker.
    pub fn parse(raw: Bytes) -> StrataResult<Self> {
        if raw.len() != SAFE_VERSION_LEN {
            return Err(StrataError::CorruptEntry {
                reason: "safe version marker has wrong length",
            });
        }
        Ok(Self { raw })
    }

    pub fn safe_version(&self) -> u64 {
        read_u64(&self.raw, 0)
    }

    pub fn checksum(&self) -> u32 {
        read_u32(&self.raw, SAFE_VERSION_CHECKSUM_OFFSET)
    }

    /// Recompute and compare the stored checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum_with_hole(&self.raw, SAFE_VERSION_CHECKSUM_OFFSET) == self.checksum()
    }
}

/// Version carried by an entry of either indexed kind.
///
/// For tombstones this is the superseded object's version, which is what
/// reconciliation compares against.
pub fn entry_version(entry_type: LogEntryType, raw: &Bytes) -> StrataResult<u64> {
    match entry_type {
        LogEntryType::Object => Ok(ObjectView::parse(raw.clone())?.version()),
        LogEntryType::Tombstone => Ok(TombstoneView::parse(raw.clone())?.object_version()),
        LogEntryType::SafeVersion => Err(StrataError::CorruptEntry {
            reason: "safe version markers carry no object version",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> Key {
        Key::new(7, Bytes::from_static(b"alpha"))
    }

    #[test]
    fn test_key_equality_and_hash() {
        let a = Key::new(1, Bytes::from_static(b"k"));
        let b = Key::new(1, Bytes::copy_from_slice(b"k"));
        let c = Key::new(2, Bytes::from_static(b"k"));

        assert_eq!(a, b);
        assert_eq!(a.key_hash(), b.key_hash());
        assert_ne!(a, c);
        assert_ne!(a.key_hash(), c.key_hash());
    }

    #[test]
    fn test_object_roundtrip() {
        let key = sample_key();
        let raw = encode_object(&key, b"value-bytes", 42, 1234);
        let view = ObjectView::parse(raw).unwrap();

        assert_eq!(view.table_id(), 7);
        assert_eq!(view.key_bytes(), Bytes::from_static(b"alpha"));
        assert_eq!(view.value(), Bytes::from_static(b"value-bytes"));
        assert_eq!(view.version(), 42);
        assert_eq!(view.timestamp(), 1234);
        assert!(view.verify_checksum());
        assert_eq!(view.to_key(), key);
    }

    #[test]
    fn test_object_checksum_detects_corruption() {
        let raw = encode_object(&sample_key(), b"v", 1, 0);
        let mut corrupt = raw.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;

        let view = ObjectView::parse(Bytes::from(corrupt)).unwrap();
        assert!(!view.verify_checksum());
    }

    #[test]
    fn test_object_rejects_truncation() {
        let raw = encode_object(&sample_key(), b"v", 1, 0);
        let truncated = raw.slice(..OBJECT_HEADER_LEN + 2);
        assert!(ObjectView::parse(truncated).is_err());
        assert!(ObjectView::parse(raw.slice(..10)).is_err());
    }

    #[test]
    fn test_tombstone_built_from_object() {
        let key = sample_key();
        let object = ObjectView::parse(encode_object(&key, b"v", 9, 50)).unwrap();
        let raw = encode_tombstone(&object, 3, 60);
        let tomb = TombstoneView::parse(raw).unwrap();

        assert_eq!(tomb.table_id(), 7);
        assert_eq!(tomb.segment_id(), 3);
        assert_eq!(tomb.object_version(), 9);
        assert_eq!(tomb.timestamp(), 60);
        assert_eq!(tomb.to_key(), key);
        assert!(tomb.verify_checksum());
    }

    #[test]
    fn test_tombstone_rejects_length_mismatch() {
        let object = ObjectView::parse(encode_object(&sample_key(), b"v", 1, 0)).unwrap();
        let raw = encode_tombstone(&object, 1, 0);
        let mut extended = raw.to_vec();
        extended.push(0);
        assert!(TombstoneView::parse(Bytes::from(extended)).is_err());
    }

    #[test]
    fn test_safe_version_roundtrip() {
        let raw = encode_safe_version(77);
        let view = SafeVersionView::parse(raw).unwrap();
        assert_eq!(view.safe_version(), 77);
        assert!(view.verify_checksum());
    }

    #[test]
    fn test_entry_version_asymmetry() {
        let object = ObjectView::parse(encode_object(&sample_key(), b"v", 5, 0)).unwrap();
        let tomb_raw = encode_tombstone(&object, 1, 0);

        assert_eq!(
            entry_version(LogEntryType::Object, object.raw()).unwrap(),
            5
        );
        assert_eq!(entry_version(LogEntryType::Tombstone, &tomb_raw).unwrap(), 5);
        assert!(entry_version(LogEntryType::SafeVersion, &encode_safe_version(1)).is_err());
    }
}
