//! dbheader validates and writes the 100-byte database file header.
//!
//! The header occupies the beginning of page 1. Almost every field is
//! constant in this file format; validation therefore checks the fields
//! against their fixed values instead of interpreting them.

use crate::codec;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("The magic bytes for this file are wrong.")]
    WrongMagic,
    #[error("The pagesize is not supported by this code.")]
    UnsupportedPagesize,
    #[error("A header field does not hold its expected fixed value.")]
    Invalid,
}

pub const DB_HEADER_SIZE: usize = codec::DB_HEADER_SIZE;

// Offset	Size	Description
// 0        16      The header string: "SQLite format 3\000"
const MAGIC: &[u8; 16] = b"SQLite format 3\0";

// Offset	Size	Description
// 18       1       File format write version. Always 1 here.
// 19       1       File format read version. Always 1 here.
// 20       1       Bytes of unused "reserved" space at the end of each page. Always 0.
// 21       1       Maximum embedded payload fraction. Must be 64.
// 22       1       Minimum embedded payload fraction. Must be 32.
// 23       1       Leaf payload fraction. Must be 32.
const FORMAT_BYTES: &[u8; 6] = &[0x01, 0x01, 0x00, 0x40, 0x20, 0x20];

// The three non-zero words in the otherwise-zero region 0x18..0x64:
// 0x2C: schema format number, 0x30: default page cache size, 0x38: text
// encoding (1 = UTF-8).
const SCHEMA_FORMAT: u32 = 1;
const DEFAULT_CACHE_SIZE: u32 = 20000;
const TEXT_ENCODING_UTF8: u32 = 1;

const MIN_PAGE_SIZE: u32 = 512;

/// Validates a header read from the start of the file and returns the page
/// size it declares.
pub fn validate(header: &[u8; DB_HEADER_SIZE]) -> Result<u32, Error> {
    if &header[0..16] != MAGIC {
        return Err(Error::WrongMagic);
    }

    // Offset	Size	Description
    // 16       2       The database page size in bytes, big-endian.
    let pagesize = codec::read_u16(&header[16..18]) as u32;
    if pagesize < MIN_PAGE_SIZE {
        return Err(Error::UnsupportedPagesize);
    }

    if &header[0x12..0x18] != FORMAT_BYTES {
        return Err(Error::Invalid);
    }

    // The words from 0x18 up to 0x64 are all zero except the three fixed
    // non-zero fields.
    for off in (0x18..0x64).step_by(4) {
        let expected = match off {
            0x2c => SCHEMA_FORMAT,
            0x30 => DEFAULT_CACHE_SIZE,
            0x38 => TEXT_ENCODING_UTF8,
            _ => 0,
        };
        if codec::read_u32(&header[off..off + 4]) != expected {
            return Err(Error::Invalid);
        }
    }

    Ok(pagesize)
}

/// Fills bytes 0..100 of a fresh page 1 with the fixed header.
pub fn write_into(page1: &mut [u8], pagesize: u16) {
    page1[0..16].copy_from_slice(MAGIC);
    codec::write_u16(&mut page1[16..18], pagesize);
    page1[0x12..0x18].copy_from_slice(FORMAT_BYTES);
    page1[0x18..0x64].fill(0);
    codec::write_u32(&mut page1[0x2c..0x30], SCHEMA_FORMAT);
    codec::write_u32(&mut page1[0x30..0x34], DEFAULT_CACHE_SIZE);
    codec::write_u32(&mut page1[0x38..0x3c], TEXT_ENCODING_UTF8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_header() -> [u8; DB_HEADER_SIZE] {
        let mut page = [0_u8; DB_HEADER_SIZE];
        write_into(&mut page, 1024);
        page
    }

    #[test]
    fn test_write_then_validate() {
        let header = fresh_header();
        assert_eq!(&header[0..15], b"SQLite format 3");
        assert_eq!(header[15], 0);
        assert_eq!(header[16..18], [0x04, 0x00]);
        assert_eq!(validate(&header).unwrap(), 1024);
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut header = fresh_header();
        header[0] = b'X';
        assert!(matches!(validate(&header), Err(Error::WrongMagic)));
    }

    #[test]
    fn test_rejects_small_pagesize() {
        let mut header = fresh_header();
        codec::write_u16(&mut header[16..18], 256);
        assert!(matches!(validate(&header), Err(Error::UnsupportedPagesize)));
    }

    #[test]
    fn test_rejects_changed_fixed_fields() {
        // Text encoding flipped to UTF-16.
        let mut header = fresh_header();
        codec::write_u32(&mut header[0x38..0x3c], 2);
        assert!(matches!(validate(&header), Err(Error::Invalid)));

        // A stray non-zero byte in the reserved region.
        let mut header = fresh_header();
        header[0x50] = 1;
        assert!(matches!(validate(&header), Err(Error::Invalid)));
    }
}
