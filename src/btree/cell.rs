//! cell defines the entries stored in B-tree nodes and their on-disk codec.
//!
//! Cell Formats:
//!
//! Table B-Tree Leaf Cell (page type 0x0d):
//! A varint which is the number of bytes of payload.
//! A varint which is the integer key, a.k.a. "rowid".
//! The payload.
//!
//! Table B-Tree Interior Cell (page type 0x05):
//! A 4-byte big-endian page number which is the left child pointer.
//! A varint which is the integer key.
//!
//! Index B-Tree Leaf Cell (page type 0x0a):
//! The 4-byte record header constant 0x0B030404.
//! A 4-byte big-endian integer key.
//! A 4-byte big-endian integer primary key.
//!
//! Index B-Tree Interior Cell (page type 0x02):
//! A 4-byte big-endian page number which is the left child pointer,
//! followed by the three words of the leaf format.
//!
//! Cells are owned records: payload bytes are copied out of the page when a
//! cell is read, so a cell stays valid after its node is modified or
//! dropped.

use enum_as_inner::EnumAsInner;

use super::{Error, Key, PageType};
use crate::codec;
use crate::pager::PageNo;

/// Fixed record-header word preceding the keys of every index cell,
/// preserved bit-for-bit.
pub const INDEX_RECORD_HEADER: u32 = 0x0B03_0404;

/// One entry of a B-tree node. The variant matches the node's page type.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum Cell {
    TableInternal {
        child_page: PageNo,
        key: Key,
    },
    TableLeaf {
        key: Key,
        data: Vec<u8>,
    },
    IndexInternal {
        child_page: PageNo,
        key: Key,
        key_pk: Key,
    },
    IndexLeaf {
        key: Key,
        key_pk: Key,
    },
}

impl Cell {
    pub fn key(&self) -> Key {
        match self {
            Cell::TableInternal { key, .. } => *key,
            Cell::TableLeaf { key, .. } => *key,
            Cell::IndexInternal { key, .. } => *key,
            Cell::IndexLeaf { key, .. } => *key,
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Cell::TableInternal { .. } => PageType::TableInternal,
            Cell::TableLeaf { .. } => PageType::TableLeaf,
            Cell::IndexInternal { .. } => PageType::IndexInternal,
            Cell::IndexLeaf { .. } => PageType::IndexLeaf,
        }
    }

    /// The left child pointer, present only on internal cells.
    pub fn child_page(&self) -> Option<PageNo> {
        match self {
            Cell::TableInternal { child_page, .. } => Some(*child_page),
            Cell::IndexInternal { child_page, .. } => Some(*child_page),
            _ => None,
        }
    }

    /// Encoded size of this cell on a node of the given type.
    ///
    /// The size is a function of the node type, as in the capacity test
    /// used before descending: a leaf cell measured against an internal
    /// node takes the internal size.
    pub fn size_on(&self, kind: PageType) -> usize {
        match kind {
            PageType::TableInternal => 8,
            PageType::TableLeaf => {
                8 + match self {
                    Cell::TableLeaf { data, .. } => data.len(),
                    _ => 0,
                }
            }
            PageType::IndexInternal => 16,
            PageType::IndexLeaf => 12,
        }
    }

    /// Decodes a cell of the given node type from `buf`, which runs from
    /// the cell's offset to the end of the page.
    pub fn parse(kind: PageType, buf: &[u8]) -> Result<Cell, Error> {
        match kind {
            PageType::TableInternal => {
                if buf.len() < 8 {
                    return Err(Error::CellNo);
                }
                let child_page = codec::read_u32(&buf[0..4]);
                let (key, _) = codec::read_varint32(&buf[4..]);
                Ok(Cell::TableInternal { child_page, key })
            }
            PageType::TableLeaf => {
                if buf.len() < 8 {
                    return Err(Error::CellNo);
                }
                let (data_size, _) = codec::read_varint32(&buf[0..]);
                let (key, _) = codec::read_varint32(&buf[4..]);
                let end = 8 + data_size as usize;
                if buf.len() < end {
                    return Err(Error::CellNo);
                }
                Ok(Cell::TableLeaf {
                    key,
                    data: buf[8..end].to_vec(),
                })
            }
            PageType::IndexInternal => {
                if buf.len() < 16 {
                    return Err(Error::CellNo);
                }
                Ok(Cell::IndexInternal {
                    child_page: codec::read_u32(&buf[0..4]),
                    key: codec::read_u32(&buf[8..12]),
                    key_pk: codec::read_u32(&buf[12..16]),
                })
            }
            PageType::IndexLeaf => {
                if buf.len() < 12 {
                    return Err(Error::CellNo);
                }
                Ok(Cell::IndexLeaf {
                    key: codec::read_u32(&buf[4..8]),
                    key_pk: codec::read_u32(&buf[8..12]),
                })
            }
        }
    }

    /// Serializes this cell into the front of `buf`, which must hold at
    /// least `size_on(self.page_type())` bytes.
    pub fn put(&self, buf: &mut [u8]) {
        match self {
            Cell::TableInternal { child_page, key } => {
                codec::write_u32(&mut buf[0..4], *child_page);
                codec::write_varint32(&mut buf[4..8], *key);
            }
            Cell::TableLeaf { key, data } => {
                codec::write_varint32(&mut buf[0..4], data.len() as u32);
                codec::write_varint32(&mut buf[4..8], *key);
                buf[8..8 + data.len()].copy_from_slice(data);
            }
            Cell::IndexInternal {
                child_page,
                key,
                key_pk,
            } => {
                codec::write_u32(&mut buf[0..4], *child_page);
                codec::write_u32(&mut buf[4..8], INDEX_RECORD_HEADER);
                codec::write_u32(&mut buf[8..12], *key);
                codec::write_u32(&mut buf[12..16], *key_pk);
            }
            Cell::IndexLeaf { key, key_pk } => {
                codec::write_u32(&mut buf[0..4], INDEX_RECORD_HEADER);
                codec::write_u32(&mut buf[4..8], *key);
                codec::write_u32(&mut buf[8..12], *key_pk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::FromHex;

    #[test]
    fn test_table_leaf_round_trip() {
        let cell = Cell::TableLeaf {
            key: 42,
            data: b"hello".to_vec(),
        };
        let mut buf = vec![0_u8; cell.size_on(PageType::TableLeaf)];
        cell.put(&mut buf);
        assert_eq!(buf.len(), 13);
        let back = Cell::parse(PageType::TableLeaf, &buf).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn test_table_internal_round_trip() {
        let cell = Cell::TableInternal {
            child_page: 7,
            key: 300,
        };
        let mut buf = [0_u8; 8];
        cell.put(&mut buf);
        assert_eq!(buf[0..4], [0, 0, 0, 7]);
        assert_eq!(Cell::parse(PageType::TableInternal, &buf).unwrap(), cell);
    }

    #[test]
    fn test_index_cells_carry_record_header() {
        let leaf = Cell::IndexLeaf { key: 10, key_pk: 100 };
        let mut buf = [0_u8; 12];
        leaf.put(&mut buf);
        assert_eq!(buf[0..4], [0x0b, 0x03, 0x04, 0x04]);
        assert_eq!(Cell::parse(PageType::IndexLeaf, &buf).unwrap(), leaf);

        let internal = Cell::IndexInternal {
            child_page: 3,
            key: 20,
            key_pk: 200,
        };
        let mut buf = [0_u8; 16];
        internal.put(&mut buf);
        assert_eq!(buf[4..8], [0x0b, 0x03, 0x04, 0x04]);
        assert_eq!(Cell::parse(PageType::IndexInternal, &buf).unwrap(), internal);
    }

    #[test]
    fn test_parse_known_leaf_bytes() {
        // data_size=2, key=1, payload 0f 41, varints in canonical form.
        let buf = Vec::from_hex("8080800280808001".to_owned() + "0f41").unwrap();
        let cell = Cell::parse(PageType::TableLeaf, &buf).unwrap();
        assert_eq!(
            cell,
            Cell::TableLeaf {
                key: 1,
                data: vec![0x0f, 0x41]
            }
        );
    }

    #[test]
    fn test_parse_rejects_truncated_cells() {
        assert!(matches!(
            Cell::parse(PageType::IndexInternal, &[0_u8; 8]),
            Err(Error::CellNo)
        ));
        // Header claims 100 payload bytes, buffer has 5.
        let mut buf = vec![0_u8; 13];
        codec::write_varint32(&mut buf[0..4], 100);
        assert!(matches!(
            Cell::parse(PageType::TableLeaf, &buf),
            Err(Error::CellNo)
        ));
    }

    #[test]
    fn test_size_follows_node_type() {
        let leaf = Cell::TableLeaf {
            key: 1,
            data: vec![0_u8; 200],
        };
        assert_eq!(leaf.size_on(PageType::TableLeaf), 208);
        // Measured against an internal node (the capacity test while
        // descending), the same entry costs one internal cell.
        assert_eq!(leaf.size_on(PageType::TableInternal), 8);

        let idx = Cell::IndexLeaf { key: 1, key_pk: 2 };
        assert_eq!(idx.size_on(PageType::IndexLeaf), 12);
        assert_eq!(idx.size_on(PageType::IndexInternal), 16);
    }
}
