//! node parses one page into a B-tree node view and edits its cell area.
//!
//! A node page is laid out as:
//! 1. The 100-byte database file header (page 1 only).
//! 2. The 8 or 12 byte node header.
//! 3. The cell-offset array: `n_cells` big-endian u16 offsets into the
//!    page, in ascending key order.
//! 4. Unallocated space.
//! 5. The cell content area, growing downward from the end of the page.
//!
//! Node Header Format:
//!
//! Offset	Size	Description
//! 0       1       The page type byte.
//! 1       2       `free_offset`: first free byte after the offset array.
//! 3       2       `n_cells`: number of cells on the page.
//! 5       2       `cells_offset`: start of the cell content area.
//! 7       1       Unused.
//! 8       4       `right_page`: right-most child pointer. Internal only.
//!
//! A `Node` exclusively owns its underlying page for its lifetime;
//! dropping the node releases the page. Changes become durable only when
//! the node is written back through the tree.

use super::{Cell, Error, PageType};
use crate::codec;
use crate::pager::{MemPage, PageNo};

#[derive(Debug)]
pub struct Node {
    page: MemPage,
    origin: usize,
    pub kind: PageType,
    pub free_offset: u16,
    pub n_cells: u16,
    pub cells_offset: u16,
    /// Right-most child pointer; internal nodes only. Leaves do not store
    /// one on disk and never carry one here.
    pub right_page: Option<PageNo>,
}

impl Node {
    /// Parses the node stored on `page`.
    pub fn parse(page: MemPage) -> Result<Node, Error> {
        let origin = codec::node_origin(page.npage);
        let data = &page.data[origin..];
        let kind = PageType::from_byte(data[0]).ok_or(Error::CorruptHeader)?;
        let free_offset = codec::read_u16(&data[1..3]);
        let n_cells = codec::read_u16(&data[3..5]);
        let cells_offset = codec::read_u16(&data[5..7]);
        let right_page = if kind.is_internal() {
            Some(codec::read_u32(&data[8..12]))
        } else {
            None
        };
        Ok(Node {
            page,
            origin,
            kind,
            free_offset,
            n_cells,
            cells_offset,
            right_page,
        })
    }

    /// Builds an empty node of `kind` over `page`, leaving any database
    /// file header bytes on page 1 untouched. Existing cell bytes are left
    /// in place; the header no longer accounts for them.
    pub fn new_empty(page: MemPage, kind: PageType, page_size: usize) -> Node {
        let origin = codec::node_origin(page.npage);
        Node {
            page,
            origin,
            kind,
            free_offset: (kind.header_size() + origin) as u16,
            n_cells: 0,
            cells_offset: page_size as u16,
            right_page: if kind.is_internal() { Some(0) } else { None },
        }
    }

    pub fn page_no(&self) -> PageNo {
        self.page.npage
    }

    pub fn page(&self) -> &MemPage {
        &self.page
    }

    /// Start of the cell-offset array within the page.
    fn offsets_start(&self) -> usize {
        self.origin + self.kind.header_size()
    }

    /// Reads the i-th entry of the cell-offset array.
    fn cell_offset(&self, ncell: u16) -> usize {
        let pos = self.offsets_start() + 2 * ncell as usize;
        codec::read_u16(&self.page.data[pos..pos + 2]) as usize
    }

    /// Reads cell `ncell` into an owned record.
    pub fn cell(&self, ncell: u16) -> Result<Cell, Error> {
        if ncell >= self.n_cells {
            return Err(Error::CellNo);
        }
        let offset = self.cell_offset(ncell);
        if offset >= self.page.data.len() {
            return Err(Error::CellNo);
        }
        Cell::parse(self.kind, &self.page.data[offset..])
    }

    /// Whether `cell` still fits on this node, counting its offset-array
    /// entry.
    pub fn fits(&self, cell: &Cell) -> bool {
        let free = (self.cells_offset - self.free_offset) as usize;
        2 + cell.size_on(self.kind) <= free
    }

    /// Inserts `cell` at position `ncell`, shifting later offset entries.
    ///
    /// The caller must have checked [`Node::fits`]. The cell content area
    /// grows downward; the offset array shifts with an overlapping-safe
    /// move.
    pub fn insert_cell(&mut self, ncell: u16, cell: &Cell) -> Result<(), Error> {
        if ncell > self.n_cells {
            return Err(Error::CellNo);
        }
        debug_assert!(self.fits(cell));
        debug_assert_eq!(cell.page_type(), self.kind);

        let size = cell.size_on(self.kind);
        self.cells_offset -= size as u16;
        let offset = self.cells_offset as usize;
        cell.put(&mut self.page.data[offset..offset + size]);

        let pos = self.offsets_start() + 2 * ncell as usize;
        if ncell < self.n_cells {
            let end = self.offsets_start() + 2 * self.n_cells as usize;
            self.page.data.copy_within(pos..end, pos + 2);
        }
        codec::write_u16(&mut self.page.data[pos..pos + 2], self.cells_offset);

        self.free_offset += 2;
        self.n_cells += 1;
        Ok(())
    }

    /// The page to descend into from position `ncell`: the cell's left
    /// child, or `right_page` one past the last cell. Internal nodes only.
    pub fn child_for(&self, ncell: u16) -> Result<PageNo, Error> {
        if ncell == self.n_cells {
            self.right_page.ok_or(Error::CellNo)
        } else {
            self.cell(ncell)?.child_page().ok_or(Error::CellNo)
        }
    }

    /// Serializes the node header back into the page buffer. The offset
    /// array and cells are edited in place, so this is all a write-out
    /// needs.
    pub fn store_header(&mut self) {
        let origin = self.origin;
        let data = &mut self.page.data[origin..];
        data[0] = self.kind.to_byte();
        codec::write_u16(&mut data[1..3], self.free_offset);
        codec::write_u16(&mut data[3..5], self.n_cells);
        codec::write_u16(&mut data[5..7], self.cells_offset);
        if let Some(right_page) = self.right_page {
            codec::write_u32(&mut data[8..12], right_page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    const PAGE_SIZE: usize = 512;

    fn empty_node(npage: PageNo, kind: PageType) -> Node {
        let page = MemPage {
            npage,
            data: vec![0_u8; PAGE_SIZE],
        };
        Node::new_empty(page, kind, PAGE_SIZE)
    }

    fn leaf_cell(key: u32, len: usize) -> Cell {
        Cell::TableLeaf {
            key,
            data: vec![key as u8; len],
        }
    }

    #[test]
    fn test_new_empty_leaf_header() {
        let mut node = empty_node(2, PageType::TableLeaf);
        assert_eq!(node.free_offset, 8);
        assert_eq!(node.cells_offset, PAGE_SIZE as u16);
        assert_eq!(node.n_cells, 0);
        assert_eq!(node.right_page, None);

        node.store_header();
        let reparsed = Node::parse(MemPage {
            npage: 2,
            data: node.page.data.clone(),
        })
        .unwrap();
        assert_eq!(reparsed.kind, PageType::TableLeaf);
        assert_eq!(reparsed.free_offset, 8);
        assert_eq!(reparsed.cells_offset, PAGE_SIZE as u16);
    }

    #[test]
    fn test_new_empty_on_page_one_starts_after_file_header() {
        let node = empty_node(1, PageType::TableLeaf);
        assert_eq!(node.free_offset, 108);
    }

    #[test]
    fn test_insert_cells_keeps_offsets_in_key_order() {
        let mut node = empty_node(2, PageType::TableLeaf);
        // Arrival order 3, 1, 2; each inserted at its sorted position.
        node.insert_cell(0, &leaf_cell(3, 4)).unwrap();
        node.insert_cell(0, &leaf_cell(1, 4)).unwrap();
        node.insert_cell(1, &leaf_cell(2, 4)).unwrap();

        assert_eq!(node.n_cells, 3);
        let keys: Vec<u32> = (0..3).map(|i| node.cell(i).unwrap().key()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(keys.iter().tuple_windows().all(|(a, b)| a < b));

        // Cell area accounting: three 12-byte cells off the end of the page.
        assert_eq!(node.cells_offset as usize, PAGE_SIZE - 3 * 12);
        assert_eq!(node.free_offset, 8 + 3 * 2);
        assert!(node.free_offset <= node.cells_offset);
    }

    #[test]
    fn test_insert_cell_rejects_position_past_end() {
        let mut node = empty_node(2, PageType::TableLeaf);
        assert!(matches!(
            node.insert_cell(1, &leaf_cell(1, 4)),
            Err(Error::CellNo)
        ));
    }

    #[test]
    fn test_cell_rejects_index_out_of_range() {
        let mut node = empty_node(2, PageType::TableLeaf);
        node.insert_cell(0, &leaf_cell(1, 4)).unwrap();
        assert!(node.cell(0).is_ok());
        assert!(matches!(node.cell(1), Err(Error::CellNo)));
    }

    #[test]
    fn test_fits_boundary() {
        let mut node = empty_node(2, PageType::TableLeaf);
        // Free space is 512 - 8 = 504. A cell of payload p costs 8+p+2.
        let exact = leaf_cell(1, 504 - 10);
        assert!(node.fits(&exact));
        let over = leaf_cell(1, 504 - 9);
        assert!(!node.fits(&over));

        node.insert_cell(0, &exact).unwrap();
        assert_eq!(node.free_offset, node.cells_offset);
        assert!(!node.fits(&leaf_cell(2, 0)));
    }

    #[test]
    fn test_internal_node_round_trip_with_right_page() {
        let mut node = empty_node(2, PageType::TableInternal);
        assert_eq!(node.free_offset, 12);
        node.right_page = Some(9);
        node.insert_cell(
            0,
            &Cell::TableInternal {
                child_page: 5,
                key: 10,
            },
        )
        .unwrap();
        node.store_header();

        let reparsed = Node::parse(MemPage {
            npage: 2,
            data: node.page.data.clone(),
        })
        .unwrap();
        assert_eq!(reparsed.right_page, Some(9));
        assert_eq!(reparsed.child_for(0).unwrap(), 5);
        assert_eq!(reparsed.child_for(1).unwrap(), 9);
        assert!(matches!(reparsed.child_for(2), Err(Error::CellNo)));
    }

    #[test]
    fn test_parse_rejects_unknown_page_type() {
        let mut data = vec![0_u8; PAGE_SIZE];
        data[0] = 0x07;
        assert!(matches!(
            Node::parse(MemPage { npage: 2, data }),
            Err(Error::CorruptHeader)
        ));
    }

    #[test]
    fn test_offset_array_shift_when_touching_cell_area() {
        // Fill an index leaf to one cell short of capacity, then insert at
        // the front: the shifting move runs with the offset array touching
        // the cell area exactly.
        let mut node = empty_node(2, PageType::IndexLeaf);
        let capacity = (PAGE_SIZE - 8) / (12 + 2);
        for i in 0..capacity as u32 - 1 {
            let cell = Cell::IndexLeaf {
                key: 2 * (i + 1),
                key_pk: i,
            };
            node.insert_cell(i as u16, &cell).unwrap();
        }
        let first = Cell::IndexLeaf { key: 1, key_pk: 0 };
        assert!(node.fits(&first));
        node.insert_cell(0, &first).unwrap();
        assert_eq!(node.free_offset, node.cells_offset);

        let keys: Vec<u32> = (0..node.n_cells)
            .map(|i| node.cell(i).unwrap().key())
            .collect();
        assert_eq!(keys.len(), capacity);
        assert!(keys.iter().tuple_windows().all(|(a, b)| a < b));
    }
}
