//! cursor walks the entries of one B-tree in key order.
//!
//! A cursor keeps the whole path from the root to its current position:
//! one loaded node per depth plus the cell index taken at that depth. The
//! active position is the deepest pair. There are no sibling or parent
//! pointers on disk, so stepping moves along this path.
//!
//! Table trees and index trees traverse differently. Table internal nodes
//! only route: the cursor never stops on one. Index internal cells are
//! entries in their own right, so an index internal node is a legitimate
//! stopping position, both when a seek matches exactly and when stepping
//! off the end of a leaf.

use streaming_iterator::StreamingIterator;

use crate::btree::{BTree, Cell, Error as TreeError, Key, PageType};
use crate::btree::node::Node;
use crate::pager::PageNo;

/// Initial capacity of the cursor path; the path grows past it for deeper
/// trees.
const INITIAL_PATH_DEPTH: usize = 5;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The cursor is on the last entry; there is no next.")]
    NoNext,
    #[error("The cursor is on the first entry; there is no previous.")]
    NoPrev,
    #[error("No entry with this key exists.")]
    KeyNotFound,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Whether the cursor is intended for reading or writing. The traversal
/// itself is identical; the tag is carried for the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

struct PathEntry {
    node: Node,
    ncell: u16,
}

/// A stateful position inside one B-tree.
pub struct Cursor<'b> {
    bt: &'b mut BTree,
    #[allow(dead_code)]
    mode: AccessMode,
    path: Vec<PathEntry>,
}

impl<'b> Cursor<'b> {
    /// Opens a cursor on the tree rooted at `nroot`, positioned on the
    /// root at cell 0.
    pub fn open(bt: &'b mut BTree, mode: AccessMode, nroot: PageNo) -> Result<Cursor<'b>, Error> {
        let root = bt.load_node(nroot)?;
        let mut path = Vec::with_capacity(INITIAL_PATH_DEPTH);
        path.push(PathEntry { node: root, ncell: 0 });
        Ok(Cursor { bt, mode, path })
    }

    fn depth(&self) -> usize {
        self.path.len() - 1
    }

    fn here(&self) -> &PathEntry {
        self.path.last().expect("cursor path is never empty")
    }

    fn here_mut(&mut self) -> &mut PathEntry {
        self.path.last_mut().expect("cursor path is never empty")
    }

    fn on_leaf(&self) -> bool {
        self.here().node.kind.is_leaf()
    }

    /// The cell the cursor is on. Fails with the tree's cell error when
    /// the position is past the node's cells (empty tree, or a leaf landed
    /// past its end by a seek).
    pub fn current(&self) -> Result<Cell, Error> {
        let here = self.here();
        Ok(here.node.cell(here.ncell)?)
    }

    /// Key of the current entry.
    pub fn key(&self) -> Result<Key, Error> {
        Ok(self.current()?.key())
    }

    /// Loads the child at the current position one level down: the current
    /// cell's left child, or `right_page` when the cell index is one past
    /// the last cell.
    fn descend_current(&mut self) -> Result<(), Error> {
        let here = self.here();
        let next_page = here.node.child_for(here.ncell)?;
        let node = self.bt.load_node(next_page)?;
        self.path.push(PathEntry { node, ncell: 0 });
        Ok(())
    }

    /// Releases the current node and moves up one level.
    fn ascend(&mut self) {
        debug_assert!(self.depth() > 0);
        self.path.pop();
    }

    /// Follows cell 0 of every internal node down to a leaf.
    fn descend_to_leftmost_leaf(&mut self) -> Result<(), Error> {
        while !self.on_leaf() {
            self.descend_current()?;
        }
        Ok(())
    }

    /// Descends from the current cell, then keeps to the right edge of the
    /// subtree; the final leaf is positioned on its last cell.
    fn descend_to_rightmost_leaf(&mut self) -> Result<(), Error> {
        while !self.on_leaf() {
            self.descend_current()?;
            let here = self.here_mut();
            if here.node.kind.is_internal() {
                here.ncell = here.node.n_cells;
            } else {
                here.ncell = here.node.n_cells.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Moves to the first entry of the tree.
    ///
    /// On an empty tree the cursor lands on the root leaf with no cell
    /// under it; `current` then reports the position as invalid.
    pub fn rewind(&mut self) -> Result<(), Error> {
        while self.depth() > 0 {
            self.ascend();
        }
        self.here_mut().ncell = 0;
        self.descend_to_leftmost_leaf()
    }

    /// Moves to the next entry in key order.
    pub fn next(&mut self) -> Result<(), Error> {
        debug_assert!(self.here().node.kind != PageType::TableInternal);
        let kind = self.here().node.kind;
        let n = self.here().node.n_cells;

        // Easy step: another cell on this node.
        if self.here().ncell + 1 < n {
            self.here_mut().ncell += 1;
            // An index internal entry follows its whole left subtree, so
            // the successor of the previous cell sits below the new one.
            if kind == PageType::IndexInternal {
                self.descend_to_leftmost_leaf()?;
            }
            return Ok(());
        }

        if kind.is_leaf() {
            if self.depth() == 0 {
                return Err(Error::NoNext);
            }
            // A path of nothing but right-page turns means this leaf ends
            // the whole tree.
            if self.path[..self.depth()]
                .iter()
                .all(|e| e.ncell == e.node.n_cells)
            {
                return Err(Error::NoNext);
            }
            loop {
                if self.depth() == 0 {
                    return Err(Error::NoNext);
                }
                self.ascend();
                if self.here().ncell < self.here().node.n_cells {
                    break;
                }
            }
            // An index internal ancestor is itself the successor entry.
            if self.here().node.kind == PageType::IndexInternal {
                return Ok(());
            }
            self.here_mut().ncell += 1;
            return self.descend_to_leftmost_leaf();
        }

        // Index internal with no further cells: the remaining entries are
        // under the right page. Recording n_cells marks it taken.
        self.here_mut().ncell = n;
        self.descend_to_leftmost_leaf()
    }

    /// Moves to the previous entry in key order; the mirror of
    /// [`Cursor::next`].
    pub fn prev(&mut self) -> Result<(), Error> {
        debug_assert!(self.here().node.kind != PageType::TableInternal);
        let kind = self.here().node.kind;

        // From an index internal entry the predecessor is the largest
        // entry of the cell's left subtree.
        if kind == PageType::IndexInternal {
            return self.descend_to_rightmost_leaf();
        }

        if self.here().ncell > 0 {
            self.here_mut().ncell -= 1;
            return Ok(());
        }

        if self.depth() == 0 {
            return Err(Error::NoPrev);
        }
        if self.path[..self.depth()].iter().all(|e| e.ncell == 0) {
            return Err(Error::NoPrev);
        }
        loop {
            if self.depth() == 0 {
                return Err(Error::NoPrev);
            }
            self.ascend();
            if self.here().ncell > 0 {
                break;
            }
        }
        self.here_mut().ncell -= 1;
        // An index internal ancestor cell is itself the predecessor entry.
        if self.here().node.kind == PageType::IndexInternal {
            return Ok(());
        }
        self.descend_to_rightmost_leaf()
    }

    /// First cell of `node` whose key is `>= key`, with the cell when one
    /// exists.
    fn find_cell(node: &Node, key: Key) -> Result<(u16, Option<Cell>), Error> {
        for i in 0..node.n_cells {
            let cell = node.cell(i)?;
            if key <= cell.key() {
                return Ok((i, Some(cell)));
            }
        }
        Ok((node.n_cells, None))
    }

    /// Common descent of the seek family: from the root, at each internal
    /// node take the first cell with key `>= key`, stopping early on an
    /// index internal exact match; on the leaf, land on that first cell
    /// (or one past the end).
    fn seek_partial(&mut self, key: Key) -> Result<(u16, Option<Cell>), Error> {
        while self.depth() > 0 {
            self.ascend();
        }
        loop {
            let (i, cell) = Self::find_cell(&self.here().node, key)?;
            self.here_mut().ncell = i;
            if self.on_leaf() {
                return Ok((i, cell));
            }
            if self.here().node.kind == PageType::IndexInternal {
                if let Some(c) = &cell {
                    if c.key() == key {
                        return Ok((i, cell));
                    }
                }
            }
            self.descend_current()?;
        }
    }

    /// Positions the cursor on `key` exactly.
    pub fn seek(&mut self, key: Key) -> Result<(), Error> {
        let (i, cell) = self.seek_partial(key)?;
        if i == self.here().node.n_cells {
            return Err(Error::KeyNotFound);
        }
        match cell {
            Some(c) if c.key() == key => Ok(()),
            _ => Err(Error::KeyNotFound),
        }
    }

    /// Positions the cursor on the smallest entry with key `>= key`.
    pub fn seek_ge(&mut self, key: Key) -> Result<(), Error> {
        let (i, cell) = self.seek_partial(key)?;
        let kind = self.here().node.kind;
        if i == self.here().node.n_cells {
            return match kind {
                // Past the end of a table leaf means past every key in the
                // table.
                PageType::TableLeaf => Err(Error::KeyNotFound),
                // An index leaf can end mid-tree; the successor sits in an
                // ancestor.
                _ => self.next_or_not_found(),
            };
        }
        match kind {
            PageType::TableLeaf | PageType::IndexInternal => Ok(()),
            PageType::IndexLeaf => {
                if let Some(c) = &cell {
                    if key > c.key() {
                        return self.next_or_not_found();
                    }
                }
                Ok(())
            }
            PageType::TableInternal => Err(Error::KeyNotFound),
        }
    }

    /// Positions the cursor on the smallest entry with key `> key`.
    pub fn seek_gt(&mut self, key: Key) -> Result<(), Error> {
        let (i, cell) = self.seek_partial(key)?;
        if i == self.here().node.n_cells {
            return self.next_or_not_found();
        }
        match cell {
            Some(c) if c.key() == key => self.next_or_not_found(),
            _ => Ok(()),
        }
    }

    fn next_or_not_found(&mut self) -> Result<(), Error> {
        match self.next() {
            Err(Error::NoNext) => Err(Error::KeyNotFound),
            other => other,
        }
    }
}

/// Iterates over every entry of one tree in ascending key order, yielding
/// owned `(key, payload)` pairs. Table entries carry their data; index
/// entries carry the primary key packed big-endian.
pub struct Scan<'b> {
    cursor: Cursor<'b>,
    started: bool,
    item: Option<(Key, Vec<u8>)>,
}

impl<'b> Scan<'b> {
    pub fn new(bt: &'b mut BTree, nroot: PageNo) -> Result<Scan<'b>, Error> {
        Ok(Scan {
            cursor: Cursor::open(bt, AccessMode::Read, nroot)?,
            started: false,
            item: None,
        })
    }
}

impl<'b> StreamingIterator for Scan<'b> {
    type Item = (Key, Vec<u8>);

    #[inline]
    fn advance(&mut self) {
        let stepped = if self.started {
            self.cursor.next()
        } else {
            self.started = true;
            self.cursor.rewind()
        };
        self.item = match stepped.and_then(|_| self.cursor.current()) {
            Ok(Cell::TableLeaf { key, data }) => Some((key, data)),
            Ok(Cell::IndexLeaf { key, key_pk })
            | Ok(Cell::IndexInternal { key, key_pk, .. }) => {
                Some((key, key_pk.to_be_bytes().to_vec()))
            }
            _ => None,
        };
    }

    #[inline]
    fn get(&self) -> Option<&Self::Item> {
        self.item.as_ref()
    }
}
