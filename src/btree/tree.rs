//! tree implements the B-tree algorithms over a paged database file:
//! opening and initializing the file, point lookup, and insertion with
//! preemptive node splitting.
//!
//! All file access goes through the pager. Every node loaded here is
//! released (dropped) on every exit path; a page allocated by a split that
//! later fails is not reclaimed, since the format has no free list.

use log::{debug, error};

use super::{Cell, Error, Key, Node, PageType};
use crate::dbheader;
use crate::pager::{PageNo, Pager};
use crate::DEFAULT_PAGE_SIZE;

/// A database file holding a forest of B-trees, one per table or index,
/// each identified by its root page number.
pub struct BTree {
    pub pager: Pager,
}

impl BTree {
    /// Opens a database file, verifying its header.
    ///
    /// An empty file (the pager reports no header) is initialized: the
    /// pager is configured with the default page size, page 1 becomes an
    /// empty table leaf, and the 100-byte file header is written in front
    /// of it.
    pub fn open(filename: &str) -> Result<BTree, Error> {
        let mut pager = Pager::open(filename).map_err(|e| {
            error!("Failed to open database file {}", filename);
            e
        })?;

        match pager.read_header() {
            Err(crate::pager::Error::NoHeader) => {
                pager.set_page_size(DEFAULT_PAGE_SIZE)?;
                let mut bt = BTree { pager };
                let npage = bt.new_node(PageType::TableLeaf)?;
                let mut page = bt.pager.read_page(npage)?;
                dbheader::write_into(&mut page.data, DEFAULT_PAGE_SIZE as u16);
                bt.pager.write_page(&page)?;
                Ok(bt)
            }
            Err(e) => Err(e.into()),
            Ok(header) => {
                let pagesize =
                    dbheader::validate(&header).map_err(|_| Error::CorruptHeader)?;
                debug!("Page size is {}", pagesize);
                pager.set_page_size(pagesize as usize)?;
                Ok(BTree { pager })
            }
        }
    }

    /// Flushes and closes the underlying file.
    pub fn close(self) -> Result<(), Error> {
        self.pager.close()?;
        Ok(())
    }

    /// Loads the node stored on `npage`. The returned node owns the page;
    /// dropping it releases the page.
    pub fn load_node(&mut self, npage: PageNo) -> Result<Node, Error> {
        let page = self.pager.read_page(npage).map_err(|e| {
            error!("Could not read page {}", npage);
            e
        })?;
        Node::parse(page)
    }

    /// Writes a node's header into its page and the page to the file.
    pub fn write_node(&mut self, node: &mut Node) -> Result<(), Error> {
        node.store_header();
        self.pager.write_page(node.page())?;
        Ok(())
    }

    /// Allocates a fresh page and initializes it as an empty node of
    /// `kind`. Returns the new page number.
    pub fn new_node(&mut self, kind: PageType) -> Result<PageNo, Error> {
        let npage = self.pager.allocate_page();
        self.init_empty_node(npage, kind)?;
        Ok(npage)
    }

    /// Reinitializes an already-allocated page as an empty node of `kind`
    /// and writes it out. On page 1 the database file header bytes are
    /// preserved.
    pub fn init_empty_node(&mut self, npage: PageNo, kind: PageType) -> Result<(), Error> {
        let page = self.pager.read_page(npage)?;
        let page_size = self.pager.page_size();
        let mut node = Node::new_empty(page, kind, page_size);
        self.write_node(&mut node)
    }

    /// Finds the payload stored under `key` in the tree rooted at `nroot`.
    ///
    /// Table trees return the entry's data; index trees return the entry's
    /// primary key packed big-endian. On an index internal node an exact
    /// key match short-circuits without descending further.
    pub fn find(&mut self, nroot: PageNo, key: Key) -> Result<Vec<u8>, Error> {
        let mut npage = nroot;
        loop {
            let node = self.load_node(npage)?;
            if node.kind.is_leaf() {
                for ncell in 0..node.n_cells {
                    let cell = node.cell(ncell)?;
                    if key < cell.key() {
                        return Err(Error::NotFound);
                    }
                    if key == cell.key() {
                        return Ok(match cell {
                            Cell::TableLeaf { data, .. } => data,
                            Cell::IndexLeaf { key_pk, .. } => key_pk.to_be_bytes().to_vec(),
                            _ => return Err(Error::CellNo),
                        });
                    }
                }
                return Err(Error::NotFound);
            }

            let mut matched = None;
            for ncell in 0..node.n_cells {
                let cell = node.cell(ncell)?;
                if key <= cell.key() {
                    matched = Some(cell);
                    break;
                }
            }
            npage = match matched {
                // Key is greater than every cell: follow the right-most
                // child.
                None => node.child_for(node.n_cells)?,
                Some(cell) => {
                    if node.kind == PageType::IndexInternal && key == cell.key() {
                        let (_, _, key_pk) =
                            cell.as_index_internal().ok_or(Error::CellNo)?;
                        return Ok(key_pk.to_be_bytes().to_vec());
                    }
                    cell.child_page().ok_or(Error::CellNo)?
                }
            };
        }
    }

    /// Inserts a table entry: `key` with an opaque payload.
    pub fn insert_in_table(
        &mut self,
        nroot: PageNo,
        key: Key,
        data: &[u8],
    ) -> Result<(), Error> {
        self.insert(
            nroot,
            Cell::TableLeaf {
                key,
                data: data.to_vec(),
            },
        )
    }

    /// Inserts an index entry mapping `key_idx` to the primary key
    /// `key_pk`.
    pub fn insert_in_index(
        &mut self,
        nroot: PageNo,
        key_idx: Key,
        key_pk: Key,
    ) -> Result<(), Error> {
        self.insert(
            nroot,
            Cell::IndexLeaf {
                key: key_idx,
                key_pk,
            },
        )
    }

    /// Inserts a cell into the tree rooted at `nroot`.
    ///
    /// A full root is split first (the root split reuses the root's page
    /// as the new top so the root page number never changes), then the
    /// cell goes down the preemptive-split descent.
    pub fn insert(&mut self, nroot: PageNo, cell: Cell) -> Result<(), Error> {
        let root = self.load_node(nroot)?;
        let root_full = !root.fits(&cell);
        drop(root);
        if root_full {
            self.split(None, nroot, 0)?;
        }
        self.insert_nonfull(nroot, &cell)
    }

    /// Inserts `cell` under a node known to have room for it.
    ///
    /// At a leaf the cell lands at its key position. At an internal node
    /// the capacity of the chosen child is re-checked before descending;
    /// a full child is split and the same node is retried, since the
    /// split shifts cell positions.
    fn insert_nonfull(&mut self, npage: PageNo, cell: &Cell) -> Result<(), Error> {
        let mut node = self.load_node(npage)?;

        let mut ncell = node.n_cells;
        let mut matched = None;
        for i in 0..node.n_cells {
            let c = node.cell(i)?;
            if cell.key() <= c.key() {
                if cell.key() == c.key() && node.kind.is_leaf() {
                    return Err(Error::Duplicate);
                }
                ncell = i;
                matched = Some(c);
                break;
            }
        }

        if node.kind.is_leaf() {
            node.insert_cell(ncell, cell)?;
            return self.write_node(&mut node);
        }

        let child_page = match &matched {
            None => node.child_for(node.n_cells)?,
            Some(c) => c.child_page().ok_or(Error::CellNo)?,
        };
        drop(node);

        let child = self.load_node(child_page)?;
        let child_full = !child.fits(cell);
        drop(child);

        if child_full {
            self.split(Some(npage), child_page, ncell)?;
            self.insert_nonfull(npage, cell)
        } else {
            self.insert_nonfull(child_page, cell)
        }
    }

    /// Splits the node on `npage_child` around its median cell.
    ///
    /// The lower half moves to a freshly allocated page (table leaves keep
    /// the median as well); the upper half lands on the child's own page,
    /// or on another fresh page when the child is the root (`parent` is
    /// `None`), in which case the root page is rebuilt as an internal node
    /// of the tree's family. The median is promoted into the parent at
    /// `parent_ncell`, pointing at the lower half.
    ///
    /// Returns the page number of the lower half.
    fn split(
        &mut self,
        parent: Option<PageNo>,
        npage_child: PageNo,
        parent_ncell: u16,
    ) -> Result<PageNo, Error> {
        let child = self.load_node(npage_child)?;

        let npage_lower = self.new_node(child.kind)?;
        let mut lower = self.load_node(npage_lower)?;

        let median_ncell = child.n_cells / 2;
        // Table leaves keep their median in the lower half; every other
        // kind promotes it out of both halves.
        let moved = if child.kind == PageType::TableLeaf {
            median_ncell + 1
        } else {
            median_ncell
        };
        for i in 0..moved {
            lower.insert_cell(i, &child.cell(i)?)?;
        }

        let median = child.cell(median_ncell)?;
        if lower.kind.is_internal() {
            lower.right_page = median.child_page();
        }

        // The upper half reuses the child's page, except for a root split
        // where that page must become the new top.
        let npage_upper = match parent {
            None => self.new_node(child.kind)?,
            Some(_) => {
                self.init_empty_node(npage_child, child.kind)?;
                npage_child
            }
        };
        let mut upper = self.load_node(npage_upper)?;
        let mut j = 0;
        for i in median_ncell + 1..child.n_cells {
            upper.insert_cell(j, &child.cell(i)?)?;
            j += 1;
        }
        if upper.kind.is_internal() {
            upper.right_page = child.right_page;
        }

        let promoted = match &median {
            Cell::IndexInternal { key, key_pk, .. } => Cell::IndexInternal {
                child_page: npage_lower,
                key: *key,
                key_pk: *key_pk,
            },
            Cell::TableInternal { key, .. } => Cell::TableInternal {
                child_page: npage_lower,
                key: *key,
            },
            Cell::IndexLeaf { key, key_pk } => Cell::IndexInternal {
                child_page: npage_lower,
                key: *key,
                key_pk: *key_pk,
            },
            Cell::TableLeaf { key, .. } => Cell::TableInternal {
                child_page: npage_lower,
                key: *key,
            },
        };
        drop(child);

        let mut parent_node = match parent {
            None => {
                let kind = if lower.kind.is_index() {
                    PageType::IndexInternal
                } else {
                    PageType::TableInternal
                };
                self.init_empty_node(npage_child, kind)?;
                self.load_node(npage_child)?
            }
            Some(npage_parent) => self.load_node(npage_parent)?,
        };
        parent_node.insert_cell(parent_ncell, &promoted)?;
        if parent.is_none() {
            parent_node.right_page = Some(npage_upper);
        }

        self.write_node(&mut parent_node)?;
        self.write_node(&mut upper)?;
        self.write_node(&mut lower)?;
        Ok(npage_lower)
    }
}
