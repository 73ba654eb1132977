//! A didactic single-file storage engine: one database file holds a forest
//! of B-trees (one per table, one per index) addressed by root page
//! number, with ordered traversal through a path-tracking cursor.
//!
//! The layers, bottom up:
//! * `codec` - fixed- and variable-width integer encodings of the file
//!   format, and the location of the node header within a page.
//! * `dbheader` - the 100-byte database file header on page 1.
//! * `pager` - page-sized frames of the file; all I/O goes through it.
//! * `btree` - node layout, point lookup, and insertion with preemptive
//!   node splitting.
//! * `cursor` - ordered traversal: rewind/next/prev and the seek family.
//!
//! There is no SQL layer, no concurrency between processes, no write-ahead
//! log, and no deletion. Payloads are opaque byte strings.

pub mod btree;
pub mod codec;
pub mod cursor;
pub mod dbheader;
pub mod pager;

/// Page size used when initializing a fresh database file.
pub const DEFAULT_PAGE_SIZE: usize = 1024;
