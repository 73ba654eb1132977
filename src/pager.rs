//! pager manages page-sized frames of a single database file.
//!
//! The file is an array of fixed-size pages numbered from 1. The pager
//! owns the file handle; callers own the page buffers they read. A page
//! handle is released by dropping it. All reads and writes go straight to
//! the file: the pager keeps no dirty state of its own.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The page number is not valid for this file.")]
    PageNo,
    #[error("The file does not contain a database header.")]
    NoHeader,
    #[error("Error accessing the database file.")]
    Io(#[from] std::io::Error),
}

/// Page numbers are 1-based, and are stored on disk as 4-byte integers.
pub type PageNo = u32;

/// One page of the file, owned by whoever read it.
#[derive(Debug)]
pub struct MemPage {
    pub npage: PageNo,
    pub data: Vec<u8>,
}

/// A pager manages page I/O for one open database file.
pub struct Pager {
    file: std::fs::File,
    page_size: usize,
    n_pages: PageNo,
}

impl Pager {
    /// Opens the database file, creating it if it does not exist.
    ///
    /// The page size is unknown until [`Pager::set_page_size`] is called;
    /// only [`Pager::read_header`] is usable before then.
    pub fn open(path: &str) -> Result<Pager, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Pager {
            file,
            page_size: 0,
            n_pages: 0,
        })
    }

    /// Reads the first 100 bytes of the file.
    ///
    /// Returns `NoHeader` for a file too short to hold one, which is how a
    /// freshly created database presents itself.
    pub fn read_header(&mut self) -> Result<[u8; crate::dbheader::DB_HEADER_SIZE], Error> {
        let len = self.file.metadata()?.len();
        if len < crate::dbheader::DB_HEADER_SIZE as u64 {
            return Err(Error::NoHeader);
        }
        let mut header = [0_u8; crate::dbheader::DB_HEADER_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut header)?;
        Ok(header)
    }

    /// Fixes the page size and derives the number of allocated pages from
    /// the current file length. Must precede any page I/O.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), Error> {
        let len = self.file.metadata()?.len() as usize;
        self.page_size = page_size;
        self.n_pages = (len / page_size) as PageNo
            + if len % page_size != 0 { 1 } else { 0 };
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn n_pages(&self) -> PageNo {
        self.n_pages
    }

    /// Reads a page into an owned buffer.
    ///
    /// Pages that have been allocated but never written read back as
    /// zeroes, as does the tail of a page that extends past the end of the
    /// file.
    pub fn read_page(&mut self, npage: PageNo) -> Result<MemPage, Error> {
        if npage == 0 || npage > self.n_pages {
            return Err(Error::PageNo);
        }
        let mut data = vec![0_u8; self.page_size];
        let start = (npage as u64 - 1) * self.page_size as u64;
        let len = self.file.metadata()?.len();
        if start < len {
            let available = std::cmp::min(len - start, self.page_size as u64) as usize;
            self.file.seek(SeekFrom::Start(start))?;
            self.file.read_exact(&mut data[..available])?;
        }
        Ok(MemPage { npage, data })
    }

    /// Writes a page back to the file, extending the file if needed.
    pub fn write_page(&mut self, page: &MemPage) -> Result<(), Error> {
        if page.npage == 0 || page.npage > self.n_pages {
            return Err(Error::PageNo);
        }
        let start = (page.npage as u64 - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(&page.data)?;
        Ok(())
    }

    /// Extends the file by one page and returns the new page number.
    ///
    /// The page exists on disk only once it is written.
    pub fn allocate_page(&mut self) -> PageNo {
        self.n_pages += 1;
        self.n_pages
    }

    /// Flushes and closes the file.
    pub fn close(self) -> Result<(), Error> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_pager(page_size: usize) -> (tempfile::TempDir, Pager) {
        let dir = tempfile::tempdir().expect("Should have created temp dir.");
        let path = dir.path().join("pager.db");
        let mut pager = Pager::open(path.to_str().unwrap()).expect("Should have opened file.");
        pager.set_page_size(page_size).unwrap();
        (dir, pager)
    }

    #[test]
    fn test_header_of_empty_file_is_missing() {
        let (_dir, mut pager) = scratch_pager(512);
        assert!(matches!(pager.read_header(), Err(Error::NoHeader)));
    }

    #[test]
    fn test_allocate_write_read_round_trip() {
        let (_dir, mut pager) = scratch_pager(512);
        let n1 = pager.allocate_page();
        let n2 = pager.allocate_page();
        assert_eq!((n1, n2), (1, 2));

        let mut page = pager.read_page(2).expect("Should have read fresh page.");
        assert!(page.data.iter().all(|b| *b == 0));
        page.data[0] = 0xab;
        page.data[511] = 0xcd;
        pager.write_page(&page).expect("Should have written page.");

        let back = pager.read_page(2).expect("Should have re-read page.");
        assert_eq!(back.data[0], 0xab);
        assert_eq!(back.data[511], 0xcd);
    }

    #[test]
    fn test_read_of_unallocated_page_fails() {
        let (_dir, mut pager) = scratch_pager(512);
        assert!(matches!(pager.read_page(0), Err(Error::PageNo)));
        assert!(matches!(pager.read_page(1), Err(Error::PageNo)));
        pager.allocate_page();
        assert!(pager.read_page(1).is_ok());
        assert!(matches!(pager.read_page(2), Err(Error::PageNo)));
    }

    #[test]
    fn test_reopen_derives_page_count_from_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pager.db");
        {
            let mut pager = Pager::open(path.to_str().unwrap()).unwrap();
            pager.set_page_size(512).unwrap();
            for _ in 0..3 {
                let n = pager.allocate_page();
                let page = pager.read_page(n).unwrap();
                pager.write_page(&page).unwrap();
            }
            pager.close().unwrap();
        }
        let mut pager = Pager::open(path.to_str().unwrap()).unwrap();
        pager.set_page_size(512).unwrap();
        assert_eq!(pager.n_pages(), 3);
    }
}
