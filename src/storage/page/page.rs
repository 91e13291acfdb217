//! Page - the raw unit the buffer pool moves between disk and memory.
//!
//! A [`Page`] carries no structure of its own. Every on-disk format in
//! the engine — the hash directory, hash buckets, table-heap pages — is
//! a typed view that parses and serializes itself over these bytes, so
//! the page type stays a plain aligned byte box with nothing to get out
//! of sync.

use crate::common::config::PAGE_SIZE;

/// One page image: `PAGE_SIZE` bytes, page-aligned for direct I/O.
///
/// The buffer pool owns all long-lived pages (one per frame, behind the
/// frame's page latch); short-lived ones exist only as I/O staging in
/// the disk manager. Typed access goes through the view constructors,
/// e.g. `DirectoryPage::parse(page.bytes())` or
/// `TablePageMut::new(page.bytes_mut())`.
///
/// `Page` is deliberately not `Clone`: a 4KB copy should be a visible
/// disk-manager read, not an accidental `.clone()`.
#[repr(align(4096))]
pub struct Page {
    bytes: [u8; PAGE_SIZE],
}

impl Page {
    /// A zeroed page. All-zero bytes are a valid empty hash bucket but
    /// *not* a valid table page; formats that need initialization get it
    /// from their own views.
    #[inline]
    pub fn new() -> Self {
        Self {
            bytes: [0u8; PAGE_SIZE],
        }
    }

    /// The page image, for parsing a typed view or writing to disk.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The page image, for serializing a typed view or reading from disk.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Zero the image. The pool does this when a frame is recycled so a
    /// freshly allocated page never leaks its predecessor's bytes.
    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
