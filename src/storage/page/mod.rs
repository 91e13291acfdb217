//! Page types and layouts.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`DirectoryPage`] - Extendible-hash directory, parsed/serialized
//! - [`BucketRef`] / [`BucketMut`] - Extendible-hash bucket views
//! - [`TablePageRef`] / [`TablePageMut`] - Slotted heap page views
//! - [`Storable`] / [`HashKey`] - Fixed-width entry codecs

mod bucket_page;
mod codec;
mod directory_page;
#[allow(clippy::module_inception)]
mod page;
mod table_page;

pub use bucket_page::{bucket_capacity, BucketMut, BucketRef};
pub use codec::{HashKey, Storable};
pub use directory_page::{DirectoryPage, DIR_ARRAY_SIZE, MAX_DEPTH};
pub use page::Page;
pub use table_page::{TablePageMut, TablePageRef, MAX_TUPLE_LEN};
