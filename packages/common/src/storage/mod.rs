//! Content-addressed byte storage.
//!
//! Bytes are keyed by their SHA-256 digest, so identical sketches or results
//! share one object on disk. Handles and ownership live one layer up in
//! [`crate::blobs`].

mod error;
mod hash;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use filesystem::FilesystemBlobStore;
pub use hash::ContentHash;
pub use traits::BlobStore;
