//! Blob lifecycle: opaque handles over the content-addressed store.
//!
//! A [`BlobRef`] is what jobs and clients hold. Each handle records its
//! owner, the content it points at (once uploaded) and the single job it is
//! attached to. Content is deleted once no handle references it.

mod manager;
mod refs;
#[cfg(feature = "sea-orm")]
mod sea_orm_refs;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::{ContentHash, StorageError};

pub use manager::{BlobManager, UploadHandle};
pub use refs::{BlobRefStore, MemoryBlobRefStore};
#[cfg(feature = "sea-orm")]
pub use sea_orm_refs::SeaOrmBlobRefStore;

/// Opaque, unguessable handle to a stored image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
#[schema(value_type = String, format = Uuid)]
pub struct BlobRef(Uuid);

impl BlobRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for BlobRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BlobRef {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Index entry behind a [`BlobRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRefRecord {
    pub id: BlobRef,
    pub owner_id: String,
    /// `None` until bytes have been uploaded to the handle.
    pub content_hash: Option<ContentHash>,
    pub content_type: Option<String>,
    pub size: i64,
    /// The job this blob belongs to. A blob is attached at most once.
    pub generation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl BlobRefRecord {
    /// An issued handle awaiting its upload.
    pub fn pending(owner_id: impl Into<String>) -> Self {
        Self {
            id: BlobRef::new(),
            owner_id: owner_id.into(),
            content_hash: None,
            content_type: None,
            size: 0,
            generation_id: None,
            created_at: crate::generation::now_micros(),
        }
    }
}

/// Raster image types accepted for uploads and served back unchanged.
const IMAGE_CONTENT_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// The normalised media type of `raw` if it is an accepted image type.
///
/// Parameters are ignored and matching is case-insensitive. Scriptable
/// formats such as `image/svg+xml` are not accepted.
pub fn image_content_type(raw: &str) -> Option<&'static str> {
    let essence = raw.split(';').next().unwrap_or_default().trim();
    IMAGE_CONTENT_TYPES
        .into_iter()
        .find(|accepted| accepted.eq_ignore_ascii_case(essence))
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(BlobRef),

    #[error("blob {0} belongs to another user")]
    NotOwner(BlobRef),

    #[error("blob {0} has no content yet")]
    NotUploaded(BlobRef),

    #[error("blob {0} was already uploaded")]
    AlreadyUploaded(BlobRef),

    #[error("blob {0} is already attached to a generation")]
    AlreadyAttached(BlobRef),

    #[error(
        "uploads must be PNG, JPEG, WebP or GIF images, got {}",
        .0.as_deref().unwrap_or("no content type")
    )]
    UnsupportedContentType(Option<String>),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("blob index error: {0}")]
    Index(String),
}
