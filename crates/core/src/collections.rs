use std::collections::HashSet;

use crate::domain::{DeleteOutcome, DocKey, Document, ImageId};
use crate::error::Result;

/// Read/delete access to the images collection.
pub trait ImageCollection {
    /// Up to `limit` documents with a key strictly greater than `after`, in key order.
    fn fetch_batch(&self, after: Option<DocKey>, limit: usize) -> Result<Vec<Document>>;

    /// Delete the single image whose `id` field equals `id`.
    fn delete_by_id(&self, id: ImageId) -> Result<DeleteOutcome>;
}

/// Read-only access to the albums collection.
pub trait AlbumCollection {
    /// Whether at least one album lists `id` in its `images` array.
    fn references(&self, id: ImageId) -> Result<bool>;

    /// Every id referenced by any well-formed album.
    fn referenced_ids(&self) -> Result<HashSet<ImageId>>;

    /// Albums whose `images` field is missing or not an array.
    fn count_malformed(&self) -> Result<usize>;
}
