use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identity of an image, as referenced from album documents.
pub type ImageId = i64;

/// Store-assigned position of a document within its collection.
/// Keys only ever grow, so they double as a resumable cursor position.
pub type DocKey = i64;

/// A raw document as held by a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: DocKey,
    /// The `id` field as the store reads it, or `None` when missing or not an integer.
    /// Deletes and uniqueness are keyed on this same value.
    pub id: Option<ImageId>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: ImageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    #[serde(default)]
    pub images: Vec<ImageId>,
}

/// Result of a targeted delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing matched: the record was already removed by someone else.
    AlreadyGone,
}

/// How the sweeper decides whether an image is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MembershipStrategy {
    /// One existence query against the albums per image.
    #[default]
    PerImage,
    /// Load every referenced id once at pass start and test locally.
    Snapshot,
}

impl MembershipStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStrategy::PerImage => "per-image",
            MembershipStrategy::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for MembershipStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-image" | "per_image" | "perimage" => Ok(MembershipStrategy::PerImage),
            "snapshot" => Ok(MembershipStrategy::Snapshot),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub strategy: MembershipStrategy,
    pub batch_size: usize,
    pub dry_run: bool,
    /// Well-formed images evaluated.
    pub scanned: usize,
    pub retained: usize,
    /// Orphans removed (or, in a dry run, that would have been removed).
    pub deleted: usize,
    /// Orphans whose delete matched nothing.
    pub already_gone: usize,
    /// Ids of the orphans counted in `deleted` and `already_gone`, in visit order.
    pub orphan_ids: Vec<ImageId>,
    /// Store keys of image documents skipped for lacking a usable id.
    pub malformed_images: Vec<DocKey>,
    pub malformed_albums: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SweepReport {
    pub(crate) fn begin(strategy: MembershipStrategy, batch_size: usize, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            strategy,
            batch_size,
            dry_run,
            scanned: 0,
            retained: 0,
            deleted: 0,
            already_gone: 0,
            orphan_ids: Vec::new(),
            malformed_images: Vec::new(),
            malformed_albums: 0,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Summary counts for a document store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_images: usize,
    pub total_albums: usize,
    pub malformed_images: usize,
    pub malformed_albums: usize,
    /// Well-formed images no album currently references.
    pub orphan_images: usize,
}

/// What the last completed sweep recorded in the store's config table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSweep {
    pub at: DateTime<Utc>,
    pub scanned: usize,
    pub deleted: usize,
}
