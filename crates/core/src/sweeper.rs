use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::collections::{AlbumCollection, ImageCollection};
use crate::cursor::ImageCursor;
use crate::domain::*;
use crate::error::Result;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Callback for reporting sweep progress.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepProgress {
    Started {
        strategy: MembershipStrategy,
        batch_size: usize,
    },
    BatchFetched { size: usize },
    ImageChecked { id: ImageId, referenced: bool },
    ImageDeleted { id: ImageId },
    MalformedSkipped { key: DocKey },
    Finished { scanned: usize, deleted: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    pub batch_size: usize,
    pub strategy: MembershipStrategy,
    /// Evaluate and report orphans without deleting them.
    pub dry_run: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            strategy: MembershipStrategy::default(),
            dry_run: false,
        }
    }
}

/// Removes image documents that no album references.
///
/// One call to [`Sweeper::run_once`] is one pass: every image is read through
/// a batched cursor, tested for membership and, if unreferenced, deleted by id
/// before the next image is looked at. Albums are only ever read.
///
/// With [`MembershipStrategy::PerImage`] an image counts as orphaned against
/// the album state at the moment its own query runs. An album edited while the
/// pass is underway may or may not be seen; that window is accepted.
pub struct Sweeper<'a, I: ImageCollection + ?Sized, A: AlbumCollection + ?Sized> {
    images: &'a I,
    albums: &'a A,
    options: SweepOptions,
    cancel: Option<&'a AtomicBool>,
}

enum Membership<'a, A: AlbumCollection + ?Sized> {
    Live(&'a A),
    Snapshot(HashSet<ImageId>),
}

impl<A: AlbumCollection + ?Sized> Membership<'_, A> {
    fn contains(&self, id: ImageId) -> Result<bool> {
        match self {
            Membership::Live(albums) => albums.references(id),
            Membership::Snapshot(ids) => Ok(ids.contains(&id)),
        }
    }
}

impl<'a, I: ImageCollection + ?Sized, A: AlbumCollection + ?Sized> Sweeper<'a, I, A> {
    pub fn new(images: &'a I, albums: &'a A, options: SweepOptions) -> Self {
        Self {
            images,
            albums,
            options,
            cancel: None,
        }
    }

    /// Stop the pass before the next image once `flag` is set.
    /// A delete already issued always completes first.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Run one full pass. Store errors abort the pass immediately; orphans
    /// deleted before the failure stay deleted.
    pub fn run_once(
        &self,
        mut progress_cb: Option<&mut dyn FnMut(SweepProgress)>,
    ) -> Result<SweepReport> {
        let SweepOptions {
            batch_size,
            strategy,
            dry_run,
        } = self.options;

        let cursor = ImageCursor::open(self.images, batch_size)?;
        let mut report = SweepReport::begin(strategy, batch_size, dry_run);

        report.malformed_albums = self.albums.count_malformed()?;
        if report.malformed_albums > 0 {
            warn!(
                count = report.malformed_albums,
                "albums without a usable images list are ignored"
            );
        }

        let membership = match strategy {
            MembershipStrategy::PerImage => Membership::Live(self.albums),
            MembershipStrategy::Snapshot => Membership::Snapshot(self.albums.referenced_ids()?),
        };

        info!(%strategy, batch_size, dry_run, "sweep started");
        if let Some(ref mut cb) = progress_cb {
            cb(SweepProgress::Started {
                strategy,
                batch_size,
            });
        }

        'pass: for batch in cursor {
            let batch = batch?;
            if let Some(ref mut cb) = progress_cb {
                cb(SweepProgress::BatchFetched { size: batch.len() });
            }

            for doc in &batch {
                if self.is_cancelled() {
                    report.cancelled = true;
                    break 'pass;
                }

                let Some(id) = doc.id else {
                    warn!(key = doc.key, "skipping image document without an integer id");
                    report.malformed_images.push(doc.key);
                    if let Some(ref mut cb) = progress_cb {
                        cb(SweepProgress::MalformedSkipped { key: doc.key });
                    }
                    continue;
                };

                report.scanned += 1;
                let referenced = membership.contains(id)?;
                debug!(id = id, referenced, "checked image");
                if let Some(ref mut cb) = progress_cb {
                    cb(SweepProgress::ImageChecked {
                        id,
                        referenced,
                    });
                }

                if referenced {
                    report.retained += 1;
                    continue;
                }

                report.orphan_ids.push(id);
                if dry_run {
                    report.deleted += 1;
                    continue;
                }

                match self.images.delete_by_id(id)? {
                    DeleteOutcome::Deleted => {
                        report.deleted += 1;
                        info!(id = id, "deleted orphan image");
                        if let Some(ref mut cb) = progress_cb {
                            cb(SweepProgress::ImageDeleted { id });
                        }
                    }
                    DeleteOutcome::AlreadyGone => {
                        report.already_gone += 1;
                        debug!(id = id, "orphan image already removed");
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        if report.cancelled {
            info!(scanned = report.scanned, deleted = report.deleted, "sweep cancelled");
        } else {
            info!(
                scanned = report.scanned,
                retained = report.retained,
                deleted = report.deleted,
                already_gone = report.already_gone,
                malformed = report.malformed_images.len(),
                "sweep finished"
            );
        }
        if let Some(ref mut cb) = progress_cb {
            cb(SweepProgress::Finished {
                scanned: report.scanned,
                deleted: report.deleted,
            });
        }

        Ok(report)
    }
}
