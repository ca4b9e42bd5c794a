pub mod collections;
pub mod cursor;
pub mod domain;
pub mod error;
pub mod store;
pub mod sweeper;

use std::path::Path;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};

use domain::*;
use error::{Error, Result};
use store::DocumentStore;

pub use sweeper::{SweepOptions, SweepProgress, Sweeper, DEFAULT_BATCH_SIZE};

const BATCH_SIZE_KEY: &str = "sweep.batch_size";
const STRATEGY_KEY: &str = "sweep.strategy";
const LAST_SWEEP_AT_KEY: &str = "last_sweep.at";
const LAST_SWEEP_SCANNED_KEY: &str = "last_sweep.scanned";
const LAST_SWEEP_DELETED_KEY: &str = "last_sweep.deleted";

/// Per-invocation settings that take precedence over the store's config table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOverrides {
    pub batch_size: Option<usize>,
    pub strategy: Option<MembershipStrategy>,
    pub dry_run: bool,
}

/// The main entry point: a document store plus its sweep settings.
pub struct Library {
    store: DocumentStore,
}

impl Library {
    /// Open or create a library at the given store path.
    pub fn open(store_path: &Path) -> Result<Self> {
        let store = DocumentStore::open(store_path)?;
        Ok(Self { store })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open_in_memory()?,
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Resolve sweep options: overrides first, then stored config, then defaults.
    pub fn sweep_options(&self, overrides: &SweepOverrides) -> Result<SweepOptions> {
        let batch_size = match overrides.batch_size {
            Some(n) => n,
            None => self.batch_size()?,
        };
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize(batch_size));
        }
        let strategy = match overrides.strategy {
            Some(s) => s,
            None => self.strategy()?,
        };
        Ok(SweepOptions {
            batch_size,
            strategy,
            dry_run: overrides.dry_run,
        })
    }

    /// Run one sweep pass over the store's images and albums.
    /// Records the outcome as the last sweep unless it was a dry run or cancelled.
    pub fn sweep(
        &self,
        overrides: &SweepOverrides,
        cancel: Option<&AtomicBool>,
        progress_cb: Option<&mut dyn FnMut(SweepProgress)>,
    ) -> Result<SweepReport> {
        let options = self.sweep_options(overrides)?;
        let images = self.store.images();
        let albums = self.store.albums();

        let mut sweeper = Sweeper::new(&images, &albums, options);
        if let Some(flag) = cancel {
            sweeper = sweeper.with_cancel(flag);
        }
        let report = sweeper.run_once(progress_cb)?;

        if !report.dry_run && !report.cancelled {
            self.record_last_sweep(&report)?;
        }
        Ok(report)
    }

    /// Get store summary statistics.
    pub fn status(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    pub fn last_sweep(&self) -> Result<Option<LastSweep>> {
        let Some(at) = self.store.get_config(LAST_SWEEP_AT_KEY)? else {
            return Ok(None);
        };
        let at = DateTime::parse_from_rfc3339(&at)
            .map_err(|_| Error::InvalidConfig {
                key: LAST_SWEEP_AT_KEY.to_string(),
                value: at.clone(),
            })?
            .with_timezone(&Utc);
        Ok(Some(LastSweep {
            at,
            scanned: self.config_usize(LAST_SWEEP_SCANNED_KEY)?.unwrap_or(0),
            deleted: self.config_usize(LAST_SWEEP_DELETED_KEY)?.unwrap_or(0),
        }))
    }

    /// Configured cursor batch size, or the default.
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self
            .config_usize(BATCH_SIZE_KEY)?
            .unwrap_or(DEFAULT_BATCH_SIZE))
    }

    pub fn set_batch_size(&self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize(batch_size));
        }
        self.store
            .set_config(BATCH_SIZE_KEY, &batch_size.to_string())
    }

    /// Configured membership strategy, or the default.
    pub fn strategy(&self) -> Result<MembershipStrategy> {
        match self.store.get_config(STRATEGY_KEY)? {
            Some(s) => s.parse(),
            None => Ok(MembershipStrategy::default()),
        }
    }

    pub fn set_strategy(&self, strategy: MembershipStrategy) -> Result<()> {
        self.store.set_config(STRATEGY_KEY, strategy.as_str())
    }

    fn record_last_sweep(&self, report: &SweepReport) -> Result<()> {
        self.store.set_configs(&[
            (LAST_SWEEP_AT_KEY, &report.finished_at.to_rfc3339()),
            (LAST_SWEEP_SCANNED_KEY, &report.scanned.to_string()),
            (LAST_SWEEP_DELETED_KEY, &report.deleted.to_string()),
        ])
    }

    fn config_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.store.get_config(key)? {
            Some(v) => v
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::InvalidConfig {
                    key: key.to_string(),
                    value: v,
                }),
            None => Ok(None),
        }
    }
}
