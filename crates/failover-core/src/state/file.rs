// # Controller State Store
//
// JSON-file persistence for the controller state with atomic writes.
//
// ## Crash safety
//
// - Atomic writes: new state is written to `<path>.tmp`, then renamed over
//   the real file, so a reader never observes a partial write.
// - Corruption policy: an unparseable file is treated like a missing one and
//   the store returns the seeded default state. A controller that cannot
//   read its own history restarts the lifecycle from HEALTHY rather than
//   refusing to run.
//
// ## Daily counter rollover
//
// The daily failover cap is tracked as (count, day-of-year). Load compares
// the persisted day against today and zeroes the counter on mismatch, so a
// controller that slept across midnight starts the new day with a fresh
// budget.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::state::{ControllerState, StateSeed};

/// Thread-safe JSON-file store for the single [`ControllerState`] snapshot.
///
/// The mutex serialises `load` with `save`; there is exactly one snapshot,
/// so no per-record locking is needed.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    seed: StateSeed,
    lock: Mutex<()>,
}

impl StateStore {
    /// Create a store for the given path, creating parent directories if
    /// needed. The seed provides the identity fields of the default state
    /// returned when the file is missing or corrupt.
    pub async fn new(path: impl AsRef<Path>, seed: StateSeed) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_file(format!(
                        "failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            seed,
            lock: Mutex::new(()),
        })
    }

    /// Read the persisted state.
    ///
    /// Missing file and unparseable file both yield the seeded default
    /// HEALTHY state. On a successful read, the daily failover counter is
    /// reset if the persisted day-of-year is not today.
    pub async fn load(&self) -> Result<ControllerState> {
        let _guard = self.lock.lock().await;

        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file, starting with defaults");
                return Ok(ControllerState::default_from_seed(&self.seed));
            }
            Err(e) => {
                return Err(Error::state_file(format!(
                    "failed to read state file {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut state: ControllerState = match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(e) => {
                // Corrupt or legacy-format file. Start fresh rather than
                // refuse to run; the previous failover (if any) will be
                // re-detected from live health scores.
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file unparseable, starting with defaults"
                );
                return Ok(ControllerState::default_from_seed(&self.seed));
            }
        };

        let today = Utc::now().ordinal();
        if state.daily_failover_reset_day != today {
            tracing::info!(
                previous_day = state.daily_failover_reset_day,
                today,
                "day rolled over, resetting daily failover count"
            );
            state.daily_failover_count = 0;
            state.daily_failover_reset_day = today;
        }

        Ok(state)
    }

    /// Persist the state atomically (write to `<path>.tmp`, then rename).
    ///
    /// Stamps `updated_at` before writing.
    pub async fn save(&self, state: &mut ControllerState) -> Result<()> {
        let _guard = self.lock.lock().await;

        state.updated_at = Utc::now();

        let json = serde_json::to_string_pretty(state)?;

        let tmp_path = self.tmp_path();
        {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o644);

            let mut file = opts.open(&tmp_path).await.map_err(|e| {
                Error::state_file(format!(
                    "failed to create temp state file {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_file(format!(
                    "failed to write temp state file {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_file(format!(
                    "failed to flush temp state file {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            Error::state_file(format!(
                "failed to rename {} to {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %self.path.display(), "state persisted");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        tmp.set_extension("json.tmp");
        tmp
    }
}
