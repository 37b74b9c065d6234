//! State file handling.
//!
//! Every command runs as one transaction on the state file: take the lock,
//! load, apply, save, release. The lock lives in a `<state>.lock` sidecar so
//! it survives the state file being replaced on save.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use log::debug;
use poolbook_core::{Ledger, LedgerBuilder, LedgerSnapshot};
use tempfile::NamedTempFile;

/// Exclusive advisory lock serializing every process using one state file.
pub struct StateLock {
    file: RwLock<File>,
}

impl StateLock {
    /// Open (or create) the lock file belonging to `state`.
    pub fn open(state: &Path) -> Result<Self> {
        let path = lock_path(state);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        Ok(Self {
            file: RwLock::new(file),
        })
    }

    /// Block until no other process holds the lock, then hold it until the
    /// guard is dropped.
    pub fn acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        debug!("waiting for the state lock");
        self.file.write().context("Failed to lock the state file")
    }
}

/// Path of the lock file guarding `state`
pub fn lock_path(state: &Path) -> PathBuf {
    let mut name = state.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Load the ledger saved at `path`, or an empty one if nothing is saved yet.
pub async fn load_ledger(path: &Path, builder: LedgerBuilder) -> Result<Ledger> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("no state at {}, starting empty", path.display());
        return Ok(builder.build()?);
    }

    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state from {}", path.display()))?;
    let snapshot = LedgerSnapshot::from_json(&json)
        .with_context(|| format!("Failed to parse state in {}", path.display()))?;
    let ledger = Ledger::restore(snapshot, builder)
        .with_context(|| format!("Refusing to load state from {}", path.display()))?;
    debug!("loaded {} markets from {}", ledger.market_count(), path.display());
    Ok(ledger)
}

/// Save the ledger to `path`, replacing the previous state in one rename.
pub async fn save_ledger(path: &Path, ledger: &Ledger) -> Result<()> {
    let json = ledger.snapshot().to_json()?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&target, json.as_bytes()))
        .await
        .context("State writer panicked")??;
    debug!("saved state to {}", path.display());
    Ok(())
}

/// Write `contents` to a fresh temp file beside `path` and rename it over `path`.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolbook_core::{FixedClock, MarketError, MarketId};
    use std::{
        io::ErrorKind,
        sync::{Arc, Barrier},
        thread,
    };

    const NOW: u64 = 1735689600;

    fn builder_at(now: u64) -> LedgerBuilder {
        Ledger::builder().with_clock(FixedClock::new(now))
    }

    /// Market 1 with alice and bob on opposite sides, resolved to alice's option.
    async fn resolved_state(state: &Path) {
        let ledger = load_ledger(state, builder_at(NOW)).await.unwrap();
        let id = ledger
            .create_market(
                "market-maker",
                "Will it rain?",
                vec!["Yes".to_string(), "No".to_string()],
                3600,
            )
            .unwrap();
        ledger.place_bet(id, "alice", 0, 100).unwrap();
        ledger.place_bet(id, "bob", 1, 100).unwrap();
        save_ledger(state, &ledger).await.unwrap();

        let ledger = load_ledger(state, builder_at(NOW + 3600)).await.unwrap();
        ledger.resolve_market(id, 0, "oracle").unwrap();
        save_ledger(state, &ledger).await.unwrap();
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("data/poolbook.json")),
            PathBuf::from("data/poolbook.json.lock")
        );
    }

    #[test]
    fn test_state_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let mut first = StateLock::open(&state).unwrap();
        let mut second = StateLock::open(&state).unwrap();

        let guard = first.acquire().unwrap();
        match second.file.try_write() {
            Ok(_) => panic!("second holder acquired a held lock"),
            Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
        }

        drop(guard);
        assert!(second.file.try_write().is_ok());
    }

    #[tokio::test]
    async fn test_claim_is_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        resolved_state(&state).await;

        let ledger = load_ledger(&state, builder_at(NOW + 3600)).await.unwrap();
        assert_eq!(ledger.claim_winnings(MarketId(1), "alice").unwrap(), 200);
        save_ledger(&state, &ledger).await.unwrap();

        let ledger = load_ledger(&state, builder_at(NOW + 7200)).await.unwrap();
        assert!(matches!(
            ledger.claim_winnings(MarketId(1), "alice"),
            Err(MarketError::NoWinningStake(_))
        ));
        assert_eq!(ledger.get_market(MarketId(1)).unwrap().paid_out, 200);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        resolved_state(&state).await;

        let ledger = load_ledger(&state, builder_at(NOW)).await.unwrap();
        save_ledger(&state, &ledger).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.json")]);
    }

    #[tokio::test]
    async fn test_missing_directory_fails_save() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("missing").join("state.json");
        let ledger = builder_at(NOW).build().unwrap();
        assert!(save_ledger(&state, &ledger).await.is_err());
        assert!(!state.exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        tokio::fs::write(&state, "{ not json").await.unwrap();
        assert!(load_ledger(&state, builder_at(NOW)).await.is_err());
    }

    #[test]
    fn test_concurrent_locked_claims_pay_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(resolved_state(&state));

        // Each thread runs the full command cycle with its own lock handle,
        // as separate processes would.
        let claimants = 8;
        let barrier = Arc::new(Barrier::new(claimants));
        let handles: Vec<_> = (0..claimants)
            .map(|_| {
                let state = state.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .unwrap();
                    let mut lock = StateLock::open(&state).unwrap();
                    barrier.wait();
                    let _guard = lock.acquire().unwrap();
                    runtime.block_on(async {
                        let ledger = load_ledger(&state, builder_at(NOW + 3600)).await.unwrap();
                        let claimed = ledger.claim_winnings(MarketId(1), "alice").ok();
                        save_ledger(&state, &ledger).await.unwrap();
                        claimed
                    })
                })
            })
            .collect();

        let payouts: Vec<u64> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(payouts, vec![200]);

        let ledger = runtime
            .block_on(load_ledger(&state, builder_at(NOW + 3600)))
            .unwrap();
        assert_eq!(ledger.get_market(MarketId(1)).unwrap().paid_out, 200);
    }
}
