use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use eco_store::{InMemoryLedgerStore, StoreSnapshot};
use eco_types::{SequenceClock, SequenceKey};

/// Exclusive hold on a state file. Released when dropped.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

/// Sidecar lock file next to the state file: `eco-state.json.lock`.
pub fn lock_path(state: &Path) -> PathBuf {
    let mut name = state
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("eco-state"));
    name.push(".lock");
    state.with_file_name(name)
}

/// Block until no other run holds the state at `path`. Hold the returned
/// guard from [`load_store`] until after [`save_store`].
pub fn lock_state(path: &Path) -> anyhow::Result<StateLock> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("opening state lock {}", lock_path.display()))?;
    FileExt::lock_exclusive(&file).with_context(|| format!("locking {}", lock_path.display()))?;
    tracing::debug!(path = %lock_path.display(), "state locked");
    Ok(StateLock { _file: file })
}

/// Load the store from `path`. A missing file is an empty ledger.
pub fn load_store(path: &Path, page_size: usize) -> anyhow::Result<InMemoryLedgerStore> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no state file, starting empty");
        return Ok(InMemoryLedgerStore::with_page_size(page_size));
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: StoreSnapshot =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), items = snapshot.items.len(), "loaded state");
    Ok(InMemoryLedgerStore::from_snapshot(snapshot, page_size))
}

/// Write the store to `path` through a temporary file in the same
/// directory, so a crash never leaves a half-written state file.
pub fn save_store(path: &Path, store: &InMemoryLedgerStore) -> anyhow::Result<()> {
    let snapshot = store.snapshot().context("snapshotting store")?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).with_context(|| format!("creating temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut file, &snapshot).context("encoding state")?;
    file.write_all(b"\n")?;
    file.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;

    tracing::debug!(path = %path.display(), items = snapshot.items.len(), "saved state");
    Ok(())
}

/// Fold every sequence key in the store into `clock`, so entries created by
/// this process sort after those written by earlier runs.
pub fn resume_clock(store: &InMemoryLedgerStore, clock: &SequenceClock) -> anyhow::Result<()> {
    let snapshot = store.snapshot().context("snapshotting store")?;
    for item in &snapshot.items {
        if let Ok(key) = SequenceKey::parse(&item.key.sort) {
            clock.observe(&key.anchor());
        }
    }
    Ok(())
}
