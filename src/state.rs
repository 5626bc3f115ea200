//! Durable resume state.
//!
//! Tracks the highest successfully appended UID per source mailbox and, for
//! mbox imports, the byte offset past the last appended message. The record
//! is shared across workers behind a mutex and persisted as indented JSON
//! readable only by the owner.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{FerryError, FerryResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateData {
    /// Highest UID successfully appended, per source mailbox.
    #[serde(default)]
    mail_max_uid: HashMap<String, u32>,
    /// Byte offset past the last appended message, keyed by
    /// `mbox:<abs-path>|dst:<mailbox>`.
    #[serde(default)]
    mbox_offsets: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct SyncState {
    inner: Mutex<StateData>,
}

/// Build the composite resume key for an mbox import.
pub fn mbox_state_key(path: &Path, dst_mailbox: &str) -> String {
    format!("mbox:{}|dst:{}", path.display(), dst_mailbox)
}

impl SyncState {
    /// Load state from `path`. A missing file or an empty path yields an
    /// initialized empty state; unknown JSON keys are ignored and missing
    /// keys default to empty maps.
    pub fn load(path: &Path) -> FerryResult<SyncState> {
        if path.as_os_str().is_empty() {
            return Ok(SyncState::default());
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncState::default())
            }
            Err(e) => {
                return Err(FerryError::State {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let data: StateData = serde_json::from_slice(&bytes)?;
        Ok(SyncState {
            inner: Mutex::new(data),
        })
    }

    /// Persist the state as indented JSON, mode 0600 on unix. A no-op when
    /// `path` is empty. Serialization happens under the mutex, so concurrent
    /// mutation still yields a consistent snapshot.
    pub fn save(&self, path: &Path) -> FerryResult<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        let guard = self.inner.lock().unwrap();
        let json = serde_json::to_vec_pretty(&*guard)?;
        drop(guard);

        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(path).map_err(|e| FerryError::State {
            path: path.to_path_buf(),
            source: e,
        })?;
        file.write_all(&json).map_err(|e| FerryError::State {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    pub fn max_uid(&self, mailbox: &str) -> u32 {
        let guard = self.inner.lock().unwrap();
        guard.mail_max_uid.get(mailbox).copied().unwrap_or(0)
    }

    /// Max-monotone: lowering the stored UID is a no-op.
    pub fn set_max_uid(&self, mailbox: &str, uid: u32) {
        let mut guard = self.inner.lock().unwrap();
        let entry = guard.mail_max_uid.entry(mailbox.to_string()).or_insert(0);
        if uid > *entry {
            *entry = uid;
        }
    }

    pub fn mbox_offset(&self, key: &str) -> u64 {
        let guard = self.inner.lock().unwrap();
        guard.mbox_offsets.get(key).copied().unwrap_or(0)
    }

    /// Overwrites; callers ensure monotonicity within a run.
    pub fn set_mbox_offset(&self, key: &str, offset: u64) {
        let mut guard = self.inner.lock().unwrap();
        guard.mbox_offsets.insert(key.to_string(), offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_uid_is_monotone() {
        let st = SyncState::default();
        assert_eq!(st.max_uid("INBOX"), 0);
        st.set_max_uid("INBOX", 10);
        st.set_max_uid("INBOX", 5);
        st.set_max_uid("INBOX", 15);
        assert_eq!(st.max_uid("INBOX"), 15);
    }

    #[test]
    fn mbox_offset_overwrites() {
        let st = SyncState::default();
        let key = mbox_state_key(Path::new("/tmp/a.mbox"), "Archive");
        assert_eq!(st.mbox_offset(&key), 0);
        st.set_mbox_offset(&key, 1024);
        st.set_mbox_offset(&key, 4096);
        assert_eq!(st.mbox_offset(&key), 4096);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let st = SyncState::default();
        st.set_max_uid("INBOX", 42);
        st.set_max_uid("Archive/2024", 7);
        st.set_mbox_offset("mbox:/x.mbox|dst:INBOX", 999);
        st.save(&path).unwrap();

        let loaded = SyncState::load(&path).unwrap();
        assert_eq!(loaded.max_uid("INBOX"), 42);
        assert_eq!(loaded.max_uid("Archive/2024"), 7);
        assert_eq!(loaded.mbox_offset("mbox:/x.mbox|dst:INBOX"), 999);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let st = SyncState::load(Path::new("/nonexistent/state.json")).unwrap();
        assert_eq!(st.max_uid("INBOX"), 0);
    }

    #[test]
    fn load_tolerates_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, br#"{"mail_max_uid":{"INBOX":3}}"#).unwrap();
        let st = SyncState::load(&path).unwrap();
        assert_eq!(st.max_uid("INBOX"), 3);
        assert_eq!(st.mbox_offset("anything"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let st = SyncState::default();
        st.save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn empty_path_is_noop() {
        let st = SyncState::load(Path::new("")).unwrap();
        st.set_max_uid("INBOX", 1);
        st.save(Path::new("")).unwrap();
    }
}
