//! Persistent settings store
//!
//! A directory-backed [`SettingsStore`] plus the boot-time recovery rule: a
//! store that is full or was written by another format version is erased
//! and opened again, exactly once.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::traits::SettingsStore;

/// Format version written into new stores
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Name of the version marker inside the store directory
const VERSION_FILE_NAME: &str = "format";

/// `ENOSPC` on Linux and the BSDs
const NO_SPACE_ERRNO: i32 = 28;

/// How the store came up at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreInit {
    /// Opened on the first try
    Ready,
    /// Opened after an erase
    Recovered,
}

/// Open the store, erasing and reopening it once if the first error is
/// recoverable
pub fn init_with_recovery(store: &dyn SettingsStore) -> Result<StoreInit, StoreError> {
    match store.init() {
        Ok(()) => Ok(StoreInit::Ready),
        Err(e) if e.is_recoverable() => {
            tracing::warn!("Settings store unusable ({}), erasing", e);
            store.erase()?;
            store.init()?;
            Ok(StoreInit::Recovered)
        }
        Err(e) => Err(e),
    }
}

/// Settings store kept in a directory with a format-version marker
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    /// Create a store rooted at `dir` (nothing touches the disk until `init`)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory backing the store
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn version_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE_NAME)
    }

    fn read_version(&self) -> Result<Option<String>, StoreError> {
        match fs::File::open(self.version_path()) {
            Ok(mut file) => {
                let mut raw = Vec::new();
                file.read_to_end(&mut raw).map_err(classify)?;
                // Undecodable markers fall through to Incompatible
                Ok(Some(String::from_utf8_lossy(&raw).trim().to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn write_version(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(classify)?;
        let mut file = fs::File::create(self.version_path()).map_err(classify)?;
        writeln!(file, "{}", STORE_FORMAT_VERSION).map_err(classify)?;
        file.sync_all().map_err(classify)?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn init(&self) -> Result<(), StoreError> {
        match self.read_version()? {
            None => {
                tracing::debug!("Creating settings store at {:?}", self.dir);
                self.write_version()
            }
            Some(found) if found.parse::<u32>().ok() == Some(STORE_FORMAT_VERSION) => Ok(()),
            Some(found) => Err(StoreError::Incompatible {
                found,
                expected: STORE_FORMAT_VERSION,
            }),
        }
    }

    fn erase(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}

fn classify(e: io::Error) -> StoreError {
    if e.raw_os_error() == Some(NO_SPACE_ERRNO) {
        StoreError::Exhausted
    } else {
        StoreError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_store() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings"));

        store.init().unwrap();
        assert!(store.path().join(VERSION_FILE_NAME).exists());
        // Second init sees a compatible store
        store.init().unwrap();
    }

    #[test]
    fn test_incompatible_version() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path());
        fs::write(dir.path().join(VERSION_FILE_NAME), "7\n").unwrap();

        match store.init() {
            Err(StoreError::Incompatible { found, expected }) => {
                assert_eq!(found, "7");
                assert_eq!(expected, STORE_FORMAT_VERSION);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_erase_nonexistent_store() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("never-created"));
        store.erase().unwrap();
    }

    #[test]
    fn test_recovery_erases_incompatible_store() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("settings");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(VERSION_FILE_NAME), "garbage").unwrap();
        fs::write(root.join("stale.bin"), b"old").unwrap();

        let store = FileSettingsStore::new(&root);
        assert_eq!(init_with_recovery(&store).unwrap(), StoreInit::Recovered);
        assert!(!root.join("stale.bin").exists());
        assert_eq!(init_with_recovery(&store).unwrap(), StoreInit::Ready);
    }

    #[test]
    fn test_recovery_erases_undecodable_marker() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("settings");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(VERSION_FILE_NAME), [0xff, 0xfe, 0x00, 0x9f]).unwrap();

        let store = FileSettingsStore::new(&root);
        assert!(matches!(
            store.init(),
            Err(StoreError::Incompatible { .. })
        ));
        assert_eq!(init_with_recovery(&store).unwrap(), StoreInit::Recovered);
        assert_eq!(
            fs::read_to_string(root.join(VERSION_FILE_NAME)).unwrap().trim(),
            STORE_FORMAT_VERSION.to_string()
        );
    }

    /// Store that keeps failing the same way, to check the retry is one-shot
    struct AlwaysFull {
        inits: AtomicU32,
        erases: AtomicU32,
    }

    impl SettingsStore for AlwaysFull {
        fn init(&self) -> Result<(), StoreError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Exhausted)
        }

        fn erase(&self) -> Result<(), StoreError> {
            self.erases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_recovery_is_attempted_once() {
        let store = AlwaysFull {
            inits: AtomicU32::new(0),
            erases: AtomicU32::new(0),
        };
        assert!(matches!(
            init_with_recovery(&store),
            Err(StoreError::Exhausted)
        ));
        assert_eq!(store.inits.load(Ordering::SeqCst), 2);
        assert_eq!(store.erases.load(Ordering::SeqCst), 1);
    }
}
