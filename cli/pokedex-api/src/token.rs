//! Persistence of the session token.
//!
//! The token is the only piece of state shared between the HTTP client and
//! the auth store. The auth store is the only writer; the client only reads
//! it when attaching credentials to a request.

use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use enum_dispatch::enum_dispatch;
use fslock::LockFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Key the token is stored under.
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const CLIENT_STATE_FILENAME: &str = "client_state.json";

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("couldn't acquire client state file lock")]
    AcquireLock(#[source] fslock::Error),
    #[error("couldn't read client state file")]
    ReadFile(#[source] std::io::Error),
    #[error("couldn't parse client state file")]
    Parse(#[source] serde_json::Error),
    #[error("couldn't create data directory")]
    CreateDir(#[source] std::io::Error),
    #[error("client state file stored in an invalid location: {0}")]
    InvalidLocation(PathBuf),
    #[error("failed to open temporary file")]
    OpenTmpFile(#[source] std::io::Error),
    #[error("failed to write temporary file")]
    WriteTmpFile(#[source] serde_json::Error),
    #[error("failed to rename temporary file")]
    RenameTmpFile(#[source] tempfile::PersistError),
}

#[enum_dispatch]
pub trait TokenStorage {
    /// The stored token, if any.
    fn read(&self) -> Result<Option<String>, TokenStoreError>;

    /// Replace the stored token.
    fn write(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Remove the stored token. Removing an absent token is not an error.
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Either a token persisted on disk or one held in memory for tests.
#[derive(Debug)]
#[enum_dispatch(TokenStorage)]
pub enum TokenStore {
    File(FileTokenStore),
    Memory(MemoryTokenStore),
}

impl TokenStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        TokenStore::File(FileTokenStore::new(path))
    }

    pub fn memory(token: Option<&str>) -> Self {
        TokenStore::Memory(MemoryTokenStore::new(token))
    }
}

// ---------------------------------------------------------------------------
// File backed store
// ---------------------------------------------------------------------------

/// Contents of the client state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Stores the token in a JSON file that survives restarts.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The lock is a separate file because the state file is replaced on write.
    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn acquire_lock(&self) -> Result<LockFile, TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(TokenStoreError::CreateDir)?;
        }
        let lock_path = self.lock_path();
        let mut lock = LockFile::open(lock_path.as_os_str()).map_err(TokenStoreError::AcquireLock)?;
        lock.lock().map_err(TokenStoreError::AcquireLock)?;
        Ok(lock)
    }

    /// Returns the parsed state file or `None` if it doesn't yet exist.
    fn read_state(&self) -> Result<Option<ClientState>, TokenStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "client state file not found");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(TokenStoreError::ReadFile)?;
        let parsed = serde_json::from_str(&contents).map_err(TokenStoreError::Parse)?;
        Ok(Some(parsed))
    }

    /// Modify the state file while holding the lock.
    ///
    /// A file that can't be parsed is replaced rather than reported,
    /// otherwise it could never be repaired.
    fn update(&self, f: impl FnOnce(&mut ClientState)) -> Result<(), TokenStoreError> {
        let lock = self.acquire_lock()?;
        let mut state = match self.read_state() {
            Ok(state) => state.unwrap_or_default(),
            Err(TokenStoreError::Parse(err)) => {
                warn!(path = %self.path.display(), %err, "replacing unparseable client state file");
                ClientState::default()
            },
            Err(err) => return Err(err),
        };
        f(&mut state);
        write_atomically(&state, &self.path, lock)
    }
}

impl TokenStorage for FileTokenStore {
    fn read(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.read_state()?.and_then(|state| state.auth_token))
    }

    fn write(&self, token: &str) -> Result<(), TokenStoreError> {
        debug!(path = %self.path.display(), "persisting session token");
        self.update(|state| state.auth_token = Some(token.to_string()))
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        debug!(path = %self.path.display(), "removing session token");
        self.update(|state| state.auth_token = None)
    }
}

/// Serialize the state and write it to disk atomically.
///
/// The value is written to a temporary file next to `path` which is then
/// renamed over `path`. Taking the [LockFile] ensures the write only happens
/// while the lock is held.
fn write_atomically(
    state: &ClientState,
    path: &Path,
    _lock: LockFile,
) -> Result<(), TokenStoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| TokenStoreError::InvalidLocation(path.to_path_buf()))?;
    let temp_file = tempfile::NamedTempFile::new_in(parent).map_err(TokenStoreError::OpenTmpFile)?;

    let writer = BufWriter::new(&temp_file);
    serde_json::to_writer_pretty(writer, state).map_err(TokenStoreError::WriteTmpFile)?;
    temp_file
        .persist(path)
        .map_err(TokenStoreError::RenameTmpFile)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
        }
    }
}

impl TokenStorage for MemoryTokenStore {
    fn read(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.token.lock().expect("token mutex poisoned").clone())
    }

    fn write(&self, token: &str) -> Result<(), TokenStoreError> {
        *self.token.lock().expect("token mutex poisoned") = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        self.token.lock().expect("token mutex poisoned").take();
        Ok(())
    }
}
