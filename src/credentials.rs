//! Holds the single API credential used to authenticate generation calls.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use log::{debug, warn};

use crate::error::{Result, StudyError};

/// Name of the durable storage entry holding the credential.
pub const STORAGE_KEY: &str = "biomaster_gemini_key";

const PLACEHOLDER_MARKER: &str = "YOUR_API_KEY";

/// Durable key-value storage for the credential entry.
pub trait CredentialStorage: Send + Sync {
    fn load(&self) -> io::Result<Option<String>>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn remove(&self) -> io::Result<()>;
}

/// Keeps the credential in a single file.
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    path: PathBuf,
}

impl FileCredentialStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStorage for FileCredentialStorage {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim().to_string()).filter(|t| !t.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        std::fs::write(&self.path, token)
    }

    fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStorage {
    entry: Mutex<Option<String>>,
}

impl CredentialStorage for MemoryCredentialStorage {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.entry.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Treats blank values, the literal `undefined`, and unreplaced template
/// placeholders as "no credential".
fn sanitize(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() || value == "undefined" || value.contains(PLACEHOLDER_MARKER) {
        return None;
    }
    Some(value.to_string())
}

/// The in-memory credential plus its durable backing.
///
/// The in-memory token is authoritative: storage failures are logged and
/// otherwise ignored.
pub struct CredentialStore {
    token: RwLock<Option<String>>,
    storage: Box<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Seeds the token from `initial` (usually the `API_KEY` variable), falling
    /// back to whatever `storage` holds.
    pub fn initialize(initial: Option<String>, storage: Box<dyn CredentialStorage>) -> Self {
        let token = match sanitize(initial) {
            Some(token) => {
                debug!("Credential seeded from the environment");
                Some(token)
            }
            None => match storage.load() {
                Ok(stored) => sanitize(stored),
                Err(e) => {
                    warn!("Failed to read stored credential: {}", e);
                    None
                }
            },
        };

        Self {
            token: RwLock::new(token),
            storage,
        }
    }

    /// A store with no seed and throwaway storage.
    pub fn in_memory() -> Self {
        Self::initialize(None, Box::new(MemoryCredentialStorage::default()))
    }

    pub fn has_credential(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    pub fn set_credential(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(StudyError::InvalidInput(
                "API key must not be empty".to_string(),
            ));
        }

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());

        if let Err(e) = self.storage.save(token) {
            warn!("Failed to save API key to storage: {}", e);
        }
        Ok(())
    }

    pub fn clear_credential(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;

        if let Err(e) = self.storage.remove() {
            warn!("Failed to remove API key from storage: {}", e);
        }
    }

    /// The current token, or [`StudyError::MissingCredential`].
    pub(crate) fn require(&self) -> Result<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(StudyError::MissingCredential)
    }
}
