use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use tracing::{event, Level};

use super::AuthState;
use crate::auth::error::AuthorizationException;
use crate::auth::{AuthorizationResponse, RegistrationResponse, TokenResponse};
use crate::core::error::UsageError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("state could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Somewhere to keep the serialized session between runs.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, StoreError>;
    fn save(&self, json: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Keeps the session in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Written beside the target and renamed over it, so readers never see half a file.
    fn save(&self, json: &str) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    json: Mutex<Option<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.json.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, json: &str) -> Result<(), StoreError> {
        *self.json.lock().unwrap_or_else(PoisonError::into_inner) = Some(json.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.json.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Holds the current [`AuthState`] and writes every new snapshot through to a store.
///
/// Reads never block. Updates are applied with compare-and-swap, so two concurrent
/// updates are both folded in rather than one overwriting the other.
pub struct AuthStateManager<S: StateStore> {
    current: ArcSwap<AuthState>,
    store: S,
    persist: Mutex<()>,
}

impl<S: StateStore> AuthStateManager<S> {
    /// Reads the stored session. Missing or unreadable state starts a fresh session.
    pub fn load(store: S) -> Result<Self, StoreError> {
        let json = store.load()?;
        let state = AuthState::from_json_or_default(json.as_deref());
        Ok(Self {
            current: ArcSwap::from_pointee(state),
            store,
            persist: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<AuthState> {
        self.current.load_full()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn replace(&self, state: AuthState) -> Result<Arc<AuthState>, StoreError> {
        let state = Arc::new(state);
        self.current.store(state.clone());
        self.write_through()?;
        Ok(state)
    }

    pub fn update_after_authorization(
        &self,
        response: Option<AuthorizationResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Arc<AuthState>, StateError> {
        self.update(|state| state.update_authorization(response.clone(), ex.clone()))
    }

    pub fn update_after_token_response(
        &self,
        response: Option<TokenResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Arc<AuthState>, StateError> {
        self.update(|state| state.update_token(response.clone(), ex.clone()))
    }

    /// A failed registration leaves the session untouched.
    pub fn update_after_registration(
        &self,
        response: Option<RegistrationResponse>,
        ex: Option<AuthorizationException>,
    ) -> Result<Arc<AuthState>, StateError> {
        match (response, ex) {
            (Some(response), None) => self.update(|state| Ok(state.update_registration(response.clone()))),
            (None, Some(ex)) => {
                event!(Level::DEBUG, error = %ex, "registration failed, state unchanged");
                Ok(self.current())
            }
            _ => Err(UsageError::ExactlyOneOf("registration response or exception").into()),
        }
    }

    pub fn logout(&self) -> Result<Arc<AuthState>, StoreError> {
        self.replace(AuthState::default())
    }

    #[tracing::instrument(skip(self, f))]
    fn update<F>(&self, f: F) -> Result<Arc<AuthState>, StateError>
    where
        F: Fn(&AuthState) -> Result<AuthState, UsageError>,
    {
        loop {
            let cur = self.current.load_full();
            let next = Arc::new(f(&cur)?);
            let prev = self.current.compare_and_swap(&cur, next.clone());
            if Arc::ptr_eq(&*prev, &cur) {
                self.write_through()?;
                return Ok(next);
            }
            event!(Level::DEBUG, "state changed concurrently, retrying update");
        }
    }

    // Always persists the latest snapshot, whichever update installed it.
    fn write_through(&self) -> Result<(), StoreError> {
        let _guard = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        let json = self.current.load().to_json()?;
        self.store.save(&json)
    }
}
