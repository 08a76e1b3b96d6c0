pub mod connections;
pub mod registry;
pub mod room;
pub mod solo;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{cache::CacheStore, session_store::StorageBackend},
    error::ServiceError,
};

pub use self::connections::{ConnectionHub, ConnectionId};
pub use self::registry::{RoomHandle, RoomLookup, RoomRegistry};
pub use self::solo::SoloGame;

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, storage handles, live rooms and sockets.
pub struct AppState {
    config: AppConfig,
    backend: RwLock<Option<StorageBackend>>,
    degraded: watch::Sender<bool>,
    rooms: RoomRegistry,
    connections: ConnectionHub,
    solo: DashMap<Uuid, SoloGame>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            backend: RwLock::new(None),
            degraded: degraded_tx,
            rooms: RoomRegistry::new(),
            connections: ConnectionHub::new(),
            solo: DashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn connections(&self) -> &ConnectionHub {
        &self.connections
    }

    /// Solo runs in progress, keyed by session id.
    pub fn solo_games(&self) -> &DashMap<Uuid, SoloGame> {
        &self.solo
    }

    /// Currently installed backend, if any.
    pub async fn backend(&self) -> Option<StorageBackend> {
        self.backend.read().await.clone()
    }

    /// Installed and healthy backend, or [`ServiceError::Degraded`].
    pub async fn require_backend(&self) -> Result<StorageBackend, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.backend().await.ok_or(ServiceError::Degraded)
    }

    pub async fn cache(&self) -> Option<Arc<dyn CacheStore>> {
        self.backend().await.map(|backend| backend.cache)
    }

    /// Install a backend, point the room registry at its cache and leave degraded mode.
    pub async fn set_backend(&self, backend: StorageBackend) {
        self.rooms.set_fallback(Some(backend.cache.clone())).await;
        *self.backend.write().await = Some(backend);
        self.update_degraded(false).await;
    }

    /// Remove the current backend and enter degraded mode.
    pub async fn clear_backend(&self) {
        self.backend.write().await.take();
        self.rooms.set_fallback(None).await;
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
