use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    dao::{
        cache::{CacheStore, room_key},
        models::JoinCode,
    },
    services::room_actor::RoomCommand,
    state::{
        connections::ConnectionId,
        room::{Room, RoomError},
    },
};

/// Sending side of a room actor's mailbox.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    join_code: JoinCode,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn new(join_code: JoinCode, tx: mpsc::Sender<RoomCommand>) -> Self {
        Self { join_code, tx }
    }

    pub fn join_code(&self) -> JoinCode {
        self.join_code
    }

    /// Queue a command; fails once the actor has stopped.
    pub async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.tx.send(command).await.map_err(|_| RoomError::NotFound)
    }

    /// Ask the actor for a copy of its room.
    pub async fn inspect(&self) -> Result<Room, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Inspect { reply }).await?;
        rx.await.map_err(|_| RoomError::NotFound)
    }

    fn shutdown(&self) {
        let _ = self.tx.try_send(RoomCommand::Shutdown);
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Outcome of [`RoomRegistry::get_room`].
#[derive(Debug)]
pub enum RoomLookup {
    /// Room has a running actor in this process.
    Live(RoomHandle),
    /// Room is only known from the shared cache; timer fields may be stale.
    Cached(Box<Room>),
    NotFound,
}

/// Live rooms by join code, with a reverse index from connections.
///
/// A shared cache acts as a fallback so a code can still resolve after a
/// restart or on another node.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<JoinCode, RoomHandle>,
    by_connection: DashMap<ConnectionId, JoinCode>,
    fallback: RwLock<Option<Arc<dyn CacheStore>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or clear the cache consulted on memory misses.
    pub async fn set_fallback(&self, cache: Option<Arc<dyn CacheStore>>) {
        *self.fallback.write().await = cache;
    }

    async fn fallback(&self) -> Option<Arc<dyn CacheStore>> {
        self.fallback.read().await.clone()
    }

    /// Register a room under `join_code`; the handle is returned if the code is live.
    pub fn create_room(&self, handle: RoomHandle) -> Result<(), RoomHandle> {
        match self.rooms.entry(handle.join_code) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(handle);
                    Ok(())
                } else {
                    Err(handle)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Whether `join_code` belongs to a room running in this process.
    pub fn is_live(&self, join_code: JoinCode) -> bool {
        self.rooms
            .get(&join_code)
            .is_some_and(|handle| !handle.is_closed())
    }

    pub fn live(&self, join_code: JoinCode) -> Option<RoomHandle> {
        self.rooms
            .get(&join_code)
            .map(|handle| handle.clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Resolve a room from memory first, then from the shared cache.
    pub async fn get_room(&self, join_code: JoinCode) -> RoomLookup {
        if let Some(handle) = self.live(join_code) {
            return RoomLookup::Live(handle);
        }

        let Some(cache) = self.fallback().await else {
            return RoomLookup::NotFound;
        };
        match cache.get(room_key(join_code)).await {
            Ok(Some(value)) => match serde_json::from_value::<Room>(value) {
                Ok(room) => RoomLookup::Cached(Box::new(room)),
                Err(err) => {
                    warn!(join_code, error = %err, "discarding unreadable cached room");
                    RoomLookup::NotFound
                }
            },
            Ok(None) => RoomLookup::NotFound,
            Err(err) => {
                warn!(join_code, error = %err, "room cache lookup failed");
                RoomLookup::NotFound
            }
        }
    }

    /// Stop the room's actor and evict it from memory and from the cache.
    pub async fn remove_room(&self, join_code: JoinCode) {
        if let Some((_, handle)) = self.rooms.remove(&join_code) {
            handle.shutdown();
        }
        self.by_connection.retain(|_, code| *code != join_code);

        if let Some(cache) = self.fallback().await {
            if let Err(err) = cache.delete(room_key(join_code)).await {
                warn!(join_code, error = %err, "failed to evict cached room");
            }
        }
        debug!(join_code, "room removed from registry");
    }

    /// Drop a code reserved by [`RoomRegistry::create_room`] whose room never started.
    pub fn discard(&self, join_code: JoinCode) {
        self.rooms.remove(&join_code);
    }

    pub fn bind_connection(&self, connection_id: ConnectionId, join_code: JoinCode) {
        self.by_connection.insert(connection_id, join_code);
    }

    /// Forget a connection, but only if it still points at `join_code`.
    pub fn unbind_connection(&self, connection_id: ConnectionId, join_code: JoinCode) {
        self.by_connection
            .remove_if(&connection_id, |_, code| *code == join_code);
    }

    /// Reverse lookup used when a socket closes.
    pub fn find_room_by_connection(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(JoinCode, RoomHandle)> {
        let join_code = *self.by_connection.get(&connection_id)?;
        self.live(join_code).map(|handle| (join_code, handle))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
