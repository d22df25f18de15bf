//! Per-connection session state.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::connection::Connection;

/// Globally unique session identifier, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Name of a per-session setting, tied to the type stored under it.
///
/// ```ignore
/// const RETRIES: SettingKey<u32> = SettingKey::new("retries");
/// session.set_setting(&RETRIES, 3);
/// ```
pub struct SettingKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for SettingKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SettingKey<T> {}

impl<T> fmt::Debug for SettingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SettingKey").field(&self.name).finish()
    }
}

type Setting = Arc<dyn Any + Send + Sync>;

/// State attached to one accepted connection.
///
/// Shared as `Arc<Session>` between the service registry and the
/// connection's dispatch loop; every accessor takes `&self`.
pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    established_at: Instant,
    user_id: RwLock<Option<String>>,
    // Keyed by type as well as name: two keys may share a name.
    settings: DashMap<(&'static str, TypeId), Setting>,
    connection: RwLock<Arc<Connection>>,
}

impl Session {
    pub fn new(connection: Arc<Connection>, peer_addr: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            peer_addr,
            established_at: Instant::now(),
            user_id: RwLock::new(None),
            settings: DashMap::new(),
            connection: RwLock::new(connection),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    pub fn bind_user_id(&self, uid: impl Into<String>) {
        *self.user_id.write() = Some(uid.into());
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Store a value under `key`, replacing any previous one.
    pub fn set_setting<T: Any + Send + Sync>(&self, key: &SettingKey<T>, value: T) {
        self.settings.insert(slot(key), Arc::new(value));
    }

    pub fn setting<T: Any + Send + Sync>(&self, key: &SettingKey<T>) -> Option<Arc<T>> {
        let value = self.settings.get(&slot(key))?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn remove_setting<T: Any + Send + Sync>(&self, key: &SettingKey<T>) -> bool {
        self.settings.remove(&slot(key)).is_some()
    }

    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection.read())
    }

    /// Swap in a new connection and hand back the old one.
    ///
    /// The service keeps draining the events of the connection it accepted.
    /// Whoever spawned `connection` owns its [`ConnectionEvents`] and must
    /// drive them; sends through [`connection`](Self::connection) go to the
    /// new stream immediately.
    ///
    /// [`ConnectionEvents`]: crate::connection::ConnectionEvents
    pub fn set_connection(&self, connection: Arc<Connection>) -> Arc<Connection> {
        std::mem::replace(&mut *self.connection.write(), connection)
    }
}

fn slot<T: Any>(key: &SettingKey<T>) -> (&'static str, TypeId) {
    (key.name, TypeId::of::<T>())
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("user_id", &*self.user_id.read())
            .field("settings", &self.settings.len())
            .finish()
    }
}
