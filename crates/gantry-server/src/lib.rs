//! gantry-server — framed TCP transport: connections, sessions, routing,
//! and the socket service that ties them together.

pub mod client;
pub mod connection;
pub mod framing;
pub mod instrument;
pub mod route;
pub mod service;
pub mod session;

pub use client::{Client, ClientError};
pub use connection::{Connection, ConnectionError, ConnectionEvents, ConnectionSettings, SendError};
pub use instrument::{instrument, HandlerMetrics, HandlerStats};
pub use route::{Handler, RouteTable, SharedHandler};
pub use service::{HeartbeatSettings, ServiceError, ServiceState, SocketService, TransportSettings};
pub use session::{Session, SessionId, SettingKey};
