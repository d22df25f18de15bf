//! Route table: packet kind → ordered handler list.

use std::sync::Arc;

use dashmap::DashMap;
use gantry_core::wire::{Kind, Packet};
use parking_lot::RwLock;

use crate::session::Session;

/// Processes one inbound packet on behalf of a session.
///
/// Implemented for any `Fn(&Session, &Packet) -> anyhow::Result<()>`, so
/// closures can be registered directly.
pub trait Handler: Send + Sync {
    fn handle(&self, session: &Session, packet: &Packet) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, session: &Session, packet: &Packet) -> anyhow::Result<()> {
        self(session, packet)
    }
}

pub type SharedHandler = Arc<dyn Handler>;

/// Kind-keyed handler registry plus the single response handler.
#[derive(Default)]
pub struct RouteTable {
    routes: DashMap<Kind, Vec<SharedHandler>>,
    response: RwLock<Option<SharedHandler>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`. Handlers run in registration order.
    pub fn register<F>(&self, kind: Kind, handler: F)
    where
        F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_shared(kind, Arc::new(handler));
    }

    pub fn register_shared(&self, kind: Kind, handler: SharedHandler) {
        self.routes.entry(kind).or_default().push(handler);
    }

    /// Install the handler for `Response` packets, replacing any previous one.
    pub fn set_response_handler<F>(&self, handler: F)
    where
        F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.response.write() = Some(Arc::new(handler));
    }

    /// Snapshot of the handlers for `kind`.
    pub fn handlers(&self, kind: Kind) -> Vec<SharedHandler> {
        self.routes
            .get(&kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Kinds with at least one handler, ascending.
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.routes.iter().map(|e| *e.key()).collect();
        kinds.sort();
        kinds
    }

    pub fn has_response_handler(&self) -> bool {
        self.response.read().is_some()
    }

    /// Run every handler that applies to `packet`. Returns how many ran.
    ///
    /// Handlers are invoked on a snapshot, outside any map lock, so a
    /// handler may register further routes.
    pub fn dispatch(&self, session: &Session, packet: &Packet) -> usize {
        match packet.kind() {
            Kind::HEARTBEAT => 0,
            Kind::RESPONSE => {
                let handler = self.response.read().clone();
                match handler {
                    Some(h) => {
                        invoke(h.as_ref(), session, packet);
                        1
                    }
                    None => 0,
                }
            }
            kind => {
                let handlers = self.handlers(kind);
                if handlers.is_empty() {
                    tracing::debug!(session_id = %session.id(), kind = %kind, "no route");
                }
                for h in &handlers {
                    invoke(h.as_ref(), session, packet);
                }
                handlers.len()
            }
        }
    }
}

fn invoke(handler: &dyn Handler, session: &Session, packet: &Packet) {
    if let Err(e) = handler.handle(session, packet) {
        tracing::warn!(
            session_id = %session.id(),
            kind = %packet.kind(),
            packet_id = %packet.id(),
            error = %e,
            "handler failed"
        );
    }
}
