//! gantry-gateway — a metrics push gateway served over the gantry wire
//! protocol.

pub mod handlers;
pub mod kinds;
pub mod messages;
pub mod store;

use std::sync::Arc;

use gantry_core::config::GatewayConfig;
use gantry_server::SocketService;

pub use messages::{DeleteRequest, PushRequest};
pub use store::{MetricGroup, MetricStore, StoreError, WriteRequest};

/// Register every gateway handler on `service`, instrumented by name.
pub fn register(service: &SocketService, store: Arc<MetricStore>, config: &GatewayConfig) {
    service.register_instrumented(
        kinds::DELETE,
        "delete",
        handlers::delete(Arc::clone(&store), config.job_base64_encoded),
    );
    service.register_instrumented(
        kinds::PUSH,
        "push",
        handlers::push(Arc::clone(&store), config.job_base64_encoded),
    );
    service.register_instrumented(kinds::HEALTHY, "healthy", handlers::healthy(Arc::clone(&store)));
    service.register_instrumented(kinds::READY, "ready", handlers::ready(Arc::clone(&store)));
    service.register_instrumented(
        kinds::STATUS,
        "status",
        handlers::status(store, config.path_prefix.clone()),
    );
    tracing::info!(kinds = ?service.routes().kinds(), "gateway handlers registered");
}
