//! Per-handler call counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use gantry_core::wire::Packet;

use crate::session::Session;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub calls: u64,
    pub errors: u64,
    pub total_time: Duration,
}

/// Counters keyed by handler name. Owned by the service, never global.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    stats: DashMap<String, HandlerStats>,
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, elapsed: Duration, ok: bool) {
        let mut entry = self.stats.entry(name.to_string()).or_default();
        entry.calls += 1;
        entry.total_time += elapsed;
        if !ok {
            entry.errors += 1;
        }
    }

    pub fn get(&self, name: &str) -> Option<HandlerStats> {
        self.stats.get(name).map(|e| e.value().clone())
    }

    /// All counters, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, HandlerStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// Wrap `handler` so each call is counted under `name`.
pub fn instrument<F>(
    name: impl Into<String>,
    handler: F,
    metrics: Arc<HandlerMetrics>,
) -> impl Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static
where
    F: Fn(&Session, &Packet) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let name = name.into();
    move |session, packet| {
        let started = Instant::now();
        let result = handler(session, packet);
        metrics.record(&name, started.elapsed(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteTable;
    use crate::session::tests::test_session;
    use bytes::Bytes;
    use gantry_core::wire::Kind;

    #[tokio::test]
    async fn counts_calls_and_errors() {
        let (session, _peer) = test_session();
        let metrics = Arc::new(HandlerMetrics::new());
        let table = RouteTable::new();
        table.register(
            Kind(2),
            instrument("ok", |_: &Session, _: &Packet| Ok(()), Arc::clone(&metrics)),
        );
        table.register(
            Kind(2),
            instrument(
                "bad",
                |_: &Session, _: &Packet| anyhow::bail!("nope"),
                Arc::clone(&metrics),
            ),
        );

        let packet = Packet::new(Kind(2), Bytes::new());
        table.dispatch(&session, &packet);
        table.dispatch(&session, &packet);

        let ok = metrics.get("ok").unwrap();
        assert_eq!((ok.calls, ok.errors), (2, 0));
        let bad = metrics.get("bad").unwrap();
        assert_eq!((bad.calls, bad.errors), (2, 2));

        let names: Vec<_> = metrics.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["bad", "ok"]);
    }

    #[tokio::test]
    async fn result_passes_through() {
        let (session, _peer) = test_session();
        let metrics = Arc::new(HandlerMetrics::new());
        let wrapped = instrument(
            "h",
            |_: &Session, p: &Packet| {
                anyhow::ensure!(!p.body().is_empty(), "empty body");
                Ok(())
            },
            Arc::clone(&metrics),
        );

        assert!(wrapped(&session, &Packet::new(Kind(2), Bytes::from_static(b"x"))).is_ok());
        let err = wrapped(&session, &Packet::new(Kind(2), Bytes::new())).unwrap_err();
        assert_eq!(err.to_string(), "empty body");
        assert!(metrics.get("missing").is_none());
    }
}
