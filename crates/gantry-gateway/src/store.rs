//! In-memory metric groups.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;

/// Grouping labels, always including `job`.
pub type GroupingKey = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub labels: GroupingKey,
    pub metrics: BTreeMap<String, f64>,
    pub last_write: SystemTime,
}

/// A change to one group. `metrics: None` deletes the group.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub labels: GroupingKey,
    pub timestamp: SystemTime,
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl WriteRequest {
    pub fn delete(labels: GroupingKey) -> Self {
        Self {
            labels,
            timestamp: SystemTime::now(),
            metrics: None,
        }
    }

    pub fn push(labels: GroupingKey, metrics: BTreeMap<String, f64>) -> Self {
        Self {
            labels,
            timestamp: SystemTime::now(),
            metrics: Some(metrics),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("grouping labels must include a job")]
    MissingJob,
    #[error("metric store is shut down")]
    ShutDown,
}

#[derive(Debug, Default)]
pub struct MetricStore {
    groups: DashMap<GroupingKey, MetricGroup>,
    writes: AtomicU64,
    shut_down: AtomicBool,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write. Pushes merge metric values into the group.
    pub fn submit(&self, request: WriteRequest) -> Result<(), StoreError> {
        self.ready()?;
        if !request.labels.contains_key("job") {
            return Err(StoreError::MissingJob);
        }

        match request.metrics {
            None => {
                if self.groups.remove(&request.labels).is_some() {
                    tracing::debug!(labels = ?request.labels, "metric group deleted");
                }
            }
            Some(metrics) => {
                let mut group = self
                    .groups
                    .entry(request.labels.clone())
                    .or_insert_with(|| MetricGroup {
                        labels: request.labels,
                        metrics: BTreeMap::new(),
                        last_write: request.timestamp,
                    });
                group.metrics.extend(metrics);
                group.last_write = request.timestamp;
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn healthy(&self) -> Result<(), StoreError> {
        self.ready()
    }

    pub fn ready(&self) -> Result<(), StoreError> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(StoreError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Refuse further writes.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// All groups, ordered by grouping labels.
    pub fn groups(&self) -> Vec<MetricGroup> {
        let mut groups: Vec<_> = self.groups.iter().map(|e| e.value().clone()).collect();
        groups.sort_by(|a, b| a.labels.cmp(&b.labels));
        groups
    }

    pub fn group(&self, labels: &GroupingKey) -> Option<MetricGroup> {
        self.groups.get(labels).map(|e| e.value().clone())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Writes accepted since start.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}
