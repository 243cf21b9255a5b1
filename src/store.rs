use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{MAX_SERIES_CAPACITY, MIN_SERIES_CAPACITY};
use crate::{MetricSnapshot, NetworkStatus};

pub const DEFAULT_SERIES_CAPACITY: usize = 60;

/// Store shared between the producer (coordinator or poller) and readers.
pub type SharedStore = Arc<RwLock<MetricStore>>;

/// The last N values of every metric dimension, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub memory_used_percent: Vec<f64>,
    pub cpu_usage_percent: Vec<f64>,
    pub disk_used_percent: Vec<f64>,
    pub network_status: Vec<NetworkStatus>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.memory_used_percent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory_used_percent.is_empty()
    }
}

/// Fixed-capacity ring buffers for one device plus its latest snapshot.
#[derive(Debug, Clone)]
pub struct MetricStore {
    capacity: usize,
    memory: VecDeque<f64>,
    cpu: VecDeque<f64>,
    disk: VecDeque<f64>,
    network: VecDeque<NetworkStatus>,
    latest: Option<MetricSnapshot>,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    capacity.clamp(MIN_SERIES_CAPACITY, MAX_SERIES_CAPACITY)
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, value: T, capacity: usize) {
    buffer.push_back(value);
    trim(buffer, capacity);
}

fn trim<T>(buffer: &mut VecDeque<T>, capacity: usize) {
    while buffer.len() > capacity {
        buffer.pop_front();
    }
}

fn tail<T: Clone>(buffer: &VecDeque<T>, points: usize) -> Vec<T> {
    let skip = buffer.len().saturating_sub(points);
    buffer.iter().skip(skip).cloned().collect()
}

impl MetricStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = clamp_capacity(capacity);
        Self {
            capacity,
            memory: VecDeque::with_capacity(capacity),
            cpu: VecDeque::with_capacity(capacity),
            disk: VecDeque::with_capacity(capacity),
            network: VecDeque::with_capacity(capacity),
            latest: None,
        }
    }

    pub fn shared(capacity: usize) -> SharedStore {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_snapshot(&mut self, snapshot: MetricSnapshot) {
        let capacity = self.capacity;
        push_bounded(&mut self.memory, snapshot.memory.used_percent, capacity);
        push_bounded(&mut self.cpu, snapshot.cpu.usage_percent, capacity);
        push_bounded(&mut self.disk, snapshot.disk.used_percent, capacity);
        push_bounded(&mut self.network, snapshot.network.status, capacity);
        self.latest = Some(snapshot);
    }

    /// The last `min(points, capacity)` values of every series; all of them if `points`
    /// is `None`.
    pub fn series(&self, points: Option<usize>) -> MetricSeries {
        let points = points.unwrap_or(self.capacity).min(self.capacity);
        MetricSeries {
            memory_used_percent: tail(&self.memory, points),
            cpu_usage_percent: tail(&self.cpu, points),
            disk_used_percent: tail(&self.disk, points),
            network_status: tail(&self.network, points),
        }
    }

    pub fn latest_snapshot(&self) -> Option<&MetricSnapshot> {
        self.latest.as_ref()
    }

    /// Changes the capacity (clamped to 1..=300) and drops the oldest values that no
    /// longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = clamp_capacity(capacity);
        self.capacity = capacity;
        trim(&mut self.memory, capacity);
        trim(&mut self.cpu, capacity);
        trim(&mut self.disk, capacity);
        trim(&mut self.network, capacity);
    }

    pub fn clear(&mut self) {
        self.memory.clear();
        self.cpu.clear();
        self.disk.clear();
        self.network.clear();
        self.latest = None;
    }
}
