//! Lifecycle metrics for a core
//!
//! Tracks how attach/detach calls into the engine behaved and how many IO
//! requests were built against the core. Snapshots serialize with serde so
//! they can be exported by whatever hosts the engine.

use serde::{Deserialize, Serialize};

/// Per-core lifecycle metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreMetrics {
    /// Engine attach calls made by this core
    pub attach_attempts: u64,

    /// Attach calls that were rejected or failed
    pub attach_failures: u64,

    /// Duration of the most recent attach call in microseconds
    pub last_attach_micros: u64,

    /// Duration of the detach call in microseconds (None until detached)
    pub detach_micros: Option<u64>,

    /// IO requests allocated through the core's handle
    pub io_requests_created: u64,
}

impl CoreMetrics {
    pub fn new() -> Self {
        CoreMetrics {
            attach_attempts: 0,
            attach_failures: 0,
            last_attach_micros: 0,
            detach_micros: None,
            io_requests_created: 0,
        }
    }

    /// Record one attach call
    pub fn with_attach(mut self, time_micros: u64, succeeded: bool) -> Self {
        self.attach_attempts += 1;
        if !succeeded {
            self.attach_failures += 1;
        }
        self.last_attach_micros = time_micros;
        self
    }

    pub fn with_detach(mut self, time_micros: u64) -> Self {
        self.detach_micros = Some(time_micros);
        self
    }

    pub fn with_io_requests(mut self, count: u64) -> Self {
        self.io_requests_created = count;
        self
    }

    /// Time spent in engine lifecycle calls, in microseconds
    pub fn engine_time_micros(&self) -> u64 {
        self.last_attach_micros + self.detach_micros.unwrap_or(0)
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CoreMetrics::new();
        assert_eq!(metrics.attach_attempts, 0);
        assert_eq!(metrics.attach_failures, 0);
        assert_eq!(metrics.detach_micros, None);
        assert_eq!(metrics.io_requests_created, 0);
    }

    #[test]
    fn test_attach_accounting() {
        let metrics = CoreMetrics::new()
            .with_attach(40, false)
            .with_attach(25, true);

        assert_eq!(metrics.attach_attempts, 2);
        assert_eq!(metrics.attach_failures, 1);
        assert_eq!(metrics.last_attach_micros, 25);
    }

    #[test]
    fn test_engine_time() {
        let metrics = CoreMetrics::new().with_attach(100, true).with_detach(50);
        assert_eq!(metrics.engine_time_micros(), 150);
    }
}
