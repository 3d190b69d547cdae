//! Component health reporting
//!
//! Each storage component answers a cheap, non-blocking health probe.
//! Probes read counters and gauges only; they never touch disk.

use crate::kv::KvEnv;
use crate::refdata::ReferenceDataStore;
use crate::stream::StreamStore;

/// Point-in-time health of one component
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub component: String,
    pub healthy: bool,
    pub detail: String,
}

/// Anything that can report its own health.
pub trait HealthCheck {
    fn get_health(&self) -> HealthStatus;
}

impl HealthCheck for KvEnv {
    fn get_health(&self) -> HealthStatus {
        let (used, capacity) = self.usage();
        let pct = if capacity == 0 {
            100.0
        } else {
            used as f64 / capacity as f64 * 100.0
        };
        HealthStatus {
            component: "kv-env".to_string(),
            // Above 90% a single bulk load can exhaust the region
            healthy: pct < 90.0,
            detail: format!("{} / {} bytes used ({:.1}%)", used, capacity, pct),
        }
    }
}

impl HealthCheck for StreamStore {
    fn get_health(&self) -> HealthStatus {
        let streams = self.stream_count();
        let pending = self.pending_sweep_count();
        HealthStatus {
            component: "stream-store".to_string(),
            healthy: true,
            detail: format!("{} streams, {} pending sweep", streams, pending),
        }
    }
}

impl HealthCheck for ReferenceDataStore {
    fn get_health(&self) -> HealthStatus {
        HealthStatus {
            component: "reference-data".to_string(),
            healthy: true,
            detail: format!("{} maps loaded", self.map_count()),
        }
    }
}
