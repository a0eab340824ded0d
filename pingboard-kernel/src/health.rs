use crate::broadcaster::Broadcaster;
use crate::inventory::InventoryStore;
use serde::Serialize;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub machines_tracked: usize,
    pub subscribers: usize,
    pub cycles_completed: u64,
    pub triggers_requested: u64,
    pub last_snapshot_ts: Option<i64>,
    pub last_snapshot_at: Option<String>,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, store: &InventoryStore, broadcaster: &Broadcaster) -> KernelHealth {
        let latest = broadcaster.latest();
        let last_snapshot_ts = latest.as_ref().map(|s| s.ts);
        let last_snapshot_at = last_snapshot_ts
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok())
            .and_then(|at| at.format(&Rfc3339).ok());

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            machines_tracked: store.current().len(),
            subscribers: broadcaster.hub().subscriber_count(),
            cycles_completed: broadcaster.cycles_completed(),
            triggers_requested: broadcaster.triggers_requested(),
            last_snapshot_ts,
            last_snapshot_at,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0; // KB -> MB
            }
        }
    }

    // inconnu hors Linux
    0.0
}
