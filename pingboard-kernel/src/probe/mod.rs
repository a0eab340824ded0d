//! Probe engine: batched, bounded-concurrency reachability checks
//!
//! This module handles:
//! - The `Prober` seam (one reachability/latency measurement per address)
//! - Per-probe timeout, folding timeouts and errors into "unreachable"
//! - Fixed-size batches: probes inside a batch run concurrently, batches run one after another

pub mod system;
#[cfg(test)]
pub mod stub;

pub use system::SystemPing;

use crate::models::{AddressRole, MachineRecord, MachineStatus, ProbeResult};
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw answer from a prober, before color derivation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReply {
    pub alive: bool,
    pub latency_ms: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("failed to run ping: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeReply, ProbeError>> + Send + 'a>>;

/// One reachability measurement against one address.
///
/// `timeout` is a hint for the underlying tool; the engine enforces it anyway.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, address: &'a str, timeout: Duration) -> ProbeFuture<'a>;
}

#[derive(Clone)]
pub struct ProbeEngine {
    prober: Arc<dyn Prober>,
    batch_size: usize,
    timeout: Duration,
}

impl ProbeEngine {
    pub fn new(prober: Arc<dyn Prober>, batch_size: usize, timeout: Duration) -> Self {
        Self {
            prober,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_count(&self, machines: usize) -> usize {
        machines.div_ceil(self.batch_size)
    }

    /// One `MachineStatus` per input record, same order. Never fails.
    pub async fn probe_all(&self, machines: &[MachineRecord]) -> Vec<MachineStatus> {
        let mut statuses = Vec::with_capacity(machines.len());

        for (index, batch) in machines.chunks(self.batch_size).enumerate() {
            let settled = join_all(batch.iter().map(|machine| self.probe_machine(machine))).await;
            debug!(batch = index + 1, size = batch.len(), "probe batch settled");
            statuses.extend(settled);
        }

        statuses
    }

    /// Probes every configured role of one machine concurrently
    pub async fn probe_machine(&self, machine: &MachineRecord) -> MachineStatus {
        let probes = AddressRole::ALL
            .into_iter()
            .filter_map(|role| machine.address(role).map(|address| (role, address)))
            .map(|(role, address)| async move { (role, self.probe_address(address).await) });

        MachineStatus {
            machine: machine.clone(),
            results: join_all(probes).await.into_iter().collect(),
        }
    }

    pub async fn probe_address(&self, address: &str) -> ProbeResult {
        match tokio::time::timeout(self.timeout, self.prober.probe(address, self.timeout)).await {
            Ok(Ok(reply)) if reply.alive => ProbeResult::reachable(address, reply.latency_ms),
            Ok(Ok(_)) => ProbeResult::unreachable(address),
            // ping absent ou non exécutable : toutes les machines passeraient au rouge sans trace
            Ok(Err(e @ ProbeError::Spawn(_))) => {
                warn!(address, "probe could not run: {e}");
                ProbeResult::unreachable(address)
            }
            Ok(Err(e)) => {
                debug!(address, "probe failed: {e}");
                ProbeResult::unreachable(address)
            }
            Err(_) => {
                debug!(address, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                ProbeResult::unreachable(address)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::{Script, ScriptedProber};
    use super::*;
    use crate::models::StatusColor;

    fn machine(name: &str, ip: Option<&str>, gateway: Option<&str>, kiosk: Option<&str>) -> MachineRecord {
        let mut m = MachineRecord::named(name);
        m.ip = ip.map(Into::into);
        m.gateway = gateway.map(Into::into);
        m.kiosk_pc = kiosk.map(Into::into);
        m
    }

    fn engine(prober: &Arc<ScriptedProber>, batch_size: usize) -> ProbeEngine {
        ProbeEngine::new(prober.clone(), batch_size, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_empty_inventory_gives_empty_statuses() {
        let prober = Arc::new(ScriptedProber::new());
        let statuses = engine(&prober, 20).probe_all(&[]).await;
        assert!(statuses.is_empty());
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_order_and_length_preserved() {
        let prober = Arc::new(ScriptedProber::new());
        // latences inversées : les dernières machines répondent en premier
        let machines: Vec<_> = (0..7)
            .map(|i| {
                let ip = format!("10.0.0.{i}");
                prober.script(&ip, Script::ReplyAfter(Duration::from_millis(70 - i * 10), 1.0));
                machine(&format!("m{i}"), Some(&ip), None, None)
            })
            .collect();

        let statuses = engine(&prober, 3).probe_all(&machines).await;

        assert_eq!(statuses.len(), machines.len());
        for (status, record) in statuses.iter().zip(&machines) {
            assert_eq!(&status.machine, record);
        }
    }

    #[tokio::test]
    async fn test_absent_roles_are_not_probed() {
        let prober = Arc::new(ScriptedProber::new());
        let m = machine("kiosk-only", None, Some(""), Some("10.0.0.9"));

        let status = engine(&prober, 20).probe_machine(&m).await;

        assert_eq!(prober.calls(), 1);
        assert_eq!(status.results.len(), 1);
        assert!(status.results.contains_key(&AddressRole::KioskPc));
        assert!(!status.results.contains_key(&AddressRole::Ip));
        assert!(!status.results.contains_key(&AddressRole::Gateway));
    }

    #[tokio::test]
    async fn test_failures_fold_into_unreachable() {
        let prober = Arc::new(ScriptedProber::new());
        prober.script("10.0.0.1", Script::Reply(4.0));
        prober.script("10.0.0.2", Script::Down);
        prober.script("bad host", Script::Fail);
        let m = machine("mixed", Some("10.0.0.1"), Some("10.0.0.2"), Some("bad host"));

        let status = engine(&prober, 20).probe_machine(&m).await;

        let ip = &status.results[&AddressRole::Ip];
        assert!(ip.reachable);
        assert_eq!(ip.color, StatusColor::Green);

        for role in [AddressRole::Gateway, AddressRole::KioskPc] {
            let result = &status.results[&role];
            assert!(!result.reachable);
            assert_eq!(result.latency_ms, 0.0);
            assert_eq!(result.color, StatusColor::Red);
        }
    }

    #[tokio::test]
    async fn test_missing_ping_binary_folds_into_unreachable() {
        let prober = Arc::new(ScriptedProber::new());
        prober.script("10.0.0.1", Script::SpawnFail);

        let result = engine(&prober, 20).probe_address("10.0.0.1").await;

        assert!(!result.reachable);
        assert_eq!(result.latency_ms, 0.0);
        assert_eq!(result.color, StatusColor::Red);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_as_unreachable() {
        let prober = Arc::new(ScriptedProber::new());
        prober.script("10.0.0.1", Script::Hang);

        let started = tokio::time::Instant::now();
        let result = engine(&prober, 20).probe_address("10.0.0.1").await;

        assert!(!result.reachable);
        assert_eq!(result.latency_ms, 0.0);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(2100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_bound_concurrency_and_wall_time() {
        let prober = Arc::new(ScriptedProber::new());
        let machines: Vec<_> = (0..45)
            .map(|i| {
                let ip = format!("10.0.1.{i}");
                prober.script(&ip, Script::Hang);
                machine(&format!("m{i}"), Some(&ip), None, None)
            })
            .collect();

        let engine = engine(&prober, 20);
        assert_eq!(engine.batch_count(machines.len()), 3);

        let started = tokio::time::Instant::now();
        let statuses = engine.probe_all(&machines).await;
        let elapsed = started.elapsed();

        assert_eq!(statuses.len(), 45);
        assert!(statuses.iter().all(|s| !s.results[&AddressRole::Ip].reachable));
        assert_eq!(prober.calls(), 45);
        assert_eq!(prober.peak_in_flight(), 20);
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_roles_of_one_machine_run_concurrently() {
        let prober = Arc::new(ScriptedProber::new());
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            prober.script(ip, Script::ReplyAfter(Duration::from_millis(50), 1.0));
        }
        let m = machine("all-roles", Some("10.0.0.1"), Some("10.0.0.2"), Some("10.0.0.3"));

        let status = engine(&prober, 1).probe_machine(&m).await;

        assert_eq!(status.results.len(), 3);
        assert_eq!(prober.peak_in_flight(), 3);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let prober = Arc::new(ScriptedProber::new());
        let engine = engine(&prober, 0);
        assert_eq!(engine.batch_size(), 1);
        assert_eq!(engine.batch_count(0), 0);
        assert_eq!(engine.batch_count(5), 5);
    }
}
