//! Scripted in-process prober for tests: no network, deterministic replies,
//! and counters for concurrency assertions.

use super::{ProbeError, ProbeFuture, ProbeReply, Prober};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Script {
    Reply(f64),
    ReplyAfter(Duration, f64),
    Down,
    Fail,
    SpawnFail,
    Hang,
    Panic,
}

pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, Script>>,
    fallback: Mutex<Script>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(Script::Reply(1.0)),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, address: &str, script: Script) {
        self.scripts.lock().insert(address.to_string(), script);
    }

    /// Script used for addresses without an explicit entry
    pub fn script_default(&self, script: Script) {
        *self.fallback.lock() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Prober for ScriptedProber {
    fn probe<'a>(&'a self, address: &'a str, _timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let script = self
                .scripts
                .lock()
                .get(address)
                .copied()
                .unwrap_or_else(|| *self.fallback.lock());

            match script {
                Script::Reply(ms) => Ok(ProbeReply { alive: true, latency_ms: ms }),
                Script::ReplyAfter(delay, ms) => {
                    tokio::time::sleep(delay).await;
                    Ok(ProbeReply { alive: true, latency_ms: ms })
                }
                Script::Down => Ok(ProbeReply { alive: false, latency_ms: 0.0 }),
                Script::Fail => Err(ProbeError::InvalidAddress(address.to_string())),
                Script::SpawnFail => Err(ProbeError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "ping: not found",
                ))),
                Script::Hang => std::future::pending().await,
                Script::Panic => panic!("scripted probe panic for {address}"),
            }
        })
    }
}
