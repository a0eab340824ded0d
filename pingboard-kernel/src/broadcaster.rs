/**
 * STATUS BROADCASTER - Boucle de ping périodique et diffusion des snapshots
 *
 * RÔLE :
 * Produit et distribue les StatusSnapshot : inventaire courant → ProbeEngine →
 * horodatage → cache "latest" → publication sur le hub.
 *
 * DÉCLENCHEURS :
 * - intervalle fixe (premier tick immédiat au démarrage)
 * - nouveau client live, sauvegarde via l'API, modification externe du YAML
 *
 * INVARIANT : jamais deux cycles en parallèle. Une seule tâche worker exécute
 * les cycles ; un trigger pendant un cycle pose un unique permis (Notify) qui
 * donne exactement un cycle de rattrapage, quel que soit le nombre de triggers.
 */

use crate::hub::StatusHub;
use crate::inventory::InventoryStore;
use crate::probe::ProbeEngine;
use crate::models::StatusSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub struct Broadcaster {
    store: Arc<InventoryStore>,
    engine: ProbeEngine,
    hub: StatusHub,
    pending: Notify,
    cycles_completed: AtomicU64,
    triggers: AtomicU64,
}

impl Broadcaster {
    pub fn new(store: Arc<InventoryStore>, engine: ProbeEngine, hub: StatusHub) -> Arc<Self> {
        Arc::new(Self {
            store,
            engine,
            hub,
            pending: Notify::new(),
            cycles_completed: AtomicU64::new(0),
            triggers: AtomicU64::new(0),
        })
    }

    /// Demande un cycle dès que possible. Plusieurs appels pendant un cycle n'en donnent qu'un.
    pub fn trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        self.pending.notify_one();
    }

    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.hub.latest()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn triggers_requested(&self) -> u64 {
        self.triggers.load(Ordering::Relaxed)
    }

    /// Démarre la tâche worker unique
    pub fn spawn(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        info!(
            interval_ms = every.as_millis() as u64,
            batch_size = this.engine.batch_size(),
            "starting status broadcaster"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {},
                    _ = this.pending.notified() => {},
                }
                this.run_guarded_cycle().await;
            }
        })
    }

    // un cycle qui panique ne doit pas tuer le worker : il tourne dans sa propre tâche
    async fn run_guarded_cycle(self: &Arc<Self>) {
        let this = Arc::clone(self);
        if let Err(e) = tokio::spawn(async move { this.run_cycle().await }).await {
            error!("broadcast cycle aborted, skipping: {e}");
        }
    }

    async fn run_cycle(&self) -> Arc<StatusSnapshot> {
        let started = Instant::now();
        let inventory = self.store.current();
        if inventory.is_empty() {
            debug!("inventory is empty, publishing an empty snapshot");
        }

        let machines = self.engine.probe_all(&inventory.machines).await;
        let snapshot = self.hub.publish(machines);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);

        info!(
            machines = snapshot.machines.len(),
            batches = self.engine.batch_count(inventory.len()),
            subscribers = self.hub.subscriber_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "broadcasted machine statuses"
        );
        snapshot
    }
}
