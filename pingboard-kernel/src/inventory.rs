/**
 * INVENTORY STORE - Inventaire des machines persisté en YAML
 *
 * RÔLE :
 * Seul propriétaire de l'inventaire en mémoire et de sa forme sur disque.
 *
 * FONCTIONNEMENT :
 * - load() : lecture + parse, retombe sur un inventaire vide en cas d'erreur (jamais de crash)
 * - save() : écriture dans un fichier temporaire voisin puis rename atomique,
 *   puis relecture du fichier écrit (le disque fait foi)
 * - watcher : polling de la date de modification / taille, recharge et signale
 *   "inventaire modifié" quand un autre processus touche le fichier
 *
 * Le remplacement est toujours global (swap d'Arc), jamais champ par champ.
 */

use crate::models::Inventory;
use crate::state::{new_state, Shared, Swap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid inventory YAML: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("failed to serialize inventory: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Empreinte du fichier utilisée pour détecter les modifications externes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileFingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

pub struct InventoryStore {
    path: PathBuf,
    current: Swap<Inventory>,
    fingerprint: Shared<Option<FileFingerprint>>,
    // sérialise save/reload : une relecture ne doit pas écraser une sauvegarde plus récente
    io_lock: tokio::sync::Mutex<()>,
}

impl InventoryStore {
    /// Ouvre le store et charge immédiatement le fichier (vide si absent ou invalide)
    pub async fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let store = Arc::new(Self {
            path: path.into(),
            current: Swap::new(Inventory::default()),
            fingerprint: new_state(None),
            io_lock: tokio::sync::Mutex::new(()),
        });
        store.load().await;
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vue courante, partagée sans copie avec les cycles de ping
    pub fn current(&self) -> Arc<Inventory> {
        self.current.load()
    }

    /// Relit le fichier et remplace la vue en mémoire.
    /// Toute erreur d'I/O ou de parse donne un inventaire vide.
    pub async fn load(&self) -> Arc<Inventory> {
        let _guard = self.io_lock.lock().await;

        // empreinte prise avant la lecture : au pire on relira une fois de trop
        let fingerprint = file_fingerprint(&self.path).await;
        let inventory = match read_inventory(&self.path).await {
            Ok(inventory) => {
                info!(path = %self.path.display(), machines = inventory.len(), "inventory loaded");
                inventory
            }
            Err(e) => {
                error!(path = %self.path.display(), "failed to read inventory: {e}");
                Inventory::default()
            }
        };

        *self.fingerprint.lock() = fingerprint;
        self.current.store(inventory)
    }

    /// Recharge depuis le disque ; idempotent, plusieurs appels donnent le même état.
    pub async fn reload(&self) -> Arc<Inventory> {
        self.load().await
    }

    /// Persiste un inventaire complet. En cas d'échec le fichier précédent reste intact.
    pub async fn save(&self, inventory: &Inventory) -> Result<Arc<Inventory>, InventoryError> {
        let _guard = self.io_lock.lock().await;

        let yaml = serde_yaml::to_string(inventory).map_err(InventoryError::Serialize)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        if let Err(e) = write_then_rename(&tmp, &self.path, yaml.as_bytes()).await {
            let _ = fs::remove_file(&tmp).await;
            error!(path = %self.path.display(), "failed to save inventory: {e}");
            return Err(e.into());
        }

        let fingerprint = file_fingerprint(&self.path).await;
        let persisted = match read_inventory(&self.path).await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(path = %self.path.display(), "saved inventory could not be re-read, keeping submitted copy: {e}");
                inventory.clone()
            }
        };

        *self.fingerprint.lock() = fingerprint;
        info!(path = %self.path.display(), machines = persisted.len(), "inventory saved");
        Ok(self.current.store(persisted))
    }

    /// Compare l'empreinte du fichier à la dernière connue ; recharge si elle a bougé.
    /// Retourne `true` quand un rechargement a eu lieu.
    pub async fn poll_external_change(&self) -> bool {
        let seen = file_fingerprint(&self.path).await;
        if seen == *self.fingerprint.lock() {
            return false;
        }
        info!(path = %self.path.display(), "detected external inventory modification");
        self.reload().await;
        true
    }

    /// Surveille le fichier par polling et appelle `on_change` après chaque rechargement
    pub fn spawn_change_watcher<F>(self: &Arc<Self>, every: Duration, on_change: F) -> JoinHandle<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let store = Arc::clone(self);
        debug!(path = %store.path.display(), interval_ms = every.as_millis() as u64, "starting inventory watcher");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // le premier tick est immédiat, l'état initial vient de open()
            interval.tick().await;

            loop {
                interval.tick().await;
                if store.poll_external_change().await {
                    on_change();
                }
            }
        })
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "machines.yml".into());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

async fn read_inventory(path: &Path) -> Result<Inventory, InventoryError> {
    let txt = fs::read_to_string(path).await?;
    let blank = txt.lines().map(str::trim).all(|l| l.is_empty() || l.starts_with('#'));
    if blank {
        return Ok(Inventory::default());
    }
    // un document YAML `null` (`~`) vaut inventaire vide
    let parsed: Option<Inventory> = serde_yaml::from_str(&txt).map_err(InventoryError::Parse)?;
    Ok(parsed.unwrap_or_default())
}

async fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, target).await
}

async fn file_fingerprint(path: &Path) -> Option<FileFingerprint> {
    let meta = fs::metadata(path).await.ok()?;
    Some(FileFingerprint {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}
