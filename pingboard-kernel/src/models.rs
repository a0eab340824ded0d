use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Une entrée d'inventaire : une machine et ses adresses par rôle.
/// Les champs descriptifs (uplink, switch, baie...) ne sont jamais interprétés.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub kiosk_pc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub uplink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub source_switch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub bay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "opt_scalar_string")]
    pub section: Option<String>,
    /// Clés inconnues conservées telles quelles (aller-retour YAML et push client)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl MachineRecord {
    #[cfg(test)]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: None,
            gateway: None,
            kiosk_pc: None,
            uplink: None,
            source_switch: None,
            column: None,
            bay: None,
            section: None,
            extra: BTreeMap::new(),
        }
    }

    /// Adresse configurée pour un rôle ; une valeur vide compte comme absente.
    pub fn address(&self, role: AddressRole) -> Option<&str> {
        let value = match role {
            AddressRole::Ip => self.ip.as_deref(),
            AddressRole::Gateway => self.gateway.as_deref(),
            AddressRole::KioskPc => self.kiosk_pc.as_deref(),
        };
        value.map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Document persisté : une seule clé `machines`, liste ordonnée.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub machines: Vec<MachineRecord>,
}

impl Inventory {
    pub fn new(machines: Vec<MachineRecord>) -> Self {
        Self { machines }
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    Ip,
    Gateway,
    KioskPc,
}

impl AddressRole {
    pub const ALL: [AddressRole; 3] = [AddressRole::Ip, AddressRole::Gateway, AddressRole::KioskPc];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Orange,
    Red,
}

impl StatusColor {
    pub fn classify(reachable: bool, latency_ms: f64) -> Self {
        if !reachable {
            return StatusColor::Red;
        }
        if latency_ms <= 10.0 {
            StatusColor::Green
        } else if latency_ms <= 100.0 {
            StatusColor::Orange
        } else {
            StatusColor::Red
        }
    }
}

/// Résultat d'un ping pour un rôle d'une machine.
/// Noms de champs sur le fil alignés sur le client dashboard (`ip`, `alive`, `ping`, `color`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(rename = "alive")]
    pub reachable: bool,
    #[serde(rename = "ping")]
    pub latency_ms: f64,
    pub color: StatusColor,
}

impl ProbeResult {
    pub fn reachable(address: impl Into<String>, latency_ms: f64) -> Self {
        let latency_ms = if latency_ms.is_finite() { latency_ms.max(0.0) } else { 0.0 };
        Self {
            address: address.into(),
            reachable: true,
            latency_ms,
            color: StatusColor::classify(true, latency_ms),
        }
    }

    pub fn unreachable(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reachable: false,
            latency_ms: 0.0,
            color: StatusColor::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineStatus {
    #[serde(flatten)]
    pub machine: MachineRecord,
    pub results: BTreeMap<AddressRole, ProbeResult>,
}

/// Résultat complet d'un cycle, immuable une fois publié.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub machines: Vec<MachineStatus>,
    /// epoch en millisecondes
    pub ts: i64,
}

/// Valeur scalaire d'un champ texte, quel que soit le type YAML.
///
/// Les flottants passent par `f64` : `1.10` revient en `"1.1"`, `10.0` en `"10"`.
/// Le texte exact n'est conservé que si la valeur est entre guillemets dans le YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Flag(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Flag(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::UInt(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

// `bay: 3` dans un YAML édité à la main ne doit pas faire échouer tout le chargement
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

fn opt_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
