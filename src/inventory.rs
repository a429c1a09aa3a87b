//! Device inventory with hostname and subnet indices.
//!
//! The inventory is built once at load and read-only afterwards; it is
//! shared between concurrent traces behind an `Arc` without locking.

use crate::model::{Device, DeviceKind};
use crate::net;
use cidr::{Cidr, Ipv4Cidr};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory file not found: {0}")]
    NotFound(String),

    #[error("reading inventory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing inventory {path}: {reason}")]
    Parse { path: String, reason: String },
}

fn default_credentials_ref() -> String {
    "default".to_string()
}

/// On-disk record shape; `default_vrf` and `default_virtual_router` are
/// interchangeable spellings for the default logical context.
#[derive(Debug, Deserialize)]
struct DeviceRecord {
    hostname: String,
    management_ip: Ipv4Addr,
    vendor: String,
    #[serde(default)]
    site: Option<String>,
    #[serde(default, rename = "device_type")]
    kind: DeviceKind,
    #[serde(default = "default_credentials_ref")]
    credentials_ref: String,
    #[serde(default)]
    logical_contexts: Option<Vec<String>>,
    #[serde(default)]
    default_vrf: Option<String>,
    #[serde(default)]
    default_virtual_router: Option<String>,
    #[serde(default)]
    subnets: Vec<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct InventoryDoc {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

#[derive(Debug, Default)]
pub struct Inventory {
    devices: Vec<Arc<Device>>,
    by_hostname: HashMap<String, usize>,
    subnet_index: Vec<(Ipv4Cidr, usize)>,
    warnings: Vec<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML or JSON inventory document, selected by file extension.
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        if !path.exists() {
            return Err(InventoryError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let inventory = Self::parse(&text, yaml).map_err(|reason| InventoryError::Parse {
            path: path.display().to_string(),
            reason,
        })?;
        tracing::info!(
            devices = inventory.devices.len(),
            path = %path.display(),
            "loaded inventory"
        );
        Ok(inventory)
    }

    pub fn from_yaml(text: &str) -> Result<Self, InventoryError> {
        Self::parse(text, true).map_err(|reason| InventoryError::Parse {
            path: "<inline>".to_string(),
            reason,
        })
    }

    fn parse(text: &str, yaml: bool) -> Result<Self, String> {
        let doc: InventoryDoc = if yaml {
            serde_yaml::from_str(text).map_err(|e| e.to_string())?
        } else {
            serde_json::from_str(text).map_err(|e| e.to_string())?
        };

        let mut inventory = Self::new();
        for record in doc.devices {
            let device = inventory.build_device(record);
            inventory.add_device(device);
        }
        Ok(inventory)
    }

    fn build_device(&mut self, record: DeviceRecord) -> Device {
        let default_context = record
            .default_vrf
            .or(record.default_virtual_router)
            .unwrap_or_else(|| "global".to_string());
        let logical_contexts = record
            .logical_contexts
            .unwrap_or_else(|| vec![default_context.clone()]);

        let mut subnets = Vec::with_capacity(record.subnets.len());
        for raw in &record.subnets {
            match net::parse_network(raw) {
                Some(network) => subnets.push(network),
                None => {
                    let warning = format!(
                        "ignoring invalid subnet {:?} on {}",
                        raw, record.hostname
                    );
                    tracing::warn!("{}", warning);
                    self.warnings.push(warning);
                }
            }
        }

        Device {
            hostname: record.hostname,
            management_ip: record.management_ip,
            vendor: record.vendor,
            site: record.site,
            kind: record.kind,
            credentials_ref: record.credentials_ref,
            logical_contexts,
            default_context,
            subnets,
            metadata: record.metadata,
        }
    }

    /// Register a device and index its hostname and owned subnets.
    /// Duplicate management IPs and same-site subnet overlaps are surfaced
    /// as non-fatal warnings.
    pub fn add_device(&mut self, device: Device) {
        for existing in &self.devices {
            if existing.management_ip == device.management_ip
                && existing.hostname != device.hostname
            {
                let warning = format!(
                    "duplicate management IP {}: {} and {}",
                    device.management_ip, existing.hostname, device.hostname
                );
                tracing::warn!("{}", warning);
                self.warnings.push(warning);
            }
        }

        for (subnet, owner) in &self.subnet_index {
            if device.subnets.contains(subnet) {
                let owner = &self.devices[*owner];
                if owner.site.is_some() && owner.site == device.site {
                    let warning = format!(
                        "overlapping subnet {} at site {}: {} and {}",
                        subnet,
                        device.site.as_deref().unwrap_or("-"),
                        owner.hostname,
                        device.hostname
                    );
                    tracing::warn!("{}", warning);
                    self.warnings.push(warning);
                }
            }
        }

        let index = self.devices.len();
        for subnet in &device.subnets {
            self.subnet_index.push((*subnet, index));
        }
        self.by_hostname
            .entry(device.hostname.clone())
            .or_insert(index);
        self.devices.push(Arc::new(device));
    }

    pub fn by_hostname(&self, hostname: &str) -> Option<Arc<Device>> {
        self.by_hostname
            .get(hostname)
            .map(|&i| Arc::clone(&self.devices[i]))
    }

    pub fn by_management_ip(&self, ip: Ipv4Addr) -> Vec<Arc<Device>> {
        self.devices
            .iter()
            .filter(|d| d.management_ip == ip)
            .cloned()
            .collect()
    }

    /// Devices owning a subnet that contains `ip`, filtered to the longest
    /// prefix length present among all containing subnets.
    pub fn by_subnet(&self, ip: Ipv4Addr) -> Vec<Arc<Device>> {
        let longest = self
            .subnet_index
            .iter()
            .filter(|(subnet, _)| subnet.contains(&ip))
            .map(|(subnet, _)| subnet.network_length())
            .max();
        let longest = match longest {
            Some(len) => len,
            None => return Vec::new(),
        };

        let mut indices: Vec<usize> = self
            .subnet_index
            .iter()
            .filter(|(subnet, _)| subnet.contains(&ip) && subnet.network_length() == longest)
            .map(|(_, i)| *i)
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|i| Arc::clone(&self.devices[i]))
            .collect()
    }

    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Serialise the inventory back into document form.
    pub fn export(&self) -> Value {
        serde_json::json!({ "devices": self.devices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
devices:
  - hostname: core-r1
    management_ip: 10.0.0.1
    vendor: cisco_ios
    site: nyc
    device_type: router
    default_vrf: global
    subnets: [10.1.1.0/24, 10.1.0.0/16]
  - hostname: edge-fw1
    management_ip: 10.0.0.2
    vendor: paloalto
    site: nyc
    device_type: firewall
    credentials_ref: firewalls
    logical_contexts: [default, guest]
    default_virtual_router: default
    subnets: [10.1.1.0/25]
  - hostname: core-r2
    management_ip: 10.0.0.3
    vendor: arista_eos
    site: sfo
    subnets: [10.2.2.0/24]
";

    #[test]
    fn loads_sample_document() {
        let inventory = Inventory::from_yaml(SAMPLE).unwrap();
        assert_eq!(inventory.len(), 3);

        let r1 = inventory.by_hostname("core-r1").unwrap();
        assert_eq!(r1.vendor, "cisco_ios");
        assert_eq!(r1.default_context, "global");
        assert_eq!(r1.logical_contexts, vec!["global".to_string()]);
        assert_eq!(r1.kind, DeviceKind::Router);

        let fw = inventory.by_hostname("edge-fw1").unwrap();
        assert_eq!(fw.credentials_ref, "firewalls");
        assert_eq!(fw.default_context, "default");
        assert!(fw.has_context("guest"));

        let r2 = inventory.by_hostname("core-r2").unwrap();
        assert_eq!(r2.default_context, "global");
        assert_eq!(r2.kind, DeviceKind::Unknown);
    }

    #[test]
    fn subnet_query_applies_longest_prefix() {
        let inventory = Inventory::from_yaml(SAMPLE).unwrap();

        // 10.1.1.10 falls in /16, /24 and /25; only the /25 owner survives.
        let matches = inventory.by_subnet("10.1.1.10".parse().unwrap());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hostname, "edge-fw1");

        // 10.1.1.200 is outside the /25, so the /24 owner wins.
        let matches = inventory.by_subnet("10.1.1.200".parse().unwrap());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hostname, "core-r1");

        assert!(inventory.by_subnet("192.168.9.9".parse().unwrap()).is_empty());
    }

    #[test]
    fn management_ip_query_returns_all_matches() {
        let inventory = Inventory::from_yaml(SAMPLE).unwrap();
        let matches = inventory.by_management_ip("10.0.0.1".parse().unwrap());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].hostname, "core-r1");
        assert!(inventory.by_management_ip("10.9.9.9".parse().unwrap()).is_empty());
    }

    #[test]
    fn duplicate_management_ip_warns() {
        let doc = "\
devices:
  - hostname: a
    management_ip: 10.0.0.1
    vendor: cisco_ios
  - hostname: b
    management_ip: 10.0.0.1
    vendor: cisco_ios
";
        let inventory = Inventory::from_yaml(doc).unwrap();
        assert_eq!(inventory.len(), 2);
        assert!(inventory.warnings().iter().any(|w| w.contains("duplicate management IP")));
    }

    #[test]
    fn same_site_subnet_overlap_warns() {
        let doc = "\
devices:
  - hostname: a
    management_ip: 10.0.0.1
    vendor: cisco_ios
    site: nyc
    subnets: [10.5.0.0/24]
  - hostname: b
    management_ip: 10.0.0.2
    vendor: cisco_ios
    site: nyc
    subnets: [10.5.0.0/24]
";
        let inventory = Inventory::from_yaml(doc).unwrap();
        assert!(inventory.warnings().iter().any(|w| w.contains("overlapping subnet")));

        // Both still answer subnet queries at the shared prefix.
        let matches = inventory.by_subnet("10.5.0.7".parse().unwrap());
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn invalid_subnets_are_skipped_with_warning() {
        let doc = "\
devices:
  - hostname: a
    management_ip: 10.0.0.1
    vendor: cisco_ios
    subnets: [\"not-a-network\"]
";
        let inventory = Inventory::from_yaml(doc).unwrap();
        assert_eq!(inventory.len(), 1);
        assert!(inventory.warnings().iter().any(|w| w.contains("invalid subnet")));
    }

    #[test]
    fn export_round_trips_device_count() {
        let inventory = Inventory::from_yaml(SAMPLE).unwrap();
        let doc = inventory.export();
        assert_eq!(doc["devices"].as_array().unwrap().len(), 3);
        assert_eq!(doc["devices"][0]["hostname"], "core-r1");
    }
}
