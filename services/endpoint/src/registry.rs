//! Device registry.
//!
//! Built once from the configured targets and immutable afterwards, apart
//! from each device's last probe result. Entries are merged by MAC address:
//! however many identity keys name the same MAC, there is exactly one
//! [`Device`], and every key resolves to that shared instance.

use crate::config::TargetConfig;
use crate::net::MacAddr;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Outcome of the most recent probe of a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LastProbe {
    Latency { ms: f64 },
    NoAnswer,
}

impl LastProbe {
    pub fn as_ms(&self) -> Option<f64> {
        match self {
            LastProbe::Latency { ms } => Some(*ms),
            LastProbe::NoAnswer => None,
        }
    }
}

/// One physically managed machine.
#[derive(Debug)]
pub struct Device {
    keys: Vec<String>,
    name: String,
    mac: MacAddr,
    address: Option<String>,
    last_probe: Mutex<Option<LastProbe>>,
}

impl Device {
    /// The first configured key for this device; probe results are reported
    /// under it.
    pub fn primary_key(&self) -> &str {
        &self.keys[0]
    }

    /// Every identity key that resolves to this device, in config order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> &MacAddr {
        &self.mac
    }

    /// IP literal or hostname; `None` means the device is not probeable.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn last_probe(&self) -> Option<LastProbe> {
        self.last_probe.lock().ok().and_then(|g| *g)
    }

    pub(crate) fn record_probe(&self, result: LastProbe) {
        if let Ok(mut slot) = self.last_probe.lock() {
            *slot = Some(result);
        }
    }
}

/// All managed devices, in first-seen config order.
#[derive(Debug, Default)]
pub struct Registry {
    devices: Vec<Arc<Device>>,
    by_key: HashMap<String, Arc<Device>>,
    keys: Vec<String>,
}

impl Registry {
    /// Build the registry from configured targets.
    ///
    /// Entries without a parseable MAC are skipped with a warning. A later
    /// entry whose MAC is already known becomes an alias of the existing
    /// device; its own name and address are ignored.
    pub fn from_targets(targets: &[TargetConfig]) -> Self {
        struct Pending {
            keys: Vec<String>,
            name: String,
            mac: MacAddr,
            address: Option<String>,
        }

        let mut pending: Vec<Pending> = Vec::new();
        let mut index_by_mac: HashMap<MacAddr, usize> = HashMap::new();

        for target in targets {
            let Some(mac_str) = target.mac.as_deref() else {
                warn!(uuid = %target.key, "target has no mac, skipping");
                continue;
            };
            let mac = match mac_str.parse::<MacAddr>() {
                Ok(m) => m,
                Err(e) => {
                    warn!(uuid = %target.key, mac = %mac_str, error = %e, "target has invalid mac, skipping");
                    continue;
                }
            };

            match index_by_mac.get(&mac) {
                Some(&i) => {
                    let entry = &mut pending[i];
                    if entry.keys.contains(&target.key) {
                        continue;
                    }
                    debug!(uuid = %target.key, primary = %entry.keys[0], %mac, "aliasing target to existing device");
                    entry.keys.push(target.key.clone());
                }
                None => {
                    index_by_mac.insert(mac, pending.len());
                    pending.push(Pending {
                        keys: vec![target.key.clone()],
                        name: target.name.clone().unwrap_or_else(|| target.key.clone()),
                        mac,
                        address: target.ip.clone(),
                    });
                }
            }
        }

        let mut registry = Registry::default();
        for p in pending {
            let device = Arc::new(Device {
                keys: p.keys,
                name: p.name,
                mac: p.mac,
                address: p.address,
                last_probe: Mutex::new(None),
            });
            registry.devices.push(Arc::clone(&device));
        }
        // Keys in config order, not grouped by device.
        for target in targets {
            if registry.by_key.contains_key(&target.key) {
                continue;
            }
            let device = registry
                .devices
                .iter()
                .find(|d| d.keys.contains(&target.key));
            if let Some(device) = device {
                registry.by_key.insert(target.key.clone(), Arc::clone(device));
                registry.keys.push(target.key.clone());
            }
        }
        registry
    }

    pub fn lookup(&self, key: &str) -> Option<&Arc<Device>> {
        self.by_key.get(key)
    }

    /// Devices in registry order (first-seen config order).
    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    /// Every identity key, in config order. This is the registration list.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
