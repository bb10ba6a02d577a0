//! Swift account ring lookup
//!
//! Maps an account name to its partition and the replica devices holding
//! it. The device order reported here is the ring's native order; callers
//! that probe replicas shuffle it first.

mod format;
mod hash;

pub use hash::HashPathConfig;

use crate::{Error, Result};
use format::RingData;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// A storage device in the ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingDevice {
    pub id: u32,
    pub ip: String,
    pub port: u16,
    pub device: String,
    #[serde(default)]
    pub region: Option<u32>,
    #[serde(default)]
    pub zone: Option<u32>,
}

impl RingDevice {
    /// `host:port`, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

/// Result of locating an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLocation {
    pub partition: u32,
    pub nodes: Vec<RingDevice>,
}

/// Maps accounts to partitions and replica devices
pub trait RingLocator: Send + Sync {
    fn locate(&self, account: &str) -> Result<RingLocation>;

    /// Pick up a newer ring if one is available. Returns whether the ring
    /// changed.
    fn refresh(&self) -> Result<bool> {
        Ok(false)
    }
}

/// An immutable, loaded ring
#[derive(Debug, Clone)]
pub struct Ring {
    data: RingData,
    hash: HashPathConfig,
}

impl Ring {
    /// Build a ring from its parts. `replica2part2dev[r][p]` is the device id
    /// holding replica `r` of partition `p`.
    pub fn new(
        devs: Vec<Option<RingDevice>>,
        part_shift: u32,
        replica2part2dev: Vec<Vec<u32>>,
        hash: HashPathConfig,
    ) -> Result<Self> {
        if part_shift > 32 {
            return Err(Error::Ring(format!("invalid part_shift {}", part_shift)));
        }
        Ok(Self {
            data: RingData {
                devs,
                part_shift,
                replica2part2dev,
            },
            hash,
        })
    }

    /// Load a gzip-compressed ring file
    pub fn load(path: &Path, hash: HashPathConfig) -> Result<Self> {
        let compressed = std::fs::read(path)
            .map_err(|e| Error::Ring(format!("cannot read {}: {}", path.display(), e)))?;
        let data = RingData::decode(&compressed)?;
        info!(
            path = %path.display(),
            partitions = data.partition_count(),
            replicas = data.replica2part2dev.len(),
            devices = data.devs.iter().flatten().count(),
            "Loaded ring"
        );
        Ok(Self { data, hash })
    }

    /// Write the ring in the version 1 file format
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.data.encode()?)?;
        Ok(())
    }

    pub fn partition_count(&self) -> usize {
        self.data.partition_count()
    }

    pub fn replica_count(&self) -> usize {
        self.data.replica2part2dev.len()
    }

    /// Partition for an account name
    pub fn partition(&self, account: &str) -> u32 {
        let digest = self.hash.hash_account(account);
        let top = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        top.checked_shr(self.data.part_shift).unwrap_or(0)
    }

    /// Distinct devices holding `partition`, in replica order
    pub fn partition_nodes(&self, partition: u32) -> Vec<RingDevice> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for table in &self.data.replica2part2dev {
            let Some(&dev_id) = table.get(partition as usize) else {
                continue;
            };
            if !seen.insert(dev_id) {
                continue;
            }
            if let Some(Some(device)) = self.data.devs.get(dev_id as usize) {
                nodes.push(device.clone());
            }
        }
        nodes
    }
}

impl RingLocator for Ring {
    fn locate(&self, account: &str) -> Result<RingLocation> {
        let partition = self.partition(account);
        let nodes = self.partition_nodes(partition);
        if nodes.is_empty() {
            return Err(Error::Ring(format!(
                "partition {} for account {} has no devices",
                partition, account
            )));
        }
        Ok(RingLocation { partition, nodes })
    }
}

/// A ring file that is reloaded when its modification time changes
pub struct RingFile {
    path: PathBuf,
    hash: HashPathConfig,
    current: RwLock<(Arc<Ring>, Option<SystemTime>)>,
}

impl RingFile {
    pub fn open(path: impl Into<PathBuf>, hash: HashPathConfig) -> Result<Self> {
        let path = path.into();
        let modified = modified_time(&path);
        let ring = Ring::load(&path, hash.clone())?;
        Ok(Self {
            path,
            hash,
            current: RwLock::new((Arc::new(ring), modified)),
        })
    }

    /// The ring currently in use
    pub fn ring(&self) -> Arc<Ring> {
        self.current.read().0.clone()
    }
}

impl RingLocator for RingFile {
    fn locate(&self, account: &str) -> Result<RingLocation> {
        self.ring().locate(account)
    }

    fn refresh(&self) -> Result<bool> {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.current.read().1 {
            return Ok(false);
        }
        match Ring::load(&self.path, self.hash.clone()) {
            Ok(ring) => {
                *self.current.write() = (Arc::new(ring), modified);
                info!(path = %self.path.display(), "Ring file changed; reloaded");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Keeping previous ring");
                Err(e)
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u32) -> RingDevice {
        RingDevice {
            id,
            ip: format!("10.0.0.{}", id + 1),
            port: 6202,
            device: "sdb".to_string(),
            region: None,
            zone: None,
        }
    }

    #[test]
    fn test_partition_uses_top_bits() {
        let hash = HashPathConfig::new("", "");
        let ring = Ring::new(vec![Some(device(0))], 28, vec![vec![0; 16]], hash.clone()).unwrap();
        let digest = hash.hash_account("AUTH_abc");
        assert_eq!(ring.partition("AUTH_abc"), (digest[0] >> 4) as u32);
    }

    #[test]
    fn test_nodes_are_unique_and_skip_removed_devices() {
        let ring = Ring::new(
            vec![Some(device(0)), None, Some(device(2))],
            31,
            vec![vec![0, 2], vec![0, 1], vec![2, 2]],
            HashPathConfig::default(),
        )
        .unwrap();

        let ids: Vec<u32> = ring.partition_nodes(0).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 2]);
        // device 1 was removed from the ring
        let ids: Vec<u32> = ring.partition_nodes(1).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_single_partition_ring() {
        let ring = Ring::new(
            vec![Some(device(0)), Some(device(1))],
            32,
            vec![vec![0], vec![1]],
            HashPathConfig::default(),
        )
        .unwrap();
        let location = ring.locate("AUTH_anything").unwrap();
        assert_eq!(location.partition, 0);
        assert_eq!(location.nodes.len(), 2);
    }

    #[test]
    fn test_ipv6_authority() {
        let mut d = device(0);
        d.ip = "fd00::1".to_string();
        assert_eq!(d.authority(), "[fd00::1]:6202");
    }
}
