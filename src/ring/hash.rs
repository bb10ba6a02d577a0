//! Ring hash path configuration
//!
//! Swift salts every ring lookup with a cluster-wide prefix and suffix,
//! normally read from the `[swift-hash]` section of `swift.conf`.

use crate::{Error, Result};
use md5::{Digest, Md5};
use std::path::Path;

/// Hash salt used when mapping names to partitions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashPathConfig {
    pub prefix: String,
    pub suffix: String,
}

impl HashPathConfig {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Read `swift_hash_path_prefix` / `swift_hash_path_suffix` from a
    /// `swift.conf` file.
    pub fn from_swift_conf(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse_swift_conf(&text);
        if config.prefix.is_empty() && config.suffix.is_empty() {
            return Err(Error::Config(format!(
                "{} has no [swift-hash] prefix or suffix",
                path.display()
            )));
        }
        Ok(config)
    }

    fn parse_swift_conf(text: &str) -> Self {
        let mut config = Self::default();
        let mut in_section = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                in_section = &line[1..line.len() - 1] == "swift-hash";
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "swift_hash_path_prefix" => config.prefix = value.trim().to_string(),
                "swift_hash_path_suffix" => config.suffix = value.trim().to_string(),
                _ => {}
            }
        }
        config
    }

    /// md5 of `prefix/name suffix`, as Swift's `hash_path` computes it for a
    /// bare account name.
    pub fn hash_account(&self, account: &str) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.prefix.as_bytes());
        hasher.update(b"/");
        hasher.update(account.as_bytes());
        hasher.update(self.suffix.as_bytes());
        hasher.finalize().into()
    }
}
