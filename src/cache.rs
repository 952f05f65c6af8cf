//! Per-module build cache.
//!
//! Keys hash the canonicalized source, the compiler version, the ABI major
//! and the feature-flag set, combined with the keys of the module's import
//! closure so a changed dependency invalidates its consumers. A hit skips
//! regeneration; consumers recompute their own keys and may still hit.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::abi;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub rt_checks: bool,
    pub lto: bool,
}

impl fmt::Display for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.rt_checks {
            names.push("rt_checks");
        }
        if self.lto {
            names.push("lto");
        }
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub c_path: PathBuf,
    pub ir_path: Option<PathBuf>,
    pub abi_path: PathBuf,
}

pub struct BuildCache {
    dir: PathBuf,
}

impl BuildCache {
    pub fn new(build_dir: &Path) -> Self {
        Self { dir: build_dir.join(".cache") }
    }

    pub fn load(&self, module_name: &str) -> Option<CacheRecord> {
        let path = self.dir.join(format!("{module_name}.json"));
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn store(&self, module_name: &str, record: &CacheRecord) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{module_name}.json"));
        fs::write(path, serde_json::to_string_pretty(record)?)
    }

    /// Hit iff the key matches and the recorded artifacts still exist.
    pub fn probe(&self, module_name: &str, key: &str) -> Option<CacheRecord> {
        let record = self.load(module_name)?;
        if record.key == key && record.c_path.exists() && record.abi_path.exists() {
            Some(record)
        } else {
            None
        }
    }
}

/// Base key for one module's source under the current compiler and flags.
pub fn module_key(source: &str, flags: FeatureFlags) -> String {
    let payload = format!(
        "{}.{}\n{}\n{}\n{}",
        abi::ABI_VERSION_MAJOR,
        abi::ABI_VERSION_MINOR,
        crate::VERSION,
        flags,
        source
    );
    hex_sha256(payload.as_bytes())
}

/// Folds each module's key with its import closure, depth first, so keys
/// change whenever any transitive dependency changes.
pub fn combined_keys(
    base_keys: &HashMap<String, String>,
    dep_graph: &HashMap<String, Vec<String>>,
) -> HashMap<String, String> {
    let mut combined: HashMap<String, String> = HashMap::new();

    fn visit(
        name: &str,
        base_keys: &HashMap<String, String>,
        dep_graph: &HashMap<String, Vec<String>>,
        combined: &mut HashMap<String, String>,
    ) -> String {
        if let Some(key) = combined.get(name) {
            return key.clone();
        }
        let mut dep_keys: Vec<String> = dep_graph
            .get(name)
            .map(|deps| {
                deps.iter()
                    .filter(|d| base_keys.contains_key(*d))
                    .map(|d| visit(d, base_keys, dep_graph, combined))
                    .collect()
            })
            .unwrap_or_default();
        dep_keys.sort();
        let payload = format!(
            "{}{}",
            base_keys.get(name).cloned().unwrap_or_default(),
            dep_keys.concat()
        );
        let key = hex_sha256(payload.as_bytes());
        combined.insert(name.to_string(), key.clone());
        key
    }

    for name in base_keys.keys() {
        visit(name, base_keys, dep_graph, &mut combined);
    }
    combined
}

fn hex_sha256(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_changes_with_source_and_flags() {
        let a = module_key("module m\n", FeatureFlags::default());
        let b = module_key("module m\nfn f() -> int:\n  return 0\n", FeatureFlags::default());
        let c = module_key("module m\n", FeatureFlags { rt_checks: true, lto: false });
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, module_key("module m\n", FeatureFlags::default()));
    }

    #[test]
    fn dependency_changes_invalidate_consumers() {
        let mut base = HashMap::new();
        base.insert("app".to_string(), "k1".to_string());
        base.insert("util".to_string(), "k2".to_string());
        let mut graph = HashMap::new();
        graph.insert("app".to_string(), vec!["util".to_string()]);
        let first = combined_keys(&base, &graph);

        base.insert("util".to_string(), "k3".to_string());
        let second = combined_keys(&base, &graph);
        assert_ne!(first["app"], second["app"]);
        assert_ne!(first["util"], second["util"]);
    }

    #[test]
    fn probe_requires_existing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let c_path = dir.path().join("m.c");
        let abi_path = dir.path().join("m.abi.json");
        let record = CacheRecord {
            key: "k".into(),
            c_path: c_path.clone(),
            ir_path: None,
            abi_path: abi_path.clone(),
        };
        cache.store("m", &record).unwrap();
        assert!(cache.probe("m", "k").is_none(), "artifacts missing, expected miss");
        std::fs::write(&c_path, "").unwrap();
        std::fs::write(&abi_path, "{}").unwrap();
        assert!(cache.probe("m", "k").is_some());
        assert!(cache.probe("m", "other").is_none());
    }
}
