//! `daisy.toml` project manifests.
//!
//! Dependencies are local path deps with exact (`x.y.z`) or caret
//! (`^x.y.z`) requirements. Workspace members (literal paths or `dir/*`)
//! contribute module search paths. A dependency whose ABI major differs
//! from the compiler's blocks the build before any artifact is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::abi;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{DaisyError, DaisyResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectManifest {
    #[serde(default)]
    pub package: Option<PackageInfo>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DepSpec>,
    #[serde(default)]
    pub workspace: Option<Workspace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub abi_major: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepSpec {
    /// `dep = "../path"`
    Path(String),
    /// `dep = { path = "../path", version = "^1.2.0" }`
    Detailed {
        path: String,
        #[serde(default)]
        version: Option<String>,
    },
}

impl DepSpec {
    pub fn path_and_version(&self) -> (PathBuf, Option<&str>) {
        match self {
            DepSpec::Path(p) => (PathBuf::from(p), None),
            DepSpec::Detailed { path, version } => (PathBuf::from(path), version.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub members: Vec<String>,
}

/// Walks up from the entry file looking for `daisy.toml`.
pub fn find_manifest(entry: &Path) -> Option<PathBuf> {
    let mut dir = if entry.is_dir() { entry } else { entry.parent()? };
    loop {
        let candidate = dir.join("daisy.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

pub fn load_manifest(path: &Path) -> DaisyResult<ProjectManifest> {
    let text = fs::read_to_string(path).map_err(DaisyError::Io)?;
    toml::from_str(&text)
        .map_err(|e| DaisyError::manifest(format!("{}: {e}", path.display())))
}

/// Dependency `src/` dirs, dependency roots and workspace members, in
/// manifest order.
pub fn search_paths(manifest_path: &Path, manifest: &ProjectManifest) -> Vec<PathBuf> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let mut paths = Vec::new();
    for spec in manifest.dependencies.values() {
        let (dep_path, _) = spec.path_and_version();
        let dep_path = absolutize(base, &dep_path);
        paths.push(dep_path.join("src"));
        paths.push(dep_path);
    }
    if let Some(workspace) = &manifest.workspace {
        for member in &workspace.members {
            for member_path in expand_member(base, member) {
                paths.push(member_path.join("src"));
                paths.push(member_path);
            }
        }
    }
    paths.retain(|p| p.exists());
    paths
}

/// `libs/*` expands to every subdirectory of `libs`.
fn expand_member(base: &Path, member: &str) -> Vec<PathBuf> {
    match member.strip_suffix("/*") {
        Some(prefix) => {
            let dir = absolutize(base, Path::new(prefix));
            let mut members: Vec<PathBuf> = fs::read_dir(&dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.is_dir())
                        .collect()
                })
                .unwrap_or_default();
            members.sort();
            members
        }
        None => vec![absolutize(base, Path::new(member))],
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Name and version requirements against each dependency's own manifest.
pub fn check_dependency_versions(
    manifest_path: &Path,
    manifest: &ProjectManifest,
) -> DaisyResult<()> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    for (dep_name, spec) in &manifest.dependencies {
        let (dep_path, version_req) = spec.path_and_version();
        let dep_path = absolutize(base, &dep_path);
        let dep_manifest_path = dep_path.join("daisy.toml");
        if !dep_manifest_path.exists() {
            return Err(DaisyError::manifest(format!(
                "dependency manifest not found: {}",
                dep_manifest_path.display()
            )));
        }
        let dep_manifest = load_manifest(&dep_manifest_path)?;
        let Some(package) = &dep_manifest.package else {
            return Err(DaisyError::manifest(format!(
                "dependency manifest missing [package]: {}",
                dep_manifest_path.display()
            )));
        };
        if package.name != *dep_name {
            return Err(DaisyError::manifest(format!(
                "dependency name mismatch: {} != {}",
                dep_name, package.name
            )));
        }
        if let Some(req) = version_req {
            if !satisfies_version(&package.version, req) {
                return Err(DaisyError::manifest(format!(
                    "dependency version mismatch for {dep_name}: required {req}, found {}",
                    package.version
                )));
            }
        }
    }
    Ok(())
}

/// The ABI gate: a declared or built `abi_major` different from the
/// compiler's is `AbiIncompatible` and no artifacts may be written.
pub fn check_dependency_abi(manifest_path: &Path, manifest: &ProjectManifest) -> DaisyResult<()> {
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    for (dep_name, spec) in &manifest.dependencies {
        let (dep_path, _) = spec.path_and_version();
        let dep_path = absolutize(base, &dep_path);
        let dep_manifest_path = dep_path.join("daisy.toml");
        if dep_manifest_path.exists() {
            let dep_manifest = load_manifest(&dep_manifest_path)?;
            if let Some(declared) = dep_manifest.package.and_then(|p| p.abi_major) {
                if declared != abi::ABI_VERSION_MAJOR {
                    return Err(abi_mismatch(dep_name, declared));
                }
            }
        }
        let build_dir = dep_path.join("build");
        if !build_dir.exists() {
            continue;
        }
        let Ok(entries) = fs::read_dir(&build_dir) else { continue };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(".abi.json"))
                    .unwrap_or(false)
            {
                let Ok(text) = fs::read_to_string(&path) else { continue };
                let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
                let major = value
                    .get("abi_version")
                    .and_then(|v| v.get("major"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(abi::ABI_VERSION_MAJOR as u64);
                if major != abi::ABI_VERSION_MAJOR as u64 {
                    return Err(abi_mismatch(dep_name, major as u32));
                }
            }
        }
    }
    Ok(())
}

fn abi_mismatch(dep_name: &str, found: u32) -> DaisyError {
    DaisyError::Diagnostics(vec![Diagnostic::new(
        DiagnosticKind::AbiIncompatible,
        format!(
            "dependency {dep_name} has ABI major {found}, compiler requires {}",
            abi::ABI_VERSION_MAJOR
        ),
        None,
    )])
}

fn parse_semver(value: &str) -> Option<(u64, u64, u64)> {
    let mut parts = value.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// `x.y.z` is exact; `^x.y.z` accepts the same major at or above the base.
pub fn satisfies_version(actual: &str, req: &str) -> bool {
    let Some(act) = parse_semver(actual) else { return false };
    if let Some(base) = req.strip_prefix('^') {
        let Some(base) = parse_semver(base) else { return false };
        return act.0 == base.0 && act >= base;
    }
    parse_semver(req).map(|base| act == base).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_requirements_accept_same_major() {
        assert!(satisfies_version("1.2.3", "^1.2.0"));
        assert!(satisfies_version("1.9.0", "^1.2.0"));
        assert!(!satisfies_version("2.0.0", "^1.2.0"));
        assert!(!satisfies_version("1.1.9", "^1.2.0"));
    }

    #[test]
    fn exact_requirements_match_exactly() {
        assert!(satisfies_version("1.2.3", "1.2.3"));
        assert!(!satisfies_version("1.2.4", "1.2.3"));
    }

    #[test]
    fn manifest_parses_both_dep_forms() {
        let manifest: ProjectManifest = toml::from_str(
            "[package]\nname = \"app\"\nversion = \"0.1.0\"\n\n[dependencies]\nutil = \"../util\"\nextra = { path = \"../extra\", version = \"^1.0.0\" }\n\n[workspace]\nmembers = [\"libs/*\"]\n",
        )
        .unwrap();
        assert_eq!(manifest.dependencies.len(), 2);
        let (path, version) = manifest.dependencies["extra"].path_and_version();
        assert_eq!(path, PathBuf::from("../extra"));
        assert_eq!(version, Some("^1.0.0"));
        assert_eq!(manifest.workspace.unwrap().members, vec!["libs/*".to_string()]);
    }

    #[test]
    fn workspace_globs_expand_to_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("libs/a/src")).unwrap();
        fs::create_dir_all(dir.path().join("libs/b")).unwrap();
        let members = expand_member(dir.path(), "libs/*");
        assert_eq!(members.len(), 2);
    }
}
