use crate::types::Catalogue;
use crate::{aeropendulum, LabConfig, RegistryError, Result};
use anyhow::Context;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Device catalogues by device name. Starts out holding the built-in
/// aeropendulum; a loaded catalogue with the same name replaces it.
#[derive(Debug, Clone)]
pub struct CatalogueRegistry {
    devices: BTreeMap<String, Catalogue>,
}

impl Default for CatalogueRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.insert(aeropendulum::catalogue());
        reg
    }
}

impl CatalogueRegistry {
    pub fn empty() -> Self {
        Self {
            devices: BTreeMap::new(),
        }
    }

    /// Returns the catalogue previously registered under the same name.
    pub fn insert(&mut self, catalogue: Catalogue) -> Option<Catalogue> {
        self.devices.insert(catalogue.device.clone(), catalogue)
    }

    pub fn lookup(&self, device: &str) -> Result<&Catalogue> {
        self.devices
            .get(device)
            .ok_or_else(|| RegistryError::UnknownDevice(device.to_string()))
    }

    /// Registered device names, sorted.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}

pub fn load_catalogue_file(path: impl AsRef<Path>) -> anyhow::Result<Catalogue> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading catalogue: {}", path.display()))?;
    let val: Value =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    let cat: Catalogue = serde_yaml::from_value(val)
        .with_context(|| format!("decoding catalogue: {}", path.display()))?;
    Ok(cat)
}

/// Load every `*.yaml`/`*.yml` catalogue in `dir` into `reg`, in file name
/// order. Two files naming the same device is an error.
pub fn load_catalogues_dir(
    reg: &mut CatalogueRegistry,
    dir: impl AsRef<Path>,
) -> anyhow::Result<usize> {
    let dir = dir.as_ref();
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading catalogue dir: {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| matches!(p.extension().and_then(|x| x.to_str()), Some("yaml" | "yml")))
        .collect();
    files.sort();

    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in &files {
        let cat = load_catalogue_file(path)?;
        if let Some(first) = seen.insert(cat.device.clone(), path.clone()) {
            anyhow::bail!(
                "device {:?} defined in both {} and {}",
                cat.device,
                first.display(),
                path.display()
            );
        }
        if reg.insert(cat).is_some() {
            debug!(file = %path.display(), "catalogue replaces an earlier definition");
        }
    }
    Ok(files.len())
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<LabConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: LabConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("decoding config: {}", path.display()))?;
    cfg.timeout()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(cfg)
}
