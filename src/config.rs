//! Pipeline configuration management
//!
//! Persistent settings live in `<config_dir>/eo-custody/config.json`. Every
//! field has a default, so a partial or missing file still yields a working
//! configuration. Relative paths are resolved against `base_dir`.

use crate::access::{AccessController, IdentityDirectory, Permission, PermissionTable, Role};
use crate::audit::AuditLog;
use crate::cipher::AesGcmCipher;
use crate::custody::JsonLedgerStore;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::ids::IntrusionDetector;
use crate::lifecycle::{LifecycleOptions, Orchestrator};
use crate::source::DEFAULT_REQUIRED_FIELDS;
use crate::zones::{FsZoneStore, Zone, filesystem::default_dir_name};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const APP_DIR: &str = "eo-custody";

/// Orchestrator over on-disk zones and ledger.
pub type FsOrchestrator = Orchestrator<FsZoneStore, JsonLedgerStore, AesGcmCipher>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the simulated storage
    pub base_dir: PathBuf,
    /// Directory name per zone, relative to `base_dir` unless absolute
    pub zone_dirs: BTreeMap<Zone, PathBuf>,
    /// Custody ledger directory
    pub ledger_dir: PathBuf,
    /// Archive encryption key (hex, owner-only permissions)
    pub key_file: PathBuf,
    /// JSON-lines audit trail; `None` keeps the trail in memory only
    pub audit_file: Option<PathBuf>,
    /// Delete the cleartext staging copy after a successful archive
    pub purge_staging_after_archive: bool,
    pub required_metadata_fields: Vec<String>,
    /// Identity to role directory
    pub identities: BTreeMap<String, Role>,
    /// Per-role replacements for the built-in permission table
    pub role_overrides: BTreeMap<Role, BTreeSet<Permission>>,
    /// Identities flagged by intrusion detection whenever they appear
    pub watch_list: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("simulation_data"))
            .unwrap_or_else(|| PathBuf::from("simulation_data"));

        Self {
            base_dir,
            zone_dirs: Zone::ALL
                .into_iter()
                .map(|zone| (zone, PathBuf::from(default_dir_name(zone))))
                .collect(),
            ledger_dir: PathBuf::from("custody_ledger"),
            key_file: PathBuf::from("secret.key"),
            audit_file: Some(PathBuf::from("audit.jsonl")),
            purge_staging_after_archive: false,
            required_metadata_fields: DEFAULT_REQUIRED_FIELDS
                .iter()
                .map(|f| (*f).to_owned())
                .collect(),
            identities: IdentityDirectory::default()
                .identities()
                .map(|(name, role)| (name.to_owned(), role))
                .collect(),
            role_overrides: BTreeMap::new(),
            watch_list: vec!["eve_hacker".to_owned()],
        }
    }
}

impl PipelineConfig {
    /// Default config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PipelineError::Config("Failed to get config directory".to_owned()))?;
        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    /// Load from the default path.
    ///
    /// # Errors
    ///
    /// See [`Self::load_from`].
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// fails [`Self::validate`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("Failed to parse {}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Save to the default path.
    ///
    /// # Errors
    ///
    /// See [`Self::save_to`].
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Reject configurations that would break zone isolation or the access model.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for zone in Zone::ALL {
            let dir = self.zone_dir(zone);
            if !seen.insert(dir.clone()) {
                return Err(PipelineError::Config(format!(
                    "the {zone} shares its directory {} with another zone",
                    dir.display()
                )));
            }
        }
        if seen.contains(&self.ledger_path()) {
            return Err(PipelineError::Config(
                "the custody ledger must not share a directory with a zone".to_owned(),
            ));
        }

        if self.role_overrides.contains_key(&Role::None) {
            return Err(PipelineError::Config(
                "the 'none' role cannot be granted permissions".to_owned(),
            ));
        }

        if self.required_metadata_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(PipelineError::Config(
                "required metadata field names must not be empty".to_owned(),
            ));
        }

        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn zone_dir(&self, zone: Zone) -> PathBuf {
        let name = self
            .zone_dirs
            .get(&zone)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(default_dir_name(zone)));
        self.resolve(&name)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger_dir)
    }

    pub fn key_path(&self) -> PathBuf {
        self.resolve(&self.key_file)
    }

    pub fn audit_path(&self) -> Option<PathBuf> {
        self.audit_file.as_deref().map(|path| self.resolve(path))
    }

    pub fn zone_store(&self) -> FsZoneStore {
        let dirs = Zone::ALL
            .into_iter()
            .map(|zone| (zone, self.zone_dir(zone)))
            .collect();
        FsZoneStore::with_dirs(&self.base_dir, &dirs)
    }

    /// Audit trail backed by the configured file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit directory cannot be created.
    pub fn audit_log(&self) -> Result<AuditLog> {
        match self.audit_path() {
            Some(path) => AuditLog::with_file(path),
            None => Ok(AuditLog::new()),
        }
    }

    pub fn access_controller(&self, audit: AuditLog) -> AccessController {
        AccessController::new(
            IdentityDirectory::from_map(self.identities.clone()),
            PermissionTable::with_overrides(&self.role_overrides),
            audit,
        )
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            purge_staging_after_archive: self.purge_staging_after_archive,
            required_fields: self.required_metadata_fields.clone(),
        }
    }

    pub fn intrusion_detector(&self) -> IntrusionDetector {
        IntrusionDetector::new(self.watch_list.clone())
    }

    /// Wire up the on-disk pipeline: zone directories, ledger, key and audit
    /// trail. A missing key file is generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a directory cannot
    /// be created, or the key file is unreadable.
    pub fn open(&self) -> Result<FsOrchestrator> {
        self.validate()?;

        let zones = self.zone_store();
        zones.bootstrap()?;
        let ledger = JsonLedgerStore::new(self.ledger_path())?;
        let cipher = AesGcmCipher::load_or_generate(&self.key_path())?;
        let access = self.access_controller(self.audit_log()?);

        tracing::info!("Pipeline opened at {}", self.base_dir.display());
        Ok(Orchestrator::new(
            Arc::new(zones),
            ledger,
            cipher,
            access,
            self.lifecycle_options(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            base_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::load_from(&temp.path().join("config.json")).unwrap();
        assert!(!config.purge_staging_after_archive);
        assert_eq!(config.identities.get("eve_hacker"), Some(&Role::None));
        assert_eq!(config.required_metadata_fields, DEFAULT_REQUIRED_FIELDS);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let mut config = config_in(temp.path());
        config.purge_staging_after_archive = true;
        config.watch_list.push("mallory".to_owned());

        config.save_to(&path).unwrap();
        assert_eq!(PipelineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"purge_staging_after_archive": true}"#).unwrap();

        let config = PipelineConfig::load_from(&path).unwrap();
        assert!(config.purge_staging_after_archive);
        assert_eq!(config.zone_dirs.len(), 4);
    }

    #[test]
    fn test_paths_resolve_against_base_dir() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        assert_eq!(
            config.zone_dir(Zone::Archive),
            temp.path().join("secure_archive")
        );
        assert_eq!(config.key_path(), temp.path().join("secret.key"));
        assert_eq!(config.audit_path(), Some(temp.path().join("audit.jsonl")));
    }

    #[test]
    fn test_shared_zone_directory_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(temp.path());
        config
            .zone_dirs
            .insert(Zone::Backup, PathBuf::from("secure_archive"));

        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_sentinel_override_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"role_overrides": {"none": ["read"]}}"#).unwrap();

        assert!(matches!(
            PipelineConfig::load_from(&path),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_open_creates_layout_and_key() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        let pipeline = config.open().unwrap();
        assert!(pipeline.list().unwrap().is_empty());
        for zone in Zone::ALL {
            assert!(config.zone_dir(zone).is_dir());
        }
        assert!(config.key_path().is_file());
        assert!(config.ledger_path().is_dir());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            PipelineConfig::load_from(&path),
            Err(PipelineError::Config(_))
        ));
    }
}
