// config.rs — Joined-commons configuration and the workspace registry.
//
// One `WorkspaceConfig` per joined commons, keyed by the canonical `org/db`
// path, persisted together in `<config dir>/wasteland/workspaces.toml`:
//
//   [workspaces."hop/commons"]
//   upstream = "hop/commons"
//   fork_org = "bob"
//   fork_db = "commons"
//   local_dir = "/home/bob/.local/share/wasteland/hop/commons"
//   rig_handle = "bob"
//   mode = "pr"
//   provider = "github"

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use wl_review::RepoRef;

use crate::error::{Result, WorkspaceError};

/// Environment variable overriding the registry directory.
pub const CONFIG_DIR_ENV: &str = "WL_CONFIG_DIR";

pub const REGISTRY_FILE: &str = "workspaces.toml";

const PATH_SEGMENT: &str = r"[A-Za-z0-9][A-Za-z0-9_.-]*";

/// How mutations reach the canonical commons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowMode {
    /// Mutate main directly and push to canonical and fork.
    #[default]
    WildWest,
    /// Mutate a per-item branch, push it to the fork, merge after review.
    Pr,
}

impl WorkflowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowMode::WildWest => "wild-west",
            WorkflowMode::Pr => "pr",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowMode {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wild-west" => Ok(WorkflowMode::WildWest),
            "pr" => Ok(WorkflowMode::Pr),
            other => Err(WorkspaceError::InvalidConfig {
                field: "mode",
                reason: format!("'{}' (expected wild-west or pr)", other),
            }),
        }
    }
}

/// Hosting provider carrying review shells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Github,
    Dolthub,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Github => "github",
            ProviderType::Dolthub => "dolthub",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "github" => Ok(ProviderType::Github),
            "dolthub" => Ok(ProviderType::Dolthub),
            other => Err(WorkspaceError::InvalidConfig {
                field: "provider",
                reason: format!("'{}' (expected github or dolthub)", other),
            }),
        }
    }
}

fn default_stale_after_days() -> u32 {
    14
}

/// Configuration for one joined commons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Canonical commons, `org/db`.
    pub upstream: String,
    pub fork_org: String,
    pub fork_db: String,
    /// Local clone of the fork.
    pub local_dir: PathBuf,
    pub rig_handle: String,
    #[serde(default)]
    pub mode: WorkflowMode,
    /// Sign database commits.
    #[serde(default)]
    pub signing: bool,
    #[serde(default)]
    pub provider: ProviderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Claims untouched on canonical for longer than this are flagged.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

impl WorkspaceConfig {
    pub fn new(
        upstream: impl Into<String>,
        fork_org: impl Into<String>,
        fork_db: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        rig_handle: impl Into<String>,
    ) -> Self {
        Self {
            upstream: upstream.into(),
            fork_org: fork_org.into(),
            fork_db: fork_db.into(),
            local_dir: local_dir.into(),
            rig_handle: rig_handle.into(),
            mode: WorkflowMode::default(),
            signing: false,
            provider: ProviderType::default(),
            last_sync: None,
            stale_after_days: default_stale_after_days(),
        }
    }

    pub fn with_mode(mut self, mode: WorkflowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let repo = Regex::new(&format!("^{0}/{0}$", PATH_SEGMENT))?;
        let segment = Regex::new(&format!("^{}$", PATH_SEGMENT))?;

        if !repo.is_match(&self.upstream) {
            return Err(WorkspaceError::InvalidConfig {
                field: "upstream",
                reason: format!("'{}' is not an org/db path", self.upstream),
            });
        }
        for (field, value) in [
            ("fork_org", &self.fork_org),
            ("fork_db", &self.fork_db),
            ("rig_handle", &self.rig_handle),
        ] {
            if !segment.is_match(value) {
                return Err(WorkspaceError::InvalidConfig {
                    field,
                    reason: format!("'{}' must be a single name without '/'", value),
                });
            }
        }
        if self.local_dir.as_os_str().is_empty() {
            return Err(WorkspaceError::InvalidConfig {
                field: "local_dir",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn upstream_repo(&self) -> Result<RepoRef> {
        Ok(self.upstream.parse()?)
    }

    pub fn fork_repo(&self) -> RepoRef {
        RepoRef::new(&self.fork_org, &self.fork_db)
    }

    /// Review branch for an item worked by this rig.
    pub fn branch_for(&self, item_id: &str) -> String {
        wl_board::branch_name(&self.rig_handle, item_id)
    }
}

/// Registry directory: `$WL_CONFIG_DIR`, else `<config dir>/wasteland`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join("wasteland"))
        .ok_or(WorkspaceError::NoConfigDir)
}

pub fn registry_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(REGISTRY_FILE))
}

/// All joined commons, keyed by `org/db`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRegistry {
    #[serde(default)]
    pub workspaces: BTreeMap<String, WorkspaceConfig>,
}

impl WorkspaceRegistry {
    /// Load the registry at `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(WorkspaceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let registry: Self = toml::from_str(&text).map_err(|source| WorkspaceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        for config in registry.workspaces.values() {
            config.validate()?;
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn join(&mut self, config: WorkspaceConfig) -> Result<()> {
        config.validate()?;
        if self.workspaces.contains_key(&config.upstream) {
            return Err(WorkspaceError::AlreadyJoined(config.upstream));
        }
        tracing::info!("joined {} as {}", config.upstream, config.rig_handle);
        self.workspaces.insert(config.upstream.clone(), config);
        Ok(())
    }

    pub fn leave(&mut self, key: &str) -> Result<WorkspaceConfig> {
        self.workspaces
            .remove(key)
            .ok_or_else(|| WorkspaceError::UnknownCommons(key.to_string()))
    }

    /// The workspace named by `key`, or the only joined one.
    pub fn resolve(&self, key: Option<&str>) -> Result<&WorkspaceConfig> {
        if let Some(key) = key {
            return self
                .workspaces
                .get(key)
                .ok_or_else(|| WorkspaceError::UnknownCommons(key.to_string()));
        }
        let mut all = self.workspaces.values();
        match (all.next(), all.next()) {
            (None, _) => Err(WorkspaceError::NotJoined),
            (Some(only), None) => Ok(only),
            (Some(_), Some(_)) => Err(WorkspaceError::Ambiguous(
                self.workspaces.keys().cloned().collect(),
            )),
        }
    }

    pub fn touch_sync(&mut self, key: &str, at: DateTime<Utc>) -> Result<()> {
        let config = self
            .workspaces
            .get_mut(key)
            .ok_or_else(|| WorkspaceError::UnknownCommons(key.to_string()))?;
        config.last_sync = Some(at);
        Ok(())
    }
}
