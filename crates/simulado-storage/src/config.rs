//! Configuration loading and the storage factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use simulado_core::memory::MemoryStorage;
use simulado_core::selector::SelectionPolicy;
use simulado_core::traits::Storage;

use crate::firestore::FirestoreStorage;
use crate::sqlite::SqliteStorage;

/// Which persistence backend to run against.
///
/// Note: Custom Debug impl masks the Firestore access token.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local storage, lost on exit.
    Memory,
    Sqlite {
        #[serde(default = "default_db_path")]
        path: PathBuf,
    },
    Firestore {
        project_id: String,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default)]
        access_token: Option<String>,
        /// Emulator or proxy base URL.
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::Memory => f.write_str("Memory"),
            StorageConfig::Sqlite { path } => f.debug_struct("Sqlite").field("path", path).finish(),
            StorageConfig::Firestore {
                project_id,
                database,
                access_token,
                base_url,
            } => f
                .debug_struct("Firestore")
                .field("project_id", project_id)
                .field("database", database)
                .field("access_token", &access_token.as_ref().map(|_| "***"))
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("simulado.db")
}

fn default_database() -> String {
    "(default)".to_string()
}

/// How request identities are established.
///
/// Note: Custom Debug impl masks bearer tokens.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityConfig {
    /// Fixed bearer-token table: token -> user id.
    Static {
        #[serde(default)]
        tokens: HashMap<String, String>,
    },
    /// Trust a header set by an authenticating proxy in front of the server.
    TrustedHeader {
        #[serde(default = "default_identity_header")]
        header: String,
    },
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityConfig::Static { tokens } => f
                .debug_struct("Static")
                .field("tokens", &format!("<{} tokens>", tokens.len()))
                .finish(),
            IdentityConfig::TrustedHeader { header } => f
                .debug_struct("TrustedHeader")
                .field("header", header)
                .finish(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig::Static {
            tokens: HashMap::new(),
        }
    }
}

fn default_identity_header() -> String {
    "x-user-id".to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

/// Top-level simulado configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimuladoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Exam generation thresholds and defaults.
    #[serde(default)]
    pub selection: SelectionPolicy,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_storage_config(config: &StorageConfig) -> StorageConfig {
    match config {
        StorageConfig::Memory => StorageConfig::Memory,
        StorageConfig::Sqlite { path } => StorageConfig::Sqlite {
            path: PathBuf::from(resolve_env_vars(&path.to_string_lossy())),
        },
        StorageConfig::Firestore {
            project_id,
            database,
            access_token,
            base_url,
        } => StorageConfig::Firestore {
            project_id: resolve_env_vars(project_id),
            database: resolve_env_vars(database),
            access_token: access_token.as_ref().map(|t| resolve_env_vars(t)),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
    }
}

fn resolve_identity_config(config: &IdentityConfig) -> IdentityConfig {
    match config {
        IdentityConfig::Static { tokens } => IdentityConfig::Static {
            tokens: tokens
                .iter()
                .map(|(token, user)| (resolve_env_vars(token), user.clone()))
                .collect(),
        },
        IdentityConfig::TrustedHeader { header } => IdentityConfig::TrustedHeader {
            header: header.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `simulado.toml` in the current directory
/// 2. `~/.config/simulado/config.toml`
///
/// Environment variable overrides: `SIMULADO_BIND`, `SIMULADO_DB_PATH`,
/// `SIMULADO_FIRESTORE_TOKEN`.
pub fn load_config() -> Result<SimuladoConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SimuladoConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("simulado.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SimuladoConfig::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse and resolve `${VAR}` references, without env overrides.
pub fn parse_config(content: &str) -> Result<SimuladoConfig> {
    let mut config: SimuladoConfig = toml::from_str(content)?;
    config.server.bind = resolve_env_vars(&config.server.bind);
    config.storage = resolve_storage_config(&config.storage);
    config.identity = resolve_identity_config(&config.identity);
    validate(&config)?;
    Ok(config)
}

fn validate(config: &SimuladoConfig) -> Result<()> {
    let s = &config.selection;
    if s.default_total_questions == 0 {
        anyhow::bail!("selection.default_total_questions must be at least 1");
    }
    if let Some(max) = s.max_total_questions {
        if s.default_total_questions > max {
            anyhow::bail!(
                "selection.default_total_questions ({}) exceeds selection.max_total_questions ({max})",
                s.default_total_questions
            );
        }
    }
    if s.easy_below > s.hard_above {
        anyhow::bail!(
            "selection.easy_below ({}) must not exceed selection.hard_above ({})",
            s.easy_below,
            s.hard_above
        );
    }
    Ok(())
}

fn apply_env_overrides(config: &mut SimuladoConfig) {
    if let Ok(bind) = std::env::var("SIMULADO_BIND") {
        config.server.bind = bind;
    }

    if let Ok(path) = std::env::var("SIMULADO_DB_PATH") {
        config.storage = StorageConfig::Sqlite {
            path: PathBuf::from(path),
        };
    }

    if let Ok(token) = std::env::var("SIMULADO_FIRESTORE_TOKEN") {
        if let StorageConfig::Firestore { access_token, .. } = &mut config.storage {
            *access_token = Some(token);
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("simulado"))
}

/// Create a storage backend from its configuration.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageConfig::Sqlite { path } => {
            let storage = SqliteStorage::open(path)
                .with_context(|| format!("failed to open sqlite database: {}", path.display()))?;
            Ok(Arc::new(storage))
        }
        StorageConfig::Firestore {
            project_id,
            database,
            access_token,
            base_url,
        } => {
            if project_id.trim().is_empty() {
                anyhow::bail!("firestore storage requires a project_id");
            }
            Ok(Arc::new(FirestoreStorage::new(
                project_id,
                database,
                access_token.clone(),
                base_url.clone(),
            )))
        }
    }
}
