// Application settings
// Loaded from ~/.config/regmerge/settings.toml

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regmerge_recon::{ReconError, ReconOptions};
use serde::{Deserialize, Serialize};

use crate::secrets::{self, SecretSource, SecretSpec};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{0} still holds a placeholder value")]
    Placeholder(&'static str),
    #[error("{field} must be an http(s) URL, got '{value}'")]
    BadUrl { field: &'static str, value: String },
    #[error(transparent)]
    Options(#[from] ReconError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub api_url: String,
    pub token: String,
}

/// Azure OpenAI deployment used for identity extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub endpoint: String,
    pub key: String,
    pub deployment: String,
    pub api_version: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            key: String::new(),
            deployment: "gpt-35-turbo".to_string(),
            api_version: "2024-02-15-preview".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Fall back to pdftoppm + tesseract for scanned documents
    pub ocr: bool,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self { ocr: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub documents: DocumentSettings,
    pub openai: OpenAiSettings,
    pub extract: ExtractSettings,
    pub recon: ReconOptions,

    /// Where each credential came from, filled by `load`
    #[serde(skip)]
    pub secret_sources: BTreeMap<&'static str, SecretSource>,
}

impl Settings {
    /// Get the default settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("regmerge")
            .join("settings.toml")
    }

    pub fn from_toml(input: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load settings from `path` (or the default location), then apply
    /// `REGMERGE_*` environment overrides and resolve credentials.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &|name| std::env::var(name).ok())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        let mut settings = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            log::debug!("loaded settings from {}", path.display());
            Self::from_toml(&contents, &path)?
        } else if explicit {
            return Err(ConfigError::NotFound(path));
        } else {
            log::info!("no settings file at {}, using defaults", path.display());
            Self::default()
        };

        settings.apply_env(env)?;
        settings.resolve_secrets(env);
        Ok(settings)
    }

    /// Non-secret environment overrides.
    pub fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("REGMERGE_BASE_URL") {
            self.registry.base_url = v;
        }
        if let Some(v) = get("REGMERGE_DOCUMENT_API_URL") {
            self.documents.api_url = v;
        }
        if let Some(v) = get("REGMERGE_OPENAI_ENDPOINT") {
            self.openai.endpoint = v;
        }
        if let Some(v) = get("REGMERGE_OPENAI_DEPLOYMENT") {
            self.openai.deployment = v;
        }
        if let Some(v) = get("REGMERGE_SIMILARITY_THRESHOLD") {
            self.recon.similarity_threshold =
                v.parse().map_err(|_| ConfigError::Env {
                    var: "REGMERGE_SIMILARITY_THRESHOLD",
                    message: format!("expected an integer 0-100, got '{v}'"),
                })?;
        }
        if let Some(v) = get("REGMERGE_REQUEST_TIMEOUT") {
            self.recon.request_timeout_seconds = v.parse().map_err(|_| ConfigError::Env {
                var: "REGMERGE_REQUEST_TIMEOUT",
                message: format!("expected seconds, got '{v}'"),
            })?;
        }
        if let Some(v) = get("REGMERGE_ENABLE_NOTIFICATIONS") {
            self.recon.enable_notifications =
                parse_flag(&v).ok_or_else(|| ConfigError::Env {
                    var: "REGMERGE_ENABLE_NOTIFICATIONS",
                    message: format!("expected true/false, got '{v}'"),
                })?;
        }
        Ok(())
    }

    fn resolve_secrets(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        for spec in secrets::ALL {
            let current = self.secret_mut(&spec).clone();
            let lookup = secrets::resolve(&spec, &current, env);
            self.secret_sources.insert(spec.field, lookup.source);
            *self.secret_mut(&spec) = lookup.value.unwrap_or_default();
        }
    }

    fn secret_mut(&mut self, spec: &SecretSpec) -> &mut String {
        match spec.field {
            "registry.token" => &mut self.registry.token,
            "documents.token" => &mut self.documents.token,
            _ => &mut self.openai.key,
        }
    }

    pub fn secret_source(&self, field: &str) -> SecretSource {
        self.secret_sources
            .get(field)
            .copied()
            .unwrap_or(SecretSource::None)
    }

    /// Everything a full run needs: URLs, credentials, valid run options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("registry.base_url", &self.registry.base_url)?;
        require_secret("registry.token", &self.registry.token)?;
        require_url("documents.api_url", &self.documents.api_url)?;
        require_secret("documents.token", &self.documents.token)?;
        require_url("openai.endpoint", &self.openai.endpoint)?;
        require_secret("openai.key", &self.openai.key)?;
        if self.openai.deployment.trim().is_empty() {
            return Err(ConfigError::Missing("openai.deployment"));
        }
        self.recon.validate()?;
        Ok(())
    }
}

fn require_secret(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    if secrets::is_placeholder(value) {
        return Err(ConfigError::Placeholder(field));
    }
    Ok(())
}

fn require_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ConfigError::Missing(field));
    }
    if !(v.starts_with("https://") || v.starts_with("http://")) {
        return Err(ConfigError::BadUrl {
            field,
            value: v.to_string(),
        });
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
