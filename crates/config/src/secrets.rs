// Credential lookup
//
// Tokens and keys are resolved in order:
// 1. Environment variable (REGMERGE_API_TOKEN, etc.)
// 2. settings.toml
// 3. System keychain (when built with the `keychain` feature)
//
// Values are never logged; only their source is reported.

/// Service name for keychain storage
#[cfg_attr(not(feature = "keychain"), allow(dead_code))]
const KEYCHAIN_SERVICE: &str = "regmerge";

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    File,
    Keychain,
    /// No value found
    None,
}

impl SecretSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSource::Environment => "environment",
            SecretSource::File => "settings file",
            SecretSource::Keychain => "keychain",
            SecretSource::None => "none",
        }
    }
}

/// Result of a credential lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretLookup {
    pub value: Option<String>,
    pub source: SecretSource,
}

impl SecretLookup {
    pub fn missing() -> Self {
        Self {
            value: None,
            source: SecretSource::None,
        }
    }
}

/// A configured credential: settings key, environment variable, keychain account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretSpec {
    pub field: &'static str,
    pub env_var: &'static str,
    pub account: &'static str,
}

pub const REGISTRY_TOKEN: SecretSpec = SecretSpec {
    field: "registry.token",
    env_var: "REGMERGE_API_TOKEN",
    account: "registry/token",
};

pub const DOCUMENT_TOKEN: SecretSpec = SecretSpec {
    field: "documents.token",
    env_var: "REGMERGE_DA_API_TOKEN",
    account: "documents/token",
};

pub const OPENAI_KEY: SecretSpec = SecretSpec {
    field: "openai.key",
    env_var: "REGMERGE_OPENAI_KEY",
    account: "openai/key",
};

pub const ALL: [SecretSpec; 3] = [REGISTRY_TOKEN, DOCUMENT_TOKEN, OPENAI_KEY];

/// Resolve one credential from the environment, the settings file value, then
/// the keychain. `env` is injected so callers and tests control the lookup.
pub fn resolve(
    spec: &SecretSpec,
    file_value: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> SecretLookup {
    if let Some(value) = env(spec.env_var).filter(|v| !v.trim().is_empty()) {
        return SecretLookup {
            value: Some(value),
            source: SecretSource::Environment,
        };
    }

    if !file_value.trim().is_empty() {
        return SecretLookup {
            value: Some(file_value.to_string()),
            source: SecretSource::File,
        };
    }

    keychain_lookup(spec)
}

#[cfg(feature = "keychain")]
fn keychain_lookup(spec: &SecretSpec) -> SecretLookup {
    if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, spec.account) {
        if let Ok(value) = entry.get_password() {
            return SecretLookup {
                value: Some(value),
                source: SecretSource::Keychain,
            };
        }
    }
    SecretLookup::missing()
}

#[cfg(not(feature = "keychain"))]
fn keychain_lookup(_spec: &SecretSpec) -> SecretLookup {
    SecretLookup::missing()
}

/// Store a credential in the system keychain
#[cfg(feature = "keychain")]
pub fn set_secret(spec: &SecretSpec, value: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, spec.account)
        .map_err(|e| format!("Failed to create keychain entry: {}", e))?;

    entry
        .set_password(value)
        .map_err(|e| format!("Failed to store {} in keychain: {}", spec.field, e))
}

#[cfg(not(feature = "keychain"))]
pub fn set_secret(spec: &SecretSpec, _value: &str) -> Result<(), String> {
    Err(format!(
        "Keychain support not enabled. Set {} instead.",
        spec.env_var
    ))
}

/// Check if keychain support is available
pub fn keychain_available() -> bool {
    #[cfg(feature = "keychain")]
    {
        keyring::Entry::new(KEYCHAIN_SERVICE, "test").is_ok()
    }
    #[cfg(not(feature = "keychain"))]
    {
        false
    }
}

/// Template values such as `YOUR_API_TOKEN_HERE` or `<token>`.
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    let upper = v.to_ascii_uppercase();
    (upper.starts_with("YOUR_") && upper.ends_with("_HERE")) || (v.starts_with('<') && v.ends_with('>'))
}
