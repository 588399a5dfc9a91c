// Configuration loading

pub mod secrets;
pub mod settings;

pub use secrets::{SecretLookup, SecretSource};
pub use settings::{
    ConfigError, DocumentSettings, ExtractSettings, OpenAiSettings, RegistrySettings, Settings,
};
