use config::{Config, ConfigError, Environment, File};
use portaria_core::settings::{backend::BackendSettings, feed::FeedSettings, store::StoreSettings};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub feed: FeedSettings,
}

impl Settings {
    pub fn get_environment() -> Environment {
        Environment::default()
            .prefix("PORTARIA")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("PORTARIA_RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("backend.kind", "yaml")?
            .set_default("backend.data_file", "config/grants.yaml")?
            .set_default("store.load_timeout_seconds", 10u64)?
            .set_default("feed.buffer_size", 16u64)?
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::get_environment());

        let s = builder.build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portaria_core::settings::backend::BackendKind;

    #[test]
    fn test_settings_from_file() {
        let builder = Config::builder().add_source(config::File::with_name("tests/test_settings.yaml"));

        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();
        assert!(settings.debug);
        assert_eq!(settings.backend.kind, BackendKind::Memory);
        assert_eq!(settings.backend.data_file, "tests/test_grants.yaml");
        assert_eq!(settings.store.load_timeout_seconds, 3);
        assert_eq!(settings.feed.buffer_size, 4);
    }

    #[test]
    fn test_settings_defaults_when_sections_missing() {
        let builder = Config::builder()
            .add_source(config::File::from_str("debug: false", config::FileFormat::Yaml));

        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();
        assert_eq!(settings.backend.kind, BackendKind::Yaml);
        assert_eq!(settings.store.load_timeout_seconds, 10);
        assert_eq!(settings.feed.buffer_size, 16);
    }

    #[test]
    fn test_environment_overrides_file() {
        env::set_var("PORTARIA__STORE__LOAD_TIMEOUT_SECONDS", "42");

        let builder = Config::builder()
            .add_source(config::File::with_name("tests/test_settings.yaml"))
            .add_source(Settings::get_environment());
        let settings: Settings = builder.build().unwrap().try_deserialize().unwrap();

        env::remove_var("PORTARIA__STORE__LOAD_TIMEOUT_SECONDS");

        assert_eq!(settings.store.load_timeout_seconds, 42);
        assert_eq!(settings.feed.buffer_size, 4);
    }
}
