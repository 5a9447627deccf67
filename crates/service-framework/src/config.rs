//! # Runtime Configuration
//!
//! TOML configuration for the container and per-environment service overrides.
//!
//! ```toml
//! [container]
//! buffer_size = 64
//! startup_timeout_ms = 5000
//! detect_cycles = true
//!
//! [services.stage]
//! priority = 20
//! config = "stage"
//!
//! [services.understudy]
//! base = "tobias"
//! priority = -1
//!
//! [values.stage]
//! name = "Main Stage"
//! ```
//!
//! A `services` entry whose id is already registered overrides that record in
//! place. An entry with a `base` derives a new service from the base record,
//! under a freshly minted identity. `values` are handed to factories whose
//! record names them through `config`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::identity::IdentityRegistry;
use crate::record::{RecordOverrides, ServiceRecord};

fn default_buffer_size() -> usize {
    32
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    pub buffer_size: usize,
    pub startup_timeout_ms: Option<u64>,
    pub detect_cycles: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            startup_timeout_ms: None,
            detect_cycles: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceOverride {
    /// Derive a new service from this registered id.
    pub base: Option<String>,
    #[serde(flatten)]
    pub overrides: RecordOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub container: ContainerSettings,
    pub services: BTreeMap<String, ServiceOverride>,
    pub values: BTreeMap<String, toml::Value>,
}

impl RuntimeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        info!(
            path = %path.display(),
            services = config.services.len(),
            values = config.values.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.container.startup_timeout_ms.map(Duration::from_millis)
    }

    /// Applies the `services` table to scanned records, ahead of registration.
    ///
    /// Overrides of existing ids replace the record in place. Derived services
    /// are appended in id order.
    pub fn apply_overrides(
        &self,
        records: Vec<ServiceRecord>,
        identities: &mut IdentityRegistry,
    ) -> Result<Vec<ServiceRecord>, ConfigError> {
        let mut records: Vec<ServiceRecord> = records
            .into_iter()
            .map(|record| match self.services.get(&record.id) {
                Some(entry) if entry.base.is_none() => {
                    debug!(service = %record.id, overrides = ?entry.overrides, "Overriding service");
                    record.clone_with(&entry.overrides)
                }
                _ => record,
            })
            .collect();

        for (id, entry) in &self.services {
            let Some(base) = &entry.base else {
                if !records.iter().any(|record| &record.id == id) {
                    warn!(service = %id, "Override for unknown service ignored");
                }
                continue;
            };
            let Some(base_record) = records.iter().find(|record| &record.id == base) else {
                return Err(ConfigError::UnknownBase {
                    id: id.clone(),
                    base: base.clone(),
                });
            };
            let derived = base_record.clone_as_new_service(identities, id, &entry.overrides);
            info!(service = %id, base = %base, gid = %derived.gid, "Derived service");
            records.push(derived);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{Bootstrap, Component, Declarer, ServiceDecl};

    struct Lamp;

    impl Component for Lamp {
        fn construct() -> Option<Self> {
            Some(Lamp)
        }

        fn declare(d: &mut Declarer<'_, Self>) {
            d.service(ServiceDecl::new("lamp").priority(1).interface("light"));
        }
    }

    const BUNDLE: &str = r#"
        [container]
        startup_timeout_ms = 250
        detect_cycles = true

        [services.lamp]
        priority = 7
        config = "lamp"

        [services.spare-lamp]
        base = "lamp"
        disabled = true

        [values.lamp]
        watts = 40
    "#;

    #[test]
    fn parses_container_settings_and_values() {
        let config = RuntimeConfig::from_toml_str(BUNDLE).expect("valid bundle");
        assert_eq!(config.container.buffer_size, 32);
        assert_eq!(config.startup_timeout(), Some(Duration::from_millis(250)));
        assert!(config.container.detect_cycles);
        assert_eq!(config.services["spare-lamp"].base.as_deref(), Some("lamp"));
        assert_eq!(
            config.values["lamp"].get("watts").and_then(toml::Value::as_integer),
            Some(40)
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").expect("empty is valid");
        assert_eq!(config.container, ContainerSettings::default());
        assert!(config.services.is_empty());
        assert_eq!(config.startup_timeout(), None);
    }

    #[test]
    fn overrides_and_derives_records() {
        let config = RuntimeConfig::from_toml_str(BUNDLE).expect("valid bundle");
        let mut bootstrap = Bootstrap::new();
        bootstrap.scan::<Lamp>();
        let records = bootstrap.records().expect("lamp normalizes");

        let records = config
            .apply_overrides(records, bootstrap.identities_mut())
            .expect("overrides apply");
        assert_eq!(records.len(), 2);

        let lamp = &records[0];
        assert_eq!(lamp.priority, 7);
        assert_eq!(lamp.config_id.as_deref(), Some("lamp"));

        let spare = &records[1];
        assert_eq!(spare.id, "spare-lamp");
        assert!(spare.disabled);
        assert_eq!(spare.priority, 7);
        assert_eq!(spare.interfaces, ["light"]);
        assert_ne!(spare.gid, lamp.gid);
    }

    #[test]
    fn unknown_base_is_an_error() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [services.ghost]
            base = "nobody"
            "#,
        )
        .expect("valid toml");
        let result = config.apply_overrides(Vec::new(), &mut IdentityRegistry::new());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownBase { ref base, .. }) if base == "nobody"
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("[container\nbuffer_size = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
