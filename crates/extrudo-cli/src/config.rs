//! TOML configuration file.

use anyhow::{Context, Result};
use extrudo_gcode::MachineProfile;
use extrudo_toolpath::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anti-ooze keys taken from the machine's retraction values unless set.
const MACHINE_ANTIOOZE_KEYS: [&str; 3] = ["amount", "speed", "z_lift"];

/// Everything a run can be configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Built-in machine profile key.
    pub profile: Option<String>,
    /// Engine settings.
    pub engine: EngineSettings,
    /// Full machine description, overriding `profile`.
    pub machine: Option<MachineProfile>,
    /// Keys present in the file's `[engine.antiooze]` table.
    #[serde(skip)]
    antiooze_keys: Vec<String>,
}

impl Config {
    /// Read a config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse config text.
    pub fn parse(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        let antiooze_keys = table
            .get("engine")
            .and_then(|engine| engine.get("antiooze"))
            .and_then(|antiooze| antiooze.as_table())
            .map(|antiooze| antiooze.keys().cloned().collect())
            .unwrap_or_default();
        let mut config: Config = toml::Value::Table(table).try_into()?;
        config.antiooze_keys = antiooze_keys;
        Ok(config)
    }

    /// Engine settings for a machine: retraction amount, speed and Z hop
    /// come from the machine unless the file sets them.
    pub fn engine_for(&self, machine: &MachineProfile) -> EngineSettings {
        let mut engine = self.engine.clone();
        let seeded = machine.antiooze_defaults();
        for key in MACHINE_ANTIOOZE_KEYS {
            if self.antiooze_keys.iter().any(|k| k == key) {
                continue;
            }
            match key {
                "amount" => engine.antiooze.amount = seeded.amount,
                "speed" => engine.antiooze.speed = seeded.speed,
                _ => engine.antiooze.z_lift = seeded.z_lift,
            }
        }
        engine
    }

    /// Machine to emit for. A key given on the command line wins, then the
    /// `[machine]` table, then `profile`.
    pub fn machine(&self, key_override: Option<&str>) -> Result<MachineProfile> {
        if let Some(key) = key_override {
            return Ok(MachineProfile::by_key(key)?);
        }
        if let Some(machine) = &self.machine {
            return Ok(machine.clone());
        }
        match &self.profile {
            Some(key) => Ok(MachineProfile::by_key(key)?),
            None => Ok(MachineProfile::generic()),
        }
    }

    /// Default configuration as TOML.
    pub fn default_toml() -> Result<String> {
        let config = Config {
            profile: Some("generic".into()),
            ..Default::default()
        };
        Ok(toml::to_string_pretty(&config)?)
    }
}
