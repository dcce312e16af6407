use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tempo_core::QuietHours;
use tempo_core::workload::HISTORY_LIMIT;

use crate::state::ensure_tempo_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub plugins: PluginsSection,
    #[serde(default)]
    pub reminders: RemindersSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// IANA timezone used for working hours and day boundaries.
    pub timezone: String,
    /// Completed tasks loaded into the duration predictor.
    pub history_limit: usize,
    /// User id tasks are stored under.
    pub user: String,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            history_limit: HISTORY_LIMIT,
            user: "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsSection {
    /// Plugin ids kept disabled across runs.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Falls back to `WEATHER_API_KEY` when unset.
    pub weather_api_key: Option<String>,
    pub weather_location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersSection {
    /// Local hours in which only HIGH-priority reminders are shown.
    #[serde(default)]
    pub quiet_hours: QuietHours,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// trace | debug | info | warn | error
    pub level: Option<String>,
}

impl PluginsSection {
    pub fn weather_api_key(&self) -> Option<String> {
        self.weather_api_key
            .clone()
            .or_else(|| std::env::var("WEATHER_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    pub fn set_disabled(&mut self, id: &str, disabled: bool) {
        self.disabled.retain(|d| d != id);
        if disabled {
            self.disabled.push(id.to_string());
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tempo_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[plugins]\ndisabled = [\"weather-plugin\"]\n").unwrap();
        assert_eq!(cfg.plugins.disabled, vec!["weather-plugin"]);
        assert_eq!(cfg.planner.timezone, "UTC");
        assert_eq!(cfg.planner.history_limit, HISTORY_LIMIT);
        assert!(cfg.logging.level.is_none());
        assert_eq!(cfg.reminders.quiet_hours, QuietHours::default());
    }

    #[test]
    fn test_quiet_hours_are_configurable() {
        let cfg: Config = toml::from_str("[reminders.quiet_hours]\nstart = 23\nend = 6\n").unwrap();
        assert_eq!(cfg.reminders.quiet_hours, QuietHours { start: 23, end: 6 });
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let s = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.planner.user, "local");
    }

    #[test]
    fn test_set_disabled_does_not_duplicate() {
        let mut p = PluginsSection::default();
        p.set_disabled("a", true);
        p.set_disabled("a", true);
        assert_eq!(p.disabled, vec!["a"]);
        p.set_disabled("a", false);
        assert!(p.disabled.is_empty());
    }
}
