use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// `$TEMPO_HOME`, or `~/.tempo`.
pub fn tempo_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TEMPO_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tempo"))
}

pub fn ensure_tempo_home() -> Result<PathBuf> {
    let dir = tempo_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn tasks_path() -> Result<PathBuf> {
    Ok(ensure_tempo_home()?.join("tasks.json"))
}

pub fn preferences_path() -> Result<PathBuf> {
    Ok(ensure_tempo_home()?.join("preferences.json"))
}

pub fn events_path() -> Result<PathBuf> {
    Ok(ensure_tempo_home()?.join("events.json"))
}

/// Read a JSON file, or `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value = serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Raw file contents, or `None` if it does not exist.
pub fn read_raw(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(s))
}
