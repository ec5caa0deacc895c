//! Named Chromium profiles: `(name, port, data_dir)` triples.
//!
//! One profile maps 1:1 onto a Chromium `--user-data-dir`. First-launch
//! detection (used by the launcher to decide whether to seed a fresh
//! profile directory) is "does `<data_dir>/Default/` exist yet".

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

pub fn is_filesystem_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl Profile {
    /// Whether Chromium has ever completed a first run against this
    /// profile's data directory.
    pub fn is_first_launch(&self) -> bool {
        !self.data_dir.join("Default").exists()
    }
}

/// Read/write access to the set of profiles in a `Config`, resolving each
/// to its on-disk data directory under `~/.helm/profiles/<name>/`.
pub struct ProfileStore;

impl ProfileStore {
    pub fn get(config: &Config, name: &str) -> Result<Profile> {
        let entry = config
            .profiles
            .get(name)
            .with_context(|| format!("no profile named '{name}' in config"))?;
        Ok(Profile {
            name: name.to_string(),
            port: entry.port,
            data_dir: Config::profiles_dir()?.join(name),
        })
    }

    pub fn default_profile(config: &Config) -> Result<Profile> {
        let name = config
            .default
            .as_deref()
            .or_else(|| config.profiles.keys().next().map(String::as_str))
            .context("no default profile configured and no profiles exist")?;
        Self::get(config, name)
    }

    /// Assign the lowest unused port at or above 9222 (Chrome's
    /// conventional default debugging port) and insert a new profile
    /// entry. Returns an error if `name` is already taken or not
    /// filesystem-safe.
    pub fn create(config: &mut Config, name: &str) -> Result<Profile> {
        if !is_filesystem_safe_name(name) {
            anyhow::bail!("profile name '{name}' must be lowercase alphanumerics, '-', or '_'");
        }
        if config.profiles.contains_key(name) {
            anyhow::bail!("profile '{name}' already exists");
        }
        let used: std::collections::HashSet<u16> =
            config.profiles.values().map(|p| p.port).collect();
        let mut port = 9222u16;
        while used.contains(&port) {
            port += 1;
        }
        config
            .profiles
            .insert(name.to_string(), crate::ProfileEntry { port });
        if config.default.is_none() {
            config.default = Some(name.to_string());
        }
        Self::get(config, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_names() {
        assert!(!is_filesystem_safe_name("My Profile"));
        assert!(!is_filesystem_safe_name(""));
        assert!(is_filesystem_safe_name("work-profile_2"));
    }

    #[test]
    fn create_assigns_unique_ports() {
        let mut config = Config::default();
        let p1 = ProfileStore::create(&mut config, "a").unwrap();
        let p2 = ProfileStore::create(&mut config, "b").unwrap();
        assert_ne!(p1.port, p2.port);
        assert_eq!(config.default.as_deref(), Some("a"));
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let mut config = Config::default();
        ProfileStore::create(&mut config, "a").unwrap();
        assert!(ProfileStore::create(&mut config, "a").is_err());
    }
}
