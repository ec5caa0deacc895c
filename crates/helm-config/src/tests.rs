use crate::{Config, ProfileStore};
use tempfile::TempDir;

#[test]
fn load_creates_default_config_on_first_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    assert!(!path.exists());

    let config = Config::load(Some(&path)).unwrap();
    assert!(path.exists());
    assert_eq!(config.agent.provider, "anthropic");
    assert!(config.agent.shell_enabled);
}

#[test]
fn load_round_trips_profiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    ProfileStore::create(&mut config, "work").unwrap();
    config.save(&path).unwrap();

    let reloaded = Config::load(Some(&path)).unwrap();
    assert_eq!(reloaded.default.as_deref(), Some("work"));
    assert_eq!(reloaded.profiles.len(), 1);
    assert_eq!(reloaded.profiles["work"].port, 9222);
}

#[test]
fn validate_rejects_duplicate_ports() {
    let mut config = Config::default();
    config
        .profiles
        .insert("a".into(), crate::ProfileEntry { port: 9222 });
    config
        .profiles
        .insert("b".into(), crate::ProfileEntry { port: 9222 });
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_unknown_default() {
    let mut config = Config::default();
    config.default = Some("ghost".into());
    assert!(config.validate().is_err());
}

#[test]
fn save_is_atomic_write_temp_then_rename() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let config = Config::default();
    config.save(&path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());
}
