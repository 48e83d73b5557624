//! Root folder resolution and config loading
//!
//! Tests that manipulate EAR_ROOT_FOLDER are marked #[serial] so they do not
//! race each other on the process environment.

use ear_common::config::{load_toml, resolve_root_folder, ROOT_FOLDER_ENV};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_var_beats_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&config_path));
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_config_file_used_when_env_missing() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&config_path));

    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_malformed_config_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "root_folder = [not toml").unwrap();

    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&config_path));

    assert_eq!(resolved, ear_common::config::default_root_folder());
}

#[test]
fn test_load_toml_typed() {
    #[derive(Deserialize)]
    struct Section {
        tick_ms: u64,
    }

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, "tick_ms = 2000\n").unwrap();

    let section: Section = load_toml(Path::new(&path)).unwrap();
    assert_eq!(section.tick_ms, 2000);
}
