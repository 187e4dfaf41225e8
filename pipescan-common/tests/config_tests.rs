//! Configuration resolution tests
//!
//! Covers graceful degradation (missing or broken TOML never aborts startup)
//! and the root folder priority order.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PIPESCAN_ROOT_FOLDER are marked with #[serial].

use pipescan_common::config::{
    load_or_default, load_toml_config, write_toml_config, CompiledDefaults, ConfigSource,
    RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV,
};
use pipescan_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.ends_with("pipescan") || defaults.root_folder.ends_with("pipescan_data"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pipescan-env-root");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pipescan-toml-root")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml(&config)
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/pipescan-env-root"));
}

#[test]
#[serial]
fn test_resolver_cli_arg_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pipescan-env-root");

    let root_folder = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/pipescan-cli-root")))
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root_folder, PathBuf::from("/tmp/pipescan-cli-root"));
}

#[test]
#[serial]
fn test_resolver_falls_back_to_toml() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pipescan-toml-root")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new("test-module")
        .with_toml(&config)
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/pipescan-toml-root"));
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does-not-exist.toml");
    let (config, source) = load_or_default(Some(&path));

    assert!(config.root_folder.is_none());
    assert_eq!(config.analysis.merge_tolerance, 0.5);
    assert_eq!(source, ConfigSource::Missing(path));
}

#[test]
fn test_broken_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(&err, Error::Config { path: p, .. } if p == &path));

    let (config, source) = load_or_default(Some(&path));
    assert_eq!(config.ollama.vision_model, "qwen2.5vl:7b");
    match source {
        ConfigSource::Invalid { path: p, reason } => {
            assert_eq!(p, path);
            assert!(reason.contains("config.toml"), "reason was {}", reason);
        }
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
fn test_valid_config_file_reports_its_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[analysis]\nfew_shot_k = 5\n").unwrap();

    let (config, source) = load_or_default(Some(&path));
    assert_eq!(config.analysis.few_shot_k, 5);
    assert_eq!(source, ConfigSource::File(path));
}

#[test]
fn test_write_then_load_preserves_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.ollama.base_url = "http://gpu-box:11434".to_string();
    config.sampling.range_sample_count = 7;

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded.ollama.base_url, "http://gpu-box:11434");
    assert_eq!(loaded.sampling.range_sample_count, 7);
}

#[test]
fn test_initializer_creates_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("a").join("b");

    let init = RootFolderInitializer::new(root.clone());
    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(init.knowledge_base_path(), root.join("knowledge_base.db"));
}
