//! Integration tests for configuration files applied at context creation

use super::test_utils::{global_records_for, tracking_registry};
use ckptio::config::ConfigValue;
use ckptio::context::{ContextBuilder, KEY_VERBOSE};
use ckptio::error::ErrorKind;
use ckptio::logging::VERBOSE_MAX;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("ckptio.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_file_overrides_context_variables() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
context_verbose = 20
context_checkpoint_size = 1048576
context_print_statistics = false
context_data_roots = "track:/burst,track:/pfs"
"#,
    );

    let (registry, tracker) = tracking_registry();
    let context = ContextBuilder::new("cfgfile")
        .registry(registry)
        .config_file(&path)
        .default_data_roots("track:/ignored")
        .build()
        .unwrap();

    assert_eq!(context.verbosity(), 20);
    assert_eq!(context.checkpoint_size(), 1_048_576);
    assert!(!context.print_statistics());
    assert_eq!(context.data_roots(), "track:/burst,track:/pfs");
    let roots: Vec<&str> = context.modules().map(|m| m.data_root()).collect();
    assert_eq!(roots, vec!["track:/burst", "track:/pfs"]);
    assert_eq!(tracker.created(), 2);

    // every entry was consumed by a context variable
    assert!(context.file_configuration().is_empty());

    context.destroy().unwrap();
}

#[test]
fn test_file_verbosity_is_clamped() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "context_verbose = 500\n");

    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("cfgclamp")
        .registry(registry)
        .config_file(&path)
        .default_data_roots("track:/a")
        .build()
        .unwrap();

    assert_eq!(context.verbosity(), VERBOSE_MAX);
    assert_eq!(
        context.config_value(KEY_VERBOSE),
        Some(ConfigValue::UInt32(VERBOSE_MAX))
    );
    context.destroy().unwrap();
}

#[test]
fn test_entries_for_other_objects_are_retained() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
context_verbose = 10

[cfgretain_dataset]
dataset_buffer_size = 4096
"#,
    );

    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("cfgretain")
        .registry(registry)
        .config_file(&path)
        .default_data_roots("track:/a")
        .build()
        .unwrap();

    assert_eq!(context.verbosity(), 10);
    let pending = context.file_configuration();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].object_identifier, "cfgretain_dataset");
    assert_eq!(pending[0].key, "dataset_buffer_size");
    assert_eq!(pending[0].value, "4096");

    context.destroy().unwrap();
}

#[test]
fn test_prefix_selects_file_section() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
context_verbose = 90

[app]
context_verbose = 50
context_data_roots = "track:/app"
"#,
    );

    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("cfgprefix")
        .registry(registry.clone())
        .config_file(&path)
        .config_prefix("app")
        .default_data_roots("track:/default")
        .build()
        .unwrap();
    assert_eq!(context.verbosity(), 50);
    assert_eq!(context.data_roots(), "track:/app");
    context.destroy().unwrap();

    // a prefix the file does not contain leaves the defaults
    let context = ContextBuilder::new("cfgprefix")
        .registry(registry)
        .config_file(&path)
        .config_prefix("missing")
        .default_data_roots("track:/default")
        .build()
        .unwrap();
    assert_eq!(context.verbosity(), 0);
    assert_eq!(context.data_roots(), "track:/default");
    context.destroy().unwrap();
}

#[test]
fn test_missing_file_fails_creation() {
    let temp_dir = TempDir::new().unwrap();
    let (registry, tracker) = tracking_registry();
    let err = ContextBuilder::new("cfgmissing")
        .registry(registry.clone())
        .config_file(temp_dir.path().join("absent.toml"))
        .default_data_roots("track:/a")
        .build()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(tracker.created(), 0);
    assert_eq!(registry.references(), 0);
    assert!(!global_records_for("cfgmissing").is_empty());
}

#[test]
fn test_invalid_override_value_fails_creation() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "context_checkpoint_size = \"lots\"\n");

    let (registry, tracker) = tracking_registry();
    let err = ContextBuilder::new("cfginvalid")
        .registry(registry.clone())
        .config_file(&path)
        .default_data_roots("track:/a")
        .build()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(tracker.created(), 0);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_file_cannot_unlock_read_only_data_roots() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "context_data_roots = \"track:/file\"\n");

    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("cfgreadonly")
        .registry(registry)
        .config_file(&path)
        .default_data_roots("track:/default")
        .build()
        .unwrap();

    assert_eq!(context.data_roots(), "track:/file");
    let err = context
        .set_config(
            "context_data_roots",
            ConfigValue::String("track:/other".to_string()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(context.data_roots(), "track:/file");
    context.destroy().unwrap();
}
