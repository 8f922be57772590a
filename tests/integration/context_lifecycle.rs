//! Integration tests for context creation, module binding and teardown

use super::test_utils::{global_records_for, tracking_registry, FAIL_FINI};
use ckptio::component::ComponentRegistry;
use ckptio::config::ConfigValue;
use ckptio::context::{destroy_context, ContextBuilder, KEY_DATA_ROOTS, KEY_VERBOSE};
use ckptio::error::ErrorKind;
use ckptio::logging::VERBOSE_ERROR;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_single_process_default_data_roots_create_destroy() {
    let registry = Arc::new(ComponentRegistry::new());
    let context = ContextBuilder::new("lifecycle-default")
        .registry(registry.clone())
        .build()
        .unwrap();

    let cwd = std::env::current_dir().unwrap();
    assert!(context.is_active());
    assert_eq!(context.data_roots(), format!("posix:{}", cwd.display()));
    assert_eq!(context.module_count(), 1);
    assert_eq!(context.rank(), 0);
    assert_eq!(context.size(), 1);
    assert_eq!(context.verbosity(), VERBOSE_ERROR);
    assert_eq!(context.checkpoint_size(), 0);
    assert!(!context.print_statistics());
    assert!(context.communicator().is_none());
    assert_eq!(registry.references(), 1);

    let mut slot = Some(context);
    destroy_context(&mut slot).unwrap();
    assert!(slot.is_none());
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_destroy_finalizes_modules_in_order() {
    let (registry, tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-order")
        .registry(registry.clone())
        .default_data_roots("track:/a,track:/b,track:/c")
        .build()
        .unwrap();
    assert_eq!(tracker.live(), 3);

    let mut slot = Some(context);
    destroy_context(&mut slot).unwrap();
    assert_eq!(tracker.live(), 0);
    assert_eq!(tracker.finalized(), vec!["track:/a", "track:/b", "track:/c"]);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_destroy_nulls_handle_when_module_fini_fails() {
    let (registry, tracker) = tracking_registry();
    let failing = format!("track:/{}", FAIL_FINI);
    let context = ContextBuilder::new("lifecycle-fini-failure")
        .registry(registry.clone())
        .default_data_roots(format!("{},track:/b", failing))
        .build()
        .unwrap();

    let mut slot = Some(context);
    let err = destroy_context(&mut slot).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generic);
    assert!(slot.is_none());

    // the failure did not stop the remaining steps
    assert_eq!(tracker.finalized(), vec![failing.clone(), "track:/b".to_string()]);
    assert_eq!(tracker.live(), 0);
    assert_eq!(registry.references(), 0);

    let records = global_records_for("lifecycle-fini-failure");
    assert!(records
        .iter()
        .any(|r| r.module.as_deref() == Some(failing.as_str())));

    // destroying the emptied slot again is a no-op
    assert!(destroy_context(&mut slot).is_ok());
}

#[test]
fn test_module_table_capacity_is_a_soft_limit() {
    let (registry, tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-capacity")
        .registry(registry)
        .default_data_roots("track:/a,track:/b,track:/c")
        .max_data_roots(2)
        .build()
        .unwrap();

    let roots: Vec<&str> = context.modules().map(|m| m.data_root()).collect();
    assert_eq!(roots, vec!["track:/a", "track:/b"]);
    assert_eq!(tracker.created(), 2);

    let warnings: Vec<_> = context
        .errors()
        .records()
        .into_iter()
        .filter(|r| r.kind == ErrorKind::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("Maximum number of io modules"));

    context.destroy().unwrap();
    assert_eq!(tracker.live(), 0);
}

#[test]
fn test_exact_capacity_does_not_warn() {
    let (registry, tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-exact-capacity")
        .registry(registry)
        .default_data_roots("track:/a,track:/b")
        .max_data_roots(2)
        .build()
        .unwrap();

    assert_eq!(context.module_count(), 2);
    assert_eq!(tracker.created(), 2);
    assert!(context
        .errors()
        .records()
        .iter()
        .all(|r| r.kind != ErrorKind::Warning));

    context.destroy().unwrap();
}

#[test]
fn test_unknown_data_root_fails_and_releases_everything() {
    let (registry, tracker) = tracking_registry();
    let err = ContextBuilder::new("lifecycle-bogus")
        .registry(registry.clone())
        .default_data_roots("track:/a,bogus:/x")
        .build()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("bogus:/x"));
    assert_eq!(tracker.created(), 1);
    assert_eq!(tracker.live(), 0);
    assert_eq!(tracker.finalized(), vec!["track:/a"]);
    assert_eq!(registry.references(), 0);

    let records = global_records_for("lifecycle-bogus");
    assert!(records
        .iter()
        .any(|r| r.kind == ErrorKind::NotFound && r.message.contains("bogus:/x")));
}

#[test]
fn test_posix_then_bogus_data_root_fails() {
    let registry = Arc::new(ComponentRegistry::new());
    let err = ContextBuilder::new("lifecycle-posix-bogus")
        .registry(registry.clone())
        .default_data_roots("posix:/a,bogus:/x")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_empty_data_roots_rejected() {
    let (registry, _tracker) = tracking_registry();
    let err = ContextBuilder::new("lifecycle-empty-roots")
        .registry(registry.clone())
        .default_data_roots(" , ")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_empty_identifier_rejected() {
    let (registry, _tracker) = tracking_registry();
    let err = ContextBuilder::new("")
        .registry(registry.clone())
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParameter);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_select_module_self_heals_unset_index() {
    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-select")
        .registry(registry)
        .default_data_roots("track:/only")
        .build()
        .unwrap();

    assert_eq!(context.current_module_index(), Some(0));
    for _ in 0..3 {
        assert_eq!(context.select_module().data_root(), "track:/only");
    }

    context.reset_module_selection();
    assert_eq!(context.current_module_index(), None);
    assert_eq!(context.select_module().data_root(), "track:/only");
    assert_eq!(context.current_module_index(), Some(0));

    context.destroy().unwrap();
}

#[test]
fn test_select_module_prefers_first_data_root() {
    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-select-first")
        .registry(registry)
        .default_data_roots("track:/fast,track:/slow")
        .build()
        .unwrap();

    context.reset_module_selection();
    assert_eq!(context.select_module().data_root(), "track:/fast");
    context.destroy().unwrap();
}

#[test]
fn test_data_roots_are_read_only_after_creation() {
    let (registry, _tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-read-only")
        .registry(registry)
        .default_data_roots("track:/a")
        .build()
        .unwrap();

    let err = context
        .set_config(KEY_DATA_ROOTS, ConfigValue::String("track:/b".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(context.data_roots(), "track:/a");
    assert_eq!(context.last_error().unwrap().kind, ErrorKind::Permission);

    // other variables stay mutable
    context
        .set_config(KEY_VERBOSE, ConfigValue::UInt32(20))
        .unwrap();
    assert_eq!(context.verbosity(), 20);

    let var = context
        .config_vars()
        .into_iter()
        .find(|v| v.key == KEY_DATA_ROOTS)
        .unwrap();
    assert!(var.is_read_only());

    context.destroy().unwrap();
}

#[test]
fn test_dropping_context_releases_modules() {
    let (registry, tracker) = tracking_registry();
    {
        let _context = ContextBuilder::new("lifecycle-drop")
            .registry(registry.clone())
            .default_data_roots("track:/a,track:/b")
            .build()
            .unwrap();
        assert_eq!(tracker.live(), 2);
    }
    assert_eq!(tracker.live(), 0);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_contexts_share_registry_references() {
    let (registry, _tracker) = tracking_registry();
    let first = ContextBuilder::new("lifecycle-shared-1")
        .registry(registry.clone())
        .default_data_roots("track:/a")
        .build()
        .unwrap();
    let second = ContextBuilder::new("lifecycle-shared-2")
        .registry(registry.clone())
        .default_data_roots("posix:/tmp")
        .build()
        .unwrap();
    assert_eq!(registry.references(), 2);

    first.destroy().unwrap();
    assert_eq!(registry.references(), 1);
    assert_eq!(second.select_module().component(), "posix");
    second.destroy().unwrap();
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_statistics_summary_for_file_enabled_context() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ckptio.toml");
    std::fs::write(&path, "context_print_statistics = true\n").unwrap();

    let (registry, tracker) = tracking_registry();
    let context = ContextBuilder::new("lifecycle-stats")
        .registry(registry.clone())
        .config_file(&path)
        .default_data_roots("track:/a,track:/b")
        .build()
        .unwrap();
    assert!(context.print_statistics());

    let summary = context.statistics_summary();
    assert!(summary.starts_with("ckptio: context lifecycle-stats (rank 0 of 1) closed after "));
    assert!(summary.ends_with("2 module(s): track:/a,track:/b"));

    let mut slot = Some(context);
    destroy_context(&mut slot).unwrap();
    assert!(slot.is_none());
    assert_eq!(tracker.live(), 0);
    assert_eq!(registry.references(), 0);
}

#[test]
fn test_failed_creation_with_statistics_enabled_releases_everything() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ckptio.toml");
    std::fs::write(&path, "context_print_statistics = true\n").unwrap();

    let (registry, tracker) = tracking_registry();
    let err = ContextBuilder::new("lifecycle-stats-failed")
        .registry(registry.clone())
        .config_file(&path)
        .default_data_roots("track:/a,bogus:/x")
        .build()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(tracker.live(), 0);
    assert_eq!(tracker.finalized(), vec!["track:/a"]);
    assert_eq!(registry.references(), 0);
}
