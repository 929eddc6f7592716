//! Tests for configuration resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PESTWATCH_DOCUMENTS or other variables are marked
//! with #[serial] so they run sequentially.

use pestwatch_common::config::{
    env_flag, load_toml, locate_config_file, resolve_documents_folder, spreadsheet_path_in,
    DOCUMENTS_ENV_VAR, SPREADSHEET_FILE_NAME,
};
use pestwatch_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_cli_argument_wins_over_everything() {
    env::set_var(DOCUMENTS_ENV_VAR, "/tmp/from-env");

    let resolved = resolve_documents_folder(
        Some(Path::new("/tmp/from-cli")),
        DOCUMENTS_ENV_VAR,
        Some(Path::new("/tmp/from-toml")),
    );
    assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));

    env::remove_var(DOCUMENTS_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_wins_over_toml() {
    env::set_var(DOCUMENTS_ENV_VAR, "/tmp/from-env");

    let resolved =
        resolve_documents_folder(None, DOCUMENTS_ENV_VAR, Some(Path::new("/tmp/from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/from-env"));

    env::remove_var(DOCUMENTS_ENV_VAR);
}

#[test]
#[serial]
fn test_toml_value_used_without_cli_or_env() {
    env::remove_var(DOCUMENTS_ENV_VAR);

    let resolved =
        resolve_documents_folder(None, DOCUMENTS_ENV_VAR, Some(Path::new("/tmp/from-toml")));
    assert_eq!(resolved, PathBuf::from("/tmp/from-toml"));
}

#[test]
#[serial]
fn test_default_folder_when_nothing_configured() {
    env::remove_var(DOCUMENTS_ENV_VAR);

    let resolved = resolve_documents_folder(None, DOCUMENTS_ENV_VAR, None);
    assert!(!resolved.as_os_str().is_empty());
}

#[test]
fn test_spreadsheet_path_in_documents() {
    let path = spreadsheet_path_in(Path::new("/home/grower/Documents"));
    assert_eq!(
        path,
        PathBuf::from("/home/grower/Documents").join(SPREADSHEET_FILE_NAME)
    );
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let result = locate_config_file(Some(&missing));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_explicit_config_file_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 8080\n").unwrap();

    assert_eq!(locate_config_file(Some(&path)).unwrap(), path);
}

#[derive(Debug, serde::Deserialize)]
struct Sample {
    port: u16,
}

#[test]
fn test_load_toml_parses_and_reports_errors() {
    let dir = tempfile::tempdir().unwrap();

    let good = dir.path().join("good.toml");
    std::fs::write(&good, "port = 8080\n").unwrap();
    let sample: Sample = load_toml(&good).unwrap();
    assert_eq!(sample.port, 8080);

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "port = \"eighty\"\n").unwrap();
    let err = load_toml::<Sample>(&bad).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_env_flag_values() {
    let name = "PESTWATCH_TEST_FLAG";

    env::remove_var(name);
    assert!(!env_flag(name));

    for truthy in ["1", "true", "TRUE", "yes", "On"] {
        env::set_var(name, truthy);
        assert!(env_flag(name), "{} should be true", truthy);
    }

    for falsy in ["0", "false", "", "maybe"] {
        env::set_var(name, falsy);
        assert!(!env_flag(name), "{} should be false", falsy);
    }

    env::remove_var(name);
}
