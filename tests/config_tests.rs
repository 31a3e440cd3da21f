// tests/config_tests.rs
use gpk_tools::config::{ConfigStore, KeyFileStore, PROMPT_HARDWARE, REPO_SHOW_DETAILS};
use gpk_tools::error::Error;
use std::path::PathBuf;
use std::{env, fs, process};

fn scratch_path(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("gpk-tools-{}-{}", name, process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir.join("settings.ini")
}

#[test]
fn missing_file_answers_defaults() {
    let path = scratch_path("defaults");
    let store = KeyFileStore::open(&path).unwrap();

    assert!(store.get_bool(PROMPT_HARDWARE).unwrap());
    assert!(!store.get_bool(REPO_SHOW_DETAILS).unwrap());
    assert!(!path.exists());
}

#[test]
fn values_persist_across_opens() {
    let path = scratch_path("persist");
    {
        let mut store = KeyFileStore::open(&path).unwrap();
        store.set_bool(PROMPT_HARDWARE, false).unwrap();
        store.set_bool(REPO_SHOW_DETAILS, true).unwrap();
    }

    let store = KeyFileStore::open(&path).unwrap();
    assert_eq!(store.path(), path.as_path());
    assert!(!store.get_bool(PROMPT_HARDWARE).unwrap());
    assert!(store.get_bool(REPO_SHOW_DETAILS).unwrap());

    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn unknown_key_is_an_error() {
    let path = scratch_path("unknown");
    let mut store = KeyFileStore::open(&path).unwrap();

    assert!(matches!(store.get_bool("no-such-key"), Err(Error::Config(_))));
    assert!(matches!(
        store.set_bool("no-such-key", true),
        Err(Error::Config(_))
    ));
    assert!(!path.exists());
}
