//! Tests for `src/store.rs`.

use radarwatch::store::{EnvFileStore, KeyValueStore, MemoryStore, StoreError};

fn env_file(contents: Option<&str>) -> (tempfile::TempDir, EnvFileStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".env");
    if let Some(contents) = contents {
        std::fs::write(&path, contents).expect("seed");
    }
    (dir, EnvFileStore::new(path))
}

#[test]
fn missing_file_reads_as_absent() {
    let (_dir, store) = env_file(None);
    assert_eq!(store.get("TELEGRAM_CHAT_ID").expect("get"), None);
}

#[test]
fn get_reads_dotenv_syntax() {
    let (_dir, store) = env_file(Some(
        "# bot\nTELEGRAM_BOT_TOKEN=\"123:abc\"\nexport TELEGRAM_CHAT_ID=1,2\n",
    ));
    assert_eq!(
        store.get("TELEGRAM_BOT_TOKEN").expect("get").as_deref(),
        Some("123:abc")
    );
    assert_eq!(
        store.get("TELEGRAM_CHAT_ID").expect("get").as_deref(),
        Some("1,2")
    );
    assert_eq!(store.get("OTHER").expect("get"), None);
}

#[test]
fn set_creates_the_file() {
    let (_dir, mut store) = env_file(None);
    store.set("TELEGRAM_CHAT_ID", "5").expect("set");

    assert_eq!(
        std::fs::read_to_string(store.path()).expect("read"),
        "TELEGRAM_CHAT_ID=5\n"
    );
}

#[test]
fn set_preserves_unrelated_lines() {
    let (_dir, mut store) = env_file(Some("# secrets\nTELEGRAM_BOT_TOKEN=abc\nTELEGRAM_CHAT_ID=1\nOTHER=x\n"));
    store.set("TELEGRAM_CHAT_ID", "1,2").expect("set");

    assert_eq!(
        std::fs::read_to_string(store.path()).expect("read"),
        "# secrets\nTELEGRAM_BOT_TOKEN=abc\nTELEGRAM_CHAT_ID=1,2\nOTHER=x\n"
    );
    assert_eq!(
        store.get("TELEGRAM_BOT_TOKEN").expect("get").as_deref(),
        Some("abc")
    );
}

#[test]
fn set_rejects_line_breaks() {
    let (_dir, mut store) = env_file(None);
    assert!(matches!(
        store.set("K", "a\nB=b"),
        Err(StoreError::MultilineValue(key)) if key == "K"
    ));
    assert!(!store.path().exists());
}

#[cfg(unix)]
#[test]
fn written_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, mut store) = env_file(Some("A=1\n"));
    store.set("B", "2").expect("set");

    let mode = std::fs::metadata(store.path())
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn memory_store_round_trip() {
    let mut store = MemoryStore::default();
    assert_eq!(store.get("K").expect("get"), None);
    store.set("K", "v").expect("set");
    assert_eq!(store.get("K").expect("get").as_deref(), Some("v"));
}
