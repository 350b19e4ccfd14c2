use blobsync_fs::{RobustnessConfig, io};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.txt");

    io::write_atomic(&path, b"hello world", RobustnessConfig::default()).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content, "hello world");
}

#[test]
fn test_write_atomic_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a").join("b").join("test.txt");

    io::write_atomic(&path, b"nested", RobustnessConfig::default()).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "nested");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "original").unwrap();

    io::write_atomic(&file_path, b"updated", RobustnessConfig::default()).unwrap();

    let content = fs::read_to_string(&file_path).unwrap();
    assert_eq!(content, "updated");
}

#[test]
fn test_write_atomic_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("test.txt");

    io::write_atomic(&file_path, b"content", RobustnessConfig::default()).unwrap();

    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| io::is_temp_file_name(&e.file_name().to_string_lossy()))
        .collect();
    assert!(leftovers.is_empty(), "Temporary file should be renamed away");
}

#[test]
fn test_read_bytes_nonexistent_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let result = io::read_bytes(&temp.path().join("missing.bin"));
    assert!(matches!(
        result,
        Err(blobsync_fs::Error::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound
    ));
}

#[test]
fn test_read_text_existing_file() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "hello").unwrap();

    let content = io::read_text(&file_path).unwrap();
    assert_eq!(content, "hello");
}
