//! Integration tests for streamtree
//!
//! Exercise configuration loading and the error surface shared by every module.

use std::io::Write;

use streamtree::config::ServerConfig;
use streamtree::{Error, Result};

#[test]
fn test_error_types() {
    let not_found = Error::StreamNotFound("cities".to_string());
    assert!(format!("{}", not_found).contains("Stream not found"));

    let fragmentation = Error::FragmentationNotFound("names".to_string());
    assert!(format!("{}", fragmentation).contains("Fragmentation not found"));

    let cursor = Error::InvalidCursor("soon".to_string());
    assert!(format!("{}", cursor).contains("Invalid cursor"));

    let rejected = Error::BuildRejected("already running".to_string());
    assert!(format!("{}", rejected).contains("Build rejected"));
}

#[test]
fn test_result_type() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    fn returns_err() -> Result<i32> {
        Err(Error::Storage("test error".to_string()))
    }

    assert!(returns_ok().is_ok());
    assert!(returns_err().is_err());
}

fn config_file(contents: &str, name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("streamtree-{}-{}.json", name, std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_config_file_overrides_defaults() {
    let path = config_file(
        r#"{"port": 8088, "base_url": "https://streams.example.org", "page_size": 50}"#,
        "valid",
    );
    let config = ServerConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.port, 8088);
    assert_eq!(config.page_size, 50);
    assert_eq!(config.bucket_page_size, ServerConfig::default().bucket_page_size);
    assert_eq!(config.public_base_url(), "https://streams.example.org");
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let path = config_file(r#"{"page_size": 0}"#, "zero");
    let result = ServerConfig::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(Error::Config(_))));

    let path = config_file("not json", "garbage");
    let result = ServerConfig::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_config_file_is_io_error() {
    let result = ServerConfig::from_file("/nonexistent/streamtree.json");
    assert!(matches!(result, Err(Error::Io(_))));
}
