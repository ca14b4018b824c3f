use streamtree::Error;

#[test]
fn test_error_display() {
    let err = Error::Config("test error".to_string());
    assert_eq!(format!("{}", err), "Configuration error: test error");
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("missing.json"));
}
