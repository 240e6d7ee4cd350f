//! Temporary directories for on-disk fixtures.

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
///
/// # Arguments
///
/// * `prefix` - A prefix for the directory name (e.g., "zarr_test")
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_prefix() {
        let dir = temp_test_dir_with_prefix("get_values_");
        let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("get_values_"));
        assert!(temp_test_dir().path().is_dir());
    }
}
