use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a peer-supplied file name is a single, plain path component.
///
/// Rejects:
/// - Empty names, `.` and `..`
/// - Any `/` or `\` separator
/// - Drive prefixes such as `C:`
/// - Embedded NUL bytes
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    let reject = |reason: &str| -> Result<(), TransferError> {
        Err(TransferError::InvalidFileName(format!("{reason}: {name:?}")))
    };

    if name.is_empty() {
        return reject("empty name");
    }
    if name.contains('\0') {
        return reject("NUL byte not allowed");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("path separator not allowed");
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return reject("drive prefix not allowed");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => reject("not a plain file name"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_dot_names() {
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_file_name("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_windows_paths() {
        assert!(validate_file_name("C:\\Windows\\evil").is_err());
        assert!(validate_file_name("C:evil").is_err());
        assert!(validate_file_name("sub\\file.txt").is_err());
    }

    #[test]
    fn rejects_subdirectory() {
        assert!(validate_file_name("sub/file.txt").is_err());
    }

    #[test]
    fn rejects_nul() {
        assert!(validate_file_name("a\0b").is_err());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_file_name("photo.jpg").is_ok());
        assert!(validate_file_name("report final (2).pdf").is_ok());
    }

    #[test]
    fn accepts_dotfile() {
        assert!(validate_file_name(".bashrc").is_ok());
        assert!(validate_file_name("..hidden").is_ok());
    }

    #[test]
    fn error_names_the_offender() {
        let err = validate_file_name("../x").unwrap_err();
        assert!(err.to_string().contains("../x"));
    }
}
