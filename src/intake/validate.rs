//! Input checks for uploaded documents. Pure and synchronous.

use std::path::Path;

use crate::error::ValidationError;

/// Accepted document extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["doc", "docx", "pdf"];

/// Size ceiling in bytes; a file must be strictly smaller.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Accept only names whose extension is on the allow-list.
pub fn validate_file_name(file_name: &str) -> Result<(), ValidationError> {
    let allowed = extension(file_name)
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false);

    if allowed {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedExtension {
            file_name: file_name.to_string(),
        })
    }
}

/// Accept sizes strictly below [`MAX_FILE_SIZE`].
pub fn validate_file_size(size: u64) -> Result<(), ValidationError> {
    if size < MAX_FILE_SIZE {
        Ok(())
    } else {
        Err(ValidationError::TooLarge {
            size,
            limit: MAX_FILE_SIZE,
        })
    }
}

/// A phone number is usable when it contains at least one digit.
pub fn validate_phone(phone: &str) -> bool {
    phone.chars().any(|c| c.is_ascii_digit())
}

/// Extension of `file_name` without the dot, if it has one.
pub fn extension(file_name: &str) -> Option<&str> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}
