//! Input validation for client-supplied identifiers.

use validator::ValidationError;

/// Maximum camera identifier length.
pub const MAX_CAMERA_ID_LENGTH: usize = 64;

/// Camera id used when a client does not name one.
pub const DEFAULT_CAMERA_ID: &str = "default";

/// Validate camera ID format.
///
/// Valid format: alphanumeric, hyphens, underscores, dots, 1-64 chars.
pub fn is_valid_camera_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_CAMERA_ID_LENGTH {
        return false;
    }
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// `validator` adapter for [`is_valid_camera_id`].
pub fn validate_camera_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_camera_id(id) {
        Ok(())
    } else {
        let mut err = ValidationError::new("camera_id");
        err.message = Some("camera_id must be 1-64 characters of [A-Za-z0-9_.-]".into());
        Err(err)
    }
}

pub fn default_camera_id() -> String {
    DEFAULT_CAMERA_ID.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_id_validation() {
        assert!(is_valid_camera_id("default"));
        assert!(is_valid_camera_id("kitchen_cam-2.left"));
        assert!(is_valid_camera_id(&"a".repeat(64)));
        assert!(!is_valid_camera_id(""));
        assert!(!is_valid_camera_id(&"a".repeat(65)));
        assert!(!is_valid_camera_id("living room"));
        assert!(!is_valid_camera_id("cam/1"));
    }

    #[test]
    fn test_validator_adapter() {
        assert!(validate_camera_id("cam1").is_ok());
        assert!(validate_camera_id("cam 1").is_err());
    }
}
