use crate::contracts::error::StorageError;

/// Longest accepted sequence name, in bytes.
pub const MAX_SEQUENCE_NAME_LEN: usize = 255;

/// Checks that a sequence name is usable as a storage key.
///
/// Names must be non-empty, at most [`MAX_SEQUENCE_NAME_LEN`] bytes and free of
/// control characters.
pub fn validate_sequence_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidInput(
            "Sequence name must not be empty".into(),
        ));
    }
    if name.len() > MAX_SEQUENCE_NAME_LEN {
        return Err(StorageError::InvalidInput(format!(
            "Sequence name is {} bytes, limit is {}",
            name.len(),
            MAX_SEQUENCE_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(StorageError::InvalidInput(
            "Sequence name must not contain control characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in ["waypoint_id", "orders", "tenant-7.invoice", "züge"] {
            assert!(validate_sequence_name(name).is_ok(), "{} rejected", name);
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert!(matches!(
            validate_sequence_name(""),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_sequence_name("bad\nname").is_err());
        assert!(validate_sequence_name("nul\0").is_err());
    }

    #[test]
    fn length_limit_is_inclusive() {
        let at_limit = "a".repeat(MAX_SEQUENCE_NAME_LEN);
        assert!(validate_sequence_name(&at_limit).is_ok());

        let over = "a".repeat(MAX_SEQUENCE_NAME_LEN + 1);
        assert!(validate_sequence_name(&over).is_err());
    }
}
