//! Session name validation.
//!
//! A session name becomes a path component under all three on-disk
//! namespaces, so anything that could traverse or escape a directory is
//! rejected before it ever reaches the filesystem.

/// Maximum accepted name length (characters).
const MAX_NAME_LEN: usize = 100;

/// Validates a user-supplied session name and returns the trimmed,
/// filesystem-safe form. Rules are applied in order; the first failure
/// wins and its reason is returned.
pub fn validate_session_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();

    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if name.len() > MAX_NAME_LEN
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
    {
        return Err(format!(
            "name can only contain letters, numbers, spaces, hyphens, and underscores (max {} characters)",
            MAX_NAME_LEN
        ));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err("name cannot start or end with a dot".to_string());
    }

    if name.contains("..") {
        return Err("name cannot contain '..'".to_string());
    }

    if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err("name cannot contain path separators".to_string());
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        for name in ["notes", "my chat", "q1-review_2024", "A"] {
            assert_eq!(validate_session_name(name).unwrap(), name);
        }
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(validate_session_name("  alpha  ").unwrap(), "alpha");
    }

    #[test]
    fn rejects_empty_and_whitespace_only() {
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("   ").is_err());
    }

    #[test]
    fn rejects_path_separators() {
        assert!(validate_session_name("a/b").is_err());
        assert!(validate_session_name("a\\b").is_err());
    }

    #[test]
    fn rejects_dot_patterns() {
        assert!(validate_session_name("..").is_err());
        assert!(validate_session_name(".hidden").is_err());
        assert!(validate_session_name("trailing.").is_err());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(validate_session_name("name!").is_err());
        assert!(validate_session_name("tab\tname").is_err());
        assert!(validate_session_name("émile").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "a".repeat(101);
        assert!(validate_session_name(&long).is_err());
        let ok = "a".repeat(100);
        assert!(validate_session_name(&ok).is_ok());
    }
}
