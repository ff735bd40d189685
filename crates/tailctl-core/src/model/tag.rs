// ── Tag naming rules ──

use serde::Serialize;

pub const TAG_PREFIX: &str = "tag:";
pub const MAX_TAG_LEN: usize = 64;

/// Prefixes the control plane reserves for its own tags.
const RESERVED_PREFIXES: [&str; 2] = ["tag:autogroup", "tag:api"];

/// Result of checking a tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagValidation {
    pub tag: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check `tag` against the naming rules: `tag:` prefix, at most 64
/// characters, and only ASCII letters, digits, `-` or `_` after the prefix.
/// Reserved prefixes are allowed but produce a warning.
pub fn validate_tag_name(tag: &str) -> TagValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match tag.strip_prefix(TAG_PREFIX) {
        None => errors.push(format!("must start with '{TAG_PREFIX}'")),
        Some("") => errors.push("name after the prefix must not be empty".to_owned()),
        Some(name) => {
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                errors.push(
                    "may only contain letters, digits, '-' or '_' after the prefix".to_owned(),
                );
            }
        }
    }

    if tag.chars().count() > MAX_TAG_LEN {
        errors.push(format!("must be at most {MAX_TAG_LEN} characters"));
    }

    if let Some(reserved) = RESERVED_PREFIXES.iter().find(|p| tag.starts_with(*p)) {
        warnings.push(format!("'{reserved}' is a reserved prefix"));
    }

    TagValidation {
        tag: tag.to_owned(),
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_tags() {
        for tag in ["tag:web", "tag:db-primary", "tag:ci_runner", "tag:X1"] {
            let check = validate_tag_name(tag);
            assert!(check.valid, "{tag}: {:?}", check.errors);
            assert!(check.warnings.is_empty());
        }
    }

    #[test]
    fn rejects_missing_prefix_and_bad_chars() {
        assert!(!validate_tag_name("web").valid);
        assert!(!validate_tag_name("tag:").valid);
        assert!(!validate_tag_name("tag:web server").valid);
        assert!(!validate_tag_name("tag:web.prod").valid);
    }

    #[test]
    fn enforces_length_limit() {
        let long = format!("tag:{}", "a".repeat(61));
        assert_eq!(long.len(), 65);
        assert!(!validate_tag_name(&long).valid);
        assert!(validate_tag_name(&long[..64]).valid);
    }

    #[test]
    fn reserved_prefix_warns_but_passes() {
        let check = validate_tag_name("tag:api-gateway");
        assert!(check.valid);
        assert_eq!(check.warnings.len(), 1);
    }
}
