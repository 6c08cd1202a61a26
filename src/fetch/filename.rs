//! Safe destination naming for downloaded assets.
//!
//! The transform is an allowlist: only `[A-Za-z0-9._-]` survive, everything
//! else collapses to `_`, dot runs collapse to a single dot, and the result
//! is trimmed, bounded, and never empty. This must hold for any input,
//! including adversarial identifiers.

/// Maximum length of a generated asset name, before the extension.
pub const MAX_ASSET_NAME_LEN: usize = 120;

/// Allowlist transform for one path component.
///
/// Keeps ASCII alphanumerics, `.`, `_`, and `-`; maps any run of other
/// characters to a single `_`; collapses `.` runs; trims `.` and `_` from
/// both ends.
pub(crate) fn sanitize_component(value: &str) -> String {
    let mut kept = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            kept.push(ch);
            prev_sep = false;
        } else if !prev_sep {
            kept.push('_');
            prev_sep = true;
        }
    }

    let mut collapsed = String::with_capacity(kept.len());
    let mut prev_dot = false;
    for ch in kept.chars() {
        if ch == '.' {
            if !prev_dot {
                collapsed.push('.');
            }
            prev_dot = true;
        } else {
            collapsed.push(ch);
            prev_dot = false;
        }
    }

    collapsed
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Builds a safe file name stem from an identifier.
///
/// The result contains no path separator and no `..` sequence, is at most
/// [`MAX_ASSET_NAME_LEN`] characters, and is `asset` when nothing survives
/// the transform. Callers append the extension.
#[must_use]
pub fn asset_file_name(identifier: &str) -> String {
    let sanitized = sanitize_component(identifier);
    let clamped: String = sanitized.chars().take(MAX_ASSET_NAME_LEN).collect();
    let trimmed = clamped.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "asset".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_file_name_typical_doi() {
        assert_eq!(
            asset_file_name("10.1038/s41586-024-07386-0"),
            "10.1038_s41586-024-07386-0"
        );
    }

    #[test]
    fn test_asset_file_name_traversal_input() {
        assert_eq!(asset_file_name("../../../etc/passwd"), "etc_passwd");
    }

    #[test]
    fn test_asset_file_name_separators_collapse() {
        assert_eq!(asset_file_name("a/b"), "a_b");
        assert_eq!(asset_file_name("a\\b"), "a_b");
        assert_eq!(asset_file_name("a//  //b"), "a_b");
    }

    #[test]
    fn test_asset_file_name_empty_input() {
        assert_eq!(asset_file_name(""), "asset");
        assert_eq!(asset_file_name("///"), "asset");
        assert_eq!(asset_file_name("...."), "asset");
    }

    #[test]
    fn test_asset_file_name_never_unsafe_for_any_input() {
        let long_input: String = "x".repeat(10_000);
        let inputs = [
            "../../../etc/passwd",
            "a/b",
            "",
            long_input.as_str(),
            "..\\..\\windows\\system32",
            "10.1234/..//..//x",
            "doi with spaces and \u{65e5}\u{672c}\u{8a9e}",
            ".hidden",
            "con.",
            "a.._b",
        ];
        for input in inputs {
            let name = asset_file_name(input);
            assert!(!name.is_empty(), "empty for {input:?}");
            assert!(name.chars().count() <= MAX_ASSET_NAME_LEN, "too long for {input:?}");
            assert!(!name.contains('/'), "separator survived {input:?}: {name}");
            assert!(!name.contains('\\'), "separator survived {input:?}: {name}");
            assert!(!name.contains(".."), "dot-dot survived {input:?}: {name}");
            assert!(
                !name.starts_with('.') && !name.ends_with('.'),
                "dot at boundary for {input:?}: {name}"
            );
        }
    }

    #[test]
    fn test_asset_file_name_clamps_long_input() {
        let name = asset_file_name(&"a".repeat(10_000));
        assert_eq!(name.chars().count(), MAX_ASSET_NAME_LEN);
    }

    #[test]
    fn test_sanitize_component_preserves_allowed_chars() {
        assert_eq!(sanitize_component("valid-file_name.v2"), "valid-file_name.v2");
    }

    #[test]
    fn test_sanitize_component_collapses_dot_runs() {
        assert_eq!(sanitize_component("a..b...c"), "a.b.c");
    }
}
