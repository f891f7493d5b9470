//! Filename hygiene for user supplied names.

/// Placeholder used when a base name is missing or sanitizes to nothing.
pub const DEFAULT_BASE_NAME: &str = "image";

const ILLEGAL_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a user supplied base name safe for use as a file and archive entry name.
///
/// Path separators, `..` sequences, control characters and quoting/glob
/// characters are removed, whitespace runs collapse to one space and the result
/// is trimmed. Letters and digits of any script are kept as-is.
pub fn sanitize_base_name(input: &str) -> String {
    let mut cleaned: String = input
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .collect();

    // removing one pair can join two dots that were apart
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "");
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        collapsed
    }
}

/// Lowercased text after the last `.`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_allowed_file(filename: &str, allowed: &[String]) -> bool {
    extension_of(filename).is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn allowed() -> Vec<String> {
        vec!["jpg".into(), "jpeg".into(), "png".into()]
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize_base_name("日本語 image"), "日本語 image");
        assert_eq!(sanitize_base_name("사진_모음-2024"), "사진_모음-2024");
        assert_eq!(sanitize_base_name("Ünïcödé"), "Ünïcödé");
    }

    #[test]
    fn test_sanitize_strips_dangerous_chars() {
        assert_eq!(sanitize_base_name("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_base_name("<x>|\"y\"?*"), "xy");
        assert_eq!(sanitize_base_name("tab\there\nnew"), "tabherenew");
        assert_eq!(sanitize_base_name("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_base_name(".<.>."), ".");
        assert_eq!(sanitize_base_name("a..b"), "ab");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_base_name("  my    cat  "), "my cat");
        assert_eq!(sanitize_base_name("wide\u{3000}\u{3000}space"), "wide space");
    }

    #[test]
    fn test_sanitize_falls_back_to_placeholder() {
        assert_eq!(sanitize_base_name(""), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name("   "), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name("///"), DEFAULT_BASE_NAME);
        assert_eq!(sanitize_base_name("...."), DEFAULT_BASE_NAME);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.PNG").as_deref(), Some("png"));
        assert_eq!(extension_of("archive.tar.JPeG").as_deref(), Some("jpeg"));
        assert_eq!(extension_of(".png").as_deref(), Some("png"));
        assert_eq!(extension_of("png"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_is_allowed_file() {
        assert!(is_allowed_file("a.jpg", &allowed()));
        assert!(is_allowed_file("b.JPEG", &allowed()));
        assert!(is_allowed_file("c.Png", &allowed()));
        assert!(!is_allowed_file("d.gif", &allowed()));
        assert!(!is_allowed_file("e.png.exe", &allowed()));
        assert!(!is_allowed_file("jpg", &allowed()));
        assert!(!is_allowed_file("", &allowed()));
    }

    proptest! {
        /// Property: sanitizing twice gives the same result as once.
        #[test]
        fn prop_sanitize_is_idempotent(input in any::<String>()) {
            let once = sanitize_base_name(&input);
            prop_assert_eq!(sanitize_base_name(&once), once);
        }

        /// Property: output is never empty and carries no dangerous characters.
        #[test]
        fn prop_sanitize_output_is_safe(input in any::<String>()) {
            let out = sanitize_base_name(&input);
            prop_assert!(!out.is_empty());
            prop_assert!(!out.contains(".."));
            prop_assert!(!out.chars().any(|c| c.is_control() || ILLEGAL_CHARS.contains(&c)));
            prop_assert_eq!(out.trim(), out.as_str());
        }

        /// Property: alphanumeric text of any script survives untouched.
        #[test]
        fn prop_sanitize_preserves_alphanumerics(input in "[\\p{L}\\p{N}]{1,24}") {
            prop_assert_eq!(sanitize_base_name(&input), input);
        }
    }
}
