//! Gallery identifiers: `<name>_<enrollment timestamp>`.

use chrono::{DateTime, TimeZone};

/// Timestamp layout appended to names, e.g. `October182026101530`.
pub const TIMESTAMP_FORMAT: &str = "%B%d%Y%H%M%S";

const SEPARATOR: char = '_';

/// Normalize a user-entered name. Returns `None` for blank input.
///
/// The separator and path separators are replaced with `-` so the name can be
/// recovered from the identifier and the identifier is a safe file stem.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .map(|c| match c {
                SEPARATOR | '/' | '\\' => '-',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect(),
    )
}

/// Build an identifier from an already-sanitized name.
pub fn make_identifier<Tz>(name: &str, enrolled_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{name}{SEPARATOR}{}", enrolled_at.format(TIMESTAMP_FORMAT))
}

/// Person name part of an identifier.
pub fn display_name(identifier: &str) -> &str {
    identifier
        .split_once(SEPARATOR)
        .map_or(identifier, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_identifier_format() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 30).unwrap();
        assert_eq!(make_identifier("Alice", &ts), "Alice_October182026090530");
    }

    #[test]
    fn test_display_name_recovers_name() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let name = sanitize_name("  Mary Jane ").unwrap();
        let id = make_identifier(&name, &ts);
        assert_eq!(display_name(&id), "Mary Jane");
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_name("a_b/c\\d").as_deref(), Some("a-b-c-d"));
    }

    #[test]
    fn test_sanitize_blank_is_none() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("   \t"), None);
    }

    #[test]
    fn test_display_name_without_separator() {
        assert_eq!(display_name("legacy"), "legacy");
    }
}
