//! Comma-separated code lists as they appear inside a single CSV cell.

/// Split a code list: quotes removed, tokens trimmed, empty tokens dropped.
///
/// Duplicates are kept; deduplication happens when codes are unioned per entity.
pub fn parse_codes(field: &str) -> Vec<String> {
    field
        .replace('"', "")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`parse_codes`] for already-parsed codes.
pub fn join_codes<S: AsRef<str>>(codes: &[S]) -> String {
    codes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
