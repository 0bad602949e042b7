//! Small text helpers shared by configuration and the remote client.

/// Trim optional text, treating blank values as absent.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Whether a URL uses the `http` or `https` scheme.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Trim and cap remote error bodies at 180 characters.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}
