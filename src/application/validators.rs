use url::Url;
use validator::ValidateUrl;

/// Validates a checkout redirect target (success/cancel URL).
/// Only absolute http(s) URLs are accepted.
pub fn is_valid_redirect_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() || !url.validate_url() {
        return false;
    }
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
