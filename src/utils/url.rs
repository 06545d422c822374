//! Request URL resolution.
//!
//! Endpoint paths such as `/chat-process` are joined onto the configured API
//! base URL; anything that already looks absolute is passed through.

/// Strip trailing slashes from a base URL.
///
/// ```
/// use chatweb::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:3002/api/"), "http://localhost:3002/api");
/// assert_eq!(normalize_base_url("http://localhost:3002/api"), "http://localhost:3002/api");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join an endpoint path onto a base URL without doubling slashes.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() {
        return base;
    }
    format!("{base}/{endpoint}")
}

/// True when `url` names a full location rather than a path.
pub fn is_absolute(url: &str) -> bool {
    url.starts_with("http")
}

/// Resolve a request target against the base URL.
///
/// ```
/// use chatweb::utils::url::resolve_url;
///
/// assert_eq!(
///     resolve_url("http://localhost:3002/api", "/session"),
///     "http://localhost:3002/api/session"
/// );
/// assert_eq!(
///     resolve_url("http://localhost:3002/api", "https://other.example/verify"),
///     "https://other.example/verify"
/// );
/// ```
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if is_absolute(url) {
        url.to_string()
    } else {
        join_url(base_url, url)
    }
}
