/// Adds an `https://` scheme when none is given and guarantees a trailing
/// slash, so relative routes can be joined onto the result.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    let mut url = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// `https` bases map to `wss`, `http` to `ws`; websocket schemes pass through.
pub fn websocket_url(input: &str) -> String {
    let url = normalize_url(input);
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url
    }
}
