use url::Url;

use crate::client::consts::{AGENT_QUERY, CALL_PATH, LOOKUP_PATH};
use crate::error::ValidationError;

/// Parses a discovery base URL. Only http(s) origins are accepted.
pub fn parse_discovery_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let url =
        Url::parse(trimmed).map_err(|_| ValidationError::InvalidEndpoint(trimmed.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ValidationError::InvalidEndpoint(trimmed.to_string())),
    }
}

fn push_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// `{discovery}/v1/lookup/{bot}`
pub fn lookup_url(discovery: &Url, bot_id: &str) -> Url {
    let mut segments = LOOKUP_PATH.to_vec();
    segments.push(bot_id);
    push_segments(discovery, &segments)
}

/// Where the call-initiation request goes.
///
/// The bot's registered endpoint wins; it may be a bare `host:port` or already end in
/// `/call`. Without one, `/call` under the discovery origin is used.
pub fn call_url(bot_endpoint: Option<&str>, discovery: &Url) -> Result<Url, String> {
    let Some(endpoint) = bot_endpoint.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(push_segments(discovery, &[CALL_PATH]));
    };

    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let url = Url::parse(&with_scheme).map_err(|e| format!("{}: {}", endpoint, e))?;
    if url.cannot_be_a_base() {
        return Err(format!("{}: not a base url", endpoint));
    }

    let already_call = url
        .path_segments()
        .and_then(|mut s| s.rfind(|seg| !seg.is_empty()))
        .is_some_and(|last| last == CALL_PATH);
    if already_call {
        Ok(url)
    } else {
        Ok(push_segments(&url, &[CALL_PATH]))
    }
}

/// The discovery origin with its scheme swapped to ws/wss and the bot passed as `agent`.
pub fn channel_url(discovery: &Url, bot_id: &str) -> Result<Url, String> {
    let mut url = discovery.clone();
    let scheme = match discovery.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => discovery.scheme(),
        other => return Err(format!("unsupported scheme: {}", other)),
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|_| format!("cannot use scheme {} for {}", scheme, discovery))?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair(AGENT_QUERY, bot_id);
    Ok(url)
}
