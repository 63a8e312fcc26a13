use std::collections::BTreeMap;

use crate::config::ChatApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const NDJSON_MIME: &str = "application/x-ndjson";

/// Build a deterministic header map for chat streaming requests.
pub fn build_headers(config: &ChatApiConfig, user_agent: Option<&str>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(HEADER_ACCEPT.to_owned(), NDJSON_MIME.to_owned());

    let ua = match (user_agent, config.user_agent.as_deref()) {
        (Some(explicit), _) if !explicit.trim().is_empty() => Some(explicit.trim().to_owned()),
        (None, Some(configured)) if !configured.trim().is_empty() => {
            Some(configured.trim().to_owned())
        }
        _ => None,
    };
    if let Some(ua) = ua {
        headers.insert(HEADER_USER_AGENT.to_owned(), ua);
    }

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}
