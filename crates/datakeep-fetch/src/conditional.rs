use std::time::{SystemTime, UNIX_EPOCH};

pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const CONTENT_MD5: &str = "Content-MD5";

/// Build an `If-Modified-Since` header for a payload published at `published`.
///
/// Returns `None` for instants the HTTP date format cannot express.
pub fn if_modified_since(published: SystemTime) -> Option<(String, String)> {
    if published < UNIX_EPOCH {
        return None;
    }

    Some((
        IF_MODIFIED_SINCE.to_string(),
        httpdate::fmt_http_date(published),
    ))
}
