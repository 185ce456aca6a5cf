/// How a refresh cycle should treat an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Any 2xx: a payload follows.
    Success,
    /// 304: the installed payload is current.
    NotModified,
    /// 403: the update URL rejected the caller.
    Forbidden,
    /// 429: the caller is polling too often.
    TooManyRequests,
    /// Anything else.
    Other(u16),
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            304 => StatusClass::NotModified,
            403 => StatusClass::Forbidden,
            429 => StatusClass::TooManyRequests,
            other => StatusClass::Other(other),
        }
    }
}
