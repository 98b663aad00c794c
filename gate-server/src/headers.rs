//! Caching headers for OAuth responses

use axum::http::HeaderValue;
use axum::response::Response;
use chrono::{Duration, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use log::warn;

/// How a response may be cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Credentials, codes and anything tied to one flow (RFC 6749 section 5.1).
    /// Also sends `Pragma: no-cache` for HTTP/1.0 intermediaries.
    NoStore,
    /// Shared caches may keep the response for `max_age` seconds
    Public { max_age: u32 },
}

impl CachePolicy {
    fn cache_control(&self) -> HeaderValue {
        match self {
            Self::NoStore => HeaderValue::from_static("no-store"),
            Self::Public { max_age } => HeaderValue::from_str(&format!("public, max-age={max_age}"))
                .unwrap_or(HeaderValue::from_static("public")),
        }
    }

    /// Set the headers of this policy on `response`, replacing existing ones
    pub fn apply<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, self.cache_control());

        match self {
            Self::NoStore => {
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            }
            Self::Public { max_age } => {
                let expires = Utc::now() + Duration::seconds(i64::from(*max_age));
                match HeaderValue::from_str(&expires.to_rfc2822()) {
                    Ok(value) => {
                        headers.insert(EXPIRES, value);
                    }
                    Err(e) => warn!("failed to set expires header: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_no_store() {
        let mut response = Response::new(Body::empty());
        CachePolicy::NoStore.apply(&mut response);

        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(response.headers().get(PRAGMA).unwrap(), "no-cache");
        assert!(response.headers().get(EXPIRES).is_none());
    }

    #[test]
    fn test_public() {
        let mut response = Response::new(Body::empty());
        CachePolicy::Public { max_age: 300 }.apply(&mut response);

        assert_eq!(
            response.headers().get(CACHE_CONTROL).unwrap(),
            "public, max-age=300"
        );
        assert!(response.headers().get(PRAGMA).is_none());
        assert!(response.headers().get(EXPIRES).is_some());
    }

    #[test]
    fn test_policy_replaces_existing_header() {
        let mut response = Response::new(Body::empty());
        CachePolicy::Public { max_age: 60 }.apply(&mut response);
        CachePolicy::NoStore.apply(&mut response);

        let values: Vec<_> = response.headers().get_all(CACHE_CONTROL).iter().collect();
        assert_eq!(values, vec!["no-store"]);
    }
}
