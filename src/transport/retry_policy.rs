use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

pub(crate) const RETRY_AFTER_MAX_SECS: u64 = 30;
const JITTER_MAX_MS: u64 = 100;

/// Delay before the next attempt: a `Retry-After` header wins when present,
/// otherwise the configured fixed delay plus a small jitter so concurrent
/// turns don't retry in lockstep.
#[must_use]
pub(crate) fn next_attempt_delay(base: Duration, headers: Option<&http::HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after_delay) {
        return delay;
    }
    base + Duration::from_millis(fastrand::u64(0..=JITTER_MAX_MS))
}

#[must_use]
pub(crate) fn parse_retry_after_delay(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }

    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("5"));
        assert_eq!(
            parse_retry_after_delay(&headers),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_parse_retry_after_capped() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("9999"));
        assert_eq!(
            parse_retry_after_delay(&headers),
            Some(Duration::from_secs(RETRY_AFTER_MAX_SECS))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let target = SystemTime::now() + Duration::from_secs(2);
        let mut headers = http::HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            http::HeaderValue::from_str(&httpdate::fmt_http_date(target)).unwrap(),
        );
        let delay = parse_retry_after_delay(&headers).unwrap();
        assert!(delay <= Duration::from_secs(RETRY_AFTER_MAX_SECS));
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("not-a-delay"));
        assert!(parse_retry_after_delay(&headers).is_none());
    }

    #[test]
    fn test_next_attempt_delay_bounds() {
        let base = Duration::from_secs(1);
        let delay = next_attempt_delay(base, None);
        assert!(delay >= base);
        assert!(delay <= base + Duration::from_millis(JITTER_MAX_MS));
    }

    #[test]
    fn test_next_attempt_delay_prefers_retry_after() {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_static("3"));
        assert_eq!(
            next_attempt_delay(Duration::from_secs(1), Some(&headers)),
            Duration::from_secs(3)
        );
    }
}
