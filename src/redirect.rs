//! Safe post-login redirect targets.
//!
//! Callback URLs come from query strings and may have passed through several
//! redirects, so a callback that is itself percent-encoded is unwrapped up to
//! twice. Once it reads as a path or an absolute URL, its own escapes are kept.
//! Only same-origin http(s) targets survive; everything else becomes the
//! fallback.

use tracing::debug;
use url::{Url, form_urlencoded};

use crate::auth::AuthFailure;

/// Query parameter carrying the page to return to after login.
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Query parameter carrying a machine-readable reason for the detour.
pub const REASON_PARAM: &str = "reason";

/// Where to go when no usable callback is present.
pub const DEFAULT_FALLBACK: &str = "/";

const MAX_DECODE_PASSES: usize = 2;

#[derive(Debug, Clone)]
pub struct RedirectManager {
    origin: Url,
}

impl RedirectManager {
    /// `origin` is the public origin of the application, e.g. `https://autolot.example`.
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    /// Resolve a callback to a safe, path-relative target.
    pub fn compute_redirect(&self, callback: Option<&str>, fallback: &str) -> String {
        match callback.and_then(|c| self.validate(c)) {
            Some(target) => target,
            None => {
                if let Some(rejected) = callback {
                    debug!(
                        callback = %rejected,
                        failure = ?AuthFailure::UnsafeRedirectTarget,
                        "Unsafe redirect target replaced by fallback"
                    );
                }
                fallback.to_string()
            }
        }
    }

    /// Unwrap and validate a callback. Returns the path, query and fragment
    /// of the target when it is same-origin http(s), with the target's own
    /// percent-encoding intact.
    pub fn validate(&self, callback: &str) -> Option<String> {
        let candidate = unwrap_encoded(callback)?;
        if candidate.is_empty() {
            return None;
        }

        let target = self.same_origin(&candidate)?;
        // Decoding further must not point anywhere else
        self.same_origin(decode(&candidate)?.trim())?;

        let mut relative = target.path().to_string();
        if let Some(query) = target.query() {
            relative.push('?');
            relative.push_str(query);
        }
        if let Some(fragment) = target.fragment() {
            relative.push('#');
            relative.push_str(fragment);
        }
        Some(relative)
    }

    fn same_origin(&self, candidate: &str) -> Option<Url> {
        let target = self.origin.join(candidate).ok()?;
        if !matches!(target.scheme(), "http" | "https") {
            return None;
        }
        (target.origin() == self.origin.origin()).then_some(target)
    }

    /// Build `<page>?callbackUrl=...&reason=...`. An unsafe callback is dropped.
    pub fn login_target(&self, page: &str, callback: Option<&str>, reason: Option<&str>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(target) = callback.and_then(|c| self.validate(c)) {
            query.append_pair(CALLBACK_PARAM, &target);
        }
        if let Some(reason) = reason {
            query.append_pair(REASON_PARAM, reason);
        }

        let query = query.finish();
        if query.is_empty() {
            page.to_string()
        } else {
            format!("{}?{}", page, query)
        }
    }
}

/// Strip whole-value encoding: decode while the value is neither a path nor
/// an absolute URL, at most `MAX_DECODE_PASSES` times.
fn unwrap_encoded(raw: &str) -> Option<String> {
    let mut value = raw.trim().to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if value.starts_with('/') || Url::parse(&value).is_ok() || !value.contains('%') {
            break;
        }
        value = urlencoding::decode(&value).ok()?.trim().to_string();
    }
    Some(value)
}

/// Percent-decode at most `MAX_DECODE_PASSES` times, stopping once nothing
/// is left to decode. Invalid UTF-8 rejects the value.
fn decode(raw: &str) -> Option<String> {
    let mut value = raw.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if !value.contains('%') {
            break;
        }
        value = urlencoding::decode(&value).ok()?.into_owned();
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RedirectManager {
        RedirectManager::new(Url::parse("https://autolot.example").unwrap())
    }

    #[test]
    fn test_relative_path_kept() {
        assert_eq!(
            manager().compute_redirect(Some("/app/ads/42"), "/"),
            "/app/ads/42"
        );
    }

    #[test]
    fn test_foreign_origin_rejected() {
        assert_eq!(
            manager().compute_redirect(Some("https://evil.example/x"), "/"),
            "/"
        );
    }

    #[test]
    fn test_missing_callback_uses_fallback() {
        assert_eq!(manager().compute_redirect(None, "/dashboard"), "/dashboard");
    }

    #[test]
    fn test_same_origin_absolute_made_relative() {
        assert_eq!(
            manager().compute_redirect(Some("https://autolot.example/app/ads?page=2#top"), "/"),
            "/app/ads?page=2#top"
        );
    }

    #[test]
    fn test_scheme_and_port_must_match() {
        let m = manager();
        assert_eq!(m.compute_redirect(Some("http://autolot.example/app"), "/"), "/");
        assert_eq!(
            m.compute_redirect(Some("https://autolot.example:8443/app"), "/"),
            "/"
        );
    }

    #[test]
    fn test_protocol_relative_and_backslash_rejected() {
        let m = manager();
        assert_eq!(m.compute_redirect(Some("//evil.example/x"), "/"), "/");
        assert_eq!(m.compute_redirect(Some("/\\evil.example/x"), "/"), "/");
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let m = manager();
        assert_eq!(m.compute_redirect(Some("javascript:alert(1)"), "/"), "/");
        assert_eq!(m.compute_redirect(Some("data:text/html,hi"), "/"), "/");
    }

    #[test]
    fn test_single_and_double_encoding_decoded() {
        let m = manager();
        assert_eq!(m.compute_redirect(Some("%2Fapp%2Fads%2F42"), "/"), "/app/ads/42");
        assert_eq!(
            m.compute_redirect(Some("%252Fapp%252Fads%252F42"), "/"),
            "/app/ads/42"
        );
    }

    #[test]
    fn test_encoded_foreign_origin_rejected() {
        let m = manager();
        assert_eq!(
            m.compute_redirect(Some("https%3A%2F%2Fevil.example%2Fx"), "/"),
            "/"
        );
        assert_eq!(
            m.compute_redirect(Some("https%253A%252F%252Fevil.example"), "/"),
            "/"
        );
    }

    #[test]
    fn test_triple_encoding_not_fully_decoded() {
        // After two passes "%2Fapp" remains, which resolves relative to the
        // origin root rather than escaping it.
        let target = manager().compute_redirect(Some("%25252Fapp"), "/");
        assert!(target.starts_with('/'));
        assert!(!target.contains("//"));
    }

    #[test]
    fn test_login_target_encodes_callback() {
        assert_eq!(
            manager().login_target("/login", Some("/app/ads/42?tab=photos"), Some("session_expired")),
            "/login?callbackUrl=%2Fapp%2Fads%2F42%3Ftab%3Dphotos&reason=session_expired"
        );
    }

    #[test]
    fn test_encoded_query_of_target_preserved() {
        let m = manager();
        assert_eq!(
            m.compute_redirect(Some("/app/search?q=a%26b%3Dc"), "/"),
            "/app/search?q=a%26b%3Dc"
        );
        assert_eq!(
            m.login_target("/login", Some("/app/search?q=a%26b%3Dc"), None),
            "/login?callbackUrl=%2Fapp%2Fsearch%3Fq%3Da%2526b%253Dc"
        );
    }

    #[test]
    fn test_login_round_trip_returns_to_same_page() {
        let m = manager();
        let page = "/app/search?q=a%26b%3Dc&sort=price%20asc";
        let location = m.login_target("/login", Some(page), Some("login_required"));

        let query = Url::parse("https://autolot.example")
            .unwrap()
            .join(&location)
            .unwrap();
        let callback = query
            .query_pairs()
            .find(|(name, _)| name == CALLBACK_PARAM)
            .map(|(_, value)| value.into_owned());

        assert_eq!(m.compute_redirect(callback.as_deref(), "/"), page);
    }

    #[test]
    fn test_encoded_slashes_inside_path_rejected() {
        assert_eq!(manager().compute_redirect(Some("/%2F%2Fevil.example/x"), "/"), "/");
    }

    #[test]
    fn test_login_target_drops_unsafe_callback() {
        assert_eq!(
            manager().login_target("/login", Some("https://evil.example"), None),
            "/login"
        );
    }
}
