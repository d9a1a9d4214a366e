//! Caller identity resolution and provisioning.

use std::borrow::Borrow;
use std::fmt;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

/// Header carrying a caller-chosen identity. Takes priority over the cookie.
pub const IDENTITY_HEADER: &str = "x-user-id";
/// Cookie carrying a previously issued identity.
pub const IDENTITY_COOKIE: &str = "userId";
/// Lifetime of the identity cookie, in seconds.
pub const IDENTITY_COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Opaque, non-empty token naming one rate-limited caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a caller-supplied value. Empty strings are not identities.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Generate a fresh random (v4) identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// The identity was generated for this request and must be handed back
    /// to the caller.
    pub is_new: bool,
}

/// Picks the caller identity from request hints, provisioning one if needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    secure_cookies: bool,
}

impl IdentityResolver {
    /// `secure_cookies` marks issued cookies `Secure` (production deployments).
    pub fn new(secure_cookies: bool) -> Self {
        Self { secure_cookies }
    }

    /// Resolve from an explicit header hint and a cookie hint.
    pub fn resolve(&self, header: Option<&str>, cookie: Option<&str>) -> ResolvedIdentity {
        match header
            .and_then(Identity::new)
            .or_else(|| cookie.and_then(Identity::new))
        {
            Some(identity) => ResolvedIdentity {
                identity,
                is_new: false,
            },
            None => ResolvedIdentity {
                identity: Identity::generate(),
                is_new: true,
            },
        }
    }

    /// Resolve from request headers (`x-user-id`, then the `userId` cookie).
    pub fn resolve_headers(&self, headers: &HeaderMap) -> ResolvedIdentity {
        let header = headers
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok());
        let cookie = cookie_value(headers, IDENTITY_COOKIE);
        self.resolve(header, cookie)
    }

    /// Cookie that persists a newly issued identity on the caller.
    pub fn cookie_for(&self, identity: &Identity) -> IdentityCookie {
        IdentityCookie {
            identity: identity.clone(),
            max_age_secs: IDENTITY_COOKIE_MAX_AGE_SECS,
            secure: self.secure_cookies,
        }
    }
}

/// `Set-Cookie` value for an issued identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCookie {
    pub identity: Identity,
    pub max_age_secs: u64,
    pub secure: bool,
}

impl fmt::Display for IdentityCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Max-Age={}; HttpOnly",
            IDENTITY_COOKIE, self.identity, self.max_age_secs
        )?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Find a cookie by name across every `Cookie` header.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_header_takes_priority() {
        let resolver = IdentityResolver::default();
        let resolved = resolver.resolve(Some("from-header"), Some("from-cookie"));

        assert_eq!(resolved.identity.as_str(), "from-header");
        assert!(!resolved.is_new);
    }

    #[test]
    fn test_cookie_fallback() {
        let resolver = IdentityResolver::default();
        let resolved = resolver.resolve(None, Some("from-cookie"));

        assert_eq!(resolved.identity.as_str(), "from-cookie");
        assert!(!resolved.is_new);
    }

    #[test]
    fn test_empty_header_falls_back_to_cookie() {
        let resolver = IdentityResolver::default();
        let resolved = resolver.resolve(Some(""), Some("from-cookie"));

        assert_eq!(resolved.identity.as_str(), "from-cookie");
    }

    #[test]
    fn test_generates_uuid_v4_when_absent() {
        let resolver = IdentityResolver::default();
        let resolved = resolver.resolve(None, Some(""));

        assert!(resolved.is_new);
        let parsed = Uuid::parse_str(resolved.identity.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_generated_identities_differ() {
        assert_ne!(Identity::generate(), Identity::generate());
    }

    #[test]
    fn test_caller_values_used_verbatim() {
        let resolver = IdentityResolver::default();
        let resolved = resolver.resolve(Some("not a uuid at all!"), None);

        assert_eq!(resolved.identity.as_str(), "not a uuid at all!");
    }

    #[test]
    fn test_resolve_headers_reads_cookie_among_others() {
        let resolver = IdentityResolver::default();
        let map = headers(&[("cookie", "theme=dark; userId=abc-123; lang=en")]);

        let resolved = resolver.resolve_headers(&map);
        assert_eq!(resolved.identity.as_str(), "abc-123");
        assert!(!resolved.is_new);
    }

    #[test]
    fn test_resolve_headers_prefers_header() {
        let resolver = IdentityResolver::default();
        let map = headers(&[("x-user-id", "alice"), ("cookie", "userId=bob")]);

        assert_eq!(resolver.resolve_headers(&map).identity.as_str(), "alice");
    }

    #[test]
    fn test_resolve_headers_ignores_similar_cookie_names() {
        let resolver = IdentityResolver::default();
        let map = headers(&[("cookie", "xuserId=nope")]);

        assert!(resolver.resolve_headers(&map).is_new);
    }

    #[test]
    fn test_cookie_rendering() {
        let identity = Identity::new("abc").unwrap();

        let plain = IdentityResolver::new(false).cookie_for(&identity);
        assert_eq!(plain.to_string(), "userId=abc; Max-Age=86400; HttpOnly");

        let secure = IdentityResolver::new(true).cookie_for(&identity);
        assert_eq!(secure.to_string(), "userId=abc; Max-Age=86400; HttpOnly; Secure");
    }

    #[test]
    fn test_empty_identity_rejected() {
        assert!(Identity::new("").is_none());
    }
}
