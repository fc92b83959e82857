//! URL normalization and the compact protocol-tagged URL form.
//!
//! Web URLs are stored as `<tag><authority><rest>`, where the tag is `s:` for
//! https and `h:` for http, the authority is the host without a leading
//! `www.` (plus an explicit port), and the rest is path, query and fragment.
//! Anything else is kept verbatim behind the `u:` tag.

use url::{ParseError, Url};

pub(crate) const HTTPS_TAG: &str = "s:";
pub(crate) const HTTP_TAG: &str = "h:";
pub(crate) const OPAQUE_TAG: &str = "u:";

const DEFAULT_SCHEME_PREFIX: &str = "https://";

/// Query parameters that only carry tracking state.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "igshid",
    "yclid",
    "twclid",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompactUrl {
    Web {
        secure: bool,
        authority: String,
        rest: String,
    },
    Opaque(String),
}

impl CompactUrl {
    pub(crate) fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CompactUrl::Opaque(String::new());
        }
        match Url::parse(trimmed) {
            Ok(url) => Self::from_url(&url).unwrap_or_else(|| CompactUrl::Opaque(trimmed.into())),
            Err(ParseError::RelativeUrlWithoutBase) => {
                let with_scheme = format!("{DEFAULT_SCHEME_PREFIX}{trimmed}");
                match Url::parse(&with_scheme) {
                    Ok(url) => {
                        Self::from_url(&url).unwrap_or(CompactUrl::Opaque(with_scheme))
                    }
                    Err(_) => CompactUrl::Opaque(with_scheme),
                }
            }
            Err(_) if !trimmed.contains("://") => {
                CompactUrl::Opaque(format!("{DEFAULT_SCHEME_PREFIX}{trimmed}"))
            }
            Err(_) => CompactUrl::Opaque(trimmed.into()),
        }
    }

    fn from_url(url: &Url) -> Option<Self> {
        let secure = match url.scheme() {
            "https" => true,
            "http" => false,
            _ => return None,
        };
        if !url.username().is_empty() || url.password().is_some() {
            return None;
        }
        let host = url.host_str()?;
        let host = match host.strip_prefix("www.") {
            Some(bare) if !bare.is_empty() => bare,
            _ => host,
        };
        let mut authority = host.to_string();
        if let Some(port) = url.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }

        let mut rest = strip_trailing_slash(url.path()).to_string();
        if let Some(query) = url.query() {
            let kept = strip_tracking_params(query);
            if !kept.is_empty() {
                rest.push('?');
                rest.push_str(&kept);
            }
        }
        if let Some(fragment) = url.fragment() {
            rest.push('#');
            rest.push_str(fragment);
        }
        Some(CompactUrl::Web {
            secure,
            authority,
            rest,
        })
    }

    /// Tag plus authority, the unit shared through the domain table.
    pub(crate) fn domain_key(&self) -> Option<String> {
        match self {
            CompactUrl::Web {
                secure, authority, ..
            } => Some(format!("{}{authority}", tag_for(*secure))),
            CompactUrl::Opaque(_) => None,
        }
    }

    pub(crate) fn rest(&self) -> &str {
        match self {
            CompactUrl::Web { rest, .. } => rest,
            CompactUrl::Opaque(raw) => raw,
        }
    }

    pub(crate) fn to_compact(&self) -> String {
        match self {
            CompactUrl::Web {
                secure,
                authority,
                rest,
            } => format!("{}{authority}{rest}", tag_for(*secure)),
            CompactUrl::Opaque(raw) => format!("{OPAQUE_TAG}{raw}"),
        }
    }

    pub(crate) fn to_url(&self) -> String {
        match self {
            CompactUrl::Web {
                secure,
                authority,
                rest,
            } => {
                let scheme = if *secure { "https" } else { "http" };
                format!("{scheme}://{authority}{rest}")
            }
            CompactUrl::Opaque(raw) => raw.clone(),
        }
    }
}

fn tag_for(secure: bool) -> &'static str {
    if secure {
        HTTPS_TAG
    } else {
        HTTP_TAG
    }
}

/// Drop one trailing slash. A path ending in `//` is left alone so that
/// normalizing twice gives the same result.
fn strip_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.ends_with('/') => stripped,
        _ => path,
    }
}

fn strip_tracking_params(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| {
            if pair.is_empty() {
                return false;
            }
            let name = pair.split('=').next().unwrap_or(pair);
            !TRACKING_PARAMS
                .iter()
                .any(|tracked| tracked.eq_ignore_ascii_case(name))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical form of a URL as it comes back out of the codec.
pub fn normalize_url(raw: &str) -> String {
    CompactUrl::parse(raw).to_url()
}

pub fn compact_url(raw: &str) -> String {
    CompactUrl::parse(raw).to_compact()
}

/// Inverse of [`compact_url`]. Strings without a known tag are returned as-is.
pub fn expand_url(compact: &str) -> String {
    if let Some(rest) = compact.strip_prefix(HTTPS_TAG) {
        format!("https://{rest}")
    } else if let Some(rest) = compact.strip_prefix(HTTP_TAG) {
        format!("http://{rest}")
    } else if let Some(rest) = compact.strip_prefix(OPAQUE_TAG) {
        rest.to_string()
    } else {
        compact.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_www_and_trailing_slash_are_dropped() {
        assert_eq!(compact_url("https://www.example.com/docs/"), "s:example.com/docs");
        assert_eq!(normalize_url("https://www.example.com/docs/"), "https://example.com/docs");
    }

    #[test]
    fn root_path_collapses() {
        assert_eq!(compact_url("http://example.com/"), "h:example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
    }

    #[test]
    fn tracking_params_removed_others_kept() {
        let url = "https://shop.example.com/item?id=42&utm_source=news&ref=home&fbclid=abc#reviews";
        assert_eq!(
            normalize_url(url),
            "https://shop.example.com/item?id=42&ref=home#reviews"
        );
    }

    #[test]
    fn only_tracking_params_drops_query() {
        assert_eq!(
            normalize_url("https://example.com/a?utm_medium=x&gclid=y"),
            "https://example.com/a"
        );
    }

    #[test]
    fn explicit_port_is_kept() {
        assert_eq!(compact_url("http://localhost:8080/app/"), "h:localhost:8080/app");
        assert_eq!(compact_url("https://example.com:443/x"), "s:example.com/x");
    }

    #[test]
    fn missing_scheme_gets_default() {
        assert_eq!(normalize_url("example.com/path"), "https://example.com/path");
    }

    #[test]
    fn malformed_url_passes_through_with_scheme() {
        let normalized = normalize_url("not a url at all");
        assert!(normalized.starts_with("https://"));
        assert!(normalized.contains("not a url at all"));
    }

    #[test]
    fn non_web_schemes_kept_verbatim() {
        for raw in [
            "chrome://extensions",
            "about:blank",
            "file:///home/user/notes.txt",
            "data:image/png;base64,iVBORw0KGgo=",
        ] {
            assert_eq!(compact_url(raw), format!("u:{raw}"));
            assert_eq!(expand_url(&compact_url(raw)), raw);
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "https://www.example.com/a/?utm_source=x&q=1#top",
            "http://example.com//",
            "example.org",
            "https://example.com/a//",
            "https://user:pw@example.com/private",
            "weird input",
            "https://example.com/search?q=a+b&utm_campaign=c",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn expand_inverts_compact() {
        for raw in [
            "https://www.example.com/docs/intro?lang=en#install",
            "http://example.com:8080/",
            "about:blank",
        ] {
            assert_eq!(expand_url(&compact_url(raw)), normalize_url(raw));
        }
    }

    #[test]
    fn domain_key_includes_tag_and_port() {
        let url = CompactUrl::parse("http://example.com:81/x");
        assert_eq!(url.domain_key().as_deref(), Some("h:example.com:81"));
        assert_eq!(url.rest(), "/x");
        assert!(CompactUrl::parse("about:blank").domain_key().is_none());
    }
}
