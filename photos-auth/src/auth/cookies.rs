//! Cookie header parsing and `Set-Cookie` construction.

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// Value of the first cookie called `name` across every `Cookie` header of the request.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(cookie_name, _)| *cookie_name == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Attributes shared by every cookie this crate issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
}

/// `Set-Cookie` value for an `HttpOnly` cookie scoped to `/`.
///
/// With `max_age` set the cookie survives a browser restart; without it the browser drops it at
/// the end of the session.
pub fn build_cookie(name: &str, value: &str, max_age: Option<std::time::Duration>, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite={}", options.same_site);
    // browsers reject SameSite=None without Secure
    if options.secure || options.same_site == SameSite::None {
        cookie.push_str("; Secure");
    }
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
    }
    cookie
}

/// `Set-Cookie` value that deletes `name` on the client.
pub fn expired_cookie(name: &str, options: &CookieOptions) -> String {
    format!(
        "{}; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        build_cookie(name, "", Some(std::time::Duration::ZERO), options)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn options() -> CookieOptions {
        CookieOptions {
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    #[test]
    fn test_read_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; PhotosApp.Auth=abc123; other=1"));

        assert_eq!(read_cookie(&headers, "PhotosApp.Auth"), Some("abc123"));
        assert_eq!(read_cookie(&headers, "theme"), Some("dark"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_cookie_across_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2"));

        assert_eq!(read_cookie(&headers, "b"), Some("2"));
    }

    #[test]
    fn test_read_cookie_ignores_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("PhotosApp.Auth="));

        assert_eq!(read_cookie(&headers, "PhotosApp.Auth"), None);
    }

    #[test]
    fn test_session_cookie_without_max_age() {
        let cookie = build_cookie("PhotosApp.Auth", "id", None, &options());
        assert_eq!(cookie, "PhotosApp.Auth=id; Path=/; HttpOnly; SameSite=Lax; Secure");
    }

    #[test]
    fn test_persistent_cookie_has_max_age() {
        let cookie = build_cookie(
            "PhotosApp.Auth",
            "id",
            Some(Duration::from_secs(3600)),
            &CookieOptions {
                secure: false,
                same_site: SameSite::Strict,
            },
        );
        assert_eq!(cookie, "PhotosApp.Auth=id; Path=/; HttpOnly; SameSite=Strict; Max-Age=3600");
    }

    #[test]
    fn test_same_site_none_forces_secure() {
        let cookie = build_cookie(
            "c",
            "v",
            None,
            &CookieOptions {
                secure: false,
                same_site: SameSite::None,
            },
        );
        assert!(cookie.contains("; Secure"));
    }

    #[test]
    fn test_expired_cookie() {
        let cookie = expired_cookie("PhotosApp.Auth", &options());
        assert!(cookie.starts_with("PhotosApp.Auth=; Path=/; HttpOnly"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }
}
