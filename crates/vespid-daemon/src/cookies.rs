// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cookie names, parsing, and `Set-Cookie` construction.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use vespid_config::{ControlPlaneConfig, Environment};

/// Refresh-session cookie.
pub const SESSION_COOKIE: &str = "vespid_session";
/// OAuth login state cookie.
pub const OAUTH_STATE_COOKIE: &str = "vespid_oauth_state";
/// OAuth login nonce cookie.
pub const OAUTH_NONCE_COOKIE: &str = "vespid_oauth_nonce";
/// Vertex flow state cookie.
pub const VERTEX_STATE_COOKIE: &str = "vespid_vertex_oauth_state";
/// Vertex flow nonce cookie.
pub const VERTEX_NONCE_COOKIE: &str = "vespid_vertex_oauth_nonce";

/// Read one cookie value from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

/// Build a `Set-Cookie` value: httpOnly, lax, path=/, `Secure` in
/// production.
pub fn set_cookie(config: &ControlPlaneConfig, name: &str, value: &str, max_age_sec: u64) -> String {
    let mut cookie =
        format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_sec}");
    if config.environment == Environment::Production {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build a cookie-clearing `Set-Cookie` value.
pub fn clear_cookie(config: &ControlPlaneConfig, name: &str) -> String {
    set_cookie(config, name, "", 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::collections::BTreeMap;
    use vespid_config::ControlPlaneConfig;

    fn config(production: bool) -> ControlPlaneConfig {
        let mut vars = BTreeMap::from([
            ("AUTH_TOKEN_SECRET".to_owned(), "a".to_owned()),
            ("REFRESH_TOKEN_SECRET".to_owned(), "r".to_owned()),
            ("OAUTH_STATE_SECRET".to_owned(), "o".to_owned()),
        ]);
        if production {
            vars.insert("VESPID_ENV".into(), "production".into());
        }
        ControlPlaneConfig::from_vars(&vars).unwrap()
    }

    #[test]
    fn parses_cookies_from_the_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("a=1; vespid_session=blob.sig; b=2"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("blob.sig")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn secure_flag_follows_environment() {
        let dev = set_cookie(&config(false), SESSION_COOKIE, "v", 600);
        assert!(!dev.contains("Secure"));
        assert!(dev.contains("HttpOnly"));
        assert!(dev.contains("SameSite=Lax"));

        let prod = set_cookie(&config(true), SESSION_COOKIE, "v", 600);
        assert!(prod.contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cleared = clear_cookie(&config(false), SESSION_COOKIE);
        assert!(cleared.contains("Max-Age=0"));
    }
}
