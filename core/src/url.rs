/*
 * url.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an embeddable HTTP client.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Minimal URL parser for http/https request targets. Splits authority from
//! path at the first `/`; a `:` before that slash is the port separator. The
//! path is passed through verbatim (no userinfo, no fragment stripping, no
//! percent handling).

const HOST_MAX: usize = 255;
const PORT_MAX: usize = 7;
const PATH_MAX: usize = 2047;

/// A parsed request target. `port` stays a numeric string because it feeds
/// name resolution as a service argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub https: bool,
    pub host: String,
    pub port: String,
    pub path: String,
}

impl ParsedUrl {
    /// True when the port is the scheme default (80 for http, 443 for https),
    /// in which case rebuilt URLs omit it.
    pub fn is_default_port(&self) -> bool {
        self.port == if self.https { "443" } else { "80" }
    }
}

/// Parse `http://` / `https://` URLs (case-sensitive scheme match). Returns
/// None for anything else, an over-long host, or an over-long port.
pub fn parse(url: &str) -> Option<ParsedUrl> {
    let (https, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return None;
    };

    let slash = rest.find('/');
    let authority = match slash {
        Some(i) => &rest[..i],
        None => rest,
    };

    let (host, port) = match authority.find(':') {
        Some(colon) => {
            let host = &authority[..colon];
            let port = &authority[colon + 1..];
            if port.len() > PORT_MAX {
                return None;
            }
            (host, port.to_string())
        }
        None => (authority, if https { "443" } else { "80" }.to_string()),
    };
    if host.len() > HOST_MAX {
        return None;
    }

    // Path is everything from the slash on, truncated at the limit; a `:`
    // after the slash belongs to the path.
    let mut path = match slash {
        Some(i) => rest[i..].to_string(),
        None => "/".to_string(),
    };
    if path.len() > PATH_MAX {
        let mut cut = PATH_MAX;
        while !path.is_char_boundary(cut) {
            cut -= 1;
        }
        path.truncate(cut);
    }

    Some(ParsedUrl {
        https,
        host: host.to_string(),
        port,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_with_port_and_path() {
        let u = parse("http://h:8080/x").unwrap();
        assert!(!u.https);
        assert_eq!(u.host, "h");
        assert_eq!(u.port, "8080");
        assert_eq!(u.path, "/x");
    }

    #[test]
    fn defaults_by_scheme() {
        let u = parse("http://example.com").unwrap();
        assert_eq!(u.port, "80");
        assert_eq!(u.path, "/");
        assert!(u.is_default_port());

        let u = parse("https://example.com/a/b").unwrap();
        assert!(u.https);
        assert_eq!(u.port, "443");
        assert_eq!(u.path, "/a/b");
    }

    #[test]
    fn colon_after_slash_is_path() {
        let u = parse("http://h/x:y").unwrap();
        assert_eq!(u.host, "h");
        assert_eq!(u.port, "80");
        assert_eq!(u.path, "/x:y");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse("ftp://h/").is_none());
        assert!(parse("HTTP://h/").is_none());
        assert!(parse("h/x").is_none());
    }

    #[test]
    fn rejects_over_long_host_and_port() {
        let long_host = format!("http://{}/", "a".repeat(256));
        assert!(parse(&long_host).is_none());
        assert!(parse("http://h:12345678/").is_none());
    }

    #[test]
    fn query_stays_in_path_verbatim() {
        let u = parse("http://h/p?a=%20b#frag").unwrap();
        assert_eq!(u.path, "/p?a=%20b#frag");
    }
}
