// URL normalization for lexical analysis

/// A submitted URL split into the parts the lexical features look at.
///
/// Nothing is re-encoded: percent escapes, default ports and letter case in
/// the path survive exactly as submitted, because they are signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub scheme: String,
    /// Network location (host, port, user-info), lower-cased.
    pub host: String,
    pub path: String,
    pub query: String,
    pub full: String,
}

/// Normalize an arbitrary string into a [`NormalizedUrl`].
///
/// A missing scheme becomes `http`. Never fails; garbage in yields a
/// well-formed value with an empty host.
pub fn normalize(raw: &str) -> NormalizedUrl {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
        .collect();

    let (scheme, rest) = match cleaned.find("://") {
        Some(idx) if is_scheme(&cleaned[..idx]) => {
            (cleaned[..idx].to_lowercase(), &cleaned[idx + 3..])
        }
        _ => ("http".to_string(), cleaned.as_str()),
    };

    let netloc_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let netloc = &rest[..netloc_end];
    let remainder = &rest[netloc_end..];

    let (remainder, fragment) = match remainder.find('#') {
        Some(idx) => (&remainder[..idx], &remainder[idx + 1..]),
        None => (remainder, ""),
    };
    let (path, query) = match remainder.find('?') {
        Some(idx) => (&remainder[..idx], &remainder[idx + 1..]),
        None => (remainder, ""),
    };

    let mut full = format!("{}://{}{}", scheme, netloc, path);
    if !query.is_empty() {
        full.push('?');
        full.push_str(query);
    }
    if !fragment.is_empty() {
        full.push('#');
        full.push_str(fragment);
    }

    NormalizedUrl {
        scheme,
        host: netloc.to_lowercase(),
        path: path.to_string(),
        query: query.to_string(),
        full,
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme() {
        let url = normalize("example.com/login");
        assert_eq!(url.scheme, "http");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.path, "/login");
        assert_eq!(url.query, "");
        assert_eq!(url.full, "http://example.com/login");
    }

    #[test]
    fn test_normalize_keeps_port_and_case_in_full() {
        let url = normalize("HTTPS://Example.COM:80/a/B.exe?x=1&y=2#top");
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "example.com:80");
        assert_eq!(url.path, "/a/B.exe");
        assert_eq!(url.query, "x=1&y=2");
        assert_eq!(url.full, "https://Example.COM:80/a/B.exe?x=1&y=2#top");
    }

    #[test]
    fn test_normalize_query_without_path() {
        let url = normalize("http://example.com?q=1");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.path, "");
        assert_eq!(url.query, "q=1");
        assert_eq!(url.full, "http://example.com?q=1");
    }

    #[test]
    fn test_normalize_degenerate_input() {
        let empty = normalize("");
        assert_eq!(empty.scheme, "http");
        assert_eq!(empty.host, "");
        assert_eq!(empty.full, "http://");

        let junk = normalize("  not a url!!! ");
        assert_eq!(junk.scheme, "http");
        assert_eq!(junk.host, "not a url!!!");

        // Invalid scheme text is treated as part of the address
        let odd = normalize("1ab://x");
        assert_eq!(odd.scheme, "http");
        assert_eq!(odd.host, "1ab:");
    }

    #[test]
    fn test_normalize_strips_control_whitespace() {
        let url = normalize("http://exa\tmple.com/pa\nth");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.path, "/path");
    }
}
