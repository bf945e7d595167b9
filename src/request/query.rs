//! Query-string decoding and the small text helpers shared by view setters.

/// Keys honoured on read requests.
pub const READ_KEYS: &[&str] = &[
    "distinct", "filter", "where", "columns", "exclude", "include", "order", "page", "start",
    "length", "join", "group", "having", "relation",
];

/// Keys honoured on write requests.
pub const WRITE_KEYS: &[&str] = &["filter", "where", "relation"];

/// One decoded query parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParam {
    /// `children` in `children.filter=...`.
    pub target: Option<String>,
    /// Normalized key: lower-case, `[]` stripped, `w` folded into `where`.
    pub key: String,
    pub value: String,
    /// Key as sent, for pass-through.
    pub raw_key: String,
}

fn normalize_key(key: &str) -> String {
    let key = key.trim().trim_end_matches("[]").to_lowercase();
    if key == "w" {
        "where".to_string()
    } else {
        key
    }
}

/// Decode `application/x-www-form-urlencoded` pairs, keeping `+` literal.
pub fn parse_query(raw: &str) -> Vec<QueryParam> {
    let raw = raw.trim_start_matches('?').replace('+', "%2B");
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| {
            let raw_key = k.into_owned();
            let stripped = raw_key.trim().trim_end_matches("[]");
            let (target, key) = match stripped.rsplit_once('.') {
                Some((table, key)) if READ_KEYS.contains(&normalize_key(key).as_str()) => {
                    (Some(table.to_string()), normalize_key(key))
                }
                _ => (None, normalize_key(stripped)),
            };
            QueryParam {
                target,
                key,
                value: v.into_owned(),
                raw_key,
            }
        })
        .collect()
}

/// Split on commas that sit outside parentheses, brackets and single quotes.
pub fn split_top_level(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in s.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' | '[' if !in_quote => depth += 1,
            ')' | ']' if !in_quote => depth -= 1,
            ',' if !in_quote && depth <= 0 => {
                let part = current.trim().to_string();
                if !part.is_empty() {
                    out.push(part);
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    let part = current.trim().to_string();
    if !part.is_empty() {
        out.push(part);
    }
    out
}

/// Keep ASCII alphanumerics, `_`, and any character listed in `extra`. A run of `-` shrinks to one.
pub fn sanitize(s: &str, extra: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || extra.contains(*c)) {
        if c != '-' || !out.ends_with('-') {
            out.push(c);
        }
    }
    out
}

/// Digits only; anything else in the value is ignored.
pub fn parse_u64(s: &str) -> Option<u64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// A key present with an empty value or any value other than `false`/`0`.
pub fn truthy(s: &str) -> bool {
    !matches!(s.trim().to_lowercase().as_str(), "false" | "0" | "no")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_keys() {
        let params = parse_query("W=a,eq,1&Filter[]=b,gt,2&children.order=name&x.y=1");
        assert_eq!(params[0].key, "where");
        assert_eq!(params[1].key, "filter");
        assert_eq!(params[2].target.as_deref(), Some("children"));
        assert_eq!(params[2].key, "order");
        assert_eq!(params[3].target, None);
        assert_eq!(params[3].key, "x.y");
    }

    #[test]
    fn plus_stays_literal() {
        let params = parse_query("filter=a,eq,1+1&name=a%20b");
        assert_eq!(params[0].value, "a,eq,1+1");
        assert_eq!(params[1].value, "a b");
    }

    #[test]
    fn splits_outside_groups() {
        assert_eq!(
            split_top_level("name, concat(a,b)@ab ,'x,y',"),
            vec!["name", "concat(a,b)@ab", "'x,y'"]
        );
    }

    #[test]
    fn sanitize_never_leaves_double_hyphen() {
        assert_eq!(sanitize("parents--", ".-"), "parents-");
        assert_eq!(sanitize("name;--x", ".-"), "name-x");
        assert_eq!(sanitize("a.b", ""), "ab");
    }

    #[test]
    fn parses_digits() {
        assert_eq!(parse_u64("1a0"), Some(10));
        assert_eq!(parse_u64("x"), None);
        assert!(truthy(""));
        assert!(!truthy("false"));
    }
}
