//! String utilities: Overpass QL escaping, Greek name normalization,
//! search query injection checks and URL allow-listing

use std::collections::HashSet;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use url::Url;

use crate::errors::DomainError;

/// Maximum accepted length of a free-text search query (in characters)
pub const MAX_QUERY_LENGTH: usize = 200;

/// Characters with special meaning in Overpass (POSIX extended) regular expressions
const REGEX_SPECIAL: &[char] = &[
    '\\', '.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']',
];

/// Characters that chain shell or query commands
const COMMAND_CHAIN_CHARS: &[char] = &[';', '|', '&', '$', '`'];

/// Scheme-like prefixes that must not appear in a name search
const URL_PATTERNS: &[&str] = &["javascript:", "vbscript:", "data:", "<script", "</script"];

/// SQL keywords rejected when they appear as whole words
const SQL_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "union", "exec", "alter", "truncate",
];

/// Administrative prefixes stripped by [`normalize_area_name`], in folded form
const AREA_PREFIXES: &[&str] = &[
    "δημοτικη ενοτητα ",
    "δημοτικη κοινοτητα ",
    "τοπικη κοινοτητα ",
    "περιφερειακη ενοτητα ",
    "αποκεντρωμενη διοικηση ",
    "περιφερεια ",
    "δημοσ ",
    "κοινοτητα ",
    "νομοσ ",
];

static URL_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // Infallible with valid static patterns
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(URL_PATTERNS)
        .expect("Failed to build URL pattern matcher")
});

static SQL_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // Infallible with valid static patterns
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(SQL_KEYWORDS)
        .expect("Failed to build SQL keyword matcher")
});

/// Escape a string so it matches literally inside an Overpass regex filter
#[must_use]
pub fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        if REGEX_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a tag key or value for interpolation inside a double-quoted
/// Overpass QL string
///
/// Backslashes and quotes are escaped, common whitespace escapes are
/// rendered as escape sequences and other control characters are dropped.
#[must_use]
pub fn escape_tag_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {},
            c => out.push(c),
        }
    }
    out
}

/// Map accented Greek letters to their base form and final sigma to sigma
fn fold_greek(c: char) -> char {
    match c {
        'ά' | 'Ά' => 'α',
        'έ' | 'Έ' => 'ε',
        'ή' | 'Ή' => 'η',
        'ί' | 'Ί' | 'ϊ' | 'Ϊ' | 'ΐ' => 'ι',
        'ό' | 'Ό' => 'ο',
        'ύ' | 'Ύ' | 'ϋ' | 'Ϋ' | 'ΰ' => 'υ',
        'ώ' | 'Ώ' => 'ω',
        'ς' => 'σ',
        other => other,
    }
}

/// Normalize a (typically Greek) area name for comparison and cache keys
///
/// Lower-cases, strips tonos and dialytika, folds final sigma, collapses
/// whitespace and removes administrative prefixes such as «Δήμος».
/// The function is idempotent.
#[must_use]
pub fn normalize_area_name(input: &str) -> String {
    let folded: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_greek)
        // Combining acute/diaeresis marks left over from decomposed input
        .filter(|c| !matches!(c, '\u{0301}' | '\u{0308}' | '\u{0344}'))
        .collect();

    let mut normalized = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let Some(rest) = AREA_PREFIXES
            .iter()
            .find_map(|prefix| normalized.strip_prefix(prefix))
        else {
            break;
        };
        if rest.is_empty() {
            break;
        }
        normalized = rest.to_string();
    }

    normalized
}

/// Whether a match at `start..end` is delimited by non-alphanumeric characters
fn is_whole_word(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    let boundary = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric() && c != '_');
    boundary(before) && boundary(after)
}

/// Validate a free-text search query before it is interpolated into a query
///
/// Returns the trimmed query on success.
///
/// # Errors
///
/// Returns `DomainError::InvalidSearchQuery` for empty or overlong input,
/// HTML tags, script/js/data URLs, SQL keywords and command chaining characters.
pub fn validate_search_query(query: &str) -> Result<&str, DomainError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidSearchQuery(
            "query must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_QUERY_LENGTH {
        return Err(DomainError::InvalidSearchQuery(format!(
            "query exceeds {MAX_QUERY_LENGTH} characters"
        )));
    }
    if let Some(m) = URL_MATCHER.find(trimmed) {
        return Err(DomainError::InvalidSearchQuery(format!(
            "forbidden pattern '{}'",
            URL_PATTERNS[m.pattern().as_usize()]
        )));
    }
    if let (Some(open), Some(close)) = (trimmed.find('<'), trimmed.rfind('>')) {
        if open < close {
            return Err(DomainError::InvalidSearchQuery(
                "HTML tags are not allowed".to_string(),
            ));
        }
    }
    if let Some(c) = trimmed.chars().find(|c| COMMAND_CHAIN_CHARS.contains(c)) {
        return Err(DomainError::InvalidSearchQuery(format!(
            "character '{c}' is not allowed"
        )));
    }
    if let Some(m) = SQL_MATCHER
        .find_overlapping_iter(trimmed)
        .find(|m| is_whole_word(trimmed, m.start(), m.end()))
    {
        return Err(DomainError::InvalidSearchQuery(format!(
            "keyword '{}' is not allowed",
            SQL_KEYWORDS[m.pattern().as_usize()]
        )));
    }
    if trimmed.contains("--") || trimmed.contains("/*") {
        return Err(DomainError::InvalidSearchQuery(
            "comment sequences are not allowed".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Check a URL against a host allow-list
///
/// Only `https` is accepted unless `allow_insecure` is set, in which case
/// `http` is accepted as well. The host must be in `allowed_hosts`.
///
/// # Errors
///
/// Returns `DomainError::UrlNotAllowed` with the reason.
pub fn check_allowed_url(
    raw: &str,
    allowed_hosts: &HashSet<String>,
    allow_insecure: bool,
) -> Result<Url, DomainError> {
    let url = Url::parse(raw).map_err(|e| DomainError::UrlNotAllowed(format!("{raw}: {e}")))?;

    match url.scheme() {
        "https" => {},
        "http" if allow_insecure => {},
        scheme => {
            return Err(DomainError::UrlNotAllowed(format!(
                "{raw}: scheme '{scheme}' is not permitted"
            )));
        },
    }

    let host = url
        .host_str()
        .ok_or_else(|| DomainError::UrlNotAllowed(format!("{raw}: missing host")))?;
    if !allowed_hosts.contains(&host.to_ascii_lowercase()) {
        return Err(DomainError::UrlNotAllowed(format!(
            "{raw}: host '{host}' is not on the allow-list"
        )));
    }

    Ok(url)
}

/// Boolean form of [`check_allowed_url`]
#[must_use]
pub fn is_allowed_url(raw: &str, allowed_hosts: &HashSet<String>, allow_insecure: bool) -> bool {
    check_allowed_url(raw, allowed_hosts, allow_insecure).is_ok()
}

/// Collect lower-cased host names from a list of server URLs, skipping invalid entries
#[must_use]
pub fn hosts_from_urls<S: AsRef<str>>(urls: &[S]) -> HashSet<String> {
    urls.iter()
        .filter_map(|u| Url::parse(u.as_ref()).ok())
        .filter_map(|u| u.host_str().map(str::to_ascii_lowercase))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_regex_special_chars() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape_regex("(x|y)"), "\\(x\\|y\\)");
        assert_eq!(escape_regex("Θεσσαλονίκη"), "Θεσσαλονίκη");
    }

    #[test]
    fn escape_tag_value_quotes_and_backslashes() {
        assert_eq!(escape_tag_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_tag_value(r"a\b"), r"a\\b");
        assert_eq!(escape_tag_value("line\nbreak"), "line\\nbreak");
        assert_eq!(escape_tag_value("bell\u{7}"), "bell");
    }

    #[test]
    fn escape_tag_value_blocks_breakout() {
        let escaped = escape_tag_value(r#"x"];node(1);out;("#);
        assert!(escaped.starts_with(r#"x\""#));
        assert!(!escaped.contains(r#"x""#));
    }

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize_area_name("Θεσσαλονίκη"), "θεσσαλονικη");
        assert_eq!(normalize_area_name("ΑΘΗΝΑ"), "αθηνα");
        assert_eq!(normalize_area_name("Πειραιάς"), "πειραιασ");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_area_name("  Νέα   Σμύρνη "), "νεα σμυρνη");
    }

    #[test]
    fn normalize_strips_admin_prefixes() {
        assert_eq!(normalize_area_name("Δήμος Θεσσαλονίκης"), "θεσσαλονικησ");
        assert_eq!(
            normalize_area_name("Περιφέρεια Κεντρικής Μακεδονίας"),
            "κεντρικησ μακεδονιασ"
        );
        assert_eq!(normalize_area_name("Δήμος Δήμος Χ"), "χ");
    }

    #[test]
    fn normalize_keeps_bare_prefix_word() {
        assert_eq!(normalize_area_name("Δήμος"), "δημοσ");
    }

    #[test]
    fn normalize_is_idempotent_on_samples() {
        for name in ["Δήμος Καλαμαριάς", "Άγιος Δημήτριος", "ΐΰ", "Κοινότητα  Ύδρας"] {
            let once = normalize_area_name(name);
            assert_eq!(normalize_area_name(&once), once);
        }
    }

    #[test]
    fn accepts_plain_names() {
        assert_eq!(validate_search_query("  Θεσσαλονίκη ").unwrap(), "Θεσσαλονίκη");
        assert!(validate_search_query("Agios Nikolaos").is_ok());
        assert!(validate_search_query("Selection Street").is_ok());
    }

    #[test]
    fn rejects_empty_and_long() {
        assert!(validate_search_query("   ").is_err());
        assert!(validate_search_query(&"α".repeat(201)).is_err());
    }

    #[test]
    fn rejects_html_and_scripts() {
        assert!(validate_search_query("<b>bold</b>").is_err());
        assert!(validate_search_query("<script>alert(1)</script>").is_err());
        assert!(validate_search_query("JavaScript:alert(1)").is_err());
        assert!(validate_search_query("data:text/html,abc").is_err());
    }

    #[test]
    fn rejects_sql_keywords_as_words() {
        assert!(validate_search_query("x union select 1").is_err());
        assert!(validate_search_query("DROP table").is_err());
        assert!(validate_search_query("name -- comment").is_err());
    }

    #[test]
    fn rejects_command_chaining() {
        assert!(validate_search_query("a; rm").is_err());
        assert!(validate_search_query("a && b").is_err());
        assert!(validate_search_query("a | b").is_err());
        assert!(validate_search_query("$(whoami)").is_err());
    }

    fn hosts() -> HashSet<String> {
        hosts_from_urls(&["https://overpass-api.de/api/interpreter"])
    }

    #[test]
    fn allows_configured_https_host() {
        assert!(is_allowed_url(
            "https://overpass-api.de/api/interpreter",
            &hosts(),
            false
        ));
    }

    #[test]
    fn rejects_http_unless_insecure_allowed() {
        let url = "http://overpass-api.de/api/interpreter";
        assert!(!is_allowed_url(url, &hosts(), false));
        assert!(is_allowed_url(url, &hosts(), true));
    }

    #[test]
    fn rejects_unknown_host_and_garbage() {
        assert!(!is_allowed_url("https://evil.example/api", &hosts(), false));
        assert!(!is_allowed_url("not a url", &hosts(), false));
        assert!(!is_allowed_url("ftp://overpass-api.de/", &hosts(), true));
    }

    #[test]
    fn hosts_are_lowercased() {
        let hosts = hosts_from_urls(&["https://Overpass.Example.ORG/x", "nonsense"]);
        assert_eq!(hosts.len(), 1);
        assert!(hosts.contains("overpass.example.org"));
    }
}
