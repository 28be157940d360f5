//! Snippet Filter Parser
//!
//! Snippet filters select which scripts run on which sites:
//!
//! ```text
//! example.com,~ads.example.com#$#race start; log hello; race end
//! example.com#@$#log hello
//! ```

use serde::Serialize;

const SNIPPET_SEPARATOR: &str = "#$#";
const EXCEPTION_SEPARATOR: &str = "#@$#";

/// A parsed snippet filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub script: String,
    pub is_exception: bool,
}

impl SnippetFilter {
    /// Whether the filter's domain list selects `host`.
    ///
    /// The most specific listed suffix of the host decides; on a tie the
    /// exclusion wins. Exception filters without domains apply everywhere.
    pub fn applies_to(&self, host: &str) -> bool {
        if self.include.is_empty() && self.exclude.is_empty() {
            return self.is_exception;
        }

        let host = host.trim_end_matches('.').to_ascii_lowercase();
        for suffix in HostSuffixes::new(&host) {
            if self.exclude.iter().any(|domain| domain == suffix) {
                return false;
            }
            if self.include.iter().any(|domain| domain == suffix) {
                return true;
            }
        }

        // Only exclusions listed: everything else is selected.
        self.include.is_empty() && self.is_exception
    }
}

/// Parse one filter line. Returns `None` for anything that is not a
/// site-specific snippet filter.
pub fn parse_snippet_filter(line: &str) -> Option<SnippetFilter> {
    let line = line.trim();
    if line.is_empty() || is_comment_line(line) {
        return None;
    }

    // The first separator on the line ends the domain list; the script may
    // contain either marker.
    let snippet = line.find(SNIPPET_SEPARATOR).map(|pos| (pos, SNIPPET_SEPARATOR, false));
    let exception = line.find(EXCEPTION_SEPARATOR).map(|pos| (pos, EXCEPTION_SEPARATOR, true));
    let (pos, separator, is_exception) = match (snippet, exception) {
        (Some(snippet), Some(exception)) => std::cmp::min_by_key(snippet, exception, |found| found.0),
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => return None,
    };
    let domains = &line[..pos];
    let script = &line[pos + separator.len()..];

    let script = script.trim();
    if script.is_empty() {
        return None;
    }

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for raw in domains.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let domain = normalize_domain(domain_raw)?;
        if is_exclude {
            exclude.push(domain);
        } else {
            include.push(domain);
        }
    }

    // Generic snippet filters are not allowed to run code everywhere.
    if include.is_empty() && !is_exception {
        return None;
    }

    Some(SnippetFilter {
        include,
        exclude,
        script: script.to_string(),
        is_exception,
    })
}

/// All snippet filters of one or more lists, in list order.
#[derive(Debug, Clone, Default)]
pub struct SnippetFilterSet {
    filters: Vec<SnippetFilter>,
}

impl SnippetFilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every snippet filter in `text`, skipping other lines.
    pub fn from_text(text: &str) -> Self {
        let mut set = Self::new();
        set.extend_from_text(text);
        set
    }

    pub fn extend_from_text(&mut self, text: &str) {
        self.filters.extend(text.lines().filter_map(parse_snippet_filter));
    }

    pub fn push(&mut self, filter: SnippetFilter) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[SnippetFilter] {
        &self.filters
    }

    /// Scripts selected for `host`, deduplicated, in list order.
    pub fn scripts_for_host(&self, host: &str) -> Vec<&str> {
        let excepted: Vec<&str> = self
            .filters
            .iter()
            .filter(|filter| filter.is_exception && filter.applies_to(host))
            .map(|filter| filter.script.as_str())
            .collect();

        let mut scripts: Vec<&str> = Vec::new();
        for filter in &self.filters {
            if filter.is_exception || !filter.applies_to(host) {
                continue;
            }
            let script = filter.script.as_str();
            if excepted.contains(&script) || scripts.contains(&script) {
                continue;
            }
            scripts.push(script);
        }
        scripts
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

/// Walks a host from the full name down to its last label.
struct HostSuffixes<'a> {
    current: Option<&'a str>,
}

impl<'a> HostSuffixes<'a> {
    fn new(host: &'a str) -> Self {
        Self {
            current: if host.is_empty() { None } else { Some(host) },
        }
    }
}

impl<'a> Iterator for HostSuffixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = match result.find('.') {
            Some(idx) if idx < result.len() - 1 => Some(&result[idx + 1..]),
            _ => None,
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_domains_and_script() {
        let filter = parse_snippet_filter("Example.com, ~ads.example.com #$# race start; race end")
            .expect("filter should parse");
        assert_eq!(filter.include, vec!["example.com"]);
        assert_eq!(filter.exclude, vec!["ads.example.com"]);
        assert_eq!(filter.script, "race start; race end");
        assert!(!filter.is_exception);
    }

    #[test]
    fn rejects_non_snippet_lines() {
        assert!(parse_snippet_filter("").is_none());
        assert!(parse_snippet_filter("! comment #$# log").is_none());
        assert!(parse_snippet_filter("[Adblock Plus 3.1]").is_none());
        assert!(parse_snippet_filter("||ads.example.com^").is_none());
        assert!(parse_snippet_filter("example.com##.ad").is_none());
        assert!(parse_snippet_filter("example.com#$#   ").is_none());
        assert!(parse_snippet_filter("exa mple.com#$#log").is_none());
    }

    #[test]
    fn splits_at_first_separator() {
        let filter = parse_snippet_filter("example.com#$#log a#@$#b").expect("filter should parse");
        assert_eq!(filter.include, vec!["example.com"]);
        assert_eq!(filter.script, "log a#@$#b");
        assert!(!filter.is_exception);

        let exception = parse_snippet_filter("example.com#@$#log a#$#b").expect("exception should parse");
        assert_eq!(exception.script, "log a#$#b");
        assert!(exception.is_exception);
    }

    #[test]
    fn rejects_generic_filters() {
        assert!(parse_snippet_filter("#$#log hello").is_none());
        assert!(parse_snippet_filter("~example.com#$#log hello").is_none());
        let exception = parse_snippet_filter("#@$#log hello").expect("exception should parse");
        assert!(exception.is_exception);
    }

    #[test]
    fn host_matching_prefers_most_specific() {
        let filter = parse_snippet_filter("example.com,~ads.example.com,x.ads.example.com#$#log")
            .expect("filter should parse");
        assert!(filter.applies_to("example.com"));
        assert!(filter.applies_to("www.example.com"));
        assert!(filter.applies_to("Example.COM."));
        assert!(!filter.applies_to("ads.example.com"));
        assert!(!filter.applies_to("a.ads.example.com"));
        assert!(filter.applies_to("x.ads.example.com"));
        assert!(!filter.applies_to("example.org"));
        assert!(!filter.applies_to("notexample.com"));
        assert!(!filter.applies_to(""));
    }

    #[test]
    fn scripts_for_host_honours_exceptions() {
        let set = SnippetFilterSet::from_text(
            "! list\n\
             example.com#$#log one\n\
             example.com,example.org#$#log two\n\
             www.example.com#$#log one\n\
             example.com#@$#log two\n\
             ||tracker.example^\n",
        );
        assert_eq!(set.len(), 4);

        assert_eq!(set.scripts_for_host("www.example.com"), vec!["log one"]);
        assert_eq!(set.scripts_for_host("example.org"), vec!["log two"]);
        assert!(set.scripts_for_host("example.net").is_empty());
    }

    #[test]
    fn generic_exception_applies_everywhere() {
        let set = SnippetFilterSet::from_text("example.com#$#debug\n#@$#debug");
        assert!(set.scripts_for_host("example.com").is_empty());
    }
}
