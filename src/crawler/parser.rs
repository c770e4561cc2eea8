//! Link extraction from text resources
//!
//! HTML, CSS, JS, XML and JSON bodies are scanned with four textual rules,
//! applied in this fixed order:
//!
//! 1. `href=` / `src=` attribute values
//! 2. CSS `url(...)` arguments
//! 3. bare absolute `http(s)://` literals
//! 4. quoted literals starting with the tour's reserved path prefix
//!
//! Within a rule, matches are taken in document order. Every candidate is
//! resolved against the URL of the document it was found in, and the result
//! keeps the first occurrence of each absolute URL.

use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Scans text content for candidate resource URLs
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    rules: Vec<Regex>,
}

impl LinkExtractor {
    /// Builds the extractor for a tour whose bare relative literals start
    /// with `reserved_prefix` (e.g. `/recorridos/`)
    pub fn new(reserved_prefix: &str) -> crate::Result<Self> {
        let rules = vec![
            Regex::new(r#"(?i)(?:href|src)=["']([^"']+)["']"#)?,
            Regex::new(r#"(?i)url\((?:"|')?([^"')]+)(?:"|')?\)"#)?,
            Regex::new(r#"(?i)https?://[^\s"'()<>]+"#)?,
            Regex::new(&format!(
                r#"(?i)["']({}[^"]+)["']"#,
                regex::escape(reserved_prefix)
            ))?,
        ];

        Ok(Self { rules })
    }

    /// Returns the absolute URLs referenced by `text`
    ///
    /// # Example
    ///
    /// ```
    /// use tour_mirror::crawler::LinkExtractor;
    /// use url::Url;
    ///
    /// let extractor = LinkExtractor::new("/recorridos/").unwrap();
    /// let base = Url::parse("https://example.com/recorridos/casa/tour.html").unwrap();
    /// let urls = extractor.extract_urls(r#"<script src="tour.js"></script>"#, &base);
    /// assert_eq!(urls, vec!["https://example.com/recorridos/casa/tour.js".to_string()]);
    /// ```
    pub fn extract_urls(&self, text: &str, base_url: &Url) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for rule in &self.rules {
            for captures in rule.captures_iter(text) {
                // Rules with a group capture the URL; the absolute-literal rule is the whole match
                let candidate = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str());

                let Some(resolved) = candidate.and_then(|c| resolve_link(c, base_url)) else {
                    continue;
                };

                if seen.insert(resolved.clone()) {
                    urls.push(resolved);
                }
            }
        }

        urls
    }
}

/// Resolves a candidate against the document URL
///
/// Returns None for empty candidates, unresolvable input and non-HTTP(S)
/// results.
fn resolve_link(candidate: &str, base_url: &Url) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    let absolute_url = base_url.join(candidate).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
