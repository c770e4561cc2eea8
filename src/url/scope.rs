use url::Url;

/// The only path admitted from any host
const FAVICON_PATH: &str = "/favicon.ico";

/// Same-scope filter for crawl discovery
///
/// A URL is in scope when it lives on the tour's host and its path starts
/// with the tour's base path. `/favicon.ico` is admitted from any host.
#[derive(Debug, Clone)]
pub struct TourScope {
    base: Url,
}

impl TourScope {
    /// Creates a scope rooted at the tour base URL
    pub fn new(base_url: &str) -> crate::Result<Self> {
        let base = Url::parse(base_url)?;
        Ok(Self { base })
    }

    /// The tour base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns the serialized URL if it is admitted into the crawl
    ///
    /// Unparseable input is rejected silently.
    ///
    /// # Examples
    ///
    /// ```
    /// use tour_mirror::url::TourScope;
    ///
    /// let scope = TourScope::new("https://example.com/tour/").unwrap();
    /// assert!(scope.admit("https://example.com/tour/panos/a.jpg").is_some());
    /// assert!(scope.admit("https://example.com/other/a.jpg").is_none());
    /// assert!(scope.admit("https://cdn.example.net/favicon.ico").is_some());
    /// ```
    pub fn admit(&self, url: &str) -> Option<String> {
        let candidate = Url::parse(url).ok()?;

        if candidate.host_str() != self.base.host_str() {
            return (candidate.path() == FAVICON_PATH).then(|| candidate.to_string());
        }

        if candidate.path().starts_with(self.base.path()) || candidate.path() == FAVICON_PATH {
            Some(candidate.to_string())
        } else {
            None
        }
    }
}
