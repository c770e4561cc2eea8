use std::path::{Path, PathBuf};
use url::form_urlencoded::byte_serialize;
use url::Url;

/// File name used when a URL path names a directory
const INDEX_FILE: &str = "index.html";

/// Maps a URL onto its file inside the download root
///
/// The URL is resolved against the tour base, the leading `/` of its path is
/// stripped, and a path that is empty or ends in `/` gets `index.html`
/// appended. Query strings and fragments are ignored, so URLs differing only
/// in those map to the same file.
///
/// Returns `None` when the URL cannot be resolved.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tour_mirror::url::url_to_local_path;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/tour/").unwrap();
/// let path = url_to_local_path(&base, "panos/a.jpg", Path::new("out")).unwrap();
/// assert_eq!(path, Path::new("out/tour/panos/a.jpg"));
/// ```
pub fn url_to_local_path(tour_base: &Url, url: &str, download_root: &Path) -> Option<PathBuf> {
    let resolved = tour_base.join(url).ok()?;

    let mut relative = resolved.path().trim_start_matches('/').to_string();
    if relative.is_empty() || relative.ends_with('/') {
        relative.push_str(INDEX_FILE);
    }

    Some(download_root.join(relative))
}

/// Location for a URL that [`url_to_local_path`] cannot map
///
/// The whole URL is percent-encoded into a single file name under `other/`.
pub fn fallback_local_path(url: &str, download_root: &Path) -> PathBuf {
    let encoded: String = byte_serialize(url.as_bytes()).collect();
    download_root.join("other").join(encoded)
}
