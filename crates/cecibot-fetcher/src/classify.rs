//! URL classification: direct download or browser render.

use std::path::Path;

/// Path extensions that mean "this is a web page, render it" even though the
/// path looks like a file. Everything else with a non-empty extension is
/// fetched directly.
const WEB_PAGE_EXTENSIONS: [&str; 17] = [
    "asp", "aspx", "asx", "cfm", "yaws", "htm", "html", "xhtml", "jhtml", "jsp", "jspx", "pl",
    "py", "rb", "rhtml", "shtml", "cgi",
];

/// The extension of the URL's path, lowercased and without the dot.
///
/// Returns `None` for an unparseable URL, a bare path, or a trailing slash.
pub fn path_extension(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let basename = parsed.path_segments()?.next_back()?.to_string();
    Path::new(&basename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty())
}

/// `true` when the URL should be downloaded directly instead of rendered.
///
/// A URL is a file iff its path extension is non-empty *and* not in the
/// web-page set; no extension means the browser.
pub fn is_file(url: &str) -> bool {
    match path_extension(url) {
        Some(ext) => !WEB_PAGE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_documents_are_files() {
        assert!(is_file("https://example.com/paper.pdf"));
        assert!(is_file("https://example.com/a/b/archive.tar.gz"));
        assert!(is_file("http://example.com/IMAGE.JPG"));
    }

    #[test]
    fn pages_are_rendered() {
        assert!(!is_file("https://example.com/"));
        assert!(!is_file("https://example.com/about"));
        assert!(!is_file("https://example.com/index.html"));
        assert!(!is_file("https://example.com/view.aspx"));
        assert!(!is_file("https://example.com/script.cgi"));
        assert!(!is_file("https://example.com/app.py"));
    }

    #[test]
    fn query_and_fragment_do_not_leak_into_the_extension() {
        assert!(is_file("https://example.com/file.pdf?download=1"));
        assert!(!is_file("https://example.com/page?f=x.pdf"));
        assert!(is_file("https://example.com/file.pdf#page=2"));
    }

    #[test]
    fn unparseable_urls_fall_back_to_the_browser() {
        assert!(!is_file("not a url"));
        assert!(!is_file(""));
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(
            path_extension("https://example.com/File.PDF"),
            Some("pdf".to_string())
        );
        assert_eq!(path_extension("https://example.com/"), None);
        assert_eq!(path_extension("https://example.com/README"), None);
        assert_eq!(
            path_extension("https://example.com/trailing-dot."),
            None,
            "an empty extension is no extension"
        );
        assert_eq!(
            path_extension("https://example.com/a.b/c"),
            None,
            "only the final segment counts"
        );
    }
}
