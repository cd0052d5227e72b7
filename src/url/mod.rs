//! URL handling: authority capture and link filtering
//!
//! The crawler scopes every run to the authority (host, plus port when one
//! is explicit in the URL) captured from the seed page at creation time.
//! Candidate links are resolved and filtered against that captured value.

mod filter;

pub use filter::{filter_link, filter_links, IGNORED_EXTENSIONS};

use url::Url;

/// Returns the authority (`host[:port]`) of a URL
///
/// The port is included only when it is explicit in the URL; the `url`
/// crate drops scheme-default ports at parse time, so both the seed capture
/// and later link comparisons see the same rendering.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use siteharvest::url::url_authority;
///
/// let url = Url::parse("https://example.com/path").unwrap();
/// assert_eq!(url_authority(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(url_authority(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn url_authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host.to_string()),
    }
}
