//! Link normalization and filtering
//!
//! Raw hrefs extracted from a page pass through a fixed pipeline before
//! they are allowed into the frontier: fragment removal, relative
//! resolution against the current page, scheme and authority checks, a
//! file-extension denylist, and an optional path-prefix restriction.

use crate::url::url_authority;
use std::collections::BTreeSet;
use url::Url;

/// File extensions that are never crawled
///
/// Matched case-insensitively as a suffix of the URL path.
pub const IGNORED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".webp", ".mp3", ".mp4", ".avi", ".mov",
    ".wmv", ".css", ".js",
];

/// Filters and normalizes a set of extracted hrefs
///
/// Each candidate is resolved and checked independently; a candidate that
/// fails any check (or cannot be processed at all) is dropped without
/// affecting the rest. The result is deduplicated and sorted so the
/// caller's enqueue order is deterministic.
///
/// # Arguments
///
/// * `hrefs` - Raw href values extracted from the current page
/// * `base_domain` - Authority captured from the seed page; links must match it exactly
/// * `current_url` - The page the hrefs were found on, used for relative resolution
/// * `path_prefix` - When set, resolved paths must start with this prefix verbatim
pub fn filter_links<'a, I>(
    hrefs: I,
    base_domain: &str,
    current_url: &Url,
    path_prefix: Option<&str>,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let valid: BTreeSet<String> = hrefs
        .into_iter()
        .filter_map(|href| filter_link(href, base_domain, current_url, path_prefix))
        .collect();

    valid.into_iter().collect()
}

/// Normalizes a single candidate href, applying every check in order
///
/// Returns the absolute URL string if the candidate survives:
///
/// 1. Everything from the first `#` onward is removed.
/// 2. The remainder is resolved against `current_url`.
/// 3. The scheme must be http or https.
/// 4. The authority must equal `base_domain` exactly.
/// 5. The path must not end with an ignored file extension.
/// 6. With `path_prefix` set, the path must start with it verbatim.
pub fn filter_link(
    href: &str,
    base_domain: &str,
    current_url: &Url,
    path_prefix: Option<&str>,
) -> Option<String> {
    // Remove fragment
    let href = href.split('#').next().unwrap_or("");

    // Join relative URLs
    let resolved = current_url.join(href).ok()?;

    // Check scheme
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    // Check domain
    if url_authority(&resolved)? != base_domain {
        return None;
    }

    // Check file extension
    let path = resolved.path().to_lowercase();
    if IGNORED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }

    // Check path restriction
    if let Some(prefix) = path_prefix {
        if !resolved.path().starts_with(prefix) {
            return None;
        }
    }

    Some(resolved.to_string())
}
