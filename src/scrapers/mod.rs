//! Best-effort field extraction from catalog pages.
//!
//! Every function here is total: a missing element, attribute or malformed
//! value turns into `None` (or an empty collection) at the point it is read,
//! never into an error. Parsing is synchronous and returns owned data, so no
//! parsed document is ever held across an `.await`.
//!
//! | Page | Module | Extracts |
//! |------|--------|----------|
//! | Genre search listing | [`listing`] | catalog size, title ids, primary genre |
//! | Title page | [`title`] | [`MovieMetadata`](crate::models::MovieMetadata) |
//! | Review feed | [`reviews`] | review records, continuation key, review count |

pub mod listing;
pub mod reviews;
pub mod title;

use scraper::{ElementRef, Selector};

/// Compile a selector written as a string literal in this crate.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Concatenated text content of an element.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Text of the first element matching `selector` below `root`.
pub(crate) fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector).next().map(text_of)
}

/// Attribute `attr` of the first element matching `selector` below `root`.
pub(crate) fn first_attr(root: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    root.select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Parse a displayed count such as `"12,345"` or `" 3 123 "`.
pub(crate) fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    digits.parse().ok()
}
