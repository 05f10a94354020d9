//! Genre search listing: catalog size and the titles on one page.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{first_attr, first_text, parse_count, selector};

static DESC_COUNT: Lazy<Selector> = Lazy::new(|| selector("div.desc span"));
static ITEM: Lazy<Selector> = Lazy::new(|| selector("div.lister-item-content"));
static ITEM_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static ITEM_GENRE: Lazy<Selector> = Lazy::new(|| selector("span.genre"));

static TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"of\s+([\d,]+)").expect("valid total regex"));
static TITLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tt\d+").expect("valid title id regex"));

/// One title as listed on a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub id: String,
    pub main_genre: Option<String>,
}

/// Total number of titles in the listing, read from text such as
/// `"1-50 of 12,345 titles."`.
pub fn total_count(body: &str) -> Option<u64> {
    let document = Html::parse_document(body);
    let text = first_text(document.root_element(), &DESC_COUNT)?;
    let caps = TOTAL_RE.captures(&text)?;
    parse_count(&caps[1])
}

/// Titles listed on the page, in page order. Items without a title link are
/// left out.
pub fn items(body: &str) -> Vec<ListingItem> {
    let document = Html::parse_document(body);
    document
        .select(&ITEM)
        .filter_map(|item| {
            let href = first_attr(item, &ITEM_LINK, "href")?;
            let id = title_id(&href)?;
            let main_genre = first_text(item, &ITEM_GENRE).and_then(|g| primary_genre(&g));
            Some(ListingItem { id, main_genre })
        })
        .collect()
}

/// Title code (`tt` followed by digits) inside a link.
pub fn title_id(href: &str) -> Option<String> {
    TITLE_ID_RE.find(href).map(|m| m.as_str().to_string())
}

/// First genre of a `"\nComedy, Drama, Romance   "` style genre list.
pub fn primary_genre(raw: &str) -> Option<String> {
    raw.replace('\n', "")
        .trim()
        .split([',', ' '])
        .find(|token| !token.is_empty())
        .map(str::to_string)
}
