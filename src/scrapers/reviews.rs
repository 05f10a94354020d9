//! Review feed pages: review containers, the "load more" key and the total
//! review count shown in the page header.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{first_attr, first_text, parse_count, selector, text_of};
use crate::models::ReviewRecord;

static CONTAINER: Lazy<Selector> = Lazy::new(|| selector(".review-container"));
static TEXT: Lazy<Selector> = Lazy::new(|| selector("div.text.show-more__control"));
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static DATE: Lazy<Selector> = Lazy::new(|| selector("span.review-date"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("a.title"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector("span.display-name-link a"));
static HELPFULNESS: Lazy<Selector> = Lazy::new(|| selector("div.actions.text-muted"));
static LOAD_MORE: Lazy<Selector> = Lazy::new(|| selector(".load-more-data[data-key]"));
static HEADER_COUNT: Lazy<Selector> = Lazy::new(|| selector("div.header div"));

/// Opaque key the feed issues for fetching the next batch of reviews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(pub String);

impl ContinuationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reviews found on one feed page plus the key for the next page, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewBatch {
    pub reviews: Vec<ReviewRecord>,
    pub next: Option<ContinuationToken>,
}

/// Parse one feed page, tagging each review with `movie_id`.
pub fn review_batch(body: &str, movie_id: &str) -> ReviewBatch {
    let document = Html::parse_document(body);
    let reviews = document
        .select(&CONTAINER)
        .map(|container| review(container, movie_id))
        .collect();
    let next = first_attr(document.root_element(), &LOAD_MORE, "data-key")
        .filter(|key| !key.is_empty())
        .map(ContinuationToken);
    ReviewBatch { reviews, next }
}

fn review(container: ElementRef<'_>, movie_id: &str) -> ReviewRecord {
    ReviewRecord {
        movie_id: movie_id.to_string(),
        text: first_text(container, &TEXT),
        rating: rating(container),
        date: first_text(container, &DATE),
        title: first_text(container, &TITLE),
        author: first_attr(container, &AUTHOR, "href"),
        helpfulness: first_text(container, &HELPFULNESS),
    }
}

/// The second `span` of a container holds the score when one was given;
/// otherwise that slot is taken by the review date.
fn rating(container: ElementRef<'_>) -> Option<u8> {
    let raw = container.select(&SPAN).nth(1).map(text_of)?;
    let raw = raw.trim();
    if raw.len() > 2 {
        return None;
    }
    raw.parse::<u8>().ok().filter(|r| (1..=10).contains(r))
}

/// Total review count from header text such as `"3,123 Reviews"`.
pub fn total_count(body: &str) -> Option<u64> {
    let document = Html::parse_document(body);
    let text = first_text(document.root_element(), &HEADER_COUNT)?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let (count, _) = compact.split_once("Reviews")?;
    parse_count(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"
<html><body>
  <div class="header"><div>3,123 Reviews</div></div>
  <div class="lister-list">
    <div class="review-container">
      <div class="lister-item-content">
        <div class="ipl-ratings-bar"><span class="rating-other-user-rating"><span>9</span><span class="point-scale">/10</span></span></div>
        <a href="/review/rw1/" class="title"> A classic
</a>
        <div class="display-name-date">
          <span class="display-name-link"><a href="/user/ur0001/?ref_=tt_urv">alice</a></span>
          <span class="review-date">15 March 2020</span>
        </div>
        <div class="content">
          <div class="text show-more__control">Loved every minute.</div>
          <div class="actions text-muted">
            1,204 out of 1,350 found this helpful.
          </div>
        </div>
      </div>
    </div>
    <div class="review-container">
      <div class="lister-item-content">
        <a href="/review/rw2/" class="title">No score given</a>
        <div class="display-name-date">
          <span class="display-name-link"><a href="/user/ur0002/">bob</a></span>
          <span class="review-date">2 May 2019</span>
        </div>
      </div>
    </div>
  </div>
  <div class="load-more-data" data-key="g4xolermtiqhejcxxxgs753i36t52q343"></div>
</body></html>"#;

    #[test]
    fn test_review_batch() {
        let batch = review_batch(FEED, "tt0113277");
        assert_eq!(batch.reviews.len(), 2);
        assert_eq!(
            batch.next,
            Some(ContinuationToken("g4xolermtiqhejcxxxgs753i36t52q343".into()))
        );

        let first = &batch.reviews[0];
        assert_eq!(first.movie_id, "tt0113277");
        assert_eq!(first.rating, Some(9));
        assert_eq!(first.text.as_deref(), Some("Loved every minute."));
        assert_eq!(first.date.as_deref(), Some("15 March 2020"));
        assert_eq!(first.title.as_deref(), Some(" A classic\n"));
        assert_eq!(first.author.as_deref(), Some("/user/ur0001/?ref_=tt_urv"));
        assert!(first.helpfulness.as_deref().unwrap().contains("1,204 out of 1,350"));

        let second = &batch.reviews[1];
        assert_eq!(second.rating, None);
        assert_eq!(second.text, None);
        assert_eq!(second.helpfulness, None);
    }

    #[test]
    fn test_last_page_has_no_continuation() {
        let body = FEED.replace(
            r#"<div class="load-more-data" data-key="g4xolermtiqhejcxxxgs753i36t52q343"></div>"#,
            "",
        );
        assert_eq!(review_batch(&body, "tt1").next, None);
    }

    #[test]
    fn test_total_count() {
        assert_eq!(total_count(FEED), Some(3123));
        assert_eq!(total_count("<html></html>"), None);
        assert_eq!(
            total_count(r#"<div class="header"><div>No reviews</div></div>"#),
            None
        );
    }
}
