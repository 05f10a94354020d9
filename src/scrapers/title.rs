//! Title page metadata.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

use super::{first_attr, first_text, selector, text_of};
use crate::models::{AggregateRating, BoxOffice, MovieMetadata, ReviewSummary, TitleDetails};

/// Only the top-billed cast is kept.
pub const TOP_N_ACTORS: usize = 10;

static ORIGINAL_TITLE: Lazy<Selector> =
    Lazy::new(|| selector(r#"h1[data-testid="hero-title-block__title"]"#));
static GENRE_LINKS: Lazy<Selector> = Lazy::new(|| selector(r#"div[data-testid="genres"] a"#));
static DIRECTOR: Lazy<Selector> = Lazy::new(|| {
    selector(
        "ul.ipc-metadata-list.ipc-metadata-list--dividers-all\
         .title-pc-list.ipc-metadata-list--baseAlt a",
    )
});
static POSTER: Lazy<Selector> =
    Lazy::new(|| selector(r#"div[data-testid="hero-media__poster"] img"#));
static SCORE: Lazy<Selector> = Lazy::new(|| selector("span.score"));
static AGG_RATING: Lazy<Selector> =
    Lazy::new(|| selector(r#"div[data-testid="hero-rating-bar__aggregate-rating"]"#));
static ACTOR: Lazy<Selector> =
    Lazy::new(|| selector(r#"a[data-testid="title-cast-item__actor"]"#));
static RECOMMENDATION: Lazy<Selector> =
    Lazy::new(|| selector(r#"a[class*="ipc-poster-card__title"]"#));
static NESTED_ITEM: Lazy<Selector> = Lazy::new(|| selector("li"));
static RUNTIME: Lazy<Selector> =
    Lazy::new(|| selector(r#"li[data-testid="title-techspec_runtime"] div"#));

/// Parse every metadata field out of a title page.
pub fn movie_metadata(body: &str) -> MovieMetadata {
    let document = Html::parse_document(body);
    let root = document.root_element();

    MovieMetadata {
        original_title: first_text(root, &ORIGINAL_TITLE),
        genres: genres(root),
        director: first_text(root, &DIRECTOR),
        poster_url: first_attr(root, &POSTER, "src"),
        review_summary: review_summary(root),
        agg_rating: aggregate_rating(root),
        actors: ranked_links(root.select(&ACTOR).take(TOP_N_ACTORS)),
        imdb_recommendations: ranked_links(root.select(&RECOMMENDATION)),
        details: details(root),
        boxoffice: boxoffice(root),
    }
}

fn genres(root: ElementRef<'_>) -> Option<Vec<String>> {
    let genres: Vec<String> = root.select(&GENRE_LINKS).map(text_of).collect();
    (!genres.is_empty()).then_some(genres)
}

fn review_summary(root: ElementRef<'_>) -> ReviewSummary {
    let mut scores = root.select(&SCORE).map(text_of);
    ReviewSummary {
        user_review_num: scores.next(),
        critic_review_num: scores.next(),
        metascore: scores.next(),
    }
}

/// `"IMDb RATING8.5/101.2M"` becomes `8.5/10` and `1.2M`.
fn aggregate_rating(root: ElementRef<'_>) -> Option<AggregateRating> {
    let raw = first_text(root, &AGG_RATING)?;
    split_aggregate_rating(&raw)
}

pub(crate) fn split_aggregate_rating(raw: &str) -> Option<AggregateRating> {
    let cleaned = raw.replace("IMDb RATING", "");
    let (rating, votes) = cleaned.split_once("/10")?;
    if rating.trim().is_empty() {
        return None;
    }
    Some(AggregateRating {
        avg_rating: Some(format!("{}/10", rating.trim())),
        num_votes: Some(votes.trim().to_string()).filter(|v| !v.is_empty()),
    })
}

/// Links such as `/name/nm0000199/?ref_=tt_cl_t_1` keyed by their rank
/// suffix. Links without a rank are skipped.
fn ranked_links<'a>(links: impl Iterator<Item = ElementRef<'a>>) -> BTreeMap<String, String> {
    links
        .filter_map(|a| a.value().attr("href"))
        .filter_map(id_and_rank)
        .map(|(id, rank)| (rank, id))
        .collect()
}

pub(crate) fn id_and_rank(href: &str) -> Option<(String, String)> {
    let id = href.split('?').next()?.to_string();
    let (_, rank) = href.split_once("_t_")?;
    Some((id, rank.to_string()))
}

fn details(root: ElementRef<'_>) -> TitleDetails {
    TitleDetails {
        release_date: nested_list(root, "title-details-releasedate"),
        countries_of_origin: nested_list(root, "title-details-origin"),
        language: nested_list(root, "title-details-languages"),
        also_known_as: nested_list(root, "title-details-akas"),
        production_companies: nested_list(root, "title-details-companies"),
        filming_locations: nested_list(root, "title-details-filminglocations"),
        runtime: first_text(root, &RUNTIME),
    }
}

fn boxoffice(root: ElementRef<'_>) -> BoxOffice {
    let first = |test_id: &str| nested_list(root, test_id).and_then(|v| v.into_iter().next());
    BoxOffice {
        budget: first("title-boxoffice-budget"),
        boxoffice_gross_domestic: first("title-boxoffice-grossdomestic"),
        boxoffice_gross_opening: first("title-boxoffice-openingweekenddomestic"),
        boxoffice_gross_worldwide: first("title-boxoffice-cumulativeworldwidegross"),
    }
}

/// Texts of the `li` items nested in the `li[data-testid=...]` section.
fn nested_list(root: ElementRef<'_>, test_id: &str) -> Option<Vec<String>> {
    let section = Selector::parse(&format!(r#"li[data-testid="{test_id}"]"#)).ok()?;
    let item = root.select(&section).next()?;
    Some(item.select(&NESTED_ITEM).map(text_of).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <h1 data-testid="hero-title-block__title">Heat</h1>
  <div data-testid="hero-rating-bar__aggregate-rating">IMDb RATING8.3/10680K</div>
  <div data-testid="hero-media__poster"><img src="https://img.example/heat.jpg"></div>
  <div data-testid="genres"><a>Action</a><a>Crime</a><a>Drama</a></div>
  <ul class="ipc-metadata-list ipc-metadata-list--dividers-all title-pc-list ipc-metadata-list--baseAlt">
    <li><a href="/name/nm0000520/">Michael Mann</a></li>
  </ul>
  <ul><li><span class="score">1.6K</span></li><li><span class="score">209</span></li><li><span class="score">76</span></li></ul>
  <a data-testid="title-cast-item__actor" href="/name/nm0000199/?ref_=tt_cl_t_1">Al Pacino</a>
  <a data-testid="title-cast-item__actor" href="/name/nm0000134/?ref_=tt_cl_t_2">Robert De Niro</a>
  <a class="ipc-poster-card__title ipc-poster-card__title--clamp-2" href="/title/tt0110912/?ref_=tt_sims_tt_t_1">Pulp Fiction</a>
  <ul>
    <li data-testid="title-details-releasedate"><ul><li>December 15, 1995 (United States)</li></ul></li>
    <li data-testid="title-details-origin"><ul><li>United States</li></ul></li>
    <li data-testid="title-details-languages"><ul><li>English</li><li>Spanish</li></ul></li>
    <li data-testid="title-boxoffice-budget"><ul><li>$60,000,000 (estimated)</li></ul></li>
    <li data-testid="title-techspec_runtime"><div>2 hours 50 minutes</div></li>
  </ul>
</body></html>"#;

    #[test]
    fn test_full_page() {
        let meta = movie_metadata(PAGE);
        assert_eq!(meta.original_title.as_deref(), Some("Heat"));
        assert_eq!(
            meta.genres,
            Some(vec!["Action".into(), "Crime".into(), "Drama".into()])
        );
        assert_eq!(meta.director.as_deref(), Some("Michael Mann"));
        assert_eq!(meta.poster_url.as_deref(), Some("https://img.example/heat.jpg"));
        assert_eq!(meta.review_summary.user_review_num.as_deref(), Some("1.6K"));
        assert_eq!(meta.review_summary.metascore.as_deref(), Some("76"));

        let rating = meta.agg_rating.unwrap();
        assert_eq!(rating.avg_rating.as_deref(), Some("8.3/10"));
        assert_eq!(rating.num_votes.as_deref(), Some("680K"));

        assert_eq!(meta.actors.get("1").map(String::as_str), Some("/name/nm0000199/"));
        assert_eq!(meta.actors.get("2").map(String::as_str), Some("/name/nm0000134/"));
        assert_eq!(
            meta.imdb_recommendations.get("1").map(String::as_str),
            Some("/title/tt0110912/")
        );

        assert_eq!(
            meta.details.language,
            Some(vec!["English".into(), "Spanish".into()])
        );
        assert_eq!(meta.details.runtime.as_deref(), Some("2 hours 50 minutes"));
        assert_eq!(meta.details.also_known_as, None);
        assert_eq!(meta.boxoffice.budget.as_deref(), Some("$60,000,000 (estimated)"));
        assert_eq!(meta.boxoffice.boxoffice_gross_worldwide, None);
    }

    #[test]
    fn test_empty_page_is_all_null() {
        let meta = movie_metadata("<html><body><p>Rate limited</p></body></html>");
        assert_eq!(meta, MovieMetadata::default());
    }

    #[test]
    fn test_id_and_rank() {
        assert_eq!(
            id_and_rank("/name/nm0000199/?ref_=tt_cl_t_1"),
            Some(("/name/nm0000199/".into(), "1".into()))
        );
        assert_eq!(id_and_rank("/name/nm0000199/"), None);
    }

    #[test]
    fn test_split_aggregate_rating() {
        assert_eq!(split_aggregate_rating("no rating yet"), None);
        let r = split_aggregate_rating("IMDb RATING7.1/1012K").unwrap();
        assert_eq!(r.avg_rating.as_deref(), Some("7.1/10"));
        assert_eq!(r.num_votes.as_deref(), Some("12K"));
    }
}
