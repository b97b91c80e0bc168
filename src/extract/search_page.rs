//! Extraction of paper cards, bylines and the pagination control from one
//! rendered search page.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use super::citations::parse_count;
use super::table::CompiledSelectors;
use crate::models::{fallback_paper_id, Paper, PaperBuilder, UNKNOWN_TITLE};

fn year_regex() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year pattern is valid"))
}

/// An author position in a card's byline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BylineAuthor {
    pub author_id: String,
    pub name: String,
    pub profile_url: String,
    /// 1-based position among the card's author links
    pub order: u32,
}

/// One parsed search-result card
#[derive(Debug, Clone, PartialEq)]
pub struct CardRecord {
    pub paper: Paper,
    pub authors: Vec<BylineAuthor>,
}

/// State of the "next page" control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextControl {
    /// No rule matched
    Absent,
    /// Present but disabled: last page reached
    Disabled,
    /// Anchor with a usable target
    Link(String),
    /// Clickable control, addressed by the locator that found it
    Button(String),
}

/// Everything the crawl needs from one search page
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub cards: Vec<CardRecord>,
    pub next: NextControl,
}

/// Parse a rendered search page.
///
/// Zero cards is a valid result; the caller treats it as end of results.
pub fn parse_search_page(markup: &str, selectors: &CompiledSelectors, base: &Url) -> SearchPage {
    let document = Html::parse_document(markup);
    let root = document.root_element();

    let cards = match selectors.cards.select_all(root) {
        Some(matched) => {
            tracing::debug!(
                "Found {} papers using selector: {}",
                matched.elements.len(),
                matched.locator
            );
            matched
                .elements
                .iter()
                .map(|card| parse_card(*card, selectors, base))
                .collect()
        }
        None => Vec::new(),
    };

    SearchPage {
        cards,
        next: next_control(root, selectors, base),
    }
}

fn parse_card(card: ElementRef<'_>, selectors: &CompiledSelectors, base: &Url) -> CardRecord {
    let title = selectors
        .title
        .resolve(card)
        .map(|r| r.value)
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let link = selectors
        .paper_link
        .resolve_where(card, |href| href.contains("/paper/"))
        .map(|r| r.value);

    let paper_id = link
        .as_deref()
        .and_then(last_path_segment)
        .unwrap_or_else(|| fallback_paper_id(&title));

    let year = selectors
        .year
        .resolve_where(card, |text| year_regex().is_match(text))
        .and_then(|r| year_regex().find(&r.value).and_then(|m| m.as_str().parse().ok()));

    let citations = selectors
        .card_citations
        .resolve(card)
        .and_then(|r| parse_count(&r.value));

    let mut builder = PaperBuilder::new(paper_id, title).maybe(year, citations);
    if let Some(url) = link.as_deref().and_then(|href| absolutize(base, href)) {
        builder = builder.url(url);
    }

    CardRecord {
        paper: builder.build(),
        authors: byline(card, selectors, base),
    }
}

fn byline(card: ElementRef<'_>, selectors: &CompiledSelectors, base: &Url) -> Vec<BylineAuthor> {
    let Some(matched) = selectors.author_links.select_all(card) else {
        return Vec::new();
    };

    let mut authors = Vec::new();
    for link in matched.elements {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.contains("/author/") {
            continue;
        }
        let (Some(author_id), Some(profile_url)) = (last_path_segment(href), absolutize(base, href))
        else {
            continue;
        };

        authors.push(BylineAuthor {
            author_id,
            name: super::normalize_text(link.text()),
            profile_url,
            order: authors.len() as u32 + 1,
        });
    }
    authors
}

fn next_control(root: ElementRef<'_>, selectors: &CompiledSelectors, base: &Url) -> NextControl {
    let Some((control, locator)) = selectors.next_page.first_element(root) else {
        return NextControl::Absent;
    };

    let element = control.value();
    let disabled = element.attr("disabled").is_some()
        || element
            .attr("aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || element.classes().any(|c| c.contains("disabled"));
    if disabled {
        return NextControl::Disabled;
    }

    if element.name() == "a" {
        if let Some(target) = element
            .attr("href")
            .filter(|h| !h.trim().is_empty() && !h.starts_with('#') && !h.starts_with("javascript:"))
            .and_then(|h| absolutize(base, h))
        {
            return NextControl::Link(target);
        }
    }

    NextControl::Button(locator.to_string())
}

/// Last non-empty path segment of a (possibly relative) URL
pub fn last_path_segment(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}
