//! Data-driven selector table: every field maps to an ordered fallback chain.
//!
//! The defaults cover several generations of the catalog's markup. Any field
//! can be replaced from the `[selectors]` section of the configuration file
//! without touching control flow.

use serde::{Deserialize, Serialize};

use super::selectors::{CompiledField, ExtractionRule, SelectorError};

/// Field -> ordered locator/transform rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    /// Signals that a search page finished rendering (primary first)
    pub search_ready: Vec<String>,

    /// One element per search-result card
    pub cards: Vec<ExtractionRule>,

    pub title: Vec<ExtractionRule>,

    /// Link to the paper page (value must contain `/paper/`)
    pub paper_link: Vec<ExtractionRule>,

    pub year: Vec<ExtractionRule>,

    /// Citation stat shown on a card
    pub card_citations: Vec<ExtractionRule>,

    /// Byline author links
    pub author_links: Vec<ExtractionRule>,

    /// Pagination control leading to the next result page
    pub next_page: Vec<ExtractionRule>,

    /// Signals that an author profile finished rendering (primary first)
    pub profile_ready: Vec<String>,

    /// Label/value stat rows on a profile
    pub stat_rows: Vec<ExtractionRule>,
    pub stat_label: Vec<ExtractionRule>,
    pub stat_value: Vec<ExtractionRule>,

    /// Region whose visible text is scanned for citation phrases
    pub profile_text_root: Vec<ExtractionRule>,

    /// Co-author listings, excluded from the text scan
    pub coauthor_sections: Vec<ExtractionRule>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            search_ready: vec![
                r#"[data-test-id="search-result"]"#.to_string(),
                ".cl-paper-row".to_string(),
            ],
            cards: texts(&[
                r#"[data-test-id="search-result"]"#,
                r#"[data-test-id="paper-card"]"#,
                ".cl-paper-row",
                r#"div[class*="search-result"]"#,
            ]),
            title: texts(&[
                "h3 a",
                "h2 a",
                r#"a[data-heap-id="paper_title"]"#,
                ".cl-paper-title",
            ]),
            paper_link: hrefs(&[
                r#"a[href*="/paper/"]"#,
                "h3 a[href]",
                "h2 a[href]",
                r#"a[data-heap-id="paper_title"]"#,
            ]),
            year: texts(&[".cl-paper-pubdates", r#"[data-test-id="paper-year"]"#]),
            card_citations: texts(&[
                ".cl-paper-stats__citation-pdp-link",
                r#"[data-heap-id="citation_count"]"#,
            ]),
            author_links: hrefs(&[
                ".cl-paper-authors a.author-list__link",
                ".cl-paper-authors a",
                r#"span[data-heap-id="heap_author_list"] a"#,
                r#"a[href*="/author/"]"#,
            ]),
            next_page: texts(&[
                r#"[data-test-id="pagination-next-button"]"#,
                r#"button[aria-label="Next page"]"#,
                ".cl-pager__button--next",
                r#"a.cl-pager__button[rel="next"]"#,
            ]),
            profile_ready: vec![
                ".author-detail-cards".to_string(),
                r#"[data-test-id="author-citation-count"]"#.to_string(),
                "h1".to_string(),
            ],
            stat_rows: texts(&[
                ".author-detail-card__stats-row",
                r#"[data-test-id="author-stats"] li"#,
                ".stats-row",
            ]),
            stat_label: texts(&[
                ".author-detail-card__stats-row__label",
                ".stats-row__label",
                "dt",
            ]),
            stat_value: texts(&[
                ".author-detail-card__stats-row__value",
                ".author-detail-cards__stat-value",
                ".stats-row__stat-value",
                r#"[data-test-id="author-citation-count"]"#,
                "dd",
            ]),
            profile_text_root: texts(&["main", "body"]),
            coauthor_sections: texts(&[
                ".author-detail-card__coauthors",
                r#"[data-test-id="co-authors"]"#,
                ".coauthors",
            ]),
        }
    }
}

fn texts(locators: &[&str]) -> Vec<ExtractionRule> {
    locators.iter().map(|l| ExtractionRule::text(*l)).collect()
}

fn hrefs(locators: &[&str]) -> Vec<ExtractionRule> {
    locators
        .iter()
        .map(|l| ExtractionRule::attr(*l, "href"))
        .collect()
}

impl SelectorTable {
    /// Parse every locator once; fails on the first invalid selector
    pub fn compile(&self) -> Result<CompiledSelectors, SelectorError> {
        for locator in self.search_ready.iter().chain(&self.profile_ready) {
            scraper::Selector::parse(locator).map_err(|e| SelectorError::Invalid {
                field: "ready".to_string(),
                locator: locator.clone(),
                reason: e.to_string(),
            })?;
        }
        if self.search_ready.is_empty() {
            return Err(SelectorError::Empty("search_ready".to_string()));
        }
        if self.profile_ready.is_empty() {
            return Err(SelectorError::Empty("profile_ready".to_string()));
        }

        Ok(CompiledSelectors {
            search_ready: self.search_ready.clone(),
            cards: CompiledField::compile("cards", &self.cards)?,
            title: CompiledField::compile("title", &self.title)?,
            paper_link: CompiledField::compile("paper_link", &self.paper_link)?,
            year: CompiledField::compile("year", &self.year)?,
            card_citations: CompiledField::compile("card_citations", &self.card_citations)?,
            author_links: CompiledField::compile("author_links", &self.author_links)?,
            next_page: CompiledField::compile("next_page", &self.next_page)?,
            profile_ready: self.profile_ready.clone(),
            stat_rows: CompiledField::compile("stat_rows", &self.stat_rows)?,
            stat_label: CompiledField::compile("stat_label", &self.stat_label)?,
            stat_value: CompiledField::compile("stat_value", &self.stat_value)?,
            profile_text_root: CompiledField::compile("profile_text_root", &self.profile_text_root)?,
            coauthor_sections: CompiledField::compile("coauthor_sections", &self.coauthor_sections)?,
        })
    }
}

/// The selector table with all locators parsed
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub search_ready: Vec<String>,
    pub cards: CompiledField,
    pub title: CompiledField,
    pub paper_link: CompiledField,
    pub year: CompiledField,
    pub card_citations: CompiledField,
    pub author_links: CompiledField,
    pub next_page: CompiledField,
    pub profile_ready: Vec<String>,
    pub stat_rows: CompiledField,
    pub stat_label: CompiledField,
    pub stat_value: CompiledField,
    pub profile_text_root: CompiledField,
    pub coauthor_sections: CompiledField,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_compiles() {
        let compiled = SelectorTable::default().compile().unwrap();
        assert_eq!(compiled.cards.locators().count(), 4);
        assert_eq!(compiled.search_ready[0], r#"[data-test-id="search-result"]"#);
    }

    #[test]
    fn test_override_single_field_from_toml() {
        let table: SelectorTable = toml::from_str(
            r#"
title = [{ locator = ".paper-heading" }]
"#,
        )
        .unwrap();
        assert_eq!(table.title, vec![ExtractionRule::text(".paper-heading")]);
        assert_eq!(table.cards, SelectorTable::default().cards);
    }

    #[test]
    fn test_bad_ready_signal_rejected() {
        let table = SelectorTable {
            profile_ready: vec!["div[".to_string()],
            ..SelectorTable::default()
        };
        assert!(table.compile().is_err());
    }
}
