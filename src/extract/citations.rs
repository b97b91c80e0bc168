//! Layered inference of an author's total citation count from profile markup.
//!
//! Layers, each consulted only when the previous one produced nothing:
//!
//! 1. Structured label/value stat rows. The row label must mention
//!    "citation" and must not mention "influential".
//! 2. Phrase patterns ("12,450 Citations", "Citations: 12,450") over a
//!    bounded leading window of the profile's visible text, with co-author
//!    listings removed.
//! 3. An explicit zero.
//!
//! Candidates outside `0..=MAX_PLAUSIBLE_CITATIONS` are discarded and the
//! search continues with the next candidate.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::selectors::normalize_text;
use super::table::CompiledSelectors;

/// Largest count accepted as a real citation total
pub const MAX_PLAUSIBLE_CITATIONS: u64 = 1_000_000;

const NUMBER: &str = r"\d[\d,]*(?:\.\d+)?(?:\s?[kK]\b)?";

fn number_regex() -> &'static Regex {
    static NUM: OnceLock<Regex> = OnceLock::new();
    NUM.get_or_init(|| Regex::new(NUMBER).expect("number pattern is valid"))
}

/// A value directly after a label: the label owns it
fn leading_value_regex() -> &'static Regex {
    static LEADING: OnceLock<Regex> = OnceLock::new();
    LEADING.get_or_init(|| {
        Regex::new(&format!(r"^\s*[:\-]?\s*{NUMBER}")).expect("leading value pattern is valid")
    })
}

/// Ordered phrase patterns; capture group 1 is the number
fn phrase_patterns() -> &'static [Regex; 2] {
    static PHRASES: OnceLock<[Regex; 2]> = OnceLock::new();
    PHRASES.get_or_init(|| {
        [
            Regex::new(&format!(r"(?i)({NUMBER})\s*(?:total\s+)?citations?\b"))
                .expect("count-first pattern is valid"),
            Regex::new(&format!(r"(?i)\bcitations?\s*[:\-]?\s*({NUMBER})"))
                .expect("label-first pattern is valid"),
        ]
    })
}

/// Parse the first number in `text`.
///
/// Thousands separators are stripped and a trailing `k` multiplies by 1000
/// (`"3.2k"` is 3200). Fractions without a suffix and implausible values
/// yield `None`.
pub fn parse_count(text: &str) -> Option<u64> {
    number_regex()
        .find(text)
        .and_then(|m| parse_number_token(m.as_str()))
}

fn parse_number_token(token: &str) -> Option<u64> {
    let token = token.trim();
    let (digits, thousands) = match token.strip_suffix(['k', 'K']) {
        Some(rest) => (rest.trim_end(), true),
        None => (token, false),
    };
    let cleaned = digits.replace(',', "");

    let value = if thousands {
        let scaled = cleaned.parse::<f64>().ok()? * 1000.0;
        if !scaled.is_finite() || scaled < 0.0 {
            return None;
        }
        scaled.round() as u64
    } else {
        cleaned.parse::<u64>().ok()?
    };

    (value <= MAX_PLAUSIBLE_CITATIONS).then_some(value)
}

/// Which layer produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationSource {
    StatRow,
    Text,
    Default,
}

/// Result of the heuristic for one profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationReading {
    pub count: u64,
    pub source: CitationSource,
}

/// Citation heuristic bound to a selector table
#[derive(Debug, Clone)]
pub struct CitationExtractor<'s> {
    selectors: &'s CompiledSelectors,
    text_window: usize,
}

impl<'s> CitationExtractor<'s> {
    pub fn new(selectors: &'s CompiledSelectors, text_window: usize) -> Self {
        Self {
            selectors,
            text_window,
        }
    }

    /// Run all layers over a profile page
    pub fn extract(&self, markup: &str) -> CitationReading {
        let document = Html::parse_document(markup);
        let root = document.root_element();

        if let Some(count) = self.from_stat_rows(root) {
            return CitationReading {
                count,
                source: CitationSource::StatRow,
            };
        }

        if let Some(count) = self.from_text(root) {
            return CitationReading {
                count,
                source: CitationSource::Text,
            };
        }

        CitationReading {
            count: 0,
            source: CitationSource::Default,
        }
    }

    fn from_stat_rows(&self, root: ElementRef<'_>) -> Option<u64> {
        let rows = self.selectors.stat_rows.select_all(root)?;

        for row in rows.elements {
            let row_text = normalize_text(row.text());
            let label = self
                .selectors
                .stat_label
                .resolve(row)
                .map(|r| r.value)
                .unwrap_or_else(|| row_text.clone())
                .to_lowercase();

            if !label.contains("citation") || label.contains("influential") {
                continue;
            }

            let value = self
                .selectors
                .stat_value
                .resolve(row)
                .map(|r| r.value)
                .unwrap_or(row_text);

            match parse_count(&value) {
                Some(count) => return Some(count),
                None => tracing::debug!("Rejected citation stat value '{}'", value),
            }
        }
        None
    }

    fn from_text(&self, root: ElementRef<'_>) -> Option<u64> {
        let region = self
            .selectors
            .profile_text_root
            .first_element(root)
            .map(|(el, _)| el)
            .unwrap_or(root);

        let text: String = visible_text(region, self.selectors)
            .chars()
            .take(self.text_window)
            .collect();

        let [count_first, label_first] = phrase_patterns();

        for caps in count_first.captures_iter(&text) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let before = preceding_words(&text, number.start(), 2);
            if before.first().is_some_and(|w| w == "influential") {
                continue;
            }
            // "h-index 42 Citations 12,450": 42 belongs to the previous stat
            if leading_value_regex().is_match(&text[whole.end()..]) {
                continue;
            }
            if let Some(count) = parse_number_token(number.as_str()) {
                return Some(count);
            }
        }

        for caps in label_first.captures_iter(&text) {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if preceding_words(&text, whole.start(), 1).first().is_some_and(|w| w == "influential") {
                continue;
            }
            if let Some(count) = parse_number_token(number.as_str()) {
                return Some(count);
            }
        }

        None
    }
}

/// Visible text under `region`, skipping scripts, styles and co-author lists
fn visible_text(region: ElementRef<'_>, selectors: &CompiledSelectors) -> String {
    let excluded: HashSet<_> = selectors
        .coauthor_sections
        .select_union(region)
        .into_iter()
        .map(|el| el.id())
        .collect();

    let fragments = region.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node.ancestors().any(|ancestor| {
            excluded.contains(&ancestor.id())
                || ancestor.value().as_element().is_some_and(|el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                })
        });
        (!hidden).then_some(&**text)
    });

    normalize_text(fragments)
}

/// The `n` words right before byte offset `end`, nearest first, lowercased
fn preceding_words(text: &str, end: usize, n: usize) -> Vec<String> {
    text[..end]
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .rev()
        .take(n)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SelectorTable;

    fn extract(markup: &str) -> CitationReading {
        let selectors = SelectorTable::default().compile().unwrap();
        CitationExtractor::new(&selectors, 4000).extract(markup)
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("12,450"), Some(12450));
        assert_eq!(parse_count("3.2k"), Some(3200));
        assert_eq!(parse_count("3.2 K citations"), Some(3200));
        assert_eq!(parse_count("  98 "), Some(98));
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count("1,000,000"), Some(1_000_000));
        assert_eq!(parse_count("5,000,000"), None);
        assert_eq!(parse_count("1.5"), None);
        assert_eq!(parse_count("no digits"), None);
        assert_eq!(parse_count("12 knots"), Some(12));
    }

    #[test]
    fn test_stat_row_skips_influential() {
        let reading = extract(
            r#"<ul data-test-id="author-stats">
                 <li><span class="stats-row__label">Influential Citations</span>
                     <span class="stats-row__stat-value">900</span></li>
                 <li><span class="stats-row__label">Citations</span>
                     <span class="stats-row__stat-value">12,450</span></li>
               </ul>"#,
        );
        assert_eq!(reading.count, 12450);
        assert_eq!(reading.source, CitationSource::StatRow);
    }

    #[test]
    fn test_stat_row_without_value_element() {
        let reading = extract(
            r#"<div class="author-detail-card__stats-row">Influential Citations: 900</div>
               <div class="author-detail-card__stats-row">Citations: 12,450</div>"#,
        );
        assert_eq!(reading.count, 12450);
    }

    #[test]
    fn test_implausible_stat_falls_through_to_text() {
        let reading = extract(
            r#"<body>
                 <div class="stats-row"><span class="stats-row__label">Citations</span>
                   <span class="stats-row__stat-value">5,000,000</span></div>
                 <p>Cited widely: 4,321 citations across 80 papers</p>
               </body>"#,
        );
        assert_eq!(reading.count, 4321);
        assert_eq!(reading.source, CitationSource::Text);
    }

    #[test]
    fn test_text_layer_patterns() {
        assert_eq!(extract("<body><p>Total: 3.2k Citations</p></body>").count, 3200);
        assert_eq!(extract("<body><p>Citations: 812</p></body>").count, 812);
        assert_eq!(extract("<body><p>1,024\nTotal Citations</p></body>").count, 1024);
    }

    #[test]
    fn test_label_then_value_layout_keeps_label_value() {
        let reading = extract(
            "<body><p>Publications 135 h-index 42 Citations 12,450 Highly Influential Citations 900</p></body>",
        );
        assert_eq!(reading.count, 12450);
        assert_eq!(reading.source, CitationSource::Text);
    }

    #[test]
    fn test_text_layer_ignores_influential() {
        let reading = extract(
            "<body><p>Highly Influential Citations: 77</p><p>Citations 5,120</p></body>",
        );
        assert_eq!(reading.count, 5120);
    }

    #[test]
    fn test_coauthor_section_is_excluded() {
        let reading = extract(
            r#"<body>
                 <div class="coauthors"><p>Grace Hopper 88,000 Citations</p></div>
                 <p>Publications 14</p>
               </body>"#,
        );
        assert_eq!(reading.count, 0);
        assert_eq!(reading.source, CitationSource::Default);
    }

    #[test]
    fn test_scripts_are_not_text() {
        let reading = extract(
            r#"<body><script>var s = "999 citations";</script><p>nothing</p></body>"#,
        );
        assert_eq!(reading.source, CitationSource::Default);
    }

    #[test]
    fn test_text_window_bounds_search() {
        let selectors = SelectorTable::default().compile().unwrap();
        let filler = "word ".repeat(50);
        let markup = format!("<body><p>{filler}</p><p>42 Citations</p></body>");
        assert_eq!(CitationExtractor::new(&selectors, 20).extract(&markup).count, 0);
        assert_eq!(CitationExtractor::new(&selectors, 4000).extract(&markup).count, 42);
    }

    #[test]
    fn test_preceding_words() {
        let text = "Highly Influential Citations 77";
        assert_eq!(preceding_words(text, 28, 2), vec!["citations", "influential"]);
    }
}
