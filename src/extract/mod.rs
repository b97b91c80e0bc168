//! Markup extraction: the fallback-chain selector resolver, the data-driven
//! selector table, search-page parsing and the citation heuristic.

mod citations;
mod search_page;
mod selectors;
mod table;

pub use citations::{parse_count, CitationExtractor, CitationReading, CitationSource, MAX_PLAUSIBLE_CITATIONS};
pub use search_page::{last_path_segment, parse_search_page, BylineAuthor, CardRecord, NextControl, SearchPage};
pub use selectors::{normalize_text, CompiledField, ExtractionRule, Matched, Resolved, SelectorError, Transform};
pub use table::{CompiledSelectors, SelectorTable};
