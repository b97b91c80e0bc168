//! Ordered fallback extraction of a single semantic field.
//!
//! A field is described by a list of [`ExtractionRule`]s. Resolution tries the
//! rules in order and returns the first non-empty result; when every rule
//! misses, the field is simply absent (`None`). Absence is data, never an
//! error: callers decide whether a missing field matters.

use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

/// How a matched element is turned into a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Whitespace-normalized text content
    Text,
    /// Value of the named attribute
    Attr(String),
}

/// One locator/transform pair in a fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    /// CSS selector
    pub locator: String,

    /// Value transform (defaults to text)
    #[serde(default = "default_transform")]
    pub transform: Transform,
}

fn default_transform() -> Transform {
    Transform::Text
}

impl ExtractionRule {
    pub fn text(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            transform: Transform::Text,
        }
    }

    pub fn attr(locator: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            transform: Transform::Attr(name.into()),
        }
    }
}

/// Selector table errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Invalid selector for field '{field}': {locator} ({reason})")]
    Invalid {
        field: String,
        locator: String,
        reason: String,
    },

    #[error("Field '{0}' has no extraction rules")]
    Empty(String),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    locator: String,
    selector: Selector,
    transform: Transform,
}

/// A resolved field value with the rule that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<'r> {
    pub value: String,
    pub rule: usize,
    pub locator: &'r str,
}

/// Elements selected by the first rule with any match
#[derive(Debug, Clone)]
pub struct Matched<'a, 'r> {
    pub elements: Vec<ElementRef<'a>>,
    pub rule: usize,
    pub locator: &'r str,
}

/// A field's fallback chain, with every locator parsed up front
#[derive(Debug, Clone)]
pub struct CompiledField {
    name: String,
    rules: Vec<CompiledRule>,
}

impl CompiledField {
    pub fn compile(name: &str, rules: &[ExtractionRule]) -> Result<Self, SelectorError> {
        if rules.is_empty() {
            return Err(SelectorError::Empty(name.to_string()));
        }

        let rules = rules
            .iter()
            .map(|rule| {
                Selector::parse(&rule.locator)
                    .map(|selector| CompiledRule {
                        locator: rule.locator.clone(),
                        selector,
                        transform: rule.transform.clone(),
                    })
                    .map_err(|e| SelectorError::Invalid {
                        field: name.to_string(),
                        locator: rule.locator.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locators(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.locator.as_str())
    }

    /// First non-empty value across the chain
    pub fn resolve(&self, scope: ElementRef<'_>) -> Option<Resolved<'_>> {
        self.resolve_where(scope, |_| true)
    }

    /// First non-empty value across the chain that also satisfies `accept`
    pub fn resolve_where(
        &self,
        scope: ElementRef<'_>,
        accept: impl Fn(&str) -> bool,
    ) -> Option<Resolved<'_>> {
        for (index, rule) in self.rules.iter().enumerate() {
            let hit = scope
                .select(&rule.selector)
                .filter_map(|el| apply(&rule.transform, el))
                .find(|value| accept(value));

            if let Some(value) = hit {
                tracing::trace!(field = %self.name, locator = %rule.locator, "field resolved");
                return Some(Resolved {
                    value,
                    rule: index,
                    locator: &rule.locator,
                });
            }
        }

        tracing::trace!(field = %self.name, "no rule matched");
        None
    }

    /// All elements of the first rule that matches anything
    pub fn select_all<'a>(&self, scope: ElementRef<'a>) -> Option<Matched<'a, '_>> {
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            let elements: Vec<_> = scope.select(&rule.selector).collect();
            (!elements.is_empty()).then(|| Matched {
                elements,
                rule: index,
                locator: rule.locator.as_str(),
            })
        })
    }

    /// First element of the first rule that matches anything
    pub fn first_element<'a>(&self, scope: ElementRef<'a>) -> Option<(ElementRef<'a>, &str)> {
        self.rules.iter().find_map(|rule| {
            scope
                .select(&rule.selector)
                .next()
                .map(|el| (el, rule.locator.as_str()))
        })
    }

    /// Elements matched by any rule (union of the chain)
    pub fn select_union<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.rules
            .iter()
            .flat_map(|rule| scope.select(&rule.selector))
            .collect()
    }
}

fn apply(transform: &Transform, el: ElementRef<'_>) -> Option<String> {
    let value = match transform {
        Transform::Text => normalize_text(el.text()),
        Transform::Attr(name) => el.value().attr(name)?.trim().to_string(),
    };
    (!value.is_empty()).then_some(value)
}

/// Join text fragments and collapse runs of whitespace
pub fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
