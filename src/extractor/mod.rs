//! Field extraction from fetched pages and API documents.
//!
//! Every field is described by a [`FieldSpec`]: an ordered list of
//! candidate [`Locator`]s. The first locator that yields a non-empty,
//! type-valid value wins and the remaining candidates are never evaluated.
//!
//! ```text
//! ParsedContent → Document → FieldSpec* → RawFields (+ gaps)
//! ```

pub mod specs;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::domain::{Field, FieldKind, RawFields};
use crate::normalizer::units::{parse_count, parse_duration};

/// Content handed back by an executor session
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    /// Rendered DOM or raw page source
    Html(String),
    /// API response or actor dataset item
    Json(Value),
}

/// One way of finding a value inside fetched content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Text of the first matching element, or one of its attributes
    Css {
        selector: String,
        attr: Option<String>,
    },
    /// `<meta property|name|itemprop=…>` content
    Meta(String),
    /// Dotted key path into the page's JSON-LD blocks
    JsonLd(String),
    /// aria-label of an element whose label contains a word
    AriaLabel { selector: String, contains: String },
    /// First capture group of a regex over the raw page source
    Pattern(String),
    /// Dotted key path into a JSON document; numeric segments index arrays
    Json(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css {
            selector: selector.to_string(),
            attr: None,
        }
    }

    pub fn css_attr(selector: &str, attr: &str) -> Self {
        Locator::Css {
            selector: selector.to_string(),
            attr: Some(attr.to_string()),
        }
    }

    pub fn meta(name: &str) -> Self {
        Locator::Meta(name.to_string())
    }

    pub fn json_ld(path: &str) -> Self {
        Locator::JsonLd(path.to_string())
    }

    pub fn aria(selector: &str, contains: &str) -> Self {
        Locator::AriaLabel {
            selector: selector.to_string(),
            contains: contains.to_string(),
        }
    }

    pub fn pattern(regex: &str) -> Self {
        Locator::Pattern(regex.to_string())
    }

    pub fn json(path: &str) -> Self {
        Locator::Json(path.to_string())
    }
}

/// Ordered candidate locators for one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    pub locators: Vec<Locator>,
    /// Unresolved required fields are reported as gaps
    pub required: bool,
}

impl FieldSpec {
    pub fn new(field: Field, locators: Vec<Locator>, required: bool) -> Self {
        Self {
            field,
            locators,
            required,
        }
    }
}

/// Anything a locator can be resolved against
pub trait LocatorSource {
    fn resolve(&self, locator: &Locator) -> Option<String>;
}

/// Parsed form of [`ParsedContent`], built once per attempt.
///
/// `scraper::Html` is not `Send`, so a document must never be held across
/// an await point.
pub enum Document<'a> {
    Html {
        source: &'a str,
        dom: Html,
        json_ld: Vec<Value>,
    },
    Json(&'a Value),
}

impl<'a> Document<'a> {
    pub fn parse(content: &'a ParsedContent) -> Self {
        match content {
            ParsedContent::Html(source) => {
                let dom = Html::parse_document(source);
                let json_ld = collect_json_ld(&dom);
                Document::Html {
                    source,
                    dom,
                    json_ld,
                }
            }
            ParsedContent::Json(value) => Document::Json(value),
        }
    }
}

impl LocatorSource for Document<'_> {
    fn resolve(&self, locator: &Locator) -> Option<String> {
        match (self, locator) {
            (Document::Html { dom, .. }, Locator::Css { selector, attr }) => {
                let selector = parse_selector(selector)?;
                dom.select(&selector).find_map(|el| {
                    let value = match attr {
                        Some(attr) => el.value().attr(attr).map(str::to_string),
                        None => Some(element_text(&el)),
                    };
                    value.filter(|v| !v.trim().is_empty())
                })
            }
            (Document::Html { dom, .. }, Locator::Meta(name)) => {
                let selector = parse_selector(&format!(
                    r#"meta[property="{0}"], meta[name="{0}"], meta[itemprop="{0}"]"#,
                    name
                ))?;
                dom.select(&selector)
                    .filter_map(|el| el.value().attr("content"))
                    .find(|v| !v.trim().is_empty())
                    .map(str::to_string)
            }
            (Document::Html { json_ld, .. }, Locator::JsonLd(path)) => json_ld
                .iter()
                .find_map(|block| lookup(block, path).and_then(scalar)),
            (Document::Html { dom, .. }, Locator::AriaLabel { selector, contains }) => {
                let selector = parse_selector(selector)?;
                let needle = contains.to_lowercase();
                dom.select(&selector)
                    .filter_map(|el| el.value().attr("aria-label"))
                    .find(|label| label.to_lowercase().contains(&needle))
                    .map(str::to_string)
            }
            (Document::Html { source, .. }, Locator::Pattern(pattern)) => {
                let re = match Regex::new(pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        tracing::debug!("Skipping invalid pattern {}: {}", pattern, e);
                        return None;
                    }
                };
                re.captures(source)
                    .and_then(|c| c.get(1))
                    .map(|m| unescape_json_fragment(m.as_str()))
            }
            (Document::Json(value), Locator::Json(path)) => lookup(value, path).and_then(scalar),
            _ => None,
        }
    }
}

/// First valid value for `spec`, evaluating locators in order
pub fn extract<S: LocatorSource + ?Sized>(source: &S, spec: &FieldSpec) -> Option<String> {
    for locator in &spec.locators {
        let Some(value) = source.resolve(locator) else {
            continue;
        };
        let value = value.trim();
        if is_valid(spec.field, value) {
            tracing::debug!(field = %spec.field, ?locator, "locator hit");
            return Some(value.to_string());
        }
    }
    None
}

/// Whether `value` parses as the field's kind
pub fn is_valid(field: Field, value: &str) -> bool {
    match field.kind() {
        FieldKind::Count => parse_count(value).is_some(),
        FieldKind::Duration => parse_duration(value).is_some(),
        FieldKind::Text => !value.trim().is_empty(),
    }
}

pub struct FieldExtractor;

impl FieldExtractor {
    /// Apply every spec to `content`, returning resolved values and the
    /// required fields nothing resolved
    pub fn extract_all(content: &ParsedContent, specs: &[FieldSpec]) -> (RawFields, Vec<Field>) {
        let document = Document::parse(content);
        Self::extract_from(&document, specs)
    }

    pub fn extract_from<S: LocatorSource + ?Sized>(
        source: &S,
        specs: &[FieldSpec],
    ) -> (RawFields, Vec<Field>) {
        let mut raw = RawFields::new();
        let mut gaps = Vec::new();

        for spec in specs {
            match extract(source, spec) {
                Some(value) => {
                    raw.insert(spec.field, value);
                }
                None if spec.required => gaps.push(spec.field),
                None => {}
            }
        }

        (raw, gaps)
    }
}

/// Follow a dotted path through objects and arrays
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::debug!("Skipping invalid selector {}: {:?}", selector, e);
            None
        }
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_json_ld(dom: &Html) -> Vec<Value> {
    let Some(selector) = parse_selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for el in dom.select(&selector) {
        let text = el.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };
        if let Some(Value::Array(items)) = value.get("@graph") {
            blocks.extend(items.iter().cloned());
        }
        match value {
            Value::Array(items) => blocks.extend(items),
            other => blocks.push(other),
        }
    }
    blocks
}

/// Undo the escaping of values captured from inline JSON
fn unescape_json_fragment(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}
