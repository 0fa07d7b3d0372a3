//! Template expansion service.
//!
//! Reference-list templates are handed to an expansion service that returns
//! one parse-tree node per template, with parameter names and values and any
//! `<ref>` elements embedded in the values. MediaWiki provides this through
//! `action=expandtemplates&prop=parsetree`; the [`TemplateExpander`] trait is
//! the seam for plugging such a service in.
//!
//! Two implementations ship with the crate: [`LocalExpander`] splits template
//! text offline, and [`StaticExpander`] replays a previously saved response.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locate::find_template_end;
use crate::wikitext::{find_close_tag, find_tag_end};

/// Errors reported by an expansion service.
#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("Failed to read parse tree: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid parse tree JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Expansion service failed: {0}")]
    Service(String),
}

/// One expanded template: `{{title|part|part…}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    pub title: String,
    #[serde(default)]
    pub parts: Vec<TemplatePart>,
}

/// A template parameter.
///
/// Named parameters carry `name`; unlabeled ones carry their 1-based `index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePart {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub value: PartValue,
}

/// A parameter value: its text and any extension elements inside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartValue {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ext: Vec<ExtElement>,
}

/// An extension tag such as `<ref name="a">…</ref>`.
///
/// Self-closing tags have neither `inner` nor `close`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtElement {
    pub name: String,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub inner: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
}

/// A service turning concatenated template text into parse-tree nodes.
///
/// Called once per pass with every located template.
pub trait TemplateExpander {
    fn expand(&self, text: &str) -> Result<Vec<TemplateNode>, ExpandError>;
}

/// Offline expander that splits template text itself.
///
/// Parameters are split on `|` outside nested `{{…}}`, `[[…]]` and `<ref>`
/// elements; templates are not actually expanded.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExpander;

impl TemplateExpander for LocalExpander {
    fn expand(&self, text: &str) -> Result<Vec<TemplateNode>, ExpandError> {
        let mut nodes = Vec::new();
        let mut pos = 0;

        while let Some(rel) = text[pos..].find("{{") {
            let start = pos + rel;
            let Some(end) = find_template_end(text, start) else {
                break;
            };
            nodes.push(parse_node(&text[start + 2..end - 2]));
            pos = end;
        }

        Ok(nodes)
    }
}

/// Expander that returns a fixed, previously obtained response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticExpander {
    nodes: Vec<TemplateNode>,
}

impl StaticExpander {
    pub fn new(nodes: Vec<TemplateNode>) -> Self {
        Self { nodes }
    }

    /// Loads a JSON array of template nodes.
    pub fn from_json(json: &str) -> Result<Self, ExpandError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ExpandError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl TemplateExpander for StaticExpander {
    fn expand(&self, _text: &str) -> Result<Vec<TemplateNode>, ExpandError> {
        Ok(self.nodes.clone())
    }
}

fn parse_node(body: &str) -> TemplateNode {
    let pieces = split_top_level(body);
    let mut parts = Vec::new();
    let mut index = 0;

    for piece in pieces.iter().skip(1) {
        let (name, position, value) = match find_top_level_equals(piece) {
            Some(eq) => (Some(piece[..eq].trim().to_string()), None, &piece[eq + 1..]),
            None => {
                index += 1;
                (None, Some(index), *piece)
            }
        };
        parts.push(TemplatePart {
            name,
            index: position,
            value: PartValue {
                text: Some(value.to_string()),
                ext: ref_elements(value),
            },
        });
    }

    TemplateNode {
        title: pieces.first().map(|t| t.trim().to_string()).unwrap_or_default(),
        parts,
    }
}

/// Splits a template body on `|` at nesting depth 0.
fn split_top_level(body: &str) -> Vec<&str> {
    let lower = body.to_ascii_lowercase();
    let bytes = body.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut piece_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1).copied()) {
            (b'{', Some(b'{')) | (b'[', Some(b'[')) => {
                depth += 1;
                i += 2;
            }
            (b'}', Some(b'}')) | (b']', Some(b']')) => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            (b'<', _) if depth == 0 && is_ref_open(&lower, i) => {
                i = skip_ref_element(body, &lower, i);
            }
            (b'|', _) if depth == 0 => {
                pieces.push(&body[piece_start..i]);
                i += 1;
                piece_start = i;
            }
            _ => i += 1,
        }
    }
    pieces.push(&body[piece_start..]);
    pieces
}

/// Position of the `=` separating a parameter name from its value, if any.
fn find_top_level_equals(piece: &str) -> Option<usize> {
    let bytes = piece.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1).copied()) {
            (b'{', Some(b'{')) | (b'[', Some(b'[')) => {
                depth += 1;
                i += 2;
            }
            (b'}', Some(b'}')) | (b']', Some(b']')) => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            (b'<', _) if depth == 0 => return None,
            (b'=', _) if depth == 0 => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn is_ref_open(lower: &str, at: usize) -> bool {
    lower[at..].starts_with("<ref")
        && lower
            .as_bytes()
            .get(at + 4)
            .is_some_and(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
}

/// Returns the offset just past the `<ref>` element starting at `at`.
fn skip_ref_element(text: &str, lower: &str, at: usize) -> usize {
    let Some(tag_end) = find_tag_end(text, at + 4) else {
        return at + 4;
    };
    if text[at + 4..tag_end].trim_end().ends_with('/') {
        return tag_end + 1;
    }
    find_close_tag(lower, tag_end + 1).map_or(tag_end + 1, |(_, end)| end)
}

/// Collects the `<ref>` elements of a parameter value.
fn ref_elements(value: &str) -> Vec<ExtElement> {
    let lower = value.to_ascii_lowercase();
    let mut elements = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find("<ref") {
        let at = pos + rel;
        if !is_ref_open(&lower, at) {
            pos = at + 4;
            continue;
        }
        let Some(tag_end) = find_tag_end(value, at + 4) else {
            pos = at + 4;
            continue;
        };

        let attrs = &value[at + 4..tag_end];
        if let Some(self_closed) = attrs.trim_end().strip_suffix('/') {
            elements.push(ExtElement {
                name: "ref".to_string(),
                attr: Some(self_closed.to_string()),
                inner: None,
                close: None,
            });
            pos = tag_end + 1;
            continue;
        }

        match find_close_tag(&lower, tag_end + 1) {
            Some((close_start, close_end)) => {
                elements.push(ExtElement {
                    name: "ref".to_string(),
                    attr: Some(attrs.to_string()),
                    inner: Some(value[tag_end + 1..close_start].to_string()),
                    close: Some(value[close_start..close_end].to_string()),
                });
                pos = close_end;
            }
            None => pos = tag_end + 1,
        }
    }

    elements
}
