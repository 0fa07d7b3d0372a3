//! Template parameter extraction.
//!
//! Turns the parse-tree nodes returned by the expansion service into ordered
//! name→value maps, one per reference-list template.

use std::fmt;

use crate::expand::{ExtElement, TemplateNode, TemplatePart};

/// A parameter name: either written out or implied by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKey {
    Named(String),
    /// 1-based position among the unlabeled parameters
    Positional(usize),
}

impl ParamKey {
    /// The name used for lookups; positional parameters are named by their index.
    pub fn name(&self) -> String {
        match self {
            ParamKey::Named(name) => name.clone(),
            ParamKey::Positional(index) => index.to_string(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            ParamKey::Named(own) => own == name,
            ParamKey::Positional(index) => name.parse::<usize>().is_ok_and(|n| n == *index),
        }
    }
}

/// An embedded `<ref>` element, split into its attribute string and inner text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPair {
    pub attr: String,
    pub inner: String,
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Plain trimmed text (empty when the parameter had no value)
    Text(String),
    /// The `<ref>` elements found in the value
    Refs(Vec<RefPair>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(text) => write!(f, "{}", text),
            ParamValue::Refs(pairs) => {
                let joined: Vec<String> = pairs
                    .iter()
                    .map(|p| format!("<ref{}>{}</ref>", p.attr, p.inner))
                    .collect();
                write!(f, "{}", joined.join("\n"))
            }
        }
    }
}

/// Ordered template parameters. Later duplicates replace earlier values but
/// keep the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: Vec<(ParamKey, ParamValue)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ParamKey, value: ParamValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.matches(name))
            .map(|(_, v)| v)
    }

    /// Returns the value of the first name in `aliases` that is present.
    pub fn get_any(&self, aliases: &[String]) -> Option<&ParamValue> {
        aliases.iter().find_map(|alias| self.get(alias.trim()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKey, ParamValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds one entry per node, in node order: a parameter map when the
/// node's title is the canonical template name, `None` otherwise.
pub fn extract_params(nodes: &[TemplateNode], canonical: &str) -> Vec<Option<ParamMap>> {
    nodes
        .iter()
        .map(|node| (node.title.trim() == canonical).then(|| node_params(node)))
        .collect()
}

fn node_params(node: &TemplateNode) -> ParamMap {
    let mut params = ParamMap::new();
    let mut next_position = 0;

    for part in &node.parts {
        let key = match (&part.name, part.index) {
            (Some(name), _) => ParamKey::Named(name.trim().to_string()),
            (None, Some(index)) => {
                next_position = index;
                ParamKey::Positional(index)
            }
            (None, None) => {
                next_position += 1;
                ParamKey::Positional(next_position)
            }
        };
        params.insert(key, part_value(part));
    }

    params
}

/// Embedded references take precedence over the plain text of a value.
fn part_value(part: &TemplatePart) -> ParamValue {
    let pairs: Vec<RefPair> = part.value.ext.iter().filter_map(ref_pair).collect();
    if !pairs.is_empty() {
        return ParamValue::Refs(pairs);
    }
    ParamValue::Text(
        part.value
            .text
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
    )
}

fn ref_pair(ext: &ExtElement) -> Option<RefPair> {
    let is_ref = ext.name.trim().eq_ignore_ascii_case("ref");
    let is_closed = ext
        .close
        .as_deref()
        .is_some_and(|c| c.trim().eq_ignore_ascii_case("</ref>"));
    if !is_ref || !is_closed {
        return None;
    }
    Some(RefPair {
        attr: ext.attr.clone()?,
        inner: ext.inner.clone()?,
    })
}
