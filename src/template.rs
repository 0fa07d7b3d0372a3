//! Reference-list template instances and their deduplication.
//!
//! A [`TemplateInstance`] owns the canonical references of one reference-list
//! template, the index over them, and the table of name substitutions that
//! citations must follow after references were renamed or merged.

use std::collections::HashMap;

use crate::config::Config;
use crate::index::RefIndex;
use crate::locate::TemplateLocation;
use crate::params::{ParamMap, ParamValue};
use crate::refs::Reference;
use crate::wikitext::{reference_from_parts, ParseError};

/// Stem for generated names of unnamed references.
const UNNAMED_STEM: &str = "ref";

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInstance {
    /// Reference group served by this template; empty for the default group
    pub group: String,
    pub params: ParamMap,
    /// Byte offset of the template in the document
    pub start: usize,
    /// Byte offset just past the template
    pub end: usize,
    /// The template text as located
    pub raw: String,
    /// Canonical references; deleted entries leave a `None` so positions stay stable
    references: Vec<Option<Reference>>,
    index: RefIndex,
    substitutions: HashMap<String, String>,
    suffixes: HashMap<String, usize>,
}

impl TemplateInstance {
    /// Creates an instance with no references.
    pub fn new(location: TemplateLocation, params: ParamMap, group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            params,
            start: location.start,
            end: location.end,
            raw: location.raw,
            references: Vec::new(),
            index: RefIndex::new(),
            substitutions: HashMap::new(),
            suffixes: HashMap::new(),
        }
    }

    /// Creates an instance from a located template and its parameters,
    /// reading the group and the list-defined references.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if a list-defined reference has a forbidden
    /// character in its name.
    pub fn from_params(
        location: TemplateLocation,
        params: ParamMap,
        config: &Config,
    ) -> Result<Self, ParseError> {
        let group = match params.get_any(&config.group_names) {
            Some(ParamValue::Text(group)) => group.clone(),
            _ => String::new(),
        };
        let pairs = match params.get_any(&config.refs_names) {
            Some(ParamValue::Refs(pairs)) => pairs.clone(),
            _ => Vec::new(),
        };

        let mut template = Self::new(location, params, group);
        for pair in pairs {
            let mut reference = reference_from_parts(&pair.attr, &pair.inner)?;
            if reference.content.is_empty() {
                continue;
            }
            reference.ident.group = template.group.clone();
            if reference.ident.name.is_empty() {
                let name = template.new_name(None);
                tracing::warn!(
                    start = template.start,
                    "unnamed reference in template refs, naming it '{}'",
                    name
                );
                reference.ident.name = name;
            }
            template.add_ref(reference);
        }

        Ok(template)
    }

    /// Appends a canonical reference and indexes it. Returns its position.
    pub fn add_ref(&mut self, reference: Reference) -> usize {
        let pos = self.references.len();
        self.index.insert(&reference.ident.name, &reference.content, pos);
        self.references.push(Some(reference));
        pos
    }

    /// Deletes the reference at `pos`, returning it.
    fn delete_ref(&mut self, pos: usize) -> Option<Reference> {
        let reference = self.references.get_mut(pos)?.take()?;
        self.index
            .remove(&reference.ident.name, &reference.content, pos);
        Some(reference)
    }

    /// Gives the reference at `pos` a new name. Returns the old name.
    fn rename_ref(&mut self, pos: usize, new_name: &str) -> Option<String> {
        let reference = self.references.get_mut(pos)?.as_mut()?;
        let old_name = std::mem::replace(&mut reference.ident.name, new_name.to_string());
        self.index
            .rename(&old_name, new_name, &reference.content, pos);
        Some(old_name)
    }

    pub fn get(&self, pos: usize) -> Option<&Reference> {
        self.references.get(pos).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Reference> {
        self.references.get_mut(pos).and_then(Option::as_mut)
    }

    /// Live references in insertion order.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().flatten()
    }

    pub fn references_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        self.references.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.references().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the first reference with this name.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.index.by_name(name).first().copied()
    }

    /// Position of the first reference with this content.
    pub fn find_by_content(&self, content: &str) -> Option<usize> {
        self.index.by_content(content).first().copied()
    }

    /// Position of the first reference with this exact name and content.
    pub fn find_by_pair(&self, name: &str, content: &str) -> Option<usize> {
        self.index.by_pair(name, content).first().copied()
    }

    /// Records that citations named `old` must now use `new`.
    pub fn substitute(&mut self, old: &str, new: &str) {
        if old != new {
            self.substitutions.insert(old.to_string(), new.to_string());
        }
    }

    pub fn substitution_count(&self) -> usize {
        self.substitutions.len()
    }

    /// Follows the substitution table from `name` to its final name.
    pub fn resolve_name(&self, name: &str) -> String {
        let mut current = name;
        // every hop uses a distinct entry, so a longer chain is a cycle
        for _ in 0..=self.substitutions.len() {
            match self.substitutions.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.to_string()
    }

    /// Generates a name not yet used in this template: `base_1`, `base_2`, …
    /// Unnamed references use the `ref` stem.
    pub fn new_name(&mut self, base: Option<&str>) -> String {
        let stem = base
            .filter(|b| !b.is_empty())
            .unwrap_or(UNNAMED_STEM)
            .to_string();
        let counter = self.suffixes.entry(stem.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", stem, counter);
            if !self.index.contains_name(&candidate) {
                return candidate;
            }
        }
    }

    /// Removes duplicates among the template's references, in a fixed order:
    ///
    /// 1. exact duplicates (same name and content) are deleted;
    /// 2. later references reusing a name for other content are renamed;
    /// 3. later references repeating content under another name are deleted
    ///    and their name is substituted by the surviving one.
    ///
    /// Within each step duplicate groups are visited in order of first
    /// appearance, and the first member of a group survives.
    pub fn process_duplicates(&mut self) {
        let positions: Vec<usize> = (0..self.references.len()).collect();

        for &pos in &positions {
            let Some(reference) = self.get(pos) else {
                continue;
            };
            let group = self
                .index
                .by_pair(&reference.ident.name, &reference.content)
                .to_vec();
            if group.first() == Some(&pos) {
                for &dup in &group[1..] {
                    self.delete_ref(dup);
                }
            }
        }

        for &pos in &positions {
            let Some(reference) = self.get(pos) else {
                continue;
            };
            let name = reference.ident.name.clone();
            let group = self.index.by_name(&name).to_vec();
            if group.first() == Some(&pos) {
                for &dup in &group[1..] {
                    let new_name = self.new_name(Some(&name));
                    self.rename_ref(dup, &new_name);
                    self.substitute(&name, &new_name);
                    tracing::debug!("renamed duplicate reference '{}' to '{}'", name, new_name);
                }
            }
        }

        for &pos in &positions {
            let Some(reference) = self.get(pos) else {
                continue;
            };
            let keep = reference.ident.name.clone();
            let group = self.index.by_content(&reference.content).to_vec();
            if group.first() == Some(&pos) {
                for &dup in &group[1..] {
                    if let Some(removed) = self.delete_ref(dup) {
                        self.substitute(&removed.ident.name, &keep);
                        tracing::debug!(
                            "merged reference '{}' into '{}'",
                            removed.ident.name,
                            keep
                        );
                    }
                }
            }
        }
    }

    /// Whether the template has a refs parameter under any of the aliases.
    pub fn has_refs_param(&self, refs_names: &[String]) -> bool {
        self.params.get_any(refs_names).is_some()
    }
}
