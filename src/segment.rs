//! Article segmentation.
//!
//! The text between reference-list templates is split into spans. A
//! reference in a span can only be listed in a template that comes after it,
//! so every span records, per group, the nearest following template serving
//! that group.

use std::collections::HashMap;

use crate::refs::{Citation, Reference};
use crate::template::TemplateInstance;
use crate::wikitext::{scan_refs, ParseError, RefTag};

/// Where a reference or citation in a span ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Index of the template holding the canonical reference
    pub template: usize,
    /// Final name to cite
    pub name: String,
    /// Position of the canonical reference in the template, if one exists
    pub position: Option<usize>,
}

/// A stretch of article text before, between or after reference-list templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextSpan {
    /// Byte offset of the span in the document
    pub start: usize,
    /// Byte offset just past the span
    pub end: usize,
    pub text: String,
    /// Group name → index of the nearest following template for that group
    pub scope: HashMap<String, usize>,
    /// Citations found in the span, offsets relative to `text`
    pub citations: Vec<Citation>,
    /// References found in the span, offsets relative to `text`
    pub references: Vec<Reference>,
    /// Resolution of each entry of `citations`
    pub citation_bindings: Vec<Option<Binding>>,
    /// Resolution of each entry of `references`
    pub reference_bindings: Vec<Option<Binding>>,
}

impl TextSpan {
    pub fn new(start: usize, end: usize, text: &str, scope: HashMap<String, usize>) -> Self {
        Self {
            start,
            end,
            text: text.to_string(),
            scope,
            ..Self::default()
        }
    }

    /// Finds the references and citations in the span text.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] (with a document-relative offset) if a name
    /// contains a forbidden character.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        let tags = scan_refs(&self.text).map_err(|e| match e {
            ParseError::ForbiddenCharacter {
                character,
                snippet,
                offset,
            } => ParseError::ForbiddenCharacter {
                character,
                snippet,
                offset: offset + self.start,
            },
        })?;

        for tag in tags {
            match tag {
                RefTag::Citation(citation) => self.citations.push(citation),
                RefTag::Reference(reference) => self.references.push(reference),
            }
        }
        self.citation_bindings = vec![None; self.citations.len()];
        self.reference_bindings = vec![None; self.references.len()];
        Ok(())
    }

    /// Index of the template serving `group` for this span.
    pub fn target(&self, group: &str) -> Option<usize> {
        self.scope.get(group).copied()
    }
}

/// Splits the document into spans around the templates.
///
/// Span `i` ends where template `i` starts; one trailing span follows the
/// last template. Together with the templates the spans cover the whole
/// document without gaps or overlaps.
pub fn build_spans(document: &str, templates: &[TemplateInstance]) -> Vec<TextSpan> {
    let mut spans = Vec::with_capacity(templates.len() + 1);
    let mut from = 0;

    for (i, template) in templates.iter().enumerate() {
        let to = template.start;
        spans.push(TextSpan::new(
            from,
            to,
            &document[from..to],
            forward_scope(templates, i),
        ));
        from = template.end;
    }

    spans.push(TextSpan::new(
        from,
        document.len(),
        &document[from..],
        HashMap::new(),
    ));
    spans
}

/// Maps each group to the first template at or after `first` that serves it.
fn forward_scope(templates: &[TemplateInstance], first: usize) -> HashMap<String, usize> {
    let mut scope = HashMap::new();
    for (j, template) in templates.iter().enumerate().skip(first) {
        scope.entry(template.group.clone()).or_insert(j);
    }
    scope
}
