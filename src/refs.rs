//! Reference and citation records.
//!
//! A citation (`<ref name="a" />`) and a reference (`<ref name="a">…</ref>`)
//! share the same identity: a group and a name. Both records carry that
//! identity as a [`RefIdent`] and add their own fields on top.

use std::fmt;

/// The (group, name) identity shared by citations and references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RefIdent {
    /// Reference group (`group="notes"`); empty for the default group
    pub group: String,
    /// Reference name (`name="smith2020"`); may be empty for unnamed references
    pub name: String,
}

impl RefIdent {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

/// Where a canonical reference definition ends up after the rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefLocation {
    /// Inside the refs parameter of the reference-list template
    #[default]
    Template,
    /// At the first use of the reference in the article text
    Text,
}

/// A place in the document where a canonical reference is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefUse {
    /// Index of the text span the use was found in
    pub span: usize,
    /// Byte offset of the use in the document
    pub offset: usize,
}

/// A citation marker: a `<ref>` tag with attributes but no content.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub ident: RefIdent,
    /// The markup exactly as it appeared in the source
    pub source: String,
    /// Start and end byte positions in the scanned text
    pub span: (usize, usize),
}

/// A reference definition with content.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub ident: RefIdent,
    /// Normalized reference content (without the `<ref>` tags)
    pub content: String,
    /// The markup exactly as it appeared in the source
    pub source: String,
    /// Start and end byte positions in the scanned text
    pub span: (usize, usize),
    pub location: RefLocation,
    /// Uses bound to this reference during resolution
    pub uses: Vec<RefUse>,
}

impl Reference {
    /// Creates a canonical reference that did not come from scanned text.
    pub fn canonical(group: &str, name: &str, content: &str) -> Self {
        Self {
            ident: RefIdent::new(group, name),
            content: content.to_string(),
            source: String::new(),
            span: (0, 0),
            location: RefLocation::Template,
            uses: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.ident.name
    }

    pub fn group(&self) -> &str {
        &self.ident.group
    }

    /// Serializes the reference as a list-defined entry: `<ref name="a">content</ref>`.
    pub fn to_definition(&self) -> String {
        format!("<ref name=\"{}\">{}</ref>", self.ident.name, self.content)
    }

    /// Serializes the reference as an inline definition, keeping its group.
    pub fn to_inline_definition(&self) -> String {
        if self.ident.group.is_empty() {
            self.to_definition()
        } else {
            format!(
                "<ref name=\"{}\" group=\"{}\">{}</ref>",
                self.ident.name, self.ident.group, self.content
            )
        }
    }
}

/// Output form used for compact citation markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CitationForm {
    /// `<ref name="a" />`
    #[default]
    Tag,
    /// `{{r|a}}`
    TemplateR,
}

/// Renders a compact citation marker for the given identity.
pub fn citation_marker(ident: &RefIdent, form: CitationForm) -> String {
    match form {
        CitationForm::Tag => {
            let mut marker = String::from("<ref");
            if !ident.name.is_empty() {
                marker.push_str(&format!(" name=\"{}\"", ident.name));
            }
            if !ident.group.is_empty() {
                marker.push_str(&format!(" group=\"{}\"", ident.group));
            }
            marker.push_str(" />");
            marker
        }
        CitationForm::TemplateR => {
            if ident.group.is_empty() {
                format!("{{{{r|{}}}}}", ident.name)
            } else {
                format!("{{{{r|g={}|{}}}}}", ident.group, ident.name)
            }
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", citation_marker(&self.ident, CitationForm::Tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_marker_tag_form() {
        let ident = RefIdent::new("", "smith");
        assert_eq!(citation_marker(&ident, CitationForm::Tag), "<ref name=\"smith\" />");
    }

    #[test]
    fn test_citation_marker_tag_form_with_group() {
        let ident = RefIdent::new("notes", "smith");
        assert_eq!(
            citation_marker(&ident, CitationForm::Tag),
            "<ref name=\"smith\" group=\"notes\" />"
        );
    }

    #[test]
    fn test_citation_marker_template_r() {
        // Given: an ungrouped and a grouped identity
        let plain = RefIdent::new("", "smith");
        let grouped = RefIdent::new("notes", "smith");

        // Then: both render as {{r}} calls
        assert_eq!(citation_marker(&plain, CitationForm::TemplateR), "{{r|smith}}");
        assert_eq!(
            citation_marker(&grouped, CitationForm::TemplateR),
            "{{r|g=notes|smith}}"
        );
    }

    #[test]
    fn test_reference_definition_drops_group() {
        // Given: a grouped canonical reference
        let reference = Reference::canonical("notes", "a", "Some book");

        // Then: the list-defined form omits the group, the inline form keeps it
        assert_eq!(reference.to_definition(), "<ref name=\"a\">Some book</ref>");
        assert_eq!(
            reference.to_inline_definition(),
            "<ref name=\"a\" group=\"notes\">Some book</ref>"
        );
    }

    #[test]
    fn test_citation_display() {
        let citation = Citation {
            ident: RefIdent::new("", "x"),
            source: "<ref name=x/>".to_string(),
            span: (0, 13),
        };
        assert_eq!(citation.to_string(), "<ref name=\"x\" />");
    }
}
