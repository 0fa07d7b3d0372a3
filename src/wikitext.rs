//! Wikitext reference parser.
//!
//! Extracts citations in the forms `<ref name="a" />` and `<ref name="a"></ref>`
//! and references in the form `<ref name="a">content</ref>` from wikitext.
//!
//! The scanner is a small hand-written tokenizer rather than a regex: tag
//! boundaries respect quoted attribute values, and content runs to the nearest
//! closing tag, across line breaks.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::refs::{Citation, RefIdent, RefLocation, Reference};

/// Characters that may never appear in a reference name.
pub const FORBIDDEN_NAME_CHARS: [char; 3] = ['<', '>', '"'];

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Errors that abort parsing of reference markup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("reference name contains forbidden character [{character}] at byte {offset}: {snippet}")]
    ForbiddenCharacter {
        character: char,
        snippet: String,
        offset: usize,
    },
}

/// A `<ref>` element found while scanning text.
#[derive(Debug, Clone, PartialEq)]
pub enum RefTag {
    Citation(Citation),
    Reference(Reference),
}

/// Scans text for `<ref>` elements and returns them in document order.
///
/// Opening tags without a matching `</ref>` are ordinary text. Tags without
/// attributes and without content (`<ref />`, `<ref></ref>`) are skipped.
///
/// # Errors
///
/// Returns [`ParseError::ForbiddenCharacter`] if any reference or citation name
/// contains one of [`FORBIDDEN_NAME_CHARS`].
pub fn scan_refs(text: &str) -> Result<Vec<RefTag>, ParseError> {
    // ASCII lowercasing keeps byte offsets identical to `text`
    let lower = text.to_ascii_lowercase();
    let bytes = text.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find("<ref") {
        let start = pos + rel;
        let attrs_start = start + 4;

        match bytes.get(attrs_start) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
            _ => {
                pos = attrs_start;
                continue;
            }
        }

        let Some(tag_end) = find_tag_end(text, attrs_start) else {
            pos = attrs_start;
            continue;
        };

        let raw_attrs = &text[attrs_start..tag_end];
        let open_end = tag_end + 1;

        if let Some(attrs) = raw_attrs.trim_end().strip_suffix('/') {
            if !attrs.trim().is_empty() {
                tags.push(RefTag::Citation(build_citation(
                    attrs,
                    &text[start..open_end],
                    (start, open_end),
                )?));
            }
            pos = open_end;
            continue;
        }

        let Some((close_start, close_end)) = find_close_tag(&lower, open_end) else {
            pos = open_end;
            continue;
        };

        let source = &text[start..close_end];
        let content = clean_content(&text[open_end..close_start]);

        if content.is_empty() {
            if !raw_attrs.trim().is_empty() {
                tags.push(RefTag::Citation(build_citation(
                    raw_attrs,
                    source,
                    (start, close_end),
                )?));
            }
        } else {
            let ident = parse_ident(raw_attrs, source, start)?;
            tags.push(RefTag::Reference(Reference {
                ident,
                content,
                source: source.to_string(),
                span: (start, close_end),
                location: RefLocation::Template,
                uses: Vec::new(),
            }));
        }
        pos = close_end;
    }

    Ok(tags)
}

/// Extracts all citation markers from the given text.
///
/// # Examples
///
/// ```
/// use refcon_tools::extract_citations;
///
/// let citations = extract_citations(r#"See<ref name="smith" /> for details."#).unwrap();
/// assert_eq!(citations.len(), 1);
/// assert_eq!(citations[0].ident.name, "smith");
/// ```
pub fn extract_citations(text: &str) -> Result<Vec<Citation>, ParseError> {
    Ok(scan_refs(text)?
        .into_iter()
        .filter_map(|tag| match tag {
            RefTag::Citation(citation) => Some(citation),
            RefTag::Reference(_) => None,
        })
        .collect())
}

/// Extracts all references with non-empty content from the given text.
///
/// # Examples
///
/// ```
/// use refcon_tools::extract_references;
///
/// let refs = extract_references("Fact.<ref name=a>Some book</ref>").unwrap();
/// assert_eq!(refs.len(), 1);
/// assert_eq!(refs[0].content, "Some book");
/// ```
pub fn extract_references(text: &str) -> Result<Vec<Reference>, ParseError> {
    Ok(scan_refs(text)?
        .into_iter()
        .filter_map(|tag| match tag {
            RefTag::Reference(reference) => Some(reference),
            RefTag::Citation(_) => None,
        })
        .collect())
}

/// Builds a reference from an already-split `(attributes, inner text)` pair,
/// as reported by the template expansion service.
pub fn reference_from_parts(attrs: &str, inner: &str) -> Result<Reference, ParseError> {
    let source = format!("<ref{}>{}</ref>", attrs, inner);
    let ident = parse_ident(attrs, &source, 0)?;
    Ok(Reference {
        ident,
        content: clean_content(inner),
        source,
        span: (0, 0),
        location: RefLocation::Template,
        uses: Vec::new(),
    })
}

/// Extracts the `name` and `group` attribute values from an attribute string.
///
/// Values may be double-quoted, single-quoted or bare. Other attributes are
/// skipped and anything unparseable degrades to an empty value.
///
/// Returns `(name, group)`, both raw (not normalized).
pub fn parse_attributes(attrs: &str) -> (String, String) {
    let mut name: Option<String> = None;
    let mut group: Option<String> = None;
    let mut rest = attrs;

    loop {
        rest = rest.trim_start();
        let Some(first) = rest.chars().next() else {
            break;
        };

        let key_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        if key_len == 0 {
            rest = &rest[first.len_utf8()..];
            continue;
        }

        let key = &rest[..key_len];
        rest = rest[key_len..].trim_start();
        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };

        let (value, remainder) = read_attribute_value(after_eq.trim_start());
        rest = remainder;

        if key.eq_ignore_ascii_case("name") {
            name.get_or_insert(value);
        } else if key.eq_ignore_ascii_case("group") {
            group.get_or_insert(value);
        }
    }

    (name.unwrap_or_default(), group.unwrap_or_default())
}

/// Normalizes a reference name: line breaks and whitespace runs become single
/// spaces and the ends are trimmed.
pub fn clean_name(name: &str) -> String {
    WHITESPACE_RUN.replace_all(name, " ").trim().to_string()
}

/// Normalizes reference content like [`clean_name`], and additionally drops
/// the space just inside template braces (`{{ cite` and `x }}`).
pub fn clean_content(content: &str) -> String {
    clean_name(content).replace("{{ ", "{{").replace(" }}", "}}")
}

fn build_citation(attrs: &str, source: &str, span: (usize, usize)) -> Result<Citation, ParseError> {
    Ok(Citation {
        ident: parse_ident(attrs, source, span.0)?,
        source: source.to_string(),
        span,
    })
}

fn parse_ident(attrs: &str, source: &str, offset: usize) -> Result<RefIdent, ParseError> {
    let (name, group) = parse_attributes(attrs);
    let name = clean_name(&name);

    if let Some(character) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(ParseError::ForbiddenCharacter {
            character,
            snippet: source.to_string(),
            offset,
        });
    }

    Ok(RefIdent {
        group: group.trim().to_string(),
        name,
    })
}

/// Reads one attribute value and returns it with the unread remainder.
fn read_attribute_value(input: &str) -> (String, &str) {
    let mut chars = input.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &input[1..];
            match body.find(quote) {
                Some(close) => (body[..close].to_string(), &body[close + 1..]),
                None => (body.to_string(), ""),
            }
        }
        Some(_) => {
            let end = input
                .find(|c: char| c.is_whitespace())
                .unwrap_or(input.len());
            (input[..end].to_string(), &input[end..])
        }
        None => (String::new(), ""),
    }
}

/// Finds the `>` that closes an opening tag, skipping quoted attribute values.
///
/// A quote only opens a value when it directly follows `=`. If a quoted value
/// is never closed, the first `>` wins.
pub(crate) fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut last_significant = 0u8;

    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'>' => return Some(i),
                b'<' => return None,
                b'"' | b'\'' if last_significant == b'=' => quote = Some(b),
                _ => {}
            },
        }
        if !b.is_ascii_whitespace() {
            last_significant = b;
        }
    }

    if quote.is_some() {
        return text[from..].find('>').map(|rel| from + rel);
    }
    None
}

/// Finds the next `</ref>` (whitespace allowed before `>`) at or after `from`.
///
/// Returns the start of the closing tag and the offset just past it.
pub(crate) fn find_close_tag(lower: &str, from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    while let Some(rel) = lower[pos..].find("</ref") {
        let start = pos + rel;
        let after = start + 5;
        let rest = &lower[after..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with('>') {
            let end = after + (rest.len() - trimmed.len()) + 1;
            return Some((start, end));
        }
        pos = after;
    }
    None
}
