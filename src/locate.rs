//! Reference-list template locator.
//!
//! Finds every occurrence of the reference-list template (`{{reflist …}}`)
//! in an article and computes where each one ends.

use regex::{Captures, Regex};

use crate::config::ConfigError;

/// A located reference-list template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLocation {
    /// Byte offset of the opening `{{`
    pub start: usize,
    /// Byte offset just past the closing `}}`
    pub end: usize,
    /// The template text, `text[start..end]`
    pub raw: String,
}

/// Rewrites every alias of the template name to the canonical name.
///
/// Matching is case-insensitive and tolerates whitespace after the opening
/// braces. The alias must be the whole template name: only whitespace may
/// separate it from the `|` or `}}` that follows. With the aliases
/// `["viited", "reflist"]` both `{{ Reflist|…}}` and `{{viited}}` become
/// `{{viited…`, while `{{reflist-talk}}` is left alone.
pub fn normalize_aliases(text: &str, aliases: &[String]) -> Result<String, ConfigError> {
    let Some(canonical) = aliases.first().map(|a| a.trim()) else {
        return Err(ConfigError::MissingAliases("template_names"));
    };

    let alternatives: Vec<String> = aliases
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Err(ConfigError::MissingAliases("template_names"));
    }

    let pattern = format!(
        r"(?i)\{{\{{\s*(?:{})(?P<tail>\s*(?:\||\}}|$))",
        alternatives.join("|")
    );
    let re = Regex::new(&pattern).map_err(|e| ConfigError::InvalidAlias {
        alias: alternatives.join(", "),
        message: e.to_string(),
    })?;

    Ok(re
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{{{{{}{}", canonical, &caps["tail"])
        })
        .into_owned())
}

/// Finds every `{{canonical` occurrence in already-normalized text.
///
/// An occurrence counts only when the name ends there, so `{{reflistx}}`
/// and `{{reflist-talk}}` are other templates. Occurrences whose closing
/// braces are missing are dropped, as are occurrences nested inside an
/// earlier located template.
pub fn locate_templates(text: &str, canonical: &str) -> Vec<TemplateLocation> {
    let needle = format!("{{{{{}", canonical);
    let mut locations: Vec<TemplateLocation> = Vec::new();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find(&needle) {
        let start = pos + rel;
        pos = start + needle.len();

        if !ends_template_name(&text[pos..]) {
            continue;
        }

        if locations.last().is_some_and(|prev| start < prev.end) {
            tracing::debug!(offset = start, "skipping template nested in a previous one");
            continue;
        }

        match find_template_end(text, start) {
            Some(end) => locations.push(TemplateLocation {
                start,
                end,
                raw: text[start..end].to_string(),
            }),
            None => {
                tracing::warn!(
                    offset = start,
                    "template '{}' is never closed, ignoring it",
                    canonical
                );
            }
        }
    }

    locations
}

/// Whether the text after a template name closes the name: optional
/// whitespace, then `|`, `}` or the end of the text.
fn ends_template_name(rest: &str) -> bool {
    matches!(rest.trim_start().chars().next(), None | Some('|' | '}'))
}

/// Computes the end of the template opening at `start` by counting brace
/// pairs: depth is 1 after the opening `{{`, each further `{{` adds one and
/// each `}}` removes one.
///
/// Returns the offset just past the closing `}}`, or `None` if the depth
/// never returns to 0.
pub fn find_template_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = start + 2;

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                depth += 1;
                i += 2;
            }
            (b'}', b'}') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => i += 1,
        }
    }

    None
}
