//! Cross-reference resolution.
//!
//! Matches the references and citations found in the article text against
//! the canonical references of their target templates, adding new canonical
//! references, renaming on conflicts, and recording which name every marker
//! must finally cite.

use thiserror::Error;

use crate::config::Placement;
use crate::refs::{RefLocation, RefUse, Reference};
use crate::segment::{Binding, TextSpan};
use crate::template::TemplateInstance;

/// Errors that abort resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("no reference list template for group '{group}' after byte {offset}: {snippet}")]
    NoTargetTemplate {
        group: String,
        snippet: String,
        offset: usize,
    },
}

/// Counts gathered while resolving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// References in the text that were turned into citations
    pub references: usize,
    /// Citations bound to a canonical reference
    pub bound: usize,
    /// Citations whose name matches no canonical reference
    pub unbound: usize,
}

/// Resolves every reference and then every citation of every span.
///
/// References of all spans go first so that the substitution tables are
/// complete before any citation name is looked up.
pub fn resolve(
    spans: &mut [TextSpan],
    templates: &mut [TemplateInstance],
) -> Result<ResolveStats, ResolveError> {
    let mut stats = ResolveStats::default();
    for (span_ix, span) in spans.iter_mut().enumerate() {
        stats.references += resolve_span_references(span_ix, span, templates)?;
    }
    for (span_ix, span) in spans.iter_mut().enumerate() {
        resolve_span_citations(span_ix, span, templates, &mut stats)?;
    }
    Ok(stats)
}

/// Resolves the references of one span: named ones first, so that generated
/// names cannot take a name the article uses on purpose, then unnamed ones.
fn resolve_span_references(
    span_ix: usize,
    span: &mut TextSpan,
    templates: &mut [TemplateInstance],
) -> Result<usize, ResolveError> {
    let mut resolved = 0;

    for named_pass in [true, false] {
        for i in 0..span.references.len() {
            let reference = &span.references[i];
            if reference.content.is_empty() || reference.ident.name.is_empty() == named_pass {
                continue;
            }

            let template_ix = target_template(
                span,
                &reference.ident.group,
                &reference.source,
                reference.span.0,
            )?;
            let template = &mut templates[template_ix];
            let (name, position) = if named_pass {
                bind_named(template, reference)
            } else {
                bind_unnamed(template, reference)
            };

            let offset = span.start + reference.span.0;
            if let Some(canonical) = template.get_mut(position) {
                canonical.uses.push(RefUse { span: span_ix, offset });
            }
            span.reference_bindings[i] = Some(Binding {
                template: template_ix,
                name,
                position: Some(position),
            });
            resolved += 1;
        }
    }

    Ok(resolved)
}

fn resolve_span_citations(
    span_ix: usize,
    span: &mut TextSpan,
    templates: &mut [TemplateInstance],
    stats: &mut ResolveStats,
) -> Result<(), ResolveError> {
    for i in 0..span.citations.len() {
        let citation = &span.citations[i];
        if citation.ident.name.is_empty() {
            continue;
        }

        let template_ix = target_template(
            span,
            &citation.ident.group,
            &citation.source,
            citation.span.0,
        )?;
        let template = &mut templates[template_ix];
        let name = template.resolve_name(&citation.ident.name);
        let position = template.find_by_name(&name);

        match position.and_then(|pos| template.get_mut(pos)) {
            Some(canonical) => {
                canonical.uses.push(RefUse {
                    span: span_ix,
                    offset: span.start + citation.span.0,
                });
                stats.bound += 1;
            }
            None => {
                tracing::warn!(
                    offset = span.start + citation.span.0,
                    "citation '{}' has no matching reference",
                    name
                );
                stats.unbound += 1;
            }
        }

        span.citation_bindings[i] = Some(Binding {
            template: template_ix,
            name,
            position,
        });
    }
    Ok(())
}

fn target_template(
    span: &TextSpan,
    group: &str,
    source: &str,
    relative_offset: usize,
) -> Result<usize, ResolveError> {
    span.target(group).ok_or_else(|| ResolveError::NoTargetTemplate {
        group: group.to_string(),
        snippet: source.to_string(),
        offset: span.start + relative_offset,
    })
}

/// Binds a named reference, returning the name to cite and the canonical position.
fn bind_named(template: &mut TemplateInstance, reference: &Reference) -> (String, usize) {
    let name = &reference.ident.name;
    let content = &reference.content;

    if let Some(pos) = template.find_by_pair(name, content) {
        return (name.clone(), pos);
    }

    if template.find_by_name(name).is_some() {
        let new_name = template.new_name(Some(name));
        let pos = template.add_ref(Reference::canonical(
            &reference.ident.group,
            &new_name,
            content,
        ));
        template.substitute(name, &new_name);
        tracing::debug!("reference '{}' reuses a name, stored as '{}'", name, new_name);
        return (new_name, pos);
    }

    if let Some(pos) = template.find_by_content(content) {
        let existing = template
            .get(pos)
            .map(|r| r.ident.name.clone())
            .unwrap_or_default();
        template.substitute(name, &existing);
        return (existing, pos);
    }

    let pos = template.add_ref(Reference::canonical(&reference.ident.group, name, content));
    (name.clone(), pos)
}

/// Binds an unnamed reference to an existing one with the same content, or
/// stores it under a generated name.
fn bind_unnamed(template: &mut TemplateInstance, reference: &Reference) -> (String, usize) {
    if let Some(pos) = template.find_by_content(&reference.content) {
        if let Some(existing) = template.get(pos) {
            return (existing.ident.name.clone(), pos);
        }
    }

    let name = template.new_name(None);
    let pos = template.add_ref(Reference::canonical(
        &reference.ident.group,
        &name,
        &reference.content,
    ));
    (name, pos)
}

/// Decides for every used canonical reference whether its definition stays
/// in the template or moves to its first use in the text.
pub fn apply_placement(templates: &mut [TemplateInstance], placement: Placement) {
    for template in templates.iter_mut() {
        for reference in template.references_mut() {
            reference.location = match placement {
                _ if reference.uses.is_empty() => RefLocation::Template,
                Placement::Template => RefLocation::Template,
                Placement::Text => RefLocation::Text,
                Placement::MinUses(min) if reference.uses.len() >= min => RefLocation::Template,
                Placement::MinUses(_) => RefLocation::Text,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::TemplateLocation;
    use crate::params::ParamMap;
    use crate::segment::build_spans;

    /// Builds templates (all ungrouped unless given) and parsed spans for a document.
    fn setup(document: &str, templates: &[(&str, &str)]) -> (Vec<TextSpan>, Vec<TemplateInstance>) {
        let mut instances = Vec::new();
        let mut from = 0;
        for (raw, group) in templates {
            let start = from + document[from..].find(raw).unwrap();
            instances.push(TemplateInstance::new(
                TemplateLocation {
                    start,
                    end: start + raw.len(),
                    raw: raw.to_string(),
                },
                ParamMap::new(),
                *group,
            ));
            from = start + raw.len();
        }
        let mut spans = build_spans(document, &instances);
        for span in &mut spans {
            span.parse().unwrap();
        }
        (spans, instances)
    }

    fn names(template: &TemplateInstance) -> Vec<(String, String)> {
        template
            .references()
            .map(|r| (r.ident.name.clone(), r.content.clone()))
            .collect()
    }

    #[test]
    fn test_duplicate_named_references_bind_once() {
        // Given: the same named reference twice and a citation
        let document = r#"A<ref name="a">X</ref> B<ref name="a">X</ref> C<ref name="a"/> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        // When: we resolve
        let stats = resolve(&mut spans, &mut templates).unwrap();

        // Then: one canonical reference with three uses
        assert_eq!(names(&templates[0]), vec![("a".to_string(), "X".to_string())]);
        assert_eq!(templates[0].get(0).unwrap().uses.len(), 3);
        assert_eq!(stats.references, 2);
        assert_eq!(stats.bound, 1);
        assert_eq!(stats.unbound, 0);
    }

    #[test]
    fn test_name_collision_in_text_renames() {
        // Given: one name used for two contents
        let document = r#"A<ref name="a">X</ref> B<ref name="a">Y</ref> C<ref name="a"/> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        // When: we resolve
        resolve(&mut spans, &mut templates).unwrap();

        // Then: the second content is stored under a new name
        assert_eq!(
            names(&templates[0]),
            vec![
                ("a".to_string(), "X".to_string()),
                ("a_1".to_string(), "Y".to_string())
            ]
        );
        let bindings: Vec<&str> = spans[0]
            .reference_bindings
            .iter()
            .map(|b| b.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(bindings, vec!["a", "a_1"]);
        assert_eq!(spans[0].citation_bindings[0].as_ref().unwrap().name, "a_1");
    }

    #[test]
    fn test_content_collision_binds_existing_name() {
        let document = r#"A<ref name="a">X</ref> B<ref name="b">X</ref> C<ref name="b"/> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        resolve(&mut spans, &mut templates).unwrap();

        assert_eq!(names(&templates[0]), vec![("a".to_string(), "X".to_string())]);
        assert_eq!(spans[0].reference_bindings[1].as_ref().unwrap().name, "a");
        assert_eq!(spans[0].citation_bindings[0].as_ref().unwrap().name, "a");
    }

    #[test]
    fn test_named_references_resolved_before_unnamed() {
        // Given: an unnamed reference before a named one with the same content
        let document = r#"A<ref>X</ref> B<ref name="a">X</ref> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        // When: we resolve
        resolve(&mut spans, &mut templates).unwrap();

        // Then: the unnamed one reuses the intentional name
        assert_eq!(names(&templates[0]), vec![("a".to_string(), "X".to_string())]);
        assert_eq!(spans[0].reference_bindings[0].as_ref().unwrap().name, "a");
    }

    #[test]
    fn test_unnamed_reference_gets_generated_name() {
        let document = r#"A<ref>X</ref> B<ref>Y</ref> C<ref>X</ref> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        resolve(&mut spans, &mut templates).unwrap();

        assert_eq!(
            names(&templates[0]),
            vec![
                ("ref_1".to_string(), "X".to_string()),
                ("ref_2".to_string(), "Y".to_string())
            ]
        );
        assert_eq!(spans[0].reference_bindings[2].as_ref().unwrap().name, "ref_1");
    }

    #[test]
    fn test_existing_template_reference_matches() {
        // Given: a template that already defines "a"
        let document = r#"A<ref name="a">X</ref> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);
        templates[0].add_ref(Reference::canonical("", "a", "X"));

        // When: we resolve
        resolve(&mut spans, &mut templates).unwrap();

        // Then: no new reference is added
        assert_eq!(templates[0].len(), 1);
        assert_eq!(templates[0].get(0).unwrap().uses.len(), 1);
    }

    #[test]
    fn test_groups_target_their_own_template() {
        // Given: a grouped and an ungrouped reference before two templates
        let document =
            r#"A<ref group="n" name="x">Note</ref> B<ref name="y">Src</ref> {{reflist|group=n}} {{reflist}}"#;
        let (mut spans, mut templates) = setup(
            document,
            &[("{{reflist|group=n}}", "n"), ("{{reflist}}", "")],
        );

        // When: we resolve
        resolve(&mut spans, &mut templates).unwrap();

        // Then: each reference lands in the template of its group
        assert_eq!(names(&templates[0]), vec![("x".to_string(), "Note".to_string())]);
        assert_eq!(names(&templates[1]), vec![("y".to_string(), "Src".to_string())]);
        assert_eq!(templates[0].get(0).unwrap().ident.group, "n");
    }

    #[test]
    fn test_missing_target_template_is_fatal() {
        // Given: a reference after the last template
        let document = r#"{{reflist}} After.<ref name="late">X</ref>"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        // When: we resolve
        let err = resolve(&mut spans, &mut templates).unwrap_err();

        // Then: the error names the group and the offending markup
        match err {
            ResolveError::NoTargetTemplate {
                group,
                snippet,
                offset,
            } => {
                assert_eq!(group, "");
                assert_eq!(snippet, r#"<ref name="late">X</ref>"#);
                assert_eq!(offset, 18);
            }
        }
    }

    #[test]
    fn test_unknown_citation_is_unbound() {
        let document = r#"A<ref name="ghost"/> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);

        let stats = resolve(&mut spans, &mut templates).unwrap();

        assert_eq!(stats.unbound, 1);
        let binding = spans[0].citation_bindings[0].as_ref().unwrap();
        assert_eq!(binding.name, "ghost");
        assert_eq!(binding.position, None);
    }

    #[test]
    fn test_apply_placement() {
        // Given: references with 0, 1 and 2 uses
        let document = r#"<ref name="a">A</ref><ref name="b">B</ref><ref name="b"/> {{reflist}}"#;
        let (mut spans, mut templates) = setup(document, &[("{{reflist}}", "")]);
        templates[0].add_ref(Reference::canonical("", "unused", "U"));
        resolve(&mut spans, &mut templates).unwrap();

        // When: at least two uses are required for the template
        apply_placement(&mut templates, Placement::MinUses(2));

        // Then: single-use references move to the text, unused ones stay
        let locations: Vec<(String, RefLocation)> = templates[0]
            .references()
            .map(|r| (r.ident.name.clone(), r.location))
            .collect();
        assert_eq!(
            locations,
            vec![
                ("unused".to_string(), RefLocation::Template),
                ("a".to_string(), RefLocation::Text),
                ("b".to_string(), RefLocation::Template),
            ]
        );
    }
}
