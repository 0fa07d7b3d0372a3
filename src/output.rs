//! Output generation for the consolidated article.
//!
//! This module rewrites reference markup in the text spans, re-serializes
//! the reference-list templates and stitches both back together in document
//! order.

use crate::collate::NameOrder;
use crate::config::{Config, Options};
use crate::params::{ParamKey, ParamValue};
use crate::refs::{citation_marker, CitationForm, RefIdent, RefLocation, Reference};
use crate::segment::{Binding, TextSpan};
use crate::template::TemplateInstance;

/// A piece of markup to replace, with its byte range in the span text.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub span: (usize, usize),
    pub text: String,
}

/// Replaces ranges of `text` with new markup.
///
/// # Implementation Note
///
/// Replacements are performed from the end of the text towards the beginning
/// so that replacing earlier markup doesn't invalidate the ranges of later
/// markup.
pub fn replace_markup(text: &str, replacements: &[Replacement]) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }

    let mut sorted: Vec<&Replacement> = replacements.iter().collect();
    sorted.sort_by(|a, b| b.span.0.cmp(&a.span.0));

    let mut result = text.to_string();
    for replacement in sorted {
        let (start, end) = replacement.span;
        result.replace_range(start..end, &replacement.text);
    }
    result
}

/// Rewrites the references and citations of one span.
///
/// Every bound marker becomes a compact citation with its final name, except
/// the first use of a text-placed reference, which receives the full
/// definition.
pub fn rewrite_span(
    span: &TextSpan,
    templates: &[TemplateInstance],
    form: CitationForm,
) -> String {
    let mut replacements = Vec::new();

    let references = span
        .references
        .iter()
        .map(|r| r.span)
        .zip(&span.reference_bindings);
    let citations = span
        .citations
        .iter()
        .map(|c| c.span)
        .zip(&span.citation_bindings);

    for (range, binding) in references.chain(citations) {
        let Some(binding) = binding else {
            continue;
        };
        let Some(template) = templates.get(binding.template) else {
            continue;
        };
        let text = match inline_definition(template, binding, span.start + range.0) {
            Some(definition) => definition,
            None => citation_marker(&RefIdent::new(&template.group, &binding.name), form),
        };
        replacements.push(Replacement { span: range, text });
    }

    replace_markup(&span.text, &replacements)
}

/// The full definition, if the marker at `offset` is the first use of a
/// text-placed reference.
fn inline_definition(template: &TemplateInstance, binding: &Binding, offset: usize) -> Option<String> {
    let reference = template.get(binding.position?)?;
    if reference.location != RefLocation::Text {
        return None;
    }
    let first_use = reference.uses.iter().map(|u| u.offset).min()?;
    (first_use == offset).then(|| reference.to_inline_definition())
}

/// Re-serializes a reference-list template with its canonical references.
///
/// Parameters are written back in order; the refs parameter (under any
/// alias) is replaced by the canonical name holding one definition per line
/// and appended if the template had none. A template with neither a refs
/// parameter nor references keeps its original text. When sorting, `order`
/// decides the order of the definitions.
pub fn build_template(
    template: &TemplateInstance,
    config: &Config,
    options: &Options,
    order: &NameOrder,
) -> String {
    let has_refs_param = template.has_refs_param(&config.refs_names);
    let mut definitions: Vec<&Reference> = template
        .references()
        .filter(|r| r.location == RefLocation::Template)
        .collect();

    if !has_refs_param && definitions.is_empty() {
        return template.raw.clone();
    }

    if options.sort {
        definitions.sort_by(|a, b| order.compare(a.name(), b.name()));
    }

    let lines: Vec<String> = definitions.iter().map(|r| r.to_definition()).collect();
    let refs_param = format!("|{}=\n{}", config.refs_name(), lines.join("\n"));

    let mut output = format!("{{{{{}", config.template_name());
    let mut refs_written = false;
    for (key, value) in template.params.iter() {
        if is_refs_key(key, &config.refs_names) {
            if !refs_written {
                output.push_str(&refs_param);
                refs_written = true;
            }
            continue;
        }
        output.push_str(&render_param(key, value));
    }
    if !refs_written {
        output.push_str(&refs_param);
    }
    output.push_str("\n}}");
    output
}

fn is_refs_key(key: &ParamKey, refs_names: &[String]) -> bool {
    match key {
        ParamKey::Named(name) => refs_names.iter().any(|alias| alias.trim() == name),
        ParamKey::Positional(_) => false,
    }
}

fn render_param(key: &ParamKey, value: &ParamValue) -> String {
    match key {
        ParamKey::Named(name) => format!("|{}={}", name, value),
        ParamKey::Positional(_) => format!("|{}", value),
    }
}

/// Interleaves span texts and template texts: span 0, template 0, span 1, …,
/// and the trailing span.
pub fn assemble(spans: &[String], templates: &[String]) -> String {
    let capacity = spans.iter().chain(templates).map(String::len).sum();
    let mut output = String::with_capacity(capacity);
    for (i, span) in spans.iter().enumerate() {
        output.push_str(span);
        if let Some(template) = templates.get(i) {
            output.push_str(template);
        }
    }
    output
}

/// Rewrites every span and template and returns the new document.
pub fn rewrite(
    spans: &[TextSpan],
    templates: &[TemplateInstance],
    config: &Config,
    options: &Options,
    order: &NameOrder,
) -> String {
    let span_texts: Vec<String> = spans
        .iter()
        .map(|span| rewrite_span(span, templates, options.citation_form))
        .collect();
    let template_texts: Vec<String> = templates
        .iter()
        .map(|template| build_template(template, config, options, order))
        .collect();
    assemble(&span_texts, &template_texts)
}

/// Adds `summary` to an existing edit summary.
///
/// The current summary is returned unchanged when `summary` is empty or
/// already part of it.
pub fn append_summary(current: &str, summary: &str, separator: &str) -> String {
    if summary.is_empty() || current.contains(summary) {
        current.to_string()
    } else if current.is_empty() {
        summary.to_string()
    } else {
        format!("{}{}{}", current, separator, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_preset, Placement};
    use crate::locate::TemplateLocation;
    use crate::params::{ParamMap, RefPair};
    use crate::refs::RefUse;

    fn location(raw: &str) -> TemplateLocation {
        TemplateLocation {
            start: 0,
            end: raw.len(),
            raw: raw.to_string(),
        }
    }

    fn template_with(raw: &str, params: ParamMap, refs: &[(&str, &str)]) -> TemplateInstance {
        let mut template = TemplateInstance::new(location(raw), params, "");
        for (name, content) in refs {
            template.add_ref(Reference::canonical("", name, content));
        }
        template
    }

    fn english() -> NameOrder {
        NameOrder::for_language("en").unwrap()
    }

    // ===========================================
    // Tests for replace_markup
    // ===========================================

    #[test]
    fn test_replace_markup_multiple() {
        // Given: two ranges in a text
        let text = r#"A<ref name="a">X</ref> B<ref name="a"/>."#;
        let replacements = vec![
            Replacement {
                span: (1, 22),
                text: "[1]".to_string(),
            },
            Replacement {
                span: (24, 39),
                text: "[2]".to_string(),
            },
        ];

        // When: we replace them
        let result = replace_markup(text, &replacements);

        // Then: both are replaced regardless of length changes
        assert_eq!(result, "A[1] B[2].");
    }

    #[test]
    fn test_replace_markup_empty_list() {
        assert_eq!(replace_markup("unchanged", &[]), "unchanged");
    }

    // ===========================================
    // Tests for rewrite_span
    // ===========================================

    #[test]
    fn test_rewrite_span_uses_final_names() {
        // Given: a parsed span whose markers are bound to "a"
        let mut span = TextSpan::new(0, 0, r#"A<ref name="b">X</ref> B<ref name="b" />."#, Default::default());
        span.parse().unwrap();
        let binding = Binding {
            template: 0,
            name: "a".to_string(),
            position: Some(0),
        };
        span.reference_bindings = vec![Some(binding.clone())];
        span.citation_bindings = vec![Some(binding)];
        let templates = vec![template_with("{{reflist}}", ParamMap::new(), &[("a", "X")])];

        // When: we rewrite it
        let result = rewrite_span(&span, &templates, CitationForm::Tag);

        // Then: both markers cite "a"
        assert_eq!(result, r#"A<ref name="a" /> B<ref name="a" />."#);
    }

    #[test]
    fn test_rewrite_span_template_r_form() {
        let mut span = TextSpan::new(0, 0, r#"A<ref name="a">X</ref>"#, Default::default());
        span.parse().unwrap();
        span.reference_bindings = vec![Some(Binding {
            template: 0,
            name: "a".to_string(),
            position: Some(0),
        })];
        let mut template = template_with("{{reflist}}", ParamMap::new(), &[]);
        template.group = "n".to_string();
        template.add_ref(Reference::canonical("n", "a", "X"));

        let result = rewrite_span(&span, &[template], CitationForm::TemplateR);

        assert_eq!(result, "A{{r|g=n|a}}");
    }

    #[test]
    fn test_rewrite_span_first_use_of_text_reference_is_defined() {
        // Given: a text-placed reference used twice
        let text = r#"A<ref name="a"/> B<ref name="a"/>"#;
        let mut span = TextSpan::new(5, 5 + text.len(), text, Default::default());
        span.parse().unwrap();
        let binding = Binding {
            template: 0,
            name: "a".to_string(),
            position: Some(0),
        };
        span.citation_bindings = vec![Some(binding.clone()), Some(binding)];
        let mut template = template_with("{{reflist}}", ParamMap::new(), &[("a", "X")]);
        let reference = template.get_mut(0).unwrap();
        reference.location = RefLocation::Text;
        // uses are recorded out of document order
        reference.uses = vec![
            RefUse { span: 0, offset: 5 + 18 },
            RefUse { span: 0, offset: 5 + 1 },
        ];

        // When: we rewrite the span
        let result = rewrite_span(&span, &[template], CitationForm::Tag);

        // Then: the earliest use carries the definition
        assert_eq!(result, r#"A<ref name="a">X</ref> B<ref name="a" />"#);
    }

    #[test]
    fn test_rewrite_span_leaves_unbound_markup() {
        let mut span = TextSpan::new(0, 0, r#"A<ref group="n" />"#, Default::default());
        span.parse().unwrap();
        let result = rewrite_span(&span, &[], CitationForm::Tag);
        assert_eq!(result, r#"A<ref group="n" />"#);
    }

    // ===========================================
    // Tests for build_template
    // ===========================================

    #[test]
    fn test_build_template_appends_refs_param() {
        // Given: a template without a refs parameter and one reference
        let mut params = ParamMap::new();
        params.insert(ParamKey::Positional(1), ParamValue::Text("30em".to_string()));
        let template = template_with("{{reflist|30em}}", params, &[("a", "X")]);

        // When: we rebuild it
        let result = build_template(&template, &Config::default(), &Options::default(), &english());

        // Then: the positional parameter is kept and refs are appended
        assert_eq!(result, "{{reflist|30em|refs=\n<ref name=\"a\">X</ref>\n}}");
    }

    #[test]
    fn test_build_template_replaces_refs_alias_in_place() {
        // Given: an Estonian template with the refs parameter first
        let mut params = ParamMap::new();
        params.insert(
            ParamKey::Named("allikad".to_string()),
            ParamValue::Refs(vec![RefPair {
                attr: " name=b".to_string(),
                inner: "Y".to_string(),
            }]),
        );
        params.insert(ParamKey::Named("grupp".to_string()), ParamValue::Text("m".to_string()));
        let template = template_with("{{viited|allikad=…|grupp=m}}", params, &[("b", "Y")]);
        let config = Config {
            template_names: vec!["viited".to_string()],
            group_names: vec!["grupp".to_string()],
            refs_names: vec!["allikad".to_string(), "refs".to_string()],
            ..Config::default()
        };

        // When: we rebuild it
        let result = build_template(&template, &config, &Options::default(), &english());

        // Then: the refs parameter keeps its place
        assert_eq!(result, "{{viited|allikad=\n<ref name=\"b\">Y</ref>|grupp=m\n}}");
    }

    #[test]
    fn test_build_template_sorts_by_collation() {
        let template = template_with(
            "{{reflist}}",
            ParamMap::new(),
            &[("beta", "2"), ("Alpha", "1"), ("alpha", "3")],
        );
        let options = Options {
            sort: true,
            ..Options::default()
        };

        let result = build_template(&template, &Config::default(), &options, &english());

        // lowercase sorts before uppercase at the tertiary level
        assert_eq!(
            result,
            "{{reflist|refs=\n<ref name=\"alpha\">3</ref>\n<ref name=\"Alpha\">1</ref>\n<ref name=\"beta\">2</ref>\n}}"
        );
    }

    #[test]
    fn test_build_template_sorts_in_estonian() {
        // Given: names whose Estonian order differs from the English one
        let template = template_with(
            "{{viited}}",
            ParamMap::new(),
            &[("tamm", "1"), ("zoo", "2"), ("õun", "3"), ("xeno", "4")],
        );
        let config = builtin_preset("et").unwrap();
        let options = Options {
            sort: true,
            ..Options::default()
        };

        // When: we rebuild it with the Estonian order
        let order = NameOrder::for_language(&config.language).unwrap();
        let result = build_template(&template, &config, &options, &order);

        // Then: z precedes t and õ precedes x
        assert_eq!(
            result,
            "{{viited|allikad=\n<ref name=\"zoo\">2</ref>\n<ref name=\"tamm\">1</ref>\n<ref name=\"õun\">3</ref>\n<ref name=\"xeno\">4</ref>\n}}"
        );
    }

    #[test]
    fn test_build_template_skips_text_placed_references() {
        let mut template = template_with("{{reflist}}", ParamMap::new(), &[("a", "X"), ("b", "Y")]);
        template.get_mut(0).unwrap().location = RefLocation::Text;
        let options = Options {
            placement: Placement::Text,
            ..Options::default()
        };

        let result = build_template(&template, &Config::default(), &options, &english());

        assert_eq!(result, "{{reflist|refs=\n<ref name=\"b\">Y</ref>\n}}");
    }

    #[test]
    fn test_build_template_without_refs_keeps_raw_text() {
        let template = template_with("{{Reflist| 2 }}", ParamMap::new(), &[]);
        let result = build_template(&template, &Config::default(), &Options::default(), &english());
        assert_eq!(result, "{{Reflist| 2 }}");
    }

    // ===========================================
    // Tests for assemble and append_summary
    // ===========================================

    #[test]
    fn test_assemble_interleaves() {
        let spans = vec!["a ".to_string(), " b ".to_string(), " c".to_string()];
        let templates = vec!["{{T1}}".to_string(), "{{T2}}".to_string()];
        assert_eq!(assemble(&spans, &templates), "a {{T1}} b {{T2}} c");
    }

    #[test]
    fn test_append_summary() {
        assert_eq!(append_summary("", "Consolidated refs", " + "), "Consolidated refs");
        assert_eq!(
            append_summary("typo", "Consolidated refs", " + "),
            "typo + Consolidated refs"
        );
        assert_eq!(
            append_summary("typo + Consolidated refs", "Consolidated refs", " + "),
            "typo + Consolidated refs"
        );
        assert_eq!(append_summary("typo", "", " + "), "typo");
    }
}
