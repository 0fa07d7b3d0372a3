//! Shared test constants and helpers for integration tests.

#![allow(dead_code)]

use refcon_tools::{
    consolidate, extract_references, Config, LocalExpander, Options, Outcome,
};

/// An article with a duplicate, a name collision, a content collision and an
/// unnamed reference, followed by an empty reference list.
pub const MIXED_ARTICLE: &str = r#"Lead.<ref name="smith">Smith, ''Book'', 2001.</ref>
Body.<ref name="smith">Smith, ''Book'', 2001.</ref> More.<ref name="smith">Smith, ''Other'', 2005.</ref>
Later.<ref name="jones">Smith, ''Book'', 2001.</ref> Cite.<ref name="jones" />
Anon.<ref>Anonymous pamphlet.</ref>

== References ==
{{Reflist}}
"#;

/// Runs a pass with the default settings and the offline expander.
pub fn run_default(text: &str) -> Outcome {
    consolidate(text, &Config::default(), &Options::default(), &LocalExpander)
        .expect("consolidation should succeed")
}

/// The (name, content) pairs defined inside `{{reflist…}}` templates of `text`,
/// in order.
pub fn template_definitions(text: &str) -> Vec<(String, String)> {
    let mut definitions = Vec::new();
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("{{reflist") {
        let start = pos + rel;
        let end = refcon_tools::locate::find_template_end(text, start).expect("closed template");
        for reference in extract_references(&text[start..end]).expect("valid markup") {
            definitions.push((reference.ident.name, reference.content));
        }
        pos = end;
    }
    definitions
}
