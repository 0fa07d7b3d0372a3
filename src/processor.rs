//! One consolidation pass over an article.
//!
//! This module drives the phases in order: alias normalization, template
//! location, parameter expansion, deduplication, segmentation, resolution
//! and rewriting. A [`Session`] owns the state of a single pass; nothing is
//! kept between passes.

use thiserror::Error;

use crate::collate::NameOrder;
use crate::config::{Config, ConfigError, Options};
use crate::expand::{ExpandError, TemplateExpander};
use crate::locate::{locate_templates, normalize_aliases, TemplateLocation};
use crate::output::{append_summary, rewrite};
use crate::params::extract_params;
use crate::resolver::{apply_placement, resolve, ResolveError, ResolveStats};
use crate::segment::{build_spans, TextSpan};
use crate::template::TemplateInstance;
use crate::wikitext::ParseError;

/// Errors that abort a pass. The caller's text is never modified when one
/// is returned.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid reference markup: {0}")]
    Parse(#[from] ParseError),

    #[error("Template expansion failed: {0}")]
    Expand(#[from] ExpandError),

    #[error("No reference list template for group '{group}' after byte {offset}: {snippet}")]
    NoTargetTemplate {
        group: String,
        snippet: String,
        offset: usize,
    },
}

impl From<ResolveError> for ProcessorError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NoTargetTemplate {
                group,
                snippet,
                offset,
            } => ProcessorError::NoTargetTemplate {
                group,
                snippet,
                offset,
            },
        }
    }
}

/// What a pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    /// Reference-list templates found
    pub templates: usize,
    /// Text spans between and around the templates
    pub spans: usize,
    /// Canonical references held by the templates after the pass
    pub references: usize,
    /// References in the text turned into citations
    pub converted: usize,
    /// Citations bound to a canonical reference
    pub bound_citations: usize,
    /// Citations whose name matches no canonical reference
    pub unbound_citations: usize,
    /// Name substitutions recorded by deduplication and resolution
    pub substitutions: usize,
}

/// Result of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The rewritten document
    pub text: String,
    /// Whether `text` differs from the input
    pub changed: bool,
    pub report: Report,
}

impl Outcome {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            changed: false,
            report: Report::default(),
        }
    }

    /// Extends an edit summary with the configured one, if the pass changed
    /// the document.
    pub fn edit_summary(&self, current: &str, config: &Config) -> String {
        if !self.changed {
            return current.to_string();
        }
        append_summary(current, &config.summary, &config.summary_separator)
    }
}

/// State of one pass: the normalized document, its templates and spans.
pub struct Session<'a> {
    config: &'a Config,
    order: NameOrder,
    document: String,
    templates: Vec<TemplateInstance>,
    spans: Vec<TextSpan>,
}

impl<'a> Session<'a> {
    /// Validates the settings and normalizes template aliases in `text`.
    pub fn new(text: &str, config: &'a Config) -> Result<Self, ProcessorError> {
        config.validate()?;
        let order = NameOrder::for_language(&config.language)?;
        let document = normalize_aliases(text, &config.template_names)?;
        Ok(Self {
            config,
            order,
            document,
            templates: Vec::new(),
            spans: Vec::new(),
        })
    }

    pub fn locate(&self) -> Vec<TemplateLocation> {
        let locations = locate_templates(&self.document, self.config.template_name());
        tracing::debug!("located {} reference list template(s)", locations.len());
        locations
    }

    /// Expands all templates with a single service call and builds their
    /// deduplicated reference lists.
    pub fn load_templates(
        &mut self,
        locations: Vec<TemplateLocation>,
        expander: &dyn TemplateExpander,
    ) -> Result<(), ProcessorError> {
        let joined: String = locations.iter().map(|l| l.raw.as_str()).collect();
        let nodes = expander.expand(&joined)?;
        let param_maps = extract_params(&nodes, self.config.template_name());
        if param_maps.len() != locations.len() {
            tracing::warn!(
                "expansion returned {} template(s) for {} located",
                param_maps.len(),
                locations.len()
            );
        }

        let mut param_maps = param_maps.into_iter();
        for location in locations {
            let Some(params) = param_maps.next().flatten() else {
                tracing::warn!(
                    offset = location.start,
                    "no expansion for the template, leaving it as text"
                );
                continue;
            };
            let mut template = TemplateInstance::from_params(location, params, self.config)?;
            template.process_duplicates();
            tracing::debug!(
                group = %template.group,
                "template at byte {} holds {} reference(s)",
                template.start,
                template.len()
            );
            self.templates.push(template);
        }
        Ok(())
    }

    /// Splits the document around the templates and scans every span.
    pub fn segment(&mut self) -> Result<(), ProcessorError> {
        let mut spans = build_spans(&self.document, &self.templates);
        for span in &mut spans {
            span.parse()?;
        }
        tracing::debug!("segmented document into {} span(s)", spans.len());
        self.spans = spans;
        Ok(())
    }

    /// Binds the markup of every span to canonical references.
    pub fn resolve(&mut self, options: &Options) -> Result<ResolveStats, ProcessorError> {
        let stats = resolve(&mut self.spans, &mut self.templates)?;
        apply_placement(&mut self.templates, options.placement);
        tracing::debug!(
            "resolved {} reference(s), {} citation(s) bound, {} unbound",
            stats.references,
            stats.bound,
            stats.unbound
        );
        Ok(stats)
    }

    pub fn render(&self, options: &Options) -> String {
        rewrite(
            &self.spans,
            &self.templates,
            self.config,
            options,
            &self.order,
        )
    }

    fn report(&self, stats: ResolveStats) -> Report {
        Report {
            templates: self.templates.len(),
            spans: self.spans.len(),
            references: self.templates.iter().map(TemplateInstance::len).sum(),
            converted: stats.references,
            bound_citations: stats.bound,
            unbound_citations: stats.unbound,
            substitutions: self
                .templates
                .iter()
                .map(TemplateInstance::substitution_count)
                .sum(),
        }
    }
}

/// Runs one consolidation pass over `text`.
///
/// # Errors
///
/// Returns a [`ProcessorError`] for invalid settings, forbidden characters
/// in reference names, a failed expansion, or markup with no reference list
/// template after it.
pub fn consolidate(
    text: &str,
    config: &Config,
    options: &Options,
    expander: &dyn TemplateExpander,
) -> Result<Outcome, ProcessorError> {
    let mut session = Session::new(text, config)?;

    let locations = session.locate();
    if locations.is_empty() {
        return Ok(Outcome::unchanged(text));
    }

    session.load_templates(locations, expander)?;
    session.segment()?;
    let stats = session.resolve(options)?;

    let output = session.render(options);
    // alias spelling alone is not an edit
    if output == session.document {
        return Ok(Outcome {
            report: session.report(stats),
            ..Outcome::unchanged(text)
        });
    }
    Ok(Outcome {
        report: session.report(stats),
        text: output,
        changed: true,
    })
}
