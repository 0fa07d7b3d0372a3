//! CLI for refcon-tools - Consolidate wiki-markup references into list-defined templates.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refcon_tools::{
    builtin_preset, config::builtin_preset_names, consolidate, load_config, Config,
    LocalExpander, ProcessorError, StaticExpander, TemplateExpander,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Consolidate wiki-markup references into list-defined reference templates
#[derive(Parser)]
#[command(name = "refcon-tools")]
#[command(version)]
#[command(after_help = "\
Examples:
  refcon-tools process article.wiki
  refcon-tools process article.wiki --preset et -o article.new.wiki
  cat article.wiki | refcon-tools process - --sort
  refcon-tools presets")]
struct Cli {
    /// Log every phase of the pass to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate the references of an article
    #[command(after_help = "\
Examples:
  refcon-tools process article.wiki --preset en --sort
  refcon-tools process article.wiki --config wiki.toml -o out.wiki
  refcon-tools process article.wiki --parse-tree response.json

Inline <ref name=\"a\">…</ref> definitions move into the refs parameter of the
reference list template that follows them; the text keeps <ref name=\"a\" />.")]
    Process {
        /// Input wikitext file (use '-' for stdin)
        input: PathBuf,

        /// Settings file (TOML); overrides --preset
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Builtin settings preset (see 'presets' command)
        #[arg(short, long, default_value = "en")]
        preset: String,

        /// Saved template parse tree (JSON) to use instead of the offline splitter
        #[arg(long)]
        parse_tree: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sort list-defined references by name (when the settings leave it to the user)
        #[arg(long)]
        sort: bool,

        /// Cite with {{r|name}} (when the settings leave it to the user)
        #[arg(long)]
        template_r: bool,

        /// Existing edit summary to extend when the article changes
        #[arg(long)]
        summary: Option<String>,
    },

    /// List available builtin settings presets
    Presets,
}

// ---------------------------------------------------------------------------
// AppError: semantic exit codes
// ---------------------------------------------------------------------------

enum AppError {
    /// Exit 10: input file not found / unreadable
    InputFile(String),
    /// Exit 11: settings file or preset not found / invalid
    Config(String),
    /// Exit 12: parse tree unreadable / invalid, or expansion failed
    ParseTree(String),
    /// Exit 13: forbidden character in a reference name
    ReferenceSyntax(String),
    /// Exit 14: markup with no reference list template after it
    NoTargetTemplate(String),
    /// Exit 15: cannot write output file
    OutputFile(String),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::InputFile(_) => 10,
            AppError::Config(_) => 11,
            AppError::ParseTree(_) => 12,
            AppError::ReferenceSyntax(_) => 13,
            AppError::NoTargetTemplate(_) => 14,
            AppError::OutputFile(_) => 15,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputFile(msg) => {
                write!(f, "{}\n  hint: verify the file path is correct", msg)
            }
            AppError::Config(msg) => {
                let names = builtin_preset_names().join(", ");
                write!(
                    f,
                    "{}\n  available builtin presets: {}\n  hint: every alias list needs at least one name",
                    msg, names
                )
            }
            AppError::ParseTree(msg) => {
                write!(
                    f,
                    "{}\n  hint: the parse tree must be a JSON array of {{\"title\", \"parts\"}} objects",
                    msg
                )
            }
            AppError::ReferenceSyntax(msg) => {
                write!(
                    f,
                    "{}\n  hint: reference names may not contain <, > or \"",
                    msg
                )
            }
            AppError::NoTargetTemplate(msg) => {
                write!(
                    f,
                    "{}\n  hint: add a reference list template for this group after the reference",
                    msg
                )
            }
            AppError::OutputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that the output directory exists and is writable",
                    msg
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("refcon_tools=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "refcon_tools=warn".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Process {
            input,
            config,
            preset,
            parse_tree,
            output,
            sort,
            template_r,
            summary,
        } => {
            let settings = load_settings(config.as_deref(), &preset)?;
            let args = ProcessArgs {
                input: &input,
                parse_tree: parse_tree.as_deref(),
                output: output.as_deref(),
                sort,
                template_r,
                summary: summary.as_deref(),
            };
            process_command(&settings, &args)?;
        }
        Commands::Presets => {
            presets_command();
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

struct ProcessArgs<'a> {
    input: &'a Path,
    parse_tree: Option<&'a Path>,
    output: Option<&'a Path>,
    sort: bool,
    template_r: bool,
    summary: Option<&'a str>,
}

fn load_settings(config: Option<&Path>, preset: &str) -> Result<Config, AppError> {
    match config {
        Some(path) => load_config(path)
            .map_err(|e| AppError::Config(format!("'{}': {}", path.display(), e))),
        None => builtin_preset(preset).map_err(|e| AppError::Config(e.to_string())),
    }
}

/// Consolidate the references of a wikitext file.
fn process_command(config: &Config, args: &ProcessArgs<'_>) -> Result<(), AppError> {
    // 1. Read the article (support '-' for stdin)
    let text = if args.input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AppError::InputFile(format!("failed to read from stdin: {}", e)))?;
        buf
    } else {
        fs::read_to_string(args.input).map_err(|e| {
            AppError::InputFile(format!("'{}': {}", args.input.display(), e))
        })?
    };

    // 2. Pick the expansion service
    let expander: Box<dyn TemplateExpander> = match args.parse_tree {
        Some(path) => Box::new(StaticExpander::from_json_file(path).map_err(|e| {
            AppError::ParseTree(format!("'{}': {}", path.display(), e))
        })?),
        None => Box::new(LocalExpander),
    };

    // 3. Run the pass
    let options = config.options(args.sort, args.template_r);
    let outcome =
        consolidate(&text, config, &options, expander.as_ref()).map_err(map_processor_error)?;

    // 4. Write to file (only when changed) or stdout
    if let Some(output_path) = args.output {
        if outcome.changed {
            fs::write(output_path, &outcome.text).map_err(|e| {
                AppError::OutputFile(format!("'{}': {}", output_path.display(), e))
            })?;
            eprintln!(
                "consolidated {} reference(s) into {} template(s), wrote {}",
                outcome.report.references,
                outcome.report.templates,
                output_path.display()
            );
        } else {
            eprintln!("no changes, {} left untouched", output_path.display());
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{}", outcome.text)
            .map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))?;
    }

    if outcome.report.unbound_citations > 0 {
        eprintln!(
            "{} citation(s) name no known reference",
            outcome.report.unbound_citations
        );
    }

    // 5. Report the edit summary
    if outcome.changed {
        let summary = outcome.edit_summary(args.summary.unwrap_or_default(), config);
        if !summary.is_empty() {
            eprintln!("summary: {}", summary);
        }
    }

    Ok(())
}

/// Maps a ProcessorError to an AppError using type-safe matching.
fn map_processor_error(e: ProcessorError) -> AppError {
    match e {
        ProcessorError::Config(_) => AppError::Config(e.to_string()),
        ProcessorError::Expand(_) => AppError::ParseTree(e.to_string()),
        ProcessorError::Parse(_) => AppError::ReferenceSyntax(e.to_string()),
        ProcessorError::NoTargetTemplate { .. } => AppError::NoTargetTemplate(e.to_string()),
    }
}

/// List available builtin settings presets.
fn presets_command() {
    for name in builtin_preset_names() {
        println!("{}", name);
    }
}
