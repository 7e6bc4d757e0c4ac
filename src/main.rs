use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use regex_tree::{check_pattern, parse, ClassSyntax, Diagnostic, DialectConfig, Violation};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regex-tree")]
#[command(about = "Parse regular expressions and check their parse trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Patterns to parse (read from --file or stdin when omitted)
    patterns: Vec<String>,

    /// Read patterns from a file, one per line (an empty line is the empty pattern)
    #[arg(short, long, conflicts_with = "patterns")]
    file: Option<PathBuf>,

    /// Dialect configuration as JSON; flags below override it
    #[arg(long)]
    dialect: Option<PathBuf>,

    /// Let several groups share one name
    #[arg(long)]
    allow_duplicate_names: bool,

    /// Deepest group nesting accepted
    #[arg(long)]
    max_depth: Option<usize>,

    /// How bracket expressions are read
    #[arg(long, value_enum)]
    class_syntax: Option<ClassSyntaxArg>,

    /// Print the parse tree of every pattern
    #[arg(short, long, conflicts_with = "json")]
    tree: bool,

    /// Emit one JSON report per pattern
    #[arg(long)]
    json: bool,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassSyntaxArg {
    Pcre,
    Posix,
}

impl From<ClassSyntaxArg> for ClassSyntax {
    fn from(arg: ClassSyntaxArg) -> Self {
        match arg {
            ClassSyntaxArg::Pcre => ClassSyntax::Pcre,
            ClassSyntaxArg::Posix => ClassSyntax::Posix,
        }
    }
}

#[derive(Serialize)]
struct Report {
    pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    diagnostics: Vec<Diagnostic>,
    violations: Vec<Violation>,
}

impl Report {
    fn is_clean(&self) -> bool {
        self.error.is_none() && self.violations.is_empty()
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let dialect = load_dialect(&cli)?;
    let patterns = collect_patterns(&cli)?;

    let mut clean = true;
    for source in patterns {
        let report = match parse(&source, &dialect) {
            Ok(pattern) => {
                if cli.tree {
                    print!("{}", pattern.tree_view());
                }
                Report {
                    violations: check_pattern(&pattern).collect(),
                    diagnostics: pattern.diagnostics().to_vec(),
                    error: None,
                    offset: None,
                    pattern: source,
                }
            }
            Err(err) => Report {
                error: Some(err.to_string()),
                offset: Some(err.offset()),
                diagnostics: Vec::new(),
                violations: Vec::new(),
                pattern: source,
            },
        };
        clean &= report.is_clean();

        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_report(&report);
        }
    }

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_dialect(cli: &Cli) -> Result<DialectConfig> {
    let mut dialect = match &cli.dialect {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading dialect file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing dialect file {}", path.display()))?
        }
        None => DialectConfig::default(),
    };
    if cli.allow_duplicate_names {
        dialect.allow_duplicate_group_names = true;
    }
    if let Some(depth) = cli.max_depth {
        dialect.max_nesting_depth = depth;
    }
    if let Some(syntax) = cli.class_syntax {
        dialect.class_syntax = syntax.into();
    }
    Ok(dialect)
}

fn collect_patterns(cli: &Cli) -> Result<Vec<String>> {
    if !cli.patterns.is_empty() {
        return Ok(cli.patterns.clone());
    }
    match &cli.file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening pattern file {}", path.display()))?;
            read_patterns(BufReader::new(file))
                .with_context(|| format!("reading patterns from {}", path.display()))
        }
        None => read_patterns(io::stdin().lock()).context("reading patterns from stdin"),
    }
}

/// One pattern per line; `\n` and `\r\n` endings are stripped and empty lines kept.
fn read_patterns(reader: impl BufRead) -> io::Result<Vec<String>> {
    reader.lines().collect()
}

fn print_report(report: &Report) {
    match &report.error {
        Some(error) => println!("error {:?}: {error}", report.pattern),
        None if report.violations.is_empty() => println!("ok    {:?}", report.pattern),
        None => println!("bad   {:?}", report.pattern),
    }
    for diagnostic in &report.diagnostics {
        println!("  warning: {diagnostic}");
    }
    for violation in &report.violations {
        println!("  violation: {violation}");
    }
}
