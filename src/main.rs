//! Purpose: `refl-index` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout formats (human or JSON by command/flags).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logs go to stderr so stdout stays machine-readable.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::ops::Range;
use std::path::{Path, PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use refl_index::api::{
    BuildOptions, Error, ErrorKind, FileIdentity, IndexBuilder, KeyOrder, Reader, ReaderOptions,
    SidecarIndex, build_all, to_exit_code,
};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod column_json;
mod command_dispatch;
mod index_info_json;
mod index_paths;

use column_json::slice_json;
use index_info_json::{build_summary_json, identity_json, index_info_json};
use index_paths::{output_index_path, resolve_source_path};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(cli.verbose, color_mode);

    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_format_hint)
        .map_err(add_stale_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing(verbose: bool, color_mode: ColorMode) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(color_mode.use_color(io::stderr().is_terminal()))
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "refl-index",
    version,
    about = "Sidecar offset indexes for DIALS reflection tables",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A .refl file is one msgpack document holding every column as a raw blob.
`build` scans it once and records where each blob lives; `read` then fetches
row ranges straight from disk without decoding anything else.
"#,
    after_help = r#"EXAMPLES
  $ refl-index build strong.refl              # writes strong.refl.idx
  $ refl-index info strong.refl.idx
  $ refl-index read strong.refl.idx -c miller_index --head 5
  $ refl-index check strong.refl.idx          # exit 7 when stale

LEARN MORE
  $ refl-index <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        short,
        long,
        global = true,
        help = "Log debug detail to stderr (overrides RUST_LOG)"
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Index one or more reflection tables",
        long_about = r#"Scan reflection tables and write a sidecar index next to each.

Each file is read once, front to back; column blobs are skipped, never loaded.
Several files are indexed in parallel."#,
        after_help = r#"EXAMPLES
  $ refl-index build strong.refl
  $ refl-index build a.refl b.refl c.refl
  $ refl-index build strong.refl -o /tmp/strong.idx
  $ refl-index build --relaxed-keys odd-writer.refl

NOTES
  - `--output` needs exactly one input file
  - `--skip-buffer` accepts bytes or K/M/G (default 64K)"#
    )]
    Build {
        #[arg(required = true, help = "Reflection table(s) to index", value_hint = ValueHint::FilePath)]
        files: Vec<PathBuf>,
        #[arg(
            short = 'o',
            long,
            help = "Sidecar path (default: <file>.idx)",
            value_hint = ValueHint::FilePath
        )]
        output: Option<PathBuf>,
        #[arg(long, help = "Accept payload keys in any order")]
        relaxed_keys: bool,
        #[arg(
            long,
            value_name = "BYTES",
            help = "Scratch buffer used to skip blobs (bytes or K/M/G)"
        )]
        skip_buffer: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Describe a sidecar index",
        after_help = r#"EXAMPLES
  $ refl-index info strong.refl.idx
  $ refl-index info strong.refl.idx --json"#
    )]
    Info {
        #[arg(help = "Sidecar index path", value_hint = ValueHint::FilePath)]
        index: PathBuf,
        #[arg(long, help = "Emit JSON instead of human-readable output")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Read column rows through a sidecar index",
        long_about = r#"Read a row range of one or more columns and print it as JSON.

Only the requested byte ranges are read from the source file."#,
        after_help = r#"EXAMPLES
  $ refl-index read strong.refl.idx -c intensity.sum.value --start 10 --stop 20
  $ refl-index read strong.refl.idx -c miller_index,flags --head 3
  $ refl-index read moved.refl.idx --source /new/place/strong.refl

NOTES
  - Without -c, every column is read
  - The source defaults to the recorded path, then to the index's directory"#
    )]
    Read {
        #[arg(help = "Sidecar index path", value_hint = ValueHint::FilePath)]
        index: PathBuf,
        #[arg(
            short = 'c',
            long = "columns",
            value_name = "NAME",
            value_delimiter = ',',
            help = "Column(s) to read (repeatable or comma-separated)"
        )]
        columns: Vec<String>,
        #[arg(long, allow_negative_numbers = true, help = "First row (default 0)")]
        start: Option<i64>,
        #[arg(
            long,
            allow_negative_numbers = true,
            conflicts_with = "head",
            help = "Row after the last one read (default: all rows)"
        )]
        stop: Option<i64>,
        #[arg(long, value_name = "N", help = "Read at most N rows from --start")]
        head: Option<u64>,
        #[arg(long, help = "Source file override", value_hint = ValueHint::FilePath)]
        source: Option<PathBuf>,
        #[arg(long, help = "Compare only the file size when checking staleness")]
        ignore_mtime: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Check whether a sidecar index matches its source",
        after_help = r#"EXAMPLES
  $ refl-index check strong.refl.idx || refl-index build strong.refl

NOTES
  - Exit code 7 means the index is stale"#
    )]
    Check {
        #[arg(help = "Sidecar index path", value_hint = ValueHint::FilePath)]
        index: PathBuf,
        #[arg(long, help = "Source file override", value_hint = ValueHint::FilePath)]
        source: Option<PathBuf>,
    },
    #[command(
        about = "Print version info as JSON",
        long_about = r#"Emit version info as JSON (stable, machine-readable)."#,
        after_help = r#"EXAMPLES
  $ refl-index version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ refl-index completion bash > ~/.local/share/bash-completion/completions/refl-index
  $ refl-index completion zsh > ~/.zfunc/_refl-index
  $ refl-index completion fish > ~/.config/fish/completions/refl-index.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn build_options(relaxed_keys: bool, skip_buffer: Option<&str>) -> Result<BuildOptions, Error> {
    let mut options = BuildOptions::new();
    if relaxed_keys {
        options = options.with_key_order(KeyOrder::Relaxed);
    }
    if let Some(input) = skip_buffer {
        let bytes = parse_size(input)?;
        let bytes = usize::try_from(bytes).map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message("skip buffer too large")
                .with_hint("Use a smaller size value.")
        })?;
        options = options.with_skip_buffer_len(bytes);
    }
    Ok(options)
}

fn build_and_save(
    builder: &IndexBuilder,
    source: &Path,
    output: Option<&Path>,
) -> Result<Value, Error> {
    let index = builder.build_path(source)?;
    let target = output_index_path(source, output);
    let saved = index.save(Some(target.as_path()))?;
    Ok(build_summary_json(&index, &saved))
}

/// Builds several files in parallel; failures are reported inline, not fatal.
fn build_many(paths: &[PathBuf], options: BuildOptions) -> (Vec<Value>, Option<ErrorKind>) {
    let mut entries = Vec::with_capacity(paths.len());
    let mut first_failure = None;
    for (source, result) in paths.iter().zip(build_all(paths, options)) {
        let saved = result.and_then(|index| {
            let target = output_index_path(source, None);
            let saved = index.save(Some(target.as_path()))?;
            Ok(build_summary_json(&index, &saved))
        });
        match saved {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                let err = add_io_hint(add_format_hint(err));
                first_failure.get_or_insert(err.kind());
                entries.push(json!({
                    "source": source.display().to_string(),
                    "error": error_body(&err),
                }));
            }
        }
    }
    (entries, first_failure)
}

fn emit_index_info_pretty(index: &SidecarIndex, index_path: &Path) {
    println!("{}", index_path.display());
    println!("  source:      {}", index.source_path().display());
    println!("  size:        {}", format_bytes(index.identity().size));
    println!("  rows:        {}", index.nrows());
    println!("  identifiers: {}", index.num_identifiers());
    println!("  created:     {}", index.created_at());
    if index.is_empty() {
        println!("  columns:     none");
        return;
    }
    println!();
    let rows = index
        .columns()
        .map(|column| {
            vec![
                column.name.clone(),
                column.dtype.tag().to_string(),
                column.elem_size().to_string(),
                column.offset.to_string(),
                format_bytes(column.length),
            ]
        })
        .collect::<Vec<_>>();
    emit_table(&["NAME", "TYPE", "ELEM", "OFFSET", "SIZE"], &rows);
}

fn row_index(value: i64, flag: &str) -> Result<u64, Error> {
    u64::try_from(value).map_err(|_| {
        Error::new(ErrorKind::Range)
            .with_message(format!("{flag} must be non-negative"))
            .with_found(value.to_string())
    })
}

/// Resolves `--start/--stop/--head` against a column length.
fn resolve_rows(
    start: Option<i64>,
    stop: Option<i64>,
    head: Option<u64>,
    nrows: u64,
) -> Result<Range<u64>, Error> {
    let start = start.map(|value| row_index(value, "--start")).transpose()?.unwrap_or(0);
    let stop = match (stop, head) {
        (Some(stop), _) => row_index(stop, "--stop")?,
        (None, Some(head)) => start.saturating_add(head).min(nrows).max(start),
        (None, None) => nrows.max(start),
    };
    Ok(start..stop)
}

fn read_rows(
    index: &SidecarIndex,
    source: &Path,
    columns: &[String],
    rows: Range<u64>,
    options: ReaderOptions,
) -> Result<Vec<Value>, Error> {
    let reader = Reader::open(index, Some(source), options)?;
    let names: Vec<&str> = if columns.is_empty() {
        index.column_names()
    } else {
        columns.iter().map(String::as_str).collect()
    };
    reader
        .read_columns(names.as_slice(), rows)?
        .iter()
        .map(slice_json)
        .collect()
}

fn check_json(index: &SidecarIndex, index_path: &Path, source: &Path) -> Result<(Value, bool), Error> {
    let actual = match FileIdentity::of_path(source) {
        Ok(identity) => Some(identity),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(err),
    };
    let current = actual.is_some_and(|actual| index.identity().matches(&actual, true));
    if !current {
        tracing::warn!(index = %index_path.display(), source = %source.display(), "index is stale");
    }
    let value = json!({
        "index": index_path.display().to_string(),
        "source": source.display().to_string(),
        "current": current,
        "recorded": identity_json(&index.identity()),
        "actual": actual.as_ref().map(identity_json),
    });
    Ok((value, current))
}

fn parse_size(input: &str) -> Result<u64, Error> {
    let trimmed = input.trim();
    let split = trimmed
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let digits = trimmed[..split].trim();
    let suffix = trimmed[split..].trim();

    let value: u64 = digits.parse().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid size")
            .with_hint("Use bytes or K/M/G (e.g. 256K).")
            .with_source(err)
    })?;

    let multiplier = match suffix {
        "" => 1,
        "K" | "k" => 1024,
        "M" | "m" => 1024 * 1024,
        "G" | "g" => 1024 * 1024 * 1024,
        _ => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("invalid size suffix")
                .with_hint("Use K/M/G (e.g. 256K)."));
        }
    };

    value.checked_mul(multiplier).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("size overflow")
            .with_hint("Use a smaller size value.")
    })
}

fn format_bytes(value: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;
    if value < KIB {
        return format!("{value}B");
    }
    let (unit, suffix) = if value >= GIB {
        (GIB, "G")
    } else if value >= MIB {
        (MIB, "M")
    } else {
        (KIB, "K")
    };
    if value.is_multiple_of(unit) {
        return format!("{}{}", value / unit, suffix);
    }
    format!("{:.1}{}", (value as f64) / (unit as f64), suffix)
}

fn add_format_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Format || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Not a well-formed DIALS reflection table (or sidecar). Check the file, or try --relaxed-keys.",
    )
}

fn add_stale_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::StaleIndex || err.hint().is_some() {
        return err;
    }
    err.with_hint("The source changed since indexing. Rebuild with `refl-index build <file>`.")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint("Permission denied. Check file and directory permissions."),
        ErrorKind::Busy => {
            err.with_hint("Source is locked by another process. Retry once it finishes writing.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and whether the file was truncated."),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("refl-index {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "refl-index",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    let cleaned_rows = rows
        .iter()
        .map(|row| {
            widths
                .iter_mut()
                .enumerate()
                .map(|(idx, width)| {
                    let cell = row.get(idx).map(String::as_str).unwrap_or("");
                    let cleaned = cell.replace('\n', "\\n").replace('\r', "\\r");
                    *width = (*width).max(cleaned.chars().count());
                    cleaned
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    std::iter::once(&header_cells)
        .chain(cleaned_rows.iter())
        .map(|cells| format_table_line(cells, &widths))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len && idx + 1 < widths.len() {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Format => "malformed input".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Range => "row range out of bounds".to_string(),
        ErrorKind::StaleIndex => "index is stale".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_body(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    if let Some(expected) = err.expected() {
        inner.insert("expected".to_string(), json!(expected));
    }
    if let Some(found) = err.found() {
        inner.insert("found".to_string(), json!(found));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    Value::Object(inner)
}

fn error_json(err: &Error) -> Value {
    json!({ "error": error_body(err) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    let label = |name: &str| colorize_label(name, use_color, AnsiColor::Yellow);
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint:")));
    }
    if let Some(path) = err.path() {
        lines.push(format!("{} {}", label("path:"), path.display()));
    }
    if let Some(column) = err.column() {
        lines.push(format!("{} {column}", label("column:")));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("{} {offset}", label("offset:")));
    }
    if let Some(expected) = err.expected() {
        lines.push(format!("{} {expected}", label("expected:")));
    }
    if let Some(found) = err.found() {
        lines.push(format!("{} {found}", label("found:")));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", label("caused by:")));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `refl-index --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "refl-index") else {
        return "Try `refl-index --help`.".to_string();
    };
    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return "Try `refl-index --help`.".to_string();
    }
    format!("Try `refl-index {} --help`.", parts.join(" "))
}
