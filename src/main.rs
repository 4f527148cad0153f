// Declare the modules we've created
mod config;
mod display;
mod error;
mod file_resolver;
mod function_extractor;
mod indent;
mod pipeline;
mod reformat;
mod repair;
mod retry;
mod session;
mod summarizer;
mod symbol_extractor;
mod syntax_check;
mod synthesizer;
mod text_generation;
mod types;

#[cfg(test)]
mod test_support;

use clap::Parser;
use std::collections::BTreeSet; // For unique canonical paths
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Overrides};
use display::DisplayManager;
use error::AppError;
use file_resolver::WatchFolders;
use retry::ThreadSleeper;
use session::{AnnotateOptions, DocstringStyle, Session, Strategy};
use text_generation::OpenAiGenerator;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::{InputResolution, ResolvedFile};

use arboard::Clipboard;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[clap(
    version,
    about = "Writes docstrings into Python code with an LLM and repairs what it breaks.",
    long_about = "Asks an OpenAI-compatible service for a docstring for every function, \
                  inserts it below the function header, comments out any line that no \
                  longer parses, and prepends a summary comment for the whole file. \
                  Without -f or --clipboard, files dropped into the push folder are \
                  processed continuously."
)]
struct Cli {
    /// Python files, folders or glob patterns to annotate in place.
    /// The original of each file is kept beside it as `_<name>`.
    #[arg(short = 'f', long = "file", num_args = 1.., conflicts_with = "clipboard")]
    files: Vec<String>,

    /// Folder watched for dropped files.
    #[arg(short = 'p', long = "push", default_value = "Push_code_here")]
    push: PathBuf,

    /// Folder receiving an untouched copy of every dropped file.
    #[arg(short = 'o', long = "original", default_value = "Original")]
    original: PathBuf,

    /// Folder receiving the annotated files.
    #[arg(short = 'm', long = "modified", default_value = "Modified")]
    modified: PathBuf,

    /// Process the push folder once instead of watching it.
    #[arg(long)]
    once: bool,

    /// Annotate the code on the clipboard and put the result back.
    #[arg(long)]
    clipboard: bool,

    #[arg(long, value_enum, default_value_t = DocstringStyle::Google)]
    style: DocstringStyle,

    /// Have the service return each function with its docstring instead of
    /// inserting the docstring alone.
    #[arg(long)]
    rewrite: bool,

    /// Do not prepend a summary comment to each file.
    #[arg(long)]
    no_file_summary: bool,

    /// File holding the API key when OPENAI_API_KEY is not set.
    #[arg(long)]
    key_file: Option<PathBuf>,

    #[arg(long)]
    model: Option<String>,

    /// Formatter command run on the code before and after annotation, e.g. "yapf --style=google".
    #[arg(long)]
    reformat: Option<String>,

    #[arg(short, long, help = "Enable verbose output for debugging.")]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "py_autodoc=debug"
    } else {
        "py_autodoc=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), AppError> {
    // A missing .env file is fine; the environment may be set otherwise.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = Overrides {
        key_file: cli.key_file.clone(),
        model: cli.model.clone(),
        reformat_cmd: cli.reformat.clone(),
    };
    let config = Config::new(&overrides)?;
    let display = DisplayManager::new();

    let files = if cli.files.is_empty() {
        Vec::new()
    } else {
        resolve_files(&cli.files, &config, &display)?
    };

    let generator = OpenAiGenerator::new(&config.llm)?;
    generator.verify_credentials()?;
    let reformatter = reformat::from_command(config.reformat_cmd.as_deref());
    let sleeper = ThreadSleeper;
    let options = AnnotateOptions {
        style: cli.style,
        strategy: if cli.rewrite {
            Strategy::Rewrite
        } else {
            Strategy::Insert
        },
        file_summary: !cli.no_file_summary,
    };
    let session = Session::new(&generator, &sleeper, reformatter.as_ref())
        .with_retry(config.retry.clone())
        .with_options(options);

    if cli.clipboard {
        annotate_clipboard(&session, &display)
    } else if !files.is_empty() {
        annotate_files(&files, &config, &session, &display)
    } else {
        let folders = WatchFolders::new(&config, &cli.push, &cli.original, &cli.modified);
        watch(&folders, cli.once, &config, &session, &display)
    }
}

fn resolve_files(
    inputs: &[String],
    config: &Config,
    display: &DisplayManager,
) -> Result<Vec<ResolvedFile>, AppError> {
    let all_resolutions: Vec<InputResolution<'_>> = inputs
        .iter()
        .map(|input_str| file_resolver::resolve_input_string(input_str, config))
        .collect();

    let mut final_ordered_files: Vec<ResolvedFile> = Vec::new();
    let mut seen_canonical_paths: BTreeSet<PathBuf> = BTreeSet::new();

    let mut path_does_not_exist_errors: Vec<&InputResolution<'_>> = Vec::new();
    let mut not_founds: Vec<&InputResolution<'_>> = Vec::new();
    let mut invalid_globs: Vec<&InputResolution<'_>> = Vec::new();

    for resolution in &all_resolutions {
        match resolution {
            InputResolution::Success(resolved_files_for_input) => {
                for resolved_file in resolved_files_for_input {
                    if seen_canonical_paths.insert(resolved_file.canonical_path().to_path_buf()) {
                        final_ordered_files.push(resolved_file.clone());
                    }
                }
            }
            InputResolution::NotFound { .. } => not_founds.push(resolution),
            InputResolution::PathDoesNotExist { .. } => path_does_not_exist_errors.push(resolution),
            InputResolution::InvalidGlobPattern { .. } => invalid_globs.push(resolution),
        }
    }

    if !path_does_not_exist_errors.is_empty() || !not_founds.is_empty() || !invalid_globs.is_empty()
    {
        display
            .print_resolution_errors(
                &path_does_not_exist_errors,
                &not_founds,
                &invalid_globs,
                &final_ordered_files,
            )
            .unwrap_or_else(|e| eprintln!("Display error: {}", e));

        return Err(AppError::ResolutionError {
            input: inputs.join(" "),
            message: "One or more inputs could not be resolved.".to_string(),
        });
    }

    Ok(final_ordered_files)
}

fn annotate_files(
    files: &[ResolvedFile],
    config: &Config,
    session: &Session<'_>,
    display: &DisplayManager,
) -> Result<(), AppError> {
    for file in files {
        let label = file.display_path().to_string_lossy().into_owned();
        info!(file = %label, "annotating");
        match pipeline::comment_file_in_place(session, file.canonical_path(), &label, &config.error_log)
        {
            Ok(result) => display
                .print_file_result(&label, &result)
                .unwrap_or_else(|e| eprintln!("Display error: {}", e)),
            Err(e) if e.is_per_file() => {
                error!(file = %label, error = %e, "annotation failed");
                display
                    .print_file_failure(&label, &e)
                    .unwrap_or_else(|e| eprintln!("Display error: {}", e));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn annotate_clipboard(session: &Session<'_>, display: &DisplayManager) -> Result<(), AppError> {
    let mut clipboard = Clipboard::new()
        .map_err(|e| AppError::IoError(format!("Clipboard unavailable: {}", e)))?;
    let code = clipboard
        .get_text()
        .map_err(|e| AppError::IoError(format!("Clipboard holds no text: {}", e)))?;

    let result = pipeline::comment_snippet(session, &code)?;
    display
        .print_file_result("clipboard", &result)
        .unwrap_or_else(|e| eprintln!("Display error: {}", e));

    match clipboard.set_text(result.text.clone()) {
        Ok(_) => {
            display
                .print_clipboard_status(true, result.text.len(), result.text.lines().count(), None)
                .unwrap_or_else(|e| eprintln!("Display error: {}", e));
        }
        Err(err) => {
            display
                .print_clipboard_status(false, 0, 0, Some(&err.to_string()))
                .unwrap_or_else(|e| eprintln!("Display error: {}", e));
        }
    }
    print!("{}", result.text);
    Ok(())
}

fn watch(
    folders: &WatchFolders,
    once: bool,
    config: &Config,
    session: &Session<'_>,
    display: &DisplayManager,
) -> Result<(), AppError> {
    folders.ensure_exist()?;
    display
        .print_watch_banner(folders, once)
        .unwrap_or_else(|e| eprintln!("Display error: {}", e));

    loop {
        let entries = pipeline::sweep(session, folders, &config.error_log)?;
        display
            .print_sweep(&entries)
            .unwrap_or_else(|e| eprintln!("Display error: {}", e));
        if once {
            return Ok(());
        }
        session.sleeper.sleep(SWEEP_INTERVAL);
    }
}
