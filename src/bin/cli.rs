//! codeloom-cli: a thin command-line exerciser over [`codeloom::Engine`].
//!
//! Not the tool-dispatch surface `spec.md` §1 places out of scope - a
//! debugging/demo binary, grounded in the teacher's `julie-extract`/
//! `julie-semantic` standalone CLIs (one subcommand per operation,
//! `clap` derive, JSON to stdout).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeloom::engine::{Engine, FileContentArgs, SearchArgs, SymbolBodyArgs};
use codeloom::search::QueryType;
use codeloom::Config;

#[derive(Parser)]
#[command(name = "codeloom-cli")]
#[command(about = "Workspace-scoped code index and safe-edit engine (CLI exerciser)")]
#[command(version)]
struct Cli {
    /// Project root to index. Every subcommand implicitly calls
    /// `set_project_path` against it first.
    #[arg(short, long)]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the index and print file/symbol counts.
    Index,
    /// Run an incremental refresh against the current on-disk state.
    Refresh,
    /// Drop and reparse every file.
    Rebuild,
    /// Search the index.
    Search {
        pattern: String,
        #[arg(long, value_enum, default_value = "text")]
        query_type: QueryTypeArg,
        #[arg(long)]
        file_pattern: Option<String>,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// List files matching a glob pattern.
    FindFiles { pattern: String },
    /// Print a file's indexed summary.
    Summary { path: PathBuf },
    /// Print a file's content, optionally a line range.
    Content {
        path: PathBuf,
        #[arg(long)]
        start_line: Option<u32>,
        #[arg(long)]
        end_line: Option<u32>,
        #[arg(long)]
        line_numbers: bool,
    },
    /// Print a symbol's body lines.
    SymbolBody {
        symbol_name: String,
        #[arg(long)]
        file_path: Option<PathBuf>,
    },
    /// Apply an atomic single-file edit.
    Edit {
        path: PathBuf,
        old_content: Option<String>,
        new_content: String,
    },
    /// Rename a symbol across every referencing file.
    Rename { old_name: String, new_name: String },
    /// Insert an import/use statement into a file.
    AddImport {
        path: PathBuf,
        import_statement: String,
    },
    /// Find references to a symbol.
    References { symbol_name: String },
    /// Find a symbol's definition.
    Definition { symbol_name: String },
    /// Find a symbol's callers.
    Callers { symbol_name: String },
    /// Find implementations of an interface-like symbol.
    Implementations { symbol_name: String },
    /// Print a symbol plus its immediate callers.
    Hierarchy { symbol_name: String },
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum QueryTypeArg {
    Text,
    Regex,
    Symbol,
}

impl From<QueryTypeArg> for QueryType {
    fn from(value: QueryTypeArg) -> Self {
        match value {
            QueryTypeArg::Text => QueryType::Text,
            QueryTypeArg::Regex => QueryType::Regex,
            QueryTypeArg::Symbol => QueryType::Symbol,
        }
    }
}

fn main() -> Result<()> {
    let _logging_guard = codeloom::logging::init(&std::env::current_dir()?).ok();
    let cli = Cli::parse();

    let engine = Engine::new(Config::from_env());
    let indexed = engine
        .set_project_path(&cli.project)
        .with_context(|| format!("failed to index {}", cli.project.display()))?;
    tracing::info!(
        files = indexed.files_indexed,
        symbols = indexed.symbols_indexed,
        "project indexed"
    );

    match cli.command {
        Commands::Index => {
            print_json(&indexed)?;
        }
        Commands::Refresh => {
            let result = engine.refresh_index()?;
            print_json(&result)?;
        }
        Commands::Rebuild => {
            let result = engine.full_rebuild_index()?;
            print_json(&result)?;
        }
        Commands::Search {
            pattern,
            query_type,
            file_pattern,
            case_sensitive,
            limit,
        } => {
            let result = engine.search_code(SearchArgs {
                pattern,
                query_type: Some(query_type.into()),
                file_pattern,
                case_sensitive: Some(case_sensitive),
                limit: Some(limit),
            })?;
            print_json(&result)?;
        }
        Commands::FindFiles { pattern } => {
            let result = engine.find_files(&pattern)?;
            print_json(&result)?;
        }
        Commands::Summary { path } => {
            let result = engine.get_file_summary(&path)?;
            print_json(&result)?;
        }
        Commands::Content {
            path,
            start_line,
            end_line,
            line_numbers,
        } => {
            let result = engine.get_file_content(FileContentArgs {
                path,
                start_line,
                end_line,
                line_numbers: Some(line_numbers),
            })?;
            print_json(&result)?;
        }
        Commands::SymbolBody {
            symbol_name,
            file_path,
        } => {
            let result = engine.get_symbol_body(SymbolBodyArgs {
                symbol_name,
                file_path,
                language: None,
            })?;
            print_json(&result)?;
        }
        Commands::Edit {
            path,
            old_content,
            new_content,
        } => {
            let result = engine.apply_edit(&path, old_content.as_deref(), &new_content)?;
            print_json(&result)?;
        }
        Commands::Rename { old_name, new_name } => {
            let result = engine.rename_symbol(&old_name, &new_name)?;
            print_json(&result)?;
        }
        Commands::AddImport {
            path,
            import_statement,
        } => {
            let result = engine.add_import(&path, &import_statement)?;
            print_json(&result)?;
        }
        Commands::References { symbol_name } => {
            let hits = engine.find_by_symbol(QueryType::References, &symbol_name)?;
            print_json(&hits)?;
        }
        Commands::Definition { symbol_name } => {
            let hits = engine.find_by_symbol(QueryType::Definition, &symbol_name)?;
            print_json(&hits)?;
        }
        Commands::Callers { symbol_name } => {
            let hits = engine.find_by_symbol(QueryType::Callers, &symbol_name)?;
            print_json(&hits)?;
        }
        Commands::Implementations { symbol_name } => {
            let hits = engine.find_by_symbol(QueryType::Implementations, &symbol_name)?;
            print_json(&hits)?;
        }
        Commands::Hierarchy { symbol_name } => {
            let hits = engine.find_by_symbol(QueryType::Hierarchy, &symbol_name)?;
            print_json(&hits)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
