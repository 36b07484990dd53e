use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use codescout::analysis::{AnalysisResult, Indentation, IssueContext};
use codescout::{
    AnalysisCache, AnalysisContext, Analyzer, AnalyzerConfig, CacheNamespace, IssueData,
};

#[derive(Parser)]
#[command(name = "codescout")]
#[command(about = "Project structure, language and convention analysis")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project directory
    Analyze {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Skip both cache tiers
        #[arg(long)]
        no_cache: bool,
        /// Abort after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Analyze a project and relate it to an issue
    Issue {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        number: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Manage the shared analysis cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached analysis
    Clear,
    /// Remove expired entries
    Cleanup,
    /// Drop the cached analysis for one project
    Invalidate {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Print the cache directory
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "codescout=debug" } else { "codescout=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::load_or_default()?,
    };

    match cli.command {
        Commands::Analyze {
            path,
            json,
            no_cache,
            timeout,
        } => {
            if no_cache {
                config = config.without_cache();
            }
            config.project_root = path.clone();
            let ctx = match timeout {
                Some(secs) => AnalysisContext::with_timeout(Duration::from_secs(secs)),
                None => AnalysisContext::new(),
            };

            let analyzer = Analyzer::new(config)?;
            let result = analyzer
                .analyze_project(&ctx, &path)
                .await
                .with_context(|| format!("Failed to analyze {}", path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
        }
        Commands::Issue {
            path,
            title,
            body,
            labels,
            number,
            json,
        } => {
            config.project_root = path.clone();
            let issue = IssueData {
                number,
                title,
                body,
                labels,
            };

            let analyzer = Analyzer::new(config)?;
            let analysis = analyzer
                .analyze_for_issue(&AnalysisContext::new(), &path, &issue)
                .await
                .with_context(|| format!("Failed to analyze {}", path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis.result)?);
            } else {
                print_summary(&analysis.result);
                if let Some(issue_context) = &analysis.result.issue_context {
                    print_issue(issue_context);
                }
            }
            if let Some(e) = analysis.enrichment_error {
                eprintln!("{}: {}", "Warning".yellow().bold(), e);
            }
        }
        Commands::Cache { action } => run_cache_action(&config, action)?,
    }

    Ok(())
}

/// Cache subcommands run in a fresh process, so they target the shared
/// namespace. Its directory is the parent of every `proc-<pid>` directory,
/// and `cleanup` sweeps those too.
fn run_cache_action(config: &AnalyzerConfig, action: CacheAction) -> Result<()> {
    let mut cache_config = config.cache.clone();
    cache_config.namespace = CacheNamespace::Shared;
    let cache = AnalysisCache::new(&cache_config);

    match action {
        CacheAction::Clear => {
            cache.clear();
            println!("{} {}", "Cleared".green(), cache.directory().display());
        }
        CacheAction::Cleanup => {
            let removed = cache.cleanup_expired();
            println!("Removed {} expired entries", removed.to_string().green());
        }
        CacheAction::Invalidate { path } => {
            let root = absolute(&path)?;
            cache.invalidate(&root);
            println!("Invalidated cache for {}", root.display().to_string().blue());
        }
        CacheAction::Path => println!("{}", cache.directory().display()),
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

fn print_summary(result: &AnalysisResult) {
    let info = &result.project_info;
    println!(
        "{} {}",
        info.name.green().bold(),
        info.version.as_deref().unwrap_or("").dimmed()
    );
    println!("Type: {}", format!("{:?}", info.project_type).blue());
    if let Some(build_system) = &info.build_system {
        println!("Build system: {}", build_system);
    }
    if !info.entry_points.is_empty() {
        println!("Entry points: {}", info.entry_points.join(", "));
    }

    if !result.languages.is_empty() {
        println!("\n{}", "Languages".bold());
        for language in &result.languages {
            println!(
                "  {:<16} {:>6} files {:>8} lines {:>6.2}%",
                language.name, language.file_count, language.line_count, language.percentage
            );
        }
    }

    if !result.frameworks.is_empty() {
        println!("\n{}", "Frameworks".bold());
        for framework in &result.frameworks {
            println!(
                "  {} {} ({:.0}%)",
                framework.name,
                framework.version.as_deref().unwrap_or(""),
                framework.confidence * 100.0
            );
        }
    }

    let deps = &result.dependencies;
    if !deps.dependencies.is_empty() {
        println!(
            "\n{} {} direct, {} dev ({})",
            "Dependencies:".bold(),
            deps.direct().count(),
            deps.dev().count(),
            deps.package_managers.join(", ")
        );
    }

    let structure = &result.file_structure;
    println!(
        "\n{} {} files, {} dirs, depth {}{}",
        "Structure:".bold(),
        structure.total_files,
        structure.total_dirs,
        structure.max_depth,
        if structure.truncated { " (truncated)" } else { "" }
    );

    let indentation = match result.conventions.indentation {
        Indentation::Tabs => "tabs".to_string(),
        Indentation::Spaces(width) => format!("{} spaces", width),
        Indentation::Mixed => "mixed".to_string(),
        Indentation::Unknown => "unknown".to_string(),
    };
    println!("{} {}", "Indentation:".bold(), indentation);

    if let Some(code_context) = &result.code_context {
        println!("\n{}", code_context.summary);
    }

    if result.degraded {
        println!("\n{}", "Some analysis phases failed:".yellow().bold());
        for record in &result.phase_errors {
            println!("  {}: {}", record.phase.to_string().yellow(), record.message);
        }
    }
    println!("\n{}", format!("Analyzed in {} ms", result.duration_ms).dimmed());
}

fn print_issue(issue: &IssueContext) {
    println!("\n{} {:?}", "Issue kind:".bold(), issue.kind);
    if !issue.keywords.is_empty() {
        println!("Keywords: {}", issue.keywords.join(", "));
    }
    for file in &issue.mentioned_files {
        println!("  {} {}", "mentioned".cyan(), file);
    }
    for file in &issue.relevant_files {
        println!("  {} {}", "relevant".blue(), file);
    }
}
