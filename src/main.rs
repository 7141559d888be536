use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use pyindex::hashes::HashAlgorithm;
use pyindex::simple::DEFAULT_INDEX_URL;

mod commands;

#[derive(Parser)]
#[command(name = "pyindex")]
#[command(about = "Query Python package indexes and evaluate version specifiers", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a project page and list its distribution links
    Fetch {
        /// Project name, canonicalized before the request
        project: String,

        /// Simple index base URL
        #[arg(long, env = "PYINDEX_INDEX_URL", default_value = DEFAULT_INDEX_URL)]
        index_url: String,

        /// Ask for the PEP 691 JSON form first
        #[arg(long)]
        prefer_json: bool,

        /// Only list candidates matching this specifier set, best first
        #[arg(short, long)]
        specifier: Option<String>,

        /// Target Python version for requires-python filtering
        #[arg(long)]
        python: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Evaluate a specifier set against versions
    Check {
        /// Comma-separated specifier set, e.g. "~=1.1.0,!=1.1.3"
        specifier: String,

        /// Versions to test
        versions: Vec<String>,

        /// Accept pre-releases regardless of the specifiers
        #[arg(long)]
        prereleases: bool,

        /// Fail unless this version is accepted
        #[arg(long = "expect-accept", value_name = "VERSION")]
        expect_accept: Vec<String>,

        /// Fail unless this version is rejected
        #[arg(long = "expect-reject", value_name = "VERSION")]
        expect_reject: Vec<String>,
    },
    /// Quote a link URL and show its checksum fragment
    Quote {
        url: String,
    },
    /// Compute the digest of a local file
    Hash {
        file: std::path::PathBuf,

        #[arg(short, long, default_value = "sha256")]
        algorithm: HashAlgorithm,

        /// Fail unless the digest equals this hex value
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_level(true)
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Fetch {
            project,
            index_url,
            prefer_json,
            specifier,
            python,
            format,
        } => {
            commands::fetch::fetch(project, index_url, prefer_json, specifier, python, format)
                .await?
        },
        Commands::Check {
            specifier,
            versions,
            prereleases,
            expect_accept,
            expect_reject,
        } => commands::check::check(specifier, versions, prereleases, expect_accept, expect_reject)?,
        Commands::Quote { url } => commands::quote::quote(url),
        Commands::Hash {
            file,
            algorithm,
            expect,
        } => commands::hash::hash(file, algorithm, expect).await?,
    }

    Ok(())
}
