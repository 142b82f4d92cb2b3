use std::{
    fs,
    path::{Path, PathBuf},
};

mod export;
mod import;
mod terminal;

use anyhow::Context;
use clap::ArgAction;
use export::Export;
use import::Import;
use tracing::instrument;
use uanodeset::{Config, DirectoryCache, DirectoryResolver, Importer, MemoryCache, NodeSetCache};

/// Directory holding the project configuration.
const CONFIG_DIR: &str = ".nodeset";

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The project root, containing `.nodeset/config.toml`
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(self.root).await
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Write a default configuration to `.nodeset/config.toml`
    Init,

    /// Import nodesets, resolving their dependencies
    ///
    /// Exits with code 2 when dependencies remain missing.
    Import(Import),

    /// Export one model as a canonical nodeset
    Export(Export),
}

impl Command {
    async fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Init => Init::run(&root)?,
            Self::Import(command) => command.run(&root).await?,
            Self::Export(command) => command.run(&root).await?,
        }
        Ok(())
    }
}

struct Init;

impl Init {
    #[instrument]
    fn run(root: &Path) -> anyhow::Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        if config_dir.exists() {
            anyhow::bail!("Project already initialized (found existing {CONFIG_DIR} directory)");
        }

        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {CONFIG_DIR} directory"))?;

        Config::default()
            .save(&config_dir.join("config.toml"))
            .map_err(|e| anyhow::anyhow!("Failed to create config.toml: {e}"))?;

        println!("Initialized nodeset project in {}", root.display());
        println!("  Created: {CONFIG_DIR}/config.toml");
        println!();
        println!("Next steps:");
        println!("  nodeset import <FILES>...");
        println!("  nodeset export <FILES>... --model <URI>");
        Ok(())
    }
}

/// Loads the project configuration, falling back to defaults.
fn load_config(root: &Path) -> Config {
    let path = root.join(CONFIG_DIR).join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

/// Builds an importer from the configuration, resolving relative paths
/// against `root`.
fn importer(
    root: &Path,
    config: &Config,
    extra_search_paths: &[PathBuf],
) -> Importer<Box<dyn NodeSetCache>> {
    let cache: Box<dyn NodeSetCache> = match &config.cache_dir {
        Some(dir) => Box::new(DirectoryCache::new(root.join(dir))),
        None => Box::new(MemoryCache::new()),
    };

    let mut importer = Importer::new(cache).with_allow_augment(config.allow_augment);
    if let Some(tenant) = &config.tenant {
        importer = importer.with_tenant(tenant.clone());
    }

    let search_paths: Vec<PathBuf> = config
        .search_paths
        .iter()
        .map(|path| root.join(path))
        .chain(extra_search_paths.iter().cloned())
        .collect();
    if !search_paths.is_empty() {
        importer = importer.with_resolver(DirectoryResolver::new(search_paths));
    }
    importer
}

/// Reads every input file up front, so that unreadable paths are reported
/// before any import work starts.
fn read_documents(files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    files
        .iter()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}
