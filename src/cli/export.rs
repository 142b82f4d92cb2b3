use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Parser;
use tracing::{instrument, warn};
use uanodeset::{export, standard_aliases, storage::xml};

use super::{importer, load_config, read_documents, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Export one model as a canonical nodeset")]
pub struct Export {
    /// Nodeset files to load; dependencies are resolved as for `import`
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Namespace URI of the model to export [default: the first model of the
    /// first file]
    #[arg(long, value_name = "URI")]
    model: Option<String>,

    /// Write the document here instead of to stdout
    #[arg(short, long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Derive every alias instead of starting from the standard set
    #[arg(long)]
    no_standard_aliases: bool,

    /// Additional directories to search for missing nodesets
    #[arg(long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,
}

impl Export {
    #[instrument(level = "debug", skip(self))]
    pub async fn run(self, root: &Path) -> anyhow::Result<()> {
        let config = load_config(root);
        let documents = read_documents(&self.files)?;

        let namespace_uri = match self.model {
            Some(uri) => uri,
            None => default_model(&documents)?,
        };

        let mut importer = importer(root, &config, &self.search_paths);
        let result = importer.import(&documents, false, None).await;
        if result.is_fatal() {
            anyhow::bail!("{}", result.error_message().unwrap_or("import failed"));
        }
        if let Some(message) = result.error_message() {
            warn!("exporting with unresolved dependencies: {message}");
        }

        let catalog = result.catalog();
        let model = catalog
            .model(&namespace_uri)
            .with_context(|| format!("No model {namespace_uri} in the given nodesets"))?;

        let seed = (config.standard_aliases && !self.no_standard_aliases).then(standard_aliases);
        let document = export(model, catalog, seed.as_ref());
        let text = document.to_xml()?;

        match &self.out {
            Some(path) => {
                fs::write(path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!(
                    "{} {namespace_uri} → {}",
                    "Exported".success(),
                    path.display()
                );
            }
            None => print!("{text}"),
        }
        Ok(())
    }
}

/// The first model declared by the first document.
fn default_model(documents: &[String]) -> anyhow::Result<String> {
    let first = documents.first().context("No nodeset files given")?;
    let models = xml::read_header(first).context("Failed to read the first nodeset")?;
    models
        .into_iter()
        .next()
        .map(|model| model.namespace_uri)
        .context("The first nodeset declares no models")
}
