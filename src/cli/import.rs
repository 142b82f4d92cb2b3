use std::{
    path::{Path, PathBuf},
    process,
};

use clap::Parser;
use tracing::instrument;
use uanodeset::{ImportResult, Model};

use super::{
    importer, load_config, read_documents,
    terminal::{Colorize, OutputFormat},
};

#[derive(Debug, Parser)]
#[command(about = "Import nodesets and resolve their dependencies")]
pub struct Import {
    /// Nodeset files to import
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Fail if nothing new is imported, and remove newly cached models when
    /// dependencies remain missing
    #[arg(long)]
    strict: bool,

    /// Additional directories to search for missing nodesets
    #[arg(long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

impl Import {
    #[instrument(level = "debug", skip(self))]
    pub async fn run(self, root: &Path) -> anyhow::Result<()> {
        let config = load_config(root);
        let documents = read_documents(&self.files)?;

        let mut importer = importer(root, &config, &self.search_paths);
        let strict = self.strict || config.fail_on_existing;
        let result = importer.import(documents, strict, None).await;

        if result.is_fatal() {
            anyhow::bail!("{}", result.error_message().unwrap_or("import failed"));
        }

        match self.output {
            OutputFormat::Json => output_json(&result)?,
            OutputFormat::Table => output_table(&result),
        }

        if !result.missing_models().is_empty() {
            process::exit(2);
        }
        Ok(())
    }
}

fn output_json(result: &ImportResult) -> anyhow::Result<()> {
    use serde_json::json;

    let models: Vec<_> = result
        .models()
        .iter()
        .map(|model| {
            json!({
                "namespace_uri": model.namespace_uri,
                "version": model.version,
                "publication_date": model.publication_date,
                "nodes": model.node_count(),
                "diagnostics": model.diagnostics,
            })
        })
        .collect();

    let output = json!({
        "models": models,
        "missing": result.missing_models(),
        "cycles": result.catalog().dependency_cycles(),
        "error": result.error_message(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn output_table(result: &ImportResult) {
    println!("{}", "Models (dependency order)".info());
    for model in result.models() {
        print_model(model);
    }

    let missing = result.missing_models();
    if !missing.is_empty() {
        println!();
        println!("{}", "Missing".warning());
        for required in &missing {
            println!("  {} {required}", "✗".warning());
        }
    }

    for cycle in result.catalog().dependency_cycles() {
        println!();
        println!("{} {}", "Cycle:".warning(), cycle.join(" ↔ "));
    }

    if let Some(message) = result.error_message() {
        println!();
        println!("{}", message.warning());
    }
}

fn print_model(model: &Model) {
    let revision = match (&model.version, &model.publication_date) {
        (Some(version), Some(date)) => format!("{version} ({})", date.format("%Y-%m-%d")),
        (Some(version), None) => version.clone(),
        (None, Some(date)) => date.format("%Y-%m-%d").to_string(),
        (None, None) => String::new(),
    };
    println!(
        "  {} {} {} {}",
        "✓".success(),
        model.namespace_uri,
        revision.dim(),
        format!("{} nodes", model.node_count()).dim()
    );
    for diagnostic in &model.diagnostics {
        println!("      {}", diagnostic.warning());
    }
}
