use crate::workspace::Workspace;
use anyhow::{Context, Result};
use clap::Args;
use geonet_conversion::{ConversionOptions, InputFile};
use geonet_protocol::{JsonMap, NewDataset};
use geonet_store::DatasetStore;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Args)]
pub struct ConvertArgs {
    /// Files to ingest
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "uploads")]
    pub category: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Merge every vector source into one collection
    #[arg(long)]
    pub combine: bool,
}

pub async fn convert(workspace: &Workspace, args: ConvertArgs) -> Result<Value> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        files.push(InputFile::new(name, bytes));
    }

    let dataset = workspace.repo.create_dataset(NewDataset {
        project_id: workspace.project,
        name: args.name,
        category: args.category,
        description: args.description,
        metadata: JsonMap::new(),
    })?;
    let options = ConversionOptions {
        combine: args.combine,
        ..ConversionOptions::default()
    };
    let conversion = workspace
        .analytics
        .context()
        .run_conversion(workspace.project, &dataset, files, &options)
        .await?;
    workspace.save().await?;

    if let Some(error) = &conversion.error {
        log::warn!("Conversion {} finished with errors: {error}", conversion.id);
    }
    Ok(json!({
        "dataset": dataset,
        "conversion": conversion,
    }))
}
