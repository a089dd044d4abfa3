use crate::workspace::Workspace;
use anyhow::{Context, Result};
use clap::Subcommand;
use geonet_graph::CentralityMeasure;
use geonet_protocol::TaskResult;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum AnalyzeCommand {
    /// Describe every registered analysis type
    List,

    /// JSON Schema of task results and of the centrality measure names
    Schema,

    /// Candidate input values of one type in the current project
    Options {
        /// Type name, e.g. flood_network_failure
        db_value: String,
    },

    /// Run one analysis and wait for its task result
    Run {
        db_value: String,

        /// Inline JSON object of inputs (mutually exclusive with --file)
        #[arg(long, conflicts_with = "file")]
        inputs: Option<String>,

        /// Path to a JSON file of inputs
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub async fn run(workspace: &Workspace, command: AnalyzeCommand) -> Result<Value> {
    match command {
        AnalyzeCommand::List => Ok(json!(workspace.analytics.describe())),
        AnalyzeCommand::Schema => Ok(json!({
            "task_result": schemars::schema_for!(TaskResult),
            "centrality_measure": schemars::schema_for!(CentralityMeasure),
        })),
        AnalyzeCommand::Options { db_value } => Ok(Value::Object(
            workspace
                .analytics
                .input_options(&db_value, workspace.project)?,
        )),
        AnalyzeCommand::Run {
            db_value,
            inputs,
            file,
        } => {
            let raw = match (inputs, file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => "{}".to_string(),
            };
            let inputs: Value =
                serde_json::from_str(&raw).context("Invalid JSON passed to --inputs/--file")?;

            let scheduled = workspace
                .analytics
                .run(&db_value, workspace.project, inputs)?;
            log::info!("Waiting for task {}", scheduled.id());
            let result = scheduled.wait().await?;
            workspace.save().await?;
            if let Some(error) = &result.error {
                log::warn!("Task {} finished with errors: {error}", result.id);
            }
            Ok(json!(result))
        }
    }
}
