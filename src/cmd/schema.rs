//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use super::write_output;
use crate::{
    analyze::result::AnalyzeResult, cmd::status::StatusRecord, prelude::*,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// A complete layout-analysis result.
    AnalyzeResult,
    /// The record printed by `status --format json`.
    StatusRecord,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::AnalyzeResult => schema_for!(AnalyzeResult),
        SchemaType::StatusRecord => schema_for!(StatusRecord),
    };
    let mut schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    schema_str.push('\n');
    write_output(schema_opts.output_path.as_deref(), &schema_str).await
}
