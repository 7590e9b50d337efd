//! The `status` subcommand.
//!
//! A local timeout leaves the remote operation running. This subcommand
//! queries such an operation again by its status URL, either once or by
//! resuming a full wait.

use clap::Args;
use schemars::JsonSchema;
use tokio_util::sync::CancellationToken;

use super::{OutputFormat, PollOpts, ServiceOpts, write_output};
use crate::{
    analyze::{AnalyzeClient, result::AnalyzeResult},
    lro::{Operation, OperationStatus, Poller, ServiceError},
    prelude::*,
    report::LayoutReport,
    ui::Ui,
};

/// Status command line arguments.
#[derive(Args, Debug)]
pub struct StatusOpts {
    /// The operation's status URL, as reported when a wait timed out.
    #[clap(value_name = "OPERATION_URL")]
    operation_url: String,

    /// Output format.
    #[clap(long, value_enum, default_value_t = OutputFormat::default())]
    format: OutputFormat,

    /// Wait for the operation to finish instead of querying once.
    #[clap(long)]
    wait: bool,

    /// The output path to write to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    service: ServiceOpts,

    #[clap(flatten)]
    poll: PollOpts,
}

/// What `status` prints in JSON mode.
#[derive(Debug, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    /// The operation id.
    pub id: String,

    /// The last observed status.
    pub status: OperationStatus,

    /// Failure detail, once the operation has failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,

    /// The analysis result, once the operation has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalyzeResult>,
}

/// The `status` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_status(ui: Ui, opts: &StatusOpts) -> Result<()> {
    let config = opts.service.to_config()?;
    let client = AnalyzeClient::new(config)?;
    let handle = client.handle_from_status_url(&opts.operation_url);
    let poller = Poller::new(client);
    let mut operation = Operation::new(handle);

    let out = if opts.wait {
        // Resume a full wait, Ctrl-C cancellable like `analyze`.
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
        }
        let spinner = ui.new_operation_spinner(operation.id());
        let result = poller
            .wait_until_done(&mut operation, &opts.poll.to_policy()?, &cancel)
            .await;
        spinner.finish_with_message(format!(
            "operation {}: {}",
            operation.id(),
            operation.status()
        ));
        render_result(opts.format, operation.id(), result?)?
    } else {
        let updated = poller.poll(&operation).await?;
        render_snapshot(opts.format, &updated)?
    };
    write_output(opts.output_path.as_deref(), &out).await
}

/// Render a completed result.
fn render_result(
    format: OutputFormat,
    id: &str,
    result: AnalyzeResult,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(LayoutReport::render(&result)),
        OutputFormat::Json => {
            let record = StatusRecord {
                id: id.to_owned(),
                status: OperationStatus::Succeeded,
                error: None,
                result: Some(result),
            };
            let mut json = serde_json::to_string_pretty(&record)
                .context("failed to serialize status")?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Render a one-shot status snapshot, terminal or not.
fn render_snapshot(
    format: OutputFormat,
    operation: &Operation<AnalyzeResult>,
) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out =
                format!("operation {}: {}\n", operation.id(), operation.status());
            if let Some(error) = operation.error() {
                out.push_str(&format!("  error: {error}\n"));
            }
            if let Some(result) = operation.result() {
                out.push('\n');
                out.push_str(&LayoutReport::render(result));
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let record = StatusRecord {
                id: operation.id().to_owned(),
                status: operation.status(),
                error: operation.error().cloned(),
                result: operation.result().cloned(),
            };
            let mut json = serde_json::to_string_pretty(&record)
                .context("failed to serialize status")?;
            json.push('\n');
            Ok(json)
        }
    }
}
