//! The `analyze` subcommand.

use std::sync::Arc;

use clap::Args;
use futures::{StreamExt as _, stream};
use leaky_bucket::RateLimiter;
use tokio_util::sync::CancellationToken;

use super::{OutputFormat, PollOpts, ServiceOpts, write_output};
use crate::{
    analyze::{AnalyzeClient, AnalyzeRequest, result::AnalyzeResult},
    lro::{LroError, PollingPolicy, Poller},
    prelude::*,
    rate_limit::SubmitRate,
    report::LayoutReport,
    ui::Ui,
};

/// Analyze command line arguments.
#[derive(Args, Debug)]
pub struct AnalyzeOpts {
    /// Documents to analyze: URLs or local file paths.
    #[clap(value_name = "SOURCE", required = true)]
    sources: Vec<String>,

    /// The model to run.
    #[clap(long, default_value = "prebuilt-layout")]
    model: String,

    /// Output format. JSON output is one object per source, one per line.
    #[clap(long, value_enum, default_value_t = OutputFormat::default())]
    format: OutputFormat,

    /// Max number of documents to process at a time. Defaults to the number
    /// of CPUs.
    #[clap(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// A rate limit for submissions, in requests per second (e.g. "10" or
    /// "0.5").
    #[clap(long)]
    rate_limit: Option<SubmitRate>,

    /// The output path to write results to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    service: ServiceOpts,

    #[clap(flatten)]
    poll: PollOpts,
}

/// The `analyze` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_analyze(ui: Ui, opts: &AnalyzeOpts) -> Result<()> {
    let config = opts.service.to_config()?;
    let policy = opts.poll.to_policy()?;
    let poller = Arc::new(Poller::new(AnalyzeClient::new(config)?));
    let limiter = opts.rate_limit.map(|rate| Arc::new(rate.to_limiter()));
    let jobs = opts.jobs.unwrap_or_else(num_cpus::get).max(1);

    // Ctrl-C abandons all outstanding waits. The remote operations keep
    // running.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, abandoning outstanding waits");
                cancel.cancel();
            }
        });
    }

    // Each source gets its own submit-and-wait loop, with up to `jobs` of
    // them in flight at once. Operations share nothing, so this fans out
    // cleanly; we carry the index along to restore input order at the end.
    let mut outcomes = stream::iter(opts.sources.iter().cloned().enumerate())
        .map(|(index, source)| {
            let poller = poller.clone();
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let policy = policy.clone();
            let model = opts.model.clone();
            let ui = ui.clone();
            async move {
                let result = analyze_one(
                    &poller,
                    limiter.as_deref(),
                    &cancel,
                    &model,
                    &policy,
                    &ui,
                    &source,
                )
                .await;
                (index, source, result)
            }
        })
        .buffer_unordered(jobs)
        .collect::<Vec<_>>()
        .await;
    outcomes.sort_by_key(|(index, _, _)| *index);

    // Render in input order, counting failures as we go.
    let mut out = String::new();
    let mut failures = 0;
    let multiple = opts.sources.len() > 1;
    for (_, source, result) in outcomes {
        match result {
            Ok(result) => match opts.format {
                OutputFormat::Text => {
                    if multiple {
                        out.push_str(&format!("== {source}\n"));
                    }
                    out.push_str(&LayoutReport::render(&result));
                    if multiple {
                        out.push('\n');
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&result)
                        .context("failed to serialize result")?;
                    out.push_str(&json);
                    out.push('\n');
                }
            },
            Err(err) => {
                failures += 1;
                error!("{source}: {err:#}");
            }
        }
    }
    write_output(opts.output_path.as_deref(), &out).await?;

    if failures > 0 {
        Err(anyhow!(
            "{failures} of {} documents failed",
            opts.sources.len()
        ))
    } else {
        Ok(())
    }
}

/// Submit one document and wait for its result.
#[instrument(level = "debug", skip_all, fields(source = %source))]
async fn analyze_one(
    poller: &Poller<AnalyzeClient>,
    limiter: Option<&RateLimiter>,
    cancel: &CancellationToken,
    model: &str,
    policy: &PollingPolicy,
    ui: &Ui,
    source: &str,
) -> Result<AnalyzeResult> {
    if let Some(limiter) = limiter {
        limiter.acquire_one().await;
    }

    let request = build_request(model, source).await?;
    let spinner = ui.new_operation_spinner(source);
    let mut operation = poller
        .submit(&request)
        .await
        .with_context(|| format!("failed to submit {source}"))?;
    spinner.set_message(format!("{source} ({})", operation.id()));

    let outcome = poller.wait_until_done(&mut operation, policy, cancel).await;
    match &outcome {
        Ok(_) => spinner.finish_with_message(format!("analyzed {source}")),
        Err(LroError::Timeout { .. }) => spinner.finish_with_message(format!(
            "{source}: still running remotely; resume with `status {}`",
            operation.handle().status_url
        )),
        Err(_) => spinner.finish_with_message(format!("{source}: failed")),
    }
    Ok(outcome?)
}

/// Build a request for a source, treating anything that parses as an HTTP
/// URL as remote and everything else as a local path.
async fn build_request(model: &str, source: &str) -> Result<AnalyzeRequest> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(AnalyzeRequest::from_url(model, source))
    } else {
        AnalyzeRequest::from_file(model, Path::new(source)).await
    }
}
