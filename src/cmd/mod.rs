//! Command-line entry points.

use std::{fmt, time::Duration};

use clap::{Args, ValueEnum};
use tokio::io::AsyncWriteExt as _;

use crate::{config::ServiceConfig, lro::PollingPolicy, prelude::*};

pub mod analyze;
pub mod schema;
pub mod status;

/// Common options identifying the remote service.
#[derive(Args, Clone)]
pub struct ServiceOpts {
    /// Base URL of the Document Intelligence service. Defaults to
    /// $DOCINTEL_ENDPOINT.
    #[clap(long)]
    endpoint: Option<String>,

    /// API key for the service. Defaults to $DOCINTEL_KEY. Prefer the
    /// environment variable, which keeps the key out of shell history.
    #[clap(long)]
    key: Option<String>,
}

// Hand-written so `--key` values never land in logs, which print parsed
// options at debug level.
impl fmt::Debug for ServiceOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOpts")
            .field("endpoint", &self.endpoint)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ServiceOpts {
    /// Build the service configuration, falling back to the environment.
    pub fn to_config(&self) -> Result<ServiceConfig> {
        ServiceConfig::from_env_or(self.endpoint.clone(), self.key.clone())
    }
}

/// Common options controlling how we wait for remote operations.
#[derive(Args, Clone, Debug)]
pub struct PollOpts {
    /// Seconds to wait before the first status query.
    #[clap(long, default_value = "1")]
    poll_initial_delay: f64,

    /// Multiplier applied to the poll delay after each non-terminal status
    /// query.
    #[clap(long, default_value = "1.5")]
    backoff_multiplier: f64,

    /// Upper bound, in seconds, on the delay between status queries.
    #[clap(long, default_value = "10")]
    poll_max_delay: f64,

    /// Give up waiting after this many seconds. The remote operation keeps
    /// running, and the `status` subcommand can pick it up later.
    #[clap(long, default_value = "300")]
    timeout: f64,

    /// How many consecutive transient transport failures to tolerate while
    /// polling. Unbounded by default.
    #[clap(long)]
    retry_budget: Option<u32>,
}

impl PollOpts {
    /// Convert to a [`PollingPolicy`].
    pub fn to_policy(&self) -> Result<PollingPolicy> {
        for (name, value) in [
            ("--poll-initial-delay", self.poll_initial_delay),
            ("--poll-max-delay", self.poll_max_delay),
            ("--timeout", self.timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{} must be a non-negative number", name));
            }
        }
        Ok(PollingPolicy {
            initial_delay: Duration::from_secs_f64(self.poll_initial_delay),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_secs_f64(self.poll_max_delay),
            max_total_wait: Duration::from_secs_f64(self.timeout),
            retry_budget: self.retry_budget,
        })
    }
}

/// Output formats for analysis results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum OutputFormat {
    /// A human-readable layout report.
    #[default]
    Text,

    /// The full typed result as JSON.
    Json,
}

/// Write output text to a path, or to standard output.
pub async fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(text.as_bytes())
                .await
                .context("failed to write output")?;
            stdout.flush().await.context("failed to flush output")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_opts_convert_to_a_policy() {
        let opts = PollOpts {
            poll_initial_delay: 0.5,
            backoff_multiplier: 2.0,
            poll_max_delay: 8.0,
            timeout: 120.0,
            retry_budget: Some(3),
        };
        let policy = opts.to_policy().unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(8));
        assert_eq!(policy.max_total_wait, Duration::from_secs(120));
        assert_eq!(policy.retry_budget, Some(3));
    }

    #[test]
    fn service_opts_debug_output_redacts_the_key() {
        let opts = ServiceOpts {
            endpoint: Some("https://example.test".to_owned()),
            key: Some("very-secret-key".to_owned()),
        };
        let debugged = format!("{:?}", opts);
        assert!(!debugged.contains("very-secret-key"));
    }

    #[test]
    fn nonsense_poll_opts_are_rejected() {
        let opts = PollOpts {
            poll_initial_delay: -1.0,
            backoff_multiplier: 1.5,
            poll_max_delay: 10.0,
            timeout: 300.0,
            retry_budget: None,
        };
        assert!(opts.to_policy().is_err());
    }
}
