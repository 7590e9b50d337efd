//! Pacing submissions to stay under service throttles.

use std::{fmt, str::FromStr, time::Duration};

use leaky_bucket::RateLimiter;

use crate::prelude::*;

/// A cap on how many submissions we start per second.
///
/// Fractional rates are allowed: `0.25` means one submission every four
/// seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubmitRate {
    /// Submissions allowed per second.
    per_second: f64,
}

impl SubmitRate {
    /// Create a new rate. Fails for rates that are zero, negative, or not
    /// finite.
    pub fn new(per_second: f64) -> Result<Self> {
        if !per_second.is_finite() || per_second <= 0.0 {
            return Err(anyhow!("rate limit must be a positive number"));
        }
        Ok(Self { per_second })
    }

    /// Build the shared [`RateLimiter`] enforcing this rate.
    ///
    /// The bucket starts full, so a burst of up to one second's allowance
    /// goes out immediately.
    pub fn to_limiter(&self) -> RateLimiter {
        if self.per_second >= 1.0 {
            let tokens = self.per_second.round() as usize;
            RateLimiter::builder()
                .initial(tokens)
                .refill(tokens)
                .max(tokens)
                .interval(Duration::from_secs(1))
                .build()
        } else {
            // Below one request per second, refill a single token on a
            // stretched interval instead.
            RateLimiter::builder()
                .initial(1)
                .refill(1)
                .max(1)
                .interval(Duration::from_secs_f64(1.0 / self.per_second))
                .build()
        }
    }
}

impl fmt::Display for SubmitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/s", self.per_second)
    }
}

impl FromStr for SubmitRate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let number = s
            .parse::<f64>()
            .with_context(|| format!("failed to parse rate limit: {:?}", s))?;
        SubmitRate::new(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(SubmitRate::from_str("10").unwrap(), SubmitRate::new(10.0).unwrap());
        assert_eq!(
            SubmitRate::from_str("0.25").unwrap(),
            SubmitRate::new(0.25).unwrap()
        );
    }

    #[test]
    fn test_failed_parse() {
        assert!(SubmitRate::from_str("fast").is_err());
        assert!(SubmitRate::from_str("0").is_err());
        assert!(SubmitRate::from_str("-2").is_err());
        assert!(SubmitRate::from_str("NaN").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SubmitRate::new(10.0).unwrap().to_string(), "10/s");
        assert_eq!(SubmitRate::new(0.5).unwrap().to_string(), "0.5/s");
    }
}
