//! Retry policy around a [`TextGenerator`] call.
//!
//! | error            | action                                          |
//! |------------------|-------------------------------------------------|
//! | `Authentication` | stop the run ([`AppError::CredentialError`])    |
//! | `RateLimited`    | sleep `rate_limit_backoff`, try again           |
//! | `Service`        | sleep `transient_backoff`, try again            |
//! | `Unknown`        | log it, give up on this request (`Ok(None)`)    |
//!
//! With `max_attempts` set, exhausting the attempts also gives up with `Ok(None)`.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;
use crate::text_generation::{GenerationError, TextGenerator};

const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(300);
const DEFAULT_TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);

/// Blocking wait, swapped out in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the service answers.
    pub max_attempts: Option<u32>,
    pub rate_limit_backoff: Duration,
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            transient_backoff: DEFAULT_TRANSIENT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Runs one generation request under this policy.
    pub fn call(
        &self,
        generator: &dyn TextGenerator,
        sleeper: &dyn Sleeper,
        system_role: &str,
        user_content: &str,
    ) -> Result<Option<String>, AppError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let wait = match generator.generate(system_role, user_content) {
                Ok(text) => return Ok(Some(text)),
                Err(GenerationError::Authentication(detail)) => {
                    return Err(AppError::CredentialError(detail));
                }
                Err(GenerationError::Unknown(detail)) => {
                    warn!(attempt, %detail, "generation failed, skipping this request");
                    return Ok(None);
                }
                Err(GenerationError::RateLimited(detail)) => {
                    info!(
                        attempt,
                        %detail,
                        wait_secs = self.rate_limit_backoff.as_secs(),
                        "rate limited, waiting before retry"
                    );
                    self.rate_limit_backoff
                }
                Err(GenerationError::Service(detail)) => {
                    info!(
                        attempt,
                        %detail,
                        wait_secs = self.transient_backoff.as_secs(),
                        "service unavailable, waiting before retry"
                    );
                    self.transient_backoff
                }
            };

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                warn!(attempt, "retry attempts exhausted, skipping this request");
                return Ok(None);
            }
            sleeper.sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSleeper, ScriptedGenerator};

    fn policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn rate_limit_waits_then_succeeds() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::RateLimited("429".into())),
            Err(GenerationError::Service("503".into())),
            Ok("done".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let answer = policy(None)
            .call(&generator, &sleeper, "role", "content")
            .expect("no fatal error");
        assert_eq!(answer.as_deref(), Some("done"));
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(300), Duration::from_secs(5)]
        );
        assert_eq!(generator.call_count(), 3);
    }

    #[test]
    fn authentication_failure_stops_the_run() {
        let generator =
            ScriptedGenerator::new(vec![Err(GenerationError::Authentication("401".into()))]);
        let sleeper = RecordingSleeper::default();
        let err = policy(None)
            .call(&generator, &sleeper, "role", "content")
            .unwrap_err();
        assert!(matches!(err, AppError::CredentialError(_)));
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn unknown_failure_gives_no_result() {
        let generator = ScriptedGenerator::new(vec![Err(GenerationError::Unknown("400".into()))]);
        let sleeper = RecordingSleeper::default();
        let answer = policy(None)
            .call(&generator, &sleeper, "role", "content")
            .expect("no fatal error");
        assert_eq!(answer, None);
        assert_eq!(generator.call_count(), 1);
    }

    #[test]
    fn bounded_policy_gives_up_after_max_attempts() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Service("a".into())),
            Err(GenerationError::Service("b".into())),
            Ok("too late".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let answer = policy(Some(2))
            .call(&generator, &sleeper, "role", "content")
            .expect("no fatal error");
        assert_eq!(answer, None);
        assert_eq!(generator.call_count(), 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5)]);
    }
}
