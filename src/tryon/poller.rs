use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::tryon::provider::{JobState, ProviderContext, ProviderError, TryOnProvider};

pub const DEFAULT_POLL_BUDGET: Duration = Duration::from_secs(180);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const UNKNOWN_FAILURE_REASON: &str = "Unknown reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub budget: Duration,
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            budget: DEFAULT_POLL_BUDGET,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of a single status request.
#[derive(Debug)]
pub enum PollStep {
    Pending(JobState),
    Completed(Vec<String>),
    /// Provider reported a terminal state other than `completed`.
    Failed { state: String, reason: String },
    /// The request itself failed; the job state is unknown.
    Transient(ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { output: Vec<String>, polls: u32 },
    Failed { reason: String, polls: u32 },
    TimedOut { polls: u32 },
}

pub async fn poll_once(
    provider: &dyn TryOnProvider,
    ctx: &ProviderContext,
    job_id: &str,
) -> PollStep {
    let status = match provider.status(ctx, job_id).await {
        Ok(status) => status,
        Err(error) => return PollStep::Transient(error),
    };
    match status.state() {
        JobState::Completed => PollStep::Completed(status.output.unwrap_or_default()),
        JobState::Other(state) => PollStep::Failed {
            state,
            reason: status
                .error
                .and_then(|e| e.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| String::from(UNKNOWN_FAILURE_REASON)),
        },
        pending => PollStep::Pending(pending),
    }
}

/// Polls `job_id` until it completes, fails, or `deadline` passes.
///
/// Transient request failures keep the loop going; a terminal failure state
/// ends it immediately. Each status request is itself bounded by the
/// deadline, so a slow provider cannot stretch the budget.
pub async fn poll_until_terminal(
    provider: &dyn TryOnProvider,
    ctx: &ProviderContext,
    job_id: &str,
    deadline: Instant,
    interval: Duration,
) -> PollOutcome {
    let mut polls = 0u32;
    while Instant::now() < deadline {
        polls += 1;
        let step = match timeout_at(deadline, poll_once(provider, ctx, job_id)).await {
            Ok(step) => step,
            Err(_elapsed) => break,
        };

        match step {
            PollStep::Completed(output) => {
                info!(job_id, polls, outputs = output.len(), "prediction completed");
                return PollOutcome::Completed { output, polls };
            }
            PollStep::Failed { state, reason } => {
                warn!(job_id, polls, state = %state, reason = %reason, "prediction failed");
                return PollOutcome::Failed { reason, polls };
            }
            PollStep::Pending(state) => {
                debug!(job_id, polls, state = ?state, "prediction pending");
            }
            PollStep::Transient(error) => {
                warn!(job_id, polls, error = %error, "status poll failed, retrying");
            }
        }
        sleep(interval).await;
    }

    warn!(job_id, polls, "maximum polling time exceeded");
    PollOutcome::TimedOut { polls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tryon::payload::ProviderPayload;
    use crate::tryon::provider::{JobError, JobStatus, ProviderEndpoints, SubmitResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use url::Url;

    struct ScriptedStatus {
        script: Mutex<VecDeque<Result<JobStatus, ProviderError>>>,
        calls: Mutex<Vec<Instant>>,
        latency: Duration,
    }

    impl ScriptedStatus {
        fn new(script: Vec<Result<JobStatus, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
                latency: Duration::ZERO,
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl TryOnProvider for ScriptedStatus {
        async fn submit(
            &self,
            _ctx: &ProviderContext,
            _payload: &ProviderPayload,
        ) -> Result<SubmitResponse, ProviderError> {
            unreachable!("poller never submits")
        }

        async fn status(
            &self,
            _ctx: &ProviderContext,
            _job_id: &str,
        ) -> Result<JobStatus, ProviderError> {
            self.calls
                .lock()
                .expect("calls mutex poisoned")
                .push(Instant::now());
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            self.script
                .lock()
                .expect("script mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(status("processing")))
        }
    }

    fn status(state: &str) -> JobStatus {
        JobStatus {
            id: Some(String::from("job-1")),
            status: state.to_string(),
            output: None,
            error: None,
        }
    }

    fn completed(output: &[&str]) -> JobStatus {
        JobStatus {
            output: Some(output.iter().map(|s| s.to_string()).collect()),
            ..status("completed")
        }
    }

    fn ctx() -> ProviderContext {
        ProviderContext {
            endpoints: ProviderEndpoints::new(
                Url::parse("https://provider.invalid/v1").expect("url"),
            ),
            api_key: String::from("test-key"),
        }
    }

    async fn run(provider: &ScriptedStatus) -> PollOutcome {
        let schedule = PollSchedule::default();
        poll_until_terminal(
            provider,
            &ctx(),
            "job-1",
            Instant::now() + schedule.budget,
            schedule.interval,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_pending_states() {
        let provider = ScriptedStatus::new(vec![
            Ok(status("in_queue")),
            Ok(status("processing")),
            Ok(completed(&["a", "b"])),
        ]);
        let started = Instant::now();

        let outcome = run(&provider).await;

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                output: vec![String::from("a"), String::from("b")],
                polls: 3
            }
        );
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], DEFAULT_POLL_INTERVAL);
        assert_eq!(calls[2] - started, DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_does_not_abort_loop() {
        let provider = ScriptedStatus::new(vec![
            Ok(status("starting")),
            Err(ProviderError::Http {
                status: 502,
                detail: String::from("Bad Gateway"),
            }),
            Ok(completed(&["x"])),
        ]);

        let outcome = run(&provider).await;

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                output: vec![String::from("x")],
                polls: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_is_not_retried() {
        let provider = ScriptedStatus::new(vec![
            Ok(status("in_queue")),
            Ok(JobStatus {
                error: Some(JobError {
                    name: Some(String::from("PoseError")),
                    message: Some(String::from("no person detected")),
                }),
                ..status("failed")
            }),
            Ok(completed(&["never"])),
        ]);

        let outcome = run(&provider).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: String::from("no person detected"),
                polls: 2
            }
        );
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_message_uses_placeholder() {
        let provider = ScriptedStatus::new(vec![Ok(status("canceled"))]);
        let outcome = run(&provider).await;
        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: String::from(UNKNOWN_FAILURE_REASON),
                polls: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline_not_before() {
        let provider = ScriptedStatus::new(Vec::new());
        let started = Instant::now();

        let outcome = run(&provider).await;

        assert_eq!(outcome, PollOutcome::TimedOut { polls: 90 });
        let calls = provider.calls();
        assert_eq!(calls.len(), 90);
        let last = *calls.last().expect("at least one poll");
        assert_eq!(last - started, Duration::from_secs(178));
        assert!(started.elapsed() >= DEFAULT_POLL_BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_status_call_cannot_extend_budget() {
        let mut provider = ScriptedStatus::new(Vec::new());
        provider.latency = Duration::from_secs(600);
        let started = Instant::now();

        let outcome = run(&provider).await;

        assert_eq!(outcome, PollOutcome::TimedOut { polls: 1 });
        assert_eq!(started.elapsed(), DEFAULT_POLL_BUDGET);
    }
}
