use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::tryon::error::TryOnError;
use crate::tryon::keys::ApiKeyPolicy;
use crate::tryon::normalize::{normalize_or_original, NormalizeOptions};
use crate::tryon::payload::{encode_payload, ProviderPayload};
use crate::tryon::poller::{poll_until_terminal, PollOutcome, PollSchedule};
use crate::tryon::provider::{
    ProviderContext, ProviderEndpoints, ProviderError, SharedTryOnProvider,
};
use crate::tryon::request::{GenerationRequest, ImageSource, TryOnRequestBody};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub endpoints: ProviderEndpoints,
    pub key_policy: ApiKeyPolicy,
    pub schedule: PollSchedule,
    pub normalize: NormalizeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryOnResult {
    pub job_id: String,
    pub output: Vec<String>,
    pub polls: u32,
}

/// Stateless bridge between one inbound request and one provider job.
///
/// Cloning is cheap; clones share the provider client and settings, neither
/// of which is mutated after construction.
#[derive(Clone)]
pub struct TryOnService {
    provider: SharedTryOnProvider,
    settings: Arc<ServiceSettings>,
}

impl TryOnService {
    pub fn new(provider: SharedTryOnProvider, settings: ServiceSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }

    /// Runs the pipeline on its own task. A panic anywhere inside surfaces as
    /// [`TryOnError::Unexpected`]. Dropping the returned future aborts the
    /// task, which stops polling; the provider-side job keeps running.
    pub async fn run_isolated(&self, body: TryOnRequestBody) -> Result<TryOnResult, TryOnError> {
        let service = self.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { service.run(body).await }));
        match (&mut task.0).await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "try-on task failed");
                Err(TryOnError::Unexpected(join_error.to_string()))
            }
        }
    }

    pub async fn run(&self, body: TryOnRequestBody) -> Result<TryOnResult, TryOnError> {
        let submission_id = Uuid::new_v4();
        let span = info_span!("tryon_submission", %submission_id);
        self.execute(body).instrument(span).await
    }

    async fn execute(&self, body: TryOnRequestBody) -> Result<TryOnResult, TryOnError> {
        let resolved = self
            .settings
            .key_policy
            .resolve(body.caller_api_key())
            .ok_or(TryOnError::MissingApiKey)?;
        let request = GenerationRequest::from_body(&body)?;
        drop(body);

        let request = self.normalize_images(request).await?;
        let payload = encode_payload(&request);
        let ctx = ProviderContext {
            endpoints: self.settings.endpoints.clone(),
            api_key: resolved.key,
        };
        info!(
            key_source = resolved.source.as_str(),
            model_name = request.model_variant.as_str(),
            category = request.category.provider_token(),
            num_samples = request.num_samples,
            "submitting try-on job"
        );

        let deadline = Instant::now() + self.settings.schedule.budget;
        let job_id = self.submit(&ctx, &payload, deadline).await?;
        info!(job_id = %job_id, "prediction created");

        let outcome = poll_until_terminal(
            self.provider.as_ref(),
            &ctx,
            job_id.as_str(),
            deadline,
            self.settings.schedule.interval,
        )
        .await;
        resolve_poll_outcome(job_id, outcome)
    }

    async fn normalize_images(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationRequest, TryOnError> {
        if !request.model_image.is_inline() && !request.garment_image.is_inline() {
            return Ok(request);
        }
        let options = self.settings.normalize;
        tokio::task::spawn_blocking(move || {
            let mut request = request;
            request.model_image = normalize_source(request.model_image, options);
            request.garment_image = normalize_source(request.garment_image, options);
            request
        })
        .await
        .map_err(|join_error| {
            error!(error = %join_error, "image normalization task failed");
            TryOnError::Unexpected(format!("image normalization task failed: {join_error}"))
        })
    }

    async fn submit(
        &self,
        ctx: &ProviderContext,
        payload: &ProviderPayload,
        deadline: Instant,
    ) -> Result<String, TryOnError> {
        let response = match timeout_at(deadline, self.provider.submit(ctx, payload)).await {
            Ok(response) => response,
            Err(_elapsed) => {
                warn!("job submission exceeded the polling budget");
                return Err(TryOnError::Timeout {
                    job_id: None,
                    polls: 0,
                });
            }
        };

        let response = response.map_err(map_submit_error)?;
        response
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                error!("provider accepted the job but returned no id");
                TryOnError::MissingJobId
            })
    }
}

fn normalize_source(source: ImageSource, options: NormalizeOptions) -> ImageSource {
    match source {
        ImageSource::Inline(image) => ImageSource::Inline(normalize_or_original(image, options)),
        remote => remote,
    }
}

fn map_submit_error(error: ProviderError) -> TryOnError {
    match error {
        ProviderError::Http { status, detail } if matches!(status, 401 | 403) => {
            warn!(status, detail = %detail, "provider rejected API key");
            TryOnError::InvalidApiKey
        }
        ProviderError::Http { status, detail } => {
            warn!(status, detail = %detail, "provider rejected job");
            TryOnError::SubmissionRejected { status, detail }
        }
        ProviderError::Transport(message) => {
            warn!(error = %message, "provider unreachable");
            TryOnError::ProviderUnreachable(message)
        }
        ProviderError::Decode(message) => {
            error!(error = %message, "provider job response was not valid JSON");
            TryOnError::MissingJobId
        }
        ProviderError::InvalidEndpoint(endpoint) => {
            error!(endpoint = %endpoint, "provider endpoint misconfigured");
            TryOnError::Unexpected(format!("invalid provider endpoint: {endpoint}"))
        }
    }
}

fn resolve_poll_outcome(job_id: String, outcome: PollOutcome) -> Result<TryOnResult, TryOnError> {
    match outcome {
        PollOutcome::Completed { output, polls } => Ok(TryOnResult {
            job_id,
            output,
            polls,
        }),
        PollOutcome::Failed { reason, .. } => Err(TryOnError::JobFailed { job_id, reason }),
        PollOutcome::TimedOut { polls } => Err(TryOnError::Timeout {
            job_id: Some(job_id),
            polls,
        }),
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
