use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::AsyncJobSection;

use super::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    pub fn from_section(section: &AsyncJobSection) -> Self {
        Self {
            interval: Duration::from_secs(section.poll_interval_seconds.max(1)),
            max_wait: Duration::from_secs(section.max_wait_seconds),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_section(&AsyncJobSection::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Pending(String),
    Completed(Value),
    Failed(String),
}

/// Reads the `status` field of a result document.
pub fn classify_poll_response(body: Value) -> PollOutcome {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_ascii_lowercase();
    match status.as_str() {
        "completed" | "succeeded" | "success" => PollOutcome::Completed(body),
        "failed" | "error" | "cancelled" => {
            let reason = body
                .get("error")
                .and_then(|error| match error {
                    Value::String(text) => Some(text.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .unwrap_or_else(|| "unknown error".to_string());
            PollOutcome::Failed(reason)
        }
        _ => PollOutcome::Pending(status),
    }
}

/// Calls `check` every `policy.interval` until it reports a terminal state or
/// the budget runs out. Transport errors count as a missed poll; every other
/// error ends the wait.
pub async fn poll_until_terminal<F, Fut>(
    provider: &str,
    policy: &PollPolicy,
    mut check: F,
) -> ProviderResult<Value>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<PollOutcome>>,
{
    let started = Instant::now();
    let mut attempt: u64 = 0;
    while started.elapsed() < policy.max_wait {
        attempt += 1;
        match check().await {
            Ok(PollOutcome::Completed(body)) => {
                debug!(provider, attempt, "job completed");
                return Ok(body);
            }
            Ok(PollOutcome::Failed(reason)) => {
                return Err(ProviderError::Rejected {
                    provider: provider.to_string(),
                    reason,
                });
            }
            Ok(PollOutcome::Pending(status)) => {
                debug!(provider, attempt, status = %status, elapsed = ?started.elapsed(), "job pending");
            }
            Err(ProviderError::Transport(err)) => {
                warn!(provider, attempt, error = %err, "poll request failed");
            }
            Err(err) => return Err(err),
        }
        sleep(policy.interval).await;
    }
    Err(ProviderError::Timeout {
        provider: provider.to_string(),
        waited: policy.max_wait,
    })
}

/// One known place a provider may put the artifact URL.
#[derive(Clone, Copy)]
pub struct ExtractionStrategy {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<String>,
}

impl std::fmt::Debug for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStrategy")
            .field("name", &self.name)
            .finish()
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn outputs_first_string(body: &Value) -> Option<String> {
    non_empty(body.pointer("/outputs/0"))
}

fn outputs_first_url(body: &Value) -> Option<String> {
    non_empty(body.pointer("/outputs/0/url"))
}

fn output_url(body: &Value) -> Option<String> {
    non_empty(body.pointer("/output/url"))
}

fn video_url(body: &Value) -> Option<String> {
    non_empty(body.get("video_url"))
}

fn audio_url(body: &Value) -> Option<String> {
    non_empty(body.get("audio_url"))
}

fn bare_url(body: &Value) -> Option<String> {
    non_empty(body.get("url"))
}

fn data_outputs_first(body: &Value) -> Option<String> {
    non_empty(body.pointer("/data/outputs/0"))
        .or_else(|| non_empty(body.pointer("/data/outputs/0/url")))
}

pub const VIDEO_STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy {
        name: "outputs[0]",
        extract: outputs_first_string,
    },
    ExtractionStrategy {
        name: "outputs[0].url",
        extract: outputs_first_url,
    },
    ExtractionStrategy {
        name: "output.url",
        extract: output_url,
    },
    ExtractionStrategy {
        name: "video_url",
        extract: video_url,
    },
    ExtractionStrategy {
        name: "url",
        extract: bare_url,
    },
    ExtractionStrategy {
        name: "data.outputs[0]",
        extract: data_outputs_first,
    },
];

pub const AUDIO_STRATEGIES: &[ExtractionStrategy] = &[
    ExtractionStrategy {
        name: "outputs[0]",
        extract: outputs_first_string,
    },
    ExtractionStrategy {
        name: "outputs[0].url",
        extract: outputs_first_url,
    },
    ExtractionStrategy {
        name: "output.url",
        extract: output_url,
    },
    ExtractionStrategy {
        name: "audio_url",
        extract: audio_url,
    },
    ExtractionStrategy {
        name: "url",
        extract: bare_url,
    },
    ExtractionStrategy {
        name: "data.outputs[0]",
        extract: data_outputs_first,
    },
];

/// Tries each strategy in order and returns the first match.
pub fn extract_artifact_url(
    body: &Value,
    strategies: &[ExtractionStrategy],
) -> Option<(&'static str, String)> {
    strategies
        .iter()
        .find_map(|strategy| (strategy.extract)(body).map(|url| (strategy.name, url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn strategies_follow_declared_order() {
        let body = json!({
            "outputs": [{"url": "https://cdn/a.mp4"}],
            "url": "https://cdn/b.mp4"
        });
        let (name, url) = extract_artifact_url(&body, VIDEO_STRATEGIES).unwrap();
        assert_eq!(name, "outputs[0].url");
        assert_eq!(url, "https://cdn/a.mp4");

        let plain = json!({"outputs": ["https://cdn/c.mp4"]});
        assert_eq!(
            extract_artifact_url(&plain, VIDEO_STRATEGIES).unwrap().1,
            "https://cdn/c.mp4"
        );

        let nested = json!({"data": {"outputs": ["https://cdn/d.mp3"]}});
        assert_eq!(
            extract_artifact_url(&nested, AUDIO_STRATEGIES).unwrap().0,
            "data.outputs[0]"
        );
    }

    #[test]
    fn audio_and_video_lists_differ_on_named_field() {
        let body = json!({"audio_url": "https://cdn/song.mp3"});
        assert!(extract_artifact_url(&body, VIDEO_STRATEGIES).is_none());
        assert_eq!(
            extract_artifact_url(&body, AUDIO_STRATEGIES).unwrap().1,
            "https://cdn/song.mp3"
        );
        assert!(extract_artifact_url(&json!({"outputs": [""]}), VIDEO_STRATEGIES).is_none());
    }

    #[test]
    fn classify_reads_status_and_error() {
        assert!(matches!(
            classify_poll_response(json!({"status": "processing"})),
            PollOutcome::Pending(status) if status == "processing"
        ));
        assert_eq!(
            classify_poll_response(json!({"status": "failed", "error": "content policy"})),
            PollOutcome::Failed("content policy".into())
        );
        assert!(matches!(
            classify_poll_response(json!({"status": "completed", "outputs": []})),
            PollOutcome::Completed(_)
        ));
    }

    #[test]
    fn default_policy_matches_provider_budget() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_wait, Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_after_pending_rounds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60));
        let body = poll_until_terminal("test", &policy, || {
            let counter = Arc::clone(&counter);
            async move {
                let round = counter.fetch_add(1, Ordering::SeqCst);
                if round < 3 {
                    Ok::<_, ProviderError>(PollOutcome::Pending("queued".into()))
                } else {
                    Ok(PollOutcome::Completed(json!({"outputs": ["u"]})))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(body["outputs"][0], "u");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_when_never_terminal() {
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(20));
        let err = poll_until_terminal("slow", &policy, || async {
            Ok::<_, ProviderError>(PollOutcome::Pending("running".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { ref provider, .. } if provider == "slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_on_failure_and_non_transport_errors() {
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60));
        let err = poll_until_terminal("p", &policy, || async {
            Ok::<_, ProviderError>(PollOutcome::Failed("quota exceeded".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { ref reason, .. } if reason == "quota exceeded"));

        let err = poll_until_terminal("p", &policy, || async {
            Err::<PollOutcome, _>(ProviderError::Status {
                provider: "p".into(),
                status: 500,
                body: "boom".into(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 500, .. }));
    }
}
