use async_trait::async_trait;
use rig::completion::Prompt;
use rig::prelude::*;
use rig::providers::gemini;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{ChatError, Result};
use crate::prompt::compose_prompt;
use crate::session::Transcript;

pub const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// One opaque call to a hosted text-generation model.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini through rig, with the provider's default sampling settings.
pub struct GeminiClient {
    client: gemini::Client,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: gemini::Client::new(api_key),
            model: GEMINI_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let agent = self.client.agent(&self.model).build();
        agent
            .prompt(prompt)
            .await
            .map_err(|e| ChatError::Generation(e.to_string()))
    }
}

/// Composes the prompt for a turn and runs it against the generation client.
///
/// Holds no per-conversation state; every call is independent.
#[derive(Clone)]
pub struct Responder {
    client: Arc<dyn GenerationClient>,
    timeout: Duration,
}

impl Responder {
    pub fn new(client: Arc<dyn GenerationClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn respond(
        &self,
        document: &str,
        transcript: &Transcript,
        user_input: &str,
    ) -> Result<String> {
        let prompt = compose_prompt(document, transcript, user_input);
        info!(
            "Requesting generation ({} prompt chars, {} prior turns)",
            prompt.len(),
            transcript.len()
        );

        let text = match tokio::time::timeout(self.timeout, self.client.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!("Generation failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!("Generation timed out after {:?}", self.timeout);
                return Err(ChatError::Generation(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs_f64()
                )));
            }
        };

        let answer = text.trim();
        if answer.is_empty() {
            return Err(ChatError::Generation(
                "model returned an empty response".to_string(),
            ));
        }

        info!("Generated response ({} characters)", answer.len());
        Ok(answer.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted client: replays queued results and records every prompt it sees.
    pub struct StubClient {
        replies: Mutex<VecDeque<Result<String>>>,
        pub prompts: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
        pub delay: Option<Duration>,
    }

    impl StubClient {
        pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay: None,
            })
        }

        pub fn replying(text: &str) -> Arc<Self> {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from([Ok("late".to_string())])),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay: Some(delay),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationClient for StubClient {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Generation("no scripted reply".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::StubClient;
    use super::*;
    use crate::session::Turn;

    fn responder(client: Arc<StubClient>) -> Responder {
        Responder::new(client, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_response_is_trimmed() {
        let client = StubClient::replying("  \n We offer a 6-week ML course.\n\n");
        let answer = responder(client)
            .respond("doc", &Transcript::new(), "What courses?")
            .await
            .unwrap();
        assert_eq!(answer, "We offer a 6-week ML course.");
    }

    #[tokio::test]
    async fn test_prompt_contains_document_and_history() {
        let client = StubClient::replying("ok");
        let mut transcript = Transcript::new();
        transcript.push(Turn::new("earlier", "reply"));

        responder(client.clone())
            .respond("AiCouncil offers a 6-week ML course.", &transcript, "now?")
            .await
            .unwrap();

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("AiCouncil offers a 6-week ML course."));
        assert!(prompts[0].contains("User: earlier\nAssistant: reply\n"));
        assert!(prompts[0].contains("User: now?\nAssistant:"));
    }

    #[tokio::test]
    async fn test_client_error_is_propagated_without_retry() {
        let client = StubClient::new(vec![
            Err(ChatError::Generation("quota exceeded".to_string())),
            Ok("should not be used".to_string()),
        ]);
        let err = responder(client.clone())
            .respond("doc", &Transcript::new(), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(ref m) if m.contains("quota")));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_response_is_an_error() {
        let client = StubClient::replying("   ");
        let err = responder(client)
            .respond("doc", &Transcript::new(), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_generation_error() {
        let client = StubClient::slow(Duration::from_secs(120));
        let responder = Responder::new(client, Duration::from_secs(1));
        let err = responder
            .respond("doc", &Transcript::new(), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Generation(ref m) if m.contains("timed out")));
    }
}
