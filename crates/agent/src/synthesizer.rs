//! Synthesizer — the final unconstrained completion producing the reply.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use loopwright_core::error::{ProviderError, Result};
use loopwright_core::provider::{Provider, ProviderRequest};
use loopwright_core::session::SessionSnapshot;

use crate::prompt;

pub struct Synthesizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    model_timeout: Duration,
}

impl Synthesizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        model_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            model_timeout,
        }
    }

    /// Produce the user-facing reply from the conversation and scratchpad.
    pub async fn synthesize(&self, snapshot: &SessionSnapshot<'_>) -> Result<String> {
        let messages = prompt::synthesis_messages(snapshot);
        let mut request = ProviderRequest::unconstrained(&self.model, messages);
        request.temperature = self.temperature;

        debug!(observations = snapshot.scratchpad.len(), "Synthesizing reply");

        match tokio::time::timeout(self.model_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => Ok(response.message.content),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProviderError::Timeout(format!(
                "synthesis round-trip exceeded {}s",
                self.model_timeout.as_secs()
            ))
            .into()),
        }
    }
}
