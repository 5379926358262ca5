use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Protocol mode the caller requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// `POST /v1/chat/completions`
    ChatCompletions,
    /// `POST /v1/completions`
    Completions,
    /// `POST /v1/audio/transcriptions`
    AudioTranscription,
    /// `POST /v1/audio/speech`
    AudioSpeech,
}

/// Per-request relay state
///
/// Owned by the task handling the request. Collaborators only read it; the
/// one mutable piece is the first-response marker, which can be set once.
#[derive(Debug, Clone)]
pub struct RelayInfo {
    /// Protocol mode the caller requested
    pub mode: RelayMode,
    /// Model identifier sent to the upstream
    pub upstream_model: String,
    /// Prompt tokens counted before the upstream call
    pub prompt_tokens: u32,
    /// Whether the caller asked for a trailing usage event
    pub should_include_usage: bool,
    first_response: Arc<OnceLock<Instant>>,
    started: Instant,
}

impl RelayInfo {
    pub fn new(mode: RelayMode, upstream_model: impl Into<String>, prompt_tokens: u32) -> Self {
        Self {
            mode,
            upstream_model: upstream_model.into(),
            prompt_tokens,
            should_include_usage: false,
            first_response: Arc::new(OnceLock::new()),
            started: Instant::now(),
        }
    }

    /// Request a trailing usage event on streamed responses
    #[must_use]
    pub const fn with_include_usage(mut self, include: bool) -> Self {
        self.should_include_usage = include;
        self
    }

    /// Record that the upstream produced its first bytes
    ///
    /// Only the first call has an effect.
    pub fn mark_first_response(&self) {
        let _ = self.first_response.set(Instant::now());
    }

    /// When the upstream produced its first bytes, if it has
    pub fn first_response_at(&self) -> Option<Instant> {
        self.first_response.get().copied()
    }

    /// Time from request start to first upstream bytes
    pub fn time_to_first_response(&self) -> Option<std::time::Duration> {
        self.first_response_at().map(|at| at.duration_since(self.started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_response_is_set_once() {
        let info = RelayInfo::new(RelayMode::ChatCompletions, "gpt-4o", 10);
        assert!(info.first_response_at().is_none());

        info.mark_first_response();
        let first = info.first_response_at().unwrap();

        info.mark_first_response();
        assert_eq!(info.first_response_at(), Some(first));
    }

    #[test]
    fn clones_share_first_response_marker() {
        let info = RelayInfo::new(RelayMode::Completions, "gpt-3.5-turbo-instruct", 0);
        let reader_view = info.clone();

        reader_view.mark_first_response();

        assert!(info.first_response_at().is_some());
        assert!(info.time_to_first_response().is_some());
    }
}
