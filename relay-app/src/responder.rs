//! Persona reply generation with fixed fallbacks.

use crate::context::{ContextBuffer, ConversationTurn};
use crate::persona::PersonaSource;
use relay_llm::{ChatBackend, ChatMessage, CompletionParams, FailureKind, LlmError};
use std::sync::Arc;

pub const RATE_LIMITED_REPLY: &str = "ちょっと忙しくてねえ。少し待ってからまた声かけておくれ。";
pub const BACKEND_ERROR_REPLY: &str = "あらあら、ちょっと調子が悪いねえ。また後で話しかけておくれ。";
pub const UNEXPECTED_REPLY: &str = "ごめんねえ、今ちょっと聞こえなかったわ。もう一回言っておくれ。";

const SENTENCE_TERMINATORS: [char; 3] = ['。', '！', '？'];

pub struct ResponseGenerator {
    backend: Arc<dyn ChatBackend>,
    context: Arc<ContextBuffer>,
    persona: PersonaSource,
    params: CompletionParams,
    max_reply_chars: usize,
}

impl ResponseGenerator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        context: Arc<ContextBuffer>,
        persona: PersonaSource,
        params: CompletionParams,
        max_reply_chars: usize,
    ) -> Self {
        Self {
            backend,
            context,
            persona,
            params,
            max_reply_chars,
        }
    }

    /// Record `payload` as a user turn and produce the persona's reply.
    ///
    /// Always returns non-empty text; backend failures become fixed replies.
    /// The caller records the returned text as the assistant turn.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn generate(&self, payload: &str) -> String {
        let persona = self.persona.load().await;
        self.context.append(ConversationTurn::user(payload));

        let history = self.context.snapshot();
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(persona.text));
        messages.extend(history.iter().map(ConversationTurn::to_chat_message));

        match self.complete(&messages).await {
            Ok(text) => shorten_reply(&text, self.max_reply_chars),
            Err(e) => fallback_reply(&e).to_string(),
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> relay_llm::Result<String> {
        let resp = self.backend.complete(messages, &self.params).await?;
        let text = resp.message.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text.to_string())
    }
}

fn fallback_reply(e: &LlmError) -> &'static str {
    match e.kind() {
        FailureKind::RateLimited => {
            tracing::error!(error_class = e.class(), error = %e, "llm rate limit exceeded");
            RATE_LIMITED_REPLY
        }
        FailureKind::BackendError => {
            tracing::error!(error_class = e.class(), error = %e, "llm api error");
            BACKEND_ERROR_REPLY
        }
        FailureKind::Unexpected => {
            tracing::error!(error_class = e.class(), error = %e, "unexpected error generating reply");
            UNEXPECTED_REPLY
        }
    }
}

/// Replies longer than `max_chars` are cut to their first sentence.
///
/// If no terminator separates a first sentence the text is returned as is.
pub fn shorten_reply(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut sentences = text.split(SENTENCE_TERMINATORS);
    match (sentences.next(), sentences.next()) {
        (Some(first), Some(_)) => format!("{first}。"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{MISSING_FILE_PERSONA, READ_ERROR_PERSONA};
    use crate::testing::{FakeBackend, FakeOutcome};
    use relay_llm::Role;

    fn generator(
        backend: Arc<FakeBackend>,
        context: Arc<ContextBuffer>,
        persona: PersonaSource,
    ) -> ResponseGenerator {
        ResponseGenerator::new(backend, context, persona, CompletionParams::default(), 150)
    }

    fn missing_persona() -> (tempfile::TempDir, PersonaSource) {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = PersonaSource::new(dir.path().join("absent.txt"));
        (dir, source)
    }

    #[test]
    fn long_reply_is_cut_at_first_sentence() {
        let text = format!("{}。{}", "あ".repeat(60), "い".repeat(99));
        assert_eq!(text.chars().count(), 160);
        assert_eq!(shorten_reply(&text, 150), format!("{}。", "あ".repeat(60)));
    }

    #[test]
    fn long_reply_without_terminator_is_kept() {
        let text = "あ".repeat(160);
        assert_eq!(shorten_reply(&text, 150), text);
    }

    #[test]
    fn any_terminator_ends_the_first_sentence() {
        let text = format!("{}！{}？", "う".repeat(20), "え".repeat(140));
        assert_eq!(shorten_reply(&text, 150), format!("{}。", "う".repeat(20)));
    }

    #[test]
    fn short_reply_is_untouched() {
        let text = "あらまあ。元気にしとったかい？";
        assert_eq!(shorten_reply(text, 150), text);
    }

    #[tokio::test]
    async fn prompt_is_persona_then_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("system_prompt.txt");
        tokio::fs::write(&path, "persona text").await.expect("write persona");

        let backend = Arc::new(FakeBackend::new(vec![FakeOutcome::Reply(
            "  元気やで。  ".to_string(),
        )]));
        let context = Arc::new(ContextBuffer::new(5));
        context.append(ConversationTurn::user("こんにちは"));

        let reply = generator(backend.clone(), context.clone(), PersonaSource::new(&path))
            .generate("元気？")
            .await;
        assert_eq!(reply, "元気やで。");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                ChatMessage::system("persona text"),
                ChatMessage::user("こんにちは"),
                ChatMessage::user("元気？"),
            ]
        );
        // The caller records the assistant turn, not the generator.
        assert_eq!(context.len(), 2);
    }

    #[tokio::test]
    async fn history_sent_to_backend_is_capped() {
        let (_dir, persona) = missing_persona();
        let backend = Arc::new(FakeBackend::new(vec![FakeOutcome::Reply("ok".to_string())]));
        let context = Arc::new(ContextBuffer::new(5));
        for i in 0..5 {
            context.append(ConversationTurn::assistant(format!("old {i}")));
        }

        generator(backend.clone(), context, persona).generate("new").await;

        let sent = &backend.calls()[0];
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, MISSING_FILE_PERSONA);
        assert_eq!(sent[1].content, "old 1");
        assert_eq!(sent[5], ChatMessage::user("new"));
    }

    #[tokio::test]
    async fn every_failure_maps_to_a_fixed_non_empty_reply() {
        let cases = vec![
            (FakeOutcome::RateLimited, RATE_LIMITED_REPLY),
            (FakeOutcome::ApiError(500), BACKEND_ERROR_REPLY),
            (FakeOutcome::ApiError(400), BACKEND_ERROR_REPLY),
            (FakeOutcome::Timeout, UNEXPECTED_REPLY),
            (FakeOutcome::Network, UNEXPECTED_REPLY),
            (FakeOutcome::Reply("   ".to_string()), UNEXPECTED_REPLY),
        ];

        for (outcome, expected) in cases {
            for persona_present in [true, false] {
                let dir = tempfile::tempdir().expect("tempdir");
                let path = dir.path().join("system_prompt.txt");
                if persona_present {
                    tokio::fs::write(&path, "persona").await.expect("write persona");
                }
                let backend = Arc::new(FakeBackend::new(vec![outcome.clone()]));
                let reply = generator(
                    backend,
                    Arc::new(ContextBuffer::new(5)),
                    PersonaSource::new(&path),
                )
                .generate("元気？")
                .await;
                assert!(!reply.is_empty());
                assert_eq!(reply, expected, "outcome {outcome:?}");
            }
        }
    }

    #[tokio::test]
    async fn unreadable_persona_still_generates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(FakeBackend::new(vec![FakeOutcome::Reply("はいよ".to_string())]));
        let reply = generator(
            backend.clone(),
            Arc::new(ContextBuffer::new(5)),
            PersonaSource::new(dir.path()),
        )
        .generate("あいさつ")
        .await;
        assert_eq!(reply, "はいよ");
        assert_eq!(backend.calls()[0][0].content, READ_ERROR_PERSONA);
    }
}
