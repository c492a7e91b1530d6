//! Prompt composition, moderation gating, and answer normalization.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{self, Domain};
use crate::providers::{CompletionProvider, Moderator, SamplingParams};

/// Fixed reply for out-of-scope or flagged questions. Never sent to the
/// completion provider.
pub const REFUSAL: &str =
    "I can only answer questions about the content of the provided document.";

static MARKDOWN_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|\*").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());

/// Turns retrieved context plus a question into a single final answer.
pub struct AnswerComposer {
    completion: Arc<dyn CompletionProvider>,
    moderator: Arc<dyn Moderator>,
    params: SamplingParams,
}

impl AnswerComposer {
    pub fn new(completion: Arc<dyn CompletionProvider>, moderator: Arc<dyn Moderator>) -> Self {
        Self {
            completion,
            moderator,
            params: SamplingParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// Question-level refusal gate: moderation plus the forbidden-topic
    /// screen. Context-free, so callers can consult it before paying for
    /// retrieval.
    pub async fn should_refuse(&self, question: &str) -> bool {
        match self.moderator.flag(question).await {
            Ok(true) => {
                tracing::warn!("question flagged by moderation");
                return true;
            }
            Ok(false) => {}
            Err(err) => {
                // Moderation outage: local keyword checks below still apply.
                tracing::warn!(error = %err, "moderation unavailable, using local checks only");
            }
        }
        if domain::is_forbidden(question) {
            tracing::warn!("question rejected by scope check");
            return true;
        }
        false
    }

    /// Produces the answer string for one question. Infallible by design:
    /// moderation hits and scope violations become the refusal constant, and
    /// completion failures become an error sentence, so one bad question
    /// never fails a whole batch.
    pub async fn compose(&self, context: &str, question: &str) -> String {
        if self.should_refuse(question).await {
            return REFUSAL.to_string();
        }
        self.answer(context, question).await
    }

    /// Classification and completion for a question that already passed
    /// [`Self::should_refuse`]. A question outside every supported document
    /// domain is out of policy scope and still refused here.
    pub async fn answer(&self, context: &str, question: &str) -> String {
        let domain = domain::classify(context, question);
        if domain == Domain::General {
            tracing::warn!("question outside supported document domains");
            return REFUSAL.to_string();
        }
        let prompt = build_prompt(domain, context, question);
        match self.completion.complete(&prompt, &self.params).await {
            Ok(raw) => normalize_answer(&raw),
            Err(err) => {
                tracing::error!(error = %err, "completion failed");
                format!("Unable to generate an answer for this question: {err}")
            }
        }
    }
}

/// Role-framed prompt in the shape the answerer expects: persona, grounding
/// rules, context block, then the question.
pub fn build_prompt(domain: Domain, context: &str, question: &str) -> String {
    format!(
        "You are {persona}. Answer the question using only the document \
         excerpts below.\n\
         Rules:\n\
         - Base every statement on the excerpts; do not use outside knowledge.\n\
         - If the excerpts do not contain the answer, say so plainly.\n\
         - Answer in one to three complete sentences, without markdown.\n\n\
         Document excerpts:\n{context}\n\n\
         Question: {question}\n\
         Answer:",
        persona = domain.persona(),
    )
}

/// Flattens raw model output into one clean line: markdown emphasis
/// stripped, blank-line runs collapsed, remaining newlines turned into
/// spaces.
pub fn normalize_answer(raw: &str) -> String {
    let stripped = MARKDOWN_EMPHASIS.replace_all(raw, "");
    let collapsed = BLANK_RUNS.replace_all(&stripped, "\n");
    collapsed.trim().replace('\n', " ")
}
