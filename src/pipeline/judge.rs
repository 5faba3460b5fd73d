//! Judge prompt construction and invocation
//!
//! The judge sees the original dialogue followed by every candidate answer, in
//! configuration order, and must reply in a tag grammar whose `<response{i}>`
//! numbering matches that order.

use crate::error::{AppError, AppResult};
use crate::models::{CompletionService, SamplingParams};
use crate::pipeline::{CandidateAnswer, Conversation, ConversationTurn};
use std::fmt::Write;
use std::sync::Arc;

/// User turn that separates the dialogue from the candidate answers
pub const EVALUATION_PREAMBLE: &str = "Please evaluate the following responses:";

/// Build the judge system directive for `candidate_count` answers
pub fn build_judge_directive(candidate_count: usize) -> String {
    let mut directive = format!(
        "You are an expert evaluator. You will be shown a conversation followed by {n} \
         candidate responses to its last message, labeled in order as responses 1 to {n}. \
         Weigh how accurate, complete and helpful each one is, then either pick the single \
         best response or merge the strongest parts of several into one better answer.\n\n\
         Reply using exactly this format:\n",
        n = candidate_count
    );

    for i in 1..=candidate_count {
        // Infallible for String
        let _ = writeln!(
            directive,
            "<response{i}>weight between 0 and 1 for response {i}</response{i}>"
        );
    }

    directive.push_str(
        "<decision>pick or merge</decision>\n\
         <result>the final answer</result>\n\n\
         The <decision> tag must contain only the word pick or the word merge. \
         The <result> tag must contain the final answer written directly to the user, as if \
         you were answering the conversation yourself. Do not mention the candidate \
         responses, their weights, your evaluation, or that the answer was picked or merged.",
    );

    directive
}

/// Assemble the full conversation sent to the judge
///
/// Layout: directive, original turns, evaluation preamble, one user turn per
/// candidate answer in configuration order.
pub fn build_judge_conversation(
    answers: &[CandidateAnswer],
    original: &Conversation,
) -> Conversation {
    let mut judge = original.with_system_directive(&build_judge_directive(answers.len()));
    judge.push(ConversationTurn::user(EVALUATION_PREAMBLE));
    for answer in answers {
        judge.push(ConversationTurn::user(answer.text.as_str()));
    }
    judge
}

/// Issues the single arbitration request
pub struct JudgeInvoker {
    service: Arc<dyn CompletionService>,
    model: String,
    sampling: SamplingParams,
}

impl JudgeInvoker {
    pub fn new(
        service: Arc<dyn CompletionService>,
        model: impl Into<String>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            sampling,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run the judge and return its raw text
    pub async fn invoke(&self, judge_conversation: &Conversation) -> AppResult<String> {
        self.service
            .complete(&self.model, judge_conversation, &self.sampling)
            .await
            .map_err(|source| {
                tracing::warn!(
                    model = %self.model,
                    error = %source,
                    "Judge call failed"
                );
                AppError::JudgeCall {
                    model: self.model.clone(),
                    source,
                }
            })
    }
}
