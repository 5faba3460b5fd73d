//! Candidate model pool: concurrent fan-out to every configured model
//!
//! Each candidate gets a private copy of the conversation with the system
//! directive prepended. All calls run as separate tasks and the pool waits for
//! every one of them before looking at the results; answers are stored by
//! configuration index so completion order never matters.

use crate::config::CandidateModel;
use crate::error::{AppError, AppResult, CompletionError};
use crate::models::{CompletionService, SamplingParams};
use crate::pipeline::Conversation;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

/// One candidate's answer, aligned with its configuration entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAnswer {
    pub label: String,
    pub text: String,
}

/// Fixed, ordered set of candidate models
pub struct CandidatePool {
    service: Arc<dyn CompletionService>,
    candidates: Arc<[CandidateModel]>,
    system_directive: Arc<str>,
    sampling: SamplingParams,
}

impl CandidatePool {
    /// Create a pool over `candidates` (must be non-empty; `Config::validate` checks this)
    pub fn new(
        service: Arc<dyn CompletionService>,
        candidates: Vec<CandidateModel>,
        system_directive: impl Into<Arc<str>>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            service,
            candidates: candidates.into(),
            system_directive: system_directive.into(),
            sampling,
        }
    }

    pub fn candidates(&self) -> &[CandidateModel] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Ask every candidate concurrently and return answers in configuration order
    ///
    /// Fails if any single call fails. The first failure (by configuration
    /// position) is reported, but only after every task has finished.
    pub async fn collect(&self, conversation: &Conversation) -> AppResult<Vec<CandidateAnswer>> {
        let directed = Arc::new(conversation.with_system_directive(&self.system_directive));
        let mut join_set: JoinSet<(usize, Result<String, CompletionError>)> = JoinSet::new();

        for (index, candidate) in self.candidates.iter().enumerate() {
            let service = Arc::clone(&self.service);
            let conversation = Arc::clone(&directed);
            let model = candidate.name().to_string();
            let sampling = self.sampling;

            join_set.spawn(async move {
                let start = Instant::now();
                let result = service.complete(&model, &conversation, &sampling).await;
                tracing::debug!(
                    model = %model,
                    position = index + 1,
                    success = result.is_ok(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Candidate call finished"
                );
                (index, result)
            }
            .instrument(tracing::Span::current()));
        }

        let mut slots: Vec<Option<Result<String, CompletionError>>> =
            (0..self.candidates.len()).map(|_| None).collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    return Err(AppError::Internal(format!(
                        "candidate task did not complete: {}",
                        e
                    )));
                }
            }
        }

        let mut answers = Vec::with_capacity(slots.len());
        for (index, (slot, candidate)) in slots.into_iter().zip(self.candidates.iter()).enumerate()
        {
            match slot {
                Some(Ok(text)) => answers.push(CandidateAnswer {
                    label: candidate.label().to_string(),
                    text,
                }),
                Some(Err(source)) => {
                    tracing::warn!(
                        model = %candidate.name(),
                        position = index + 1,
                        error = %source,
                        "Candidate call failed, aborting arbitration"
                    );
                    return Err(AppError::CandidateCall {
                        model: candidate.name().to_string(),
                        position: index + 1,
                        source,
                    });
                }
                None => {
                    return Err(AppError::Internal(format!(
                        "candidate #{} produced no result",
                        index + 1
                    )));
                }
            }
        }

        Ok(answers)
    }
}
