//! End-to-end arbitration: candidates, judge, extraction
//!
//! Every stage runs to completion before the next one starts. The only
//! concurrency is inside [`CandidatePool::collect`].

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError, Stage};
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use crate::models::CompletionService;
use crate::pipeline::{
    CandidatePool, Conversation, Decision, JudgeInvoker, JudgeVerdict, TagExtractor,
    build_judge_conversation,
};
use std::sync::Arc;
use std::time::Instant;

/// Arbitration pipeline built once from configuration and shared by all requests
pub struct Arbiter {
    pool: CandidatePool,
    judge: JudgeInvoker,
    extractor: TagExtractor,
    reject_unknown_decision: bool,
    metrics: Arc<Metrics>,
}

impl Arbiter {
    pub fn new(
        config: &Config,
        service: Arc<dyn CompletionService>,
        metrics: Arc<Metrics>,
    ) -> AppResult<Self> {
        let pool = CandidatePool::new(
            Arc::clone(&service),
            config.candidates.clone(),
            config.pool.system_directive.as_str(),
            config.pool.sampling(),
        );
        let judge = JudgeInvoker::new(service, config.judge.model.clone(), config.judge.sampling());
        let extractor = TagExtractor::new(config.candidates.iter().map(|c| c.label()))?;

        Ok(Self {
            pool,
            judge,
            extractor,
            reject_unknown_decision: config.judge.reject_unknown_decision,
            metrics,
        })
    }

    pub fn candidate_count(&self) -> usize {
        self.pool.len()
    }

    pub fn judge_model(&self) -> &str {
        self.judge.model()
    }

    /// Run the pipeline on an already-normalized conversation
    pub async fn arbitrate(
        &self,
        conversation: &Conversation,
        request_id: RequestId,
    ) -> AppResult<JudgeVerdict> {
        let answers = self
            .timed(Stage::Candidates, self.pool.collect(conversation))
            .await?;
        tracing::debug!(
            request_id = %request_id,
            candidates = answers.len(),
            "All candidate answers collected"
        );

        let judge_conversation = build_judge_conversation(&answers, conversation);
        let raw = self
            .timed(Stage::Judge, self.judge.invoke(&judge_conversation))
            .await?;

        let verdict = self
            .extractor
            .extract(&raw)
            .map_err(AppError::from)
            .and_then(|verdict| self.check_decision(verdict));

        let verdict = match verdict {
            Ok(verdict) => verdict,
            Err(e) => {
                self.metrics.record_stage_failure(Stage::Extract);
                tracing::warn!(
                    request_id = %request_id,
                    judge_model = %self.judge.model(),
                    error = %e,
                    judge_output_length = raw.len(),
                    "Judge output did not follow the tag grammar"
                );
                return Err(e);
            }
        };

        self.metrics.record_decision(verdict.decision.metric_label());
        tracing::info!(
            request_id = %request_id,
            decision = %verdict.decision.as_str(),
            weights = ?verdict.weights,
            result_length = verdict.result.len(),
            "Arbitration complete"
        );

        Ok(verdict)
    }

    fn check_decision(&self, verdict: JudgeVerdict) -> AppResult<JudgeVerdict> {
        if let Decision::Unrecognized(value) = &verdict.decision {
            if self.reject_unknown_decision {
                return Err(ExtractionError::UnknownDecision {
                    value: value.clone(),
                }
                .into());
            }
            tracing::warn!(
                decision = %value,
                "Judge decision is neither pick nor merge, passing result through"
            );
        }
        Ok(verdict)
    }

    async fn timed<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        let start = Instant::now();
        let result = work.await;
        self.metrics
            .record_stage_duration(stage, start.elapsed().as_secs_f64() * 1000.0);
        if result.is_err() {
            self.metrics.record_stage_failure(stage);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::models::{SamplingParams, TokenStream};
    use crate::pipeline::ConversationTurn;
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Candidates echo a fixed answer; the judge model returns `judge_reply`
    struct Scripted {
        judge_model: String,
        judge_reply: String,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(
            &self,
            model: &str,
            _conversation: &Conversation,
            _sampling: &SamplingParams,
        ) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push(model.to_string());
            if model == self.judge_model {
                Ok(self.judge_reply.clone())
            } else {
                Ok("4".to_string())
            }
        }

        async fn stream(
            &self,
            _model: &str,
            _conversation: &Conversation,
            _sampling: &SamplingParams,
        ) -> Result<TokenStream, CompletionError> {
            Err(CompletionError::EmptyChoices)
        }
    }

    fn config(reject_unknown: bool) -> Config {
        Config::from_str(&format!(
            r#"
[server]
host = "127.0.0.1"
port = 8000

[[candidates]]
name = "cand-a"
label = "A"

[[candidates]]
name = "cand-b"
label = "B"

[judge]
model = "judge"
reject_unknown_decision = {}
"#,
            reject_unknown
        ))
        .unwrap()
    }

    fn arbiter(reply: &str, reject_unknown: bool) -> (Arbiter, Arc<Scripted>, Arc<Metrics>) {
        let service = Arc::new(Scripted {
            judge_model: "judge".to_string(),
            judge_reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let arbiter = Arbiter::new(&config(reject_unknown), service.clone(), metrics.clone())
            .expect("arbiter should build");
        (arbiter, service, metrics)
    }

    fn question() -> Conversation {
        Conversation::new(vec![ConversationTurn::user("What is 2+2?")])
    }

    #[tokio::test]
    async fn test_arbitrate_returns_verdict() {
        let (arbiter, service, _) = arbiter(
            "<response1>1</response1><response2>1</response2><decision>merge</decision><result>4</result>",
            false,
        );
        let verdict = arbiter.arbitrate(&question(), RequestId::new()).await.unwrap();

        assert_eq!(verdict.result, "4");
        assert_eq!(verdict.decision, Decision::Merge);
        assert_eq!(verdict.weights.len(), 2);
        assert_eq!(verdict.weights[0].label, "A");

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.last().map(String::as_str), Some("judge"));
    }

    #[tokio::test]
    async fn test_missing_tag_is_extraction_failure() {
        let (arbiter, _, metrics) = arbiter(
            "<response1>1</response1><response2>1</response2><result>4</result>",
            false,
        );
        let err = arbiter
            .arbitrate(&question(), RequestId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction(ExtractionError::MissingTag { ref tag }) if tag == "decision"
        ));
        assert_eq!(metrics.stage_failures_count(Stage::Extract), 1);
    }

    #[tokio::test]
    async fn test_unknown_decision_passes_by_default() {
        let (arbiter, _, _) = arbiter(
            "<response1>1</response1><response2>0</response2><decision>blend</decision><result>4</result>",
            false,
        );
        let verdict = arbiter.arbitrate(&question(), RequestId::new()).await.unwrap();
        assert_eq!(verdict.decision, Decision::Unrecognized("blend".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_decision_rejected_when_configured() {
        let (arbiter, _, _) = arbiter(
            "<response1>1</response1><response2>0</response2><decision>blend</decision><result>4</result>",
            true,
        );
        let err = arbiter
            .arbitrate(&question(), RequestId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction(ExtractionError::UnknownDecision { ref value }) if value == "blend"
        ));
    }

    #[test]
    fn test_accessors() {
        let (arbiter, _, _) = arbiter("", false);
        assert_eq!(arbiter.candidate_count(), 2);
        assert_eq!(arbiter.judge_model(), "judge");
    }
}
