//! Tag extraction from free-form judge output
//!
//! The judge is asked for `<response{i}>` weights, a `<decision>` and a
//! `<result>`. Tags are located independently of each other, so their order in
//! the text does not matter. A missing tag is always an error: unverified
//! judge output is never passed on.

use crate::error::{AppError, AppResult, ExtractionError};
use regex::Regex;
use std::sync::LazyLock;

static DECISION_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<decision>(.*?)</decision>").expect("decision tag pattern is valid")
});

static RESULT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<result>(.*?)</result>").expect("result tag pattern is valid")
});

/// The judge's choice between candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pick,
    Merge,
    /// Anything else the judge wrote; kept verbatim for logging
    Unrecognized(String),
}

impl Decision {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pick" => Decision::Pick,
            "merge" => Decision::Merge,
            _ => Decision::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Decision::Pick => "pick",
            Decision::Merge => "merge",
            Decision::Unrecognized(raw) => raw,
        }
    }

    /// Metrics label with bounded cardinality
    pub fn metric_label(&self) -> &'static str {
        match self {
            Decision::Pick => "pick",
            Decision::Merge => "merge",
            Decision::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Weight the judge gave one candidate, as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateWeight {
    pub label: String,
    pub weight: String,
}

impl CandidateWeight {
    /// Numeric value of the weight, when the judge wrote a number
    pub fn value(&self) -> Option<f64> {
        self.weight.parse().ok()
    }
}

/// Parsed judge output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    /// One entry per candidate, in configuration order
    pub weights: Vec<CandidateWeight>,
    pub decision: Decision,
    pub result: String,
}

/// Precompiled extractor for a fixed candidate list
pub struct TagExtractor {
    weight_tags: Vec<(String, Regex)>,
}

impl TagExtractor {
    /// Compile `<response{i}>` patterns for each label, numbered from 1
    pub fn new<I, S>(labels: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let weight_tags = labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| {
                let tag = format!("response{}", index + 1);
                Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>"))
                    .map(|regex| (label.into(), regex))
                    .map_err(|e| {
                        AppError::Internal(format!("invalid pattern for <{}>: {}", tag, e))
                    })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self { weight_tags })
    }

    /// Number of `<response{i}>` tags required
    pub fn candidate_count(&self) -> usize {
        self.weight_tags.len()
    }

    /// Extract a verdict, failing on the first missing tag
    ///
    /// Weights and the decision are trimmed. The result is returned exactly as
    /// enclosed, since leading indentation and trailing newlines can be part
    /// of the answer. The decision value is not validated here; see
    /// [`Decision::Unrecognized`].
    pub fn extract(&self, judge_output: &str) -> Result<JudgeVerdict, ExtractionError> {
        let weights = self
            .weight_tags
            .iter()
            .enumerate()
            .map(|(index, (label, regex))| {
                capture(regex, judge_output, &format!("response{}", index + 1)).map(|weight| {
                    CandidateWeight {
                        label: label.clone(),
                        weight: weight.trim().to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let decision = capture(&DECISION_TAG, judge_output, "decision")?;
        let result = capture(&RESULT_TAG, judge_output, "result")?;

        Ok(JudgeVerdict {
            weights,
            decision: Decision::parse(decision.trim()),
            result: result.to_string(),
        })
    }
}

fn capture<'a>(regex: &Regex, text: &'a str, tag: &str) -> Result<&'a str, ExtractionError> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ExtractionError::MissingTag {
            tag: tag.to_string(),
        })
}
