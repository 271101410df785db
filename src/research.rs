//! Subject-level glue: final-result caching around an analysis pipeline.
//!
//! The pipeline itself (the agents, their tasks, their prompts) is external
//! and plugs in through [`ResearchPipeline`]. [`ResearchRunner`] adds the
//! `final` cache namespace in front of it and batch execution over several
//! subjects.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tracing::{error, info, instrument};

use crate::{CacheManager, HuginnError, Result};

/// Longest accepted subject, in characters.
pub const MAX_SUBJECT_CHARS: usize = 100;

const DEFAULT_MAX_WORKERS: usize = 3;

/// Trim `subject` and check it is usable as a `final` cache key.
pub fn validate_subject(subject: &str) -> Result<&str> {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return Err(HuginnError::InvalidInput("subject must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_SUBJECT_CHARS {
        return Err(HuginnError::InvalidInput(format!(
            "subject longer than {MAX_SUBJECT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

/// An end-to-end analysis producing one report per subject.
#[async_trait]
pub trait ResearchPipeline: Send + Sync {
    async fn run(&self, subject: &str) -> Result<String>;
}

/// Result of analysing one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub subject: String,
    pub result: String,
    /// Served from the `final` namespace without running the pipeline.
    pub cached: bool,
}

/// Per-subject outcome of a batch.
#[derive(Debug)]
pub struct SubjectReport {
    pub subject: String,
    pub outcome: Result<Analysis>,
}

/// Runs a [`ResearchPipeline`] behind the `final` result cache.
pub struct ResearchRunner<P> {
    pipeline: P,
    cache: Arc<CacheManager>,
    max_workers: usize,
}

impl<P: ResearchPipeline> ResearchRunner<P> {
    pub fn new(pipeline: P, cache: Arc<CacheManager>) -> Self {
        Self {
            pipeline,
            cache,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Upper bound on subjects analysed concurrently by
    /// [`analyze_all`](Self::analyze_all). Values below 1 are treated as 1.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Analyse one subject, serving a live `final` entry when there is one.
    #[instrument(skip(self))]
    pub async fn analyze(&self, subject: &str) -> Result<Analysis> {
        let subject = validate_subject(subject)?;
        if let Some(result) = self.cache.get_final(subject) {
            info!(subject, "using cached result");
            return Ok(Analysis {
                subject: subject.to_owned(),
                result,
                cached: true,
            });
        }

        info!(subject, "analysing");
        let result = self.pipeline.run(subject).await?;
        self.cache.save_final(subject, &result);
        Ok(Analysis {
            subject: subject.to_owned(),
            result,
            cached: false,
        })
    }

    /// Analyse a batch of tickers.
    ///
    /// Tickers are trimmed and upper-cased; blanks and repeats are dropped.
    /// Reports come back in input order. A failing subject is logged and
    /// reported, and the rest of the batch still runs.
    pub async fn analyze_all<S: AsRef<str>>(
        &self,
        subjects: &[S],
        parallel: bool,
    ) -> Vec<SubjectReport> {
        let tickers = normalize_tickers(subjects);
        let workers = if parallel {
            self.max_workers.min(tickers.len()).max(1)
        } else {
            1
        };
        info!(count = tickers.len(), workers, "analysing subjects");

        stream::iter(tickers)
            .map(|subject| async move {
                let outcome = self.analyze(&subject).await;
                if let Err(e) = &outcome {
                    error!(subject = %subject, error = %e, "analysis failed");
                }
                SubjectReport { subject, outcome }
            })
            .buffered(workers)
            .collect()
            .await
    }
}

/// Concatenate successful analyses into one context block for a follow-up
/// portfolio-level prompt.
pub fn portfolio_context(reports: &[SubjectReport]) -> String {
    reports
        .iter()
        .filter_map(|r| r.outcome.as_ref().ok())
        .map(|a| format!("=== {} Analysis ===\n{}", a.subject, a.result))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn normalize_tickers<S: AsRef<str>>(subjects: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    subjects
        .iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_trimmed() {
        assert_eq!(validate_subject("  ACME \n").unwrap(), "ACME");
    }

    #[test]
    fn empty_subject_is_rejected() {
        assert!(matches!(
            validate_subject("   "),
            Err(HuginnError::InvalidInput(_))
        ));
    }

    #[test]
    fn subject_length_limit() {
        let ok = "A".repeat(MAX_SUBJECT_CHARS);
        assert!(validate_subject(&ok).is_ok());
        let long = "A".repeat(MAX_SUBJECT_CHARS + 1);
        assert!(validate_subject(&long).is_err());
    }

    #[test]
    fn tickers_are_normalised_and_deduplicated() {
        let tickers = normalize_tickers(&[" aapl", "MSFT", "", "AAPL", "msft ", "goog"]);
        assert_eq!(tickers, vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn context_skips_failures() {
        let reports = vec![
            SubjectReport {
                subject: "AAPL".into(),
                outcome: Ok(Analysis {
                    subject: "AAPL".into(),
                    result: "buy".into(),
                    cached: false,
                }),
            },
            SubjectReport {
                subject: "BAD".into(),
                outcome: Err(HuginnError::Timeout),
            },
            SubjectReport {
                subject: "MSFT".into(),
                outcome: Ok(Analysis {
                    subject: "MSFT".into(),
                    result: "hold".into(),
                    cached: true,
                }),
            },
        ];
        assert_eq!(
            portfolio_context(&reports),
            "=== AAPL Analysis ===\nbuy\n\n=== MSFT Analysis ===\nhold"
        );
    }
}
