//! Incremental factor fetcher.
//!
//! For each code: load the cached table, work out which configured fields
//! it lacks, fetch only those (one call per field group), merge and write
//! back. A field already present on disk is never requested again.
//!
//! A group that comes back with a non-zero status abandons the code for
//! this run without writing anything, even if earlier groups succeeded.

use crate::config::{EscalationPolicy, FetchConfig};
use crate::fields::{FieldGroup, FieldName, FieldPresence};
use crate::progress::FetchProgress;
use crate::provider::{FactorProvider, FetchRequest, ProviderError, ProviderReply};
use crate::retry::{call_with_retry, RetryPolicy};
use crate::store::{FactorStore, StoreError};
use crate::table::FactorTable;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info};

/// Failures that stop a batch run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{code}: group '{group}' failed: {source}")]
    Provider {
        code: String,
        group: String,
        #[source]
        source: ProviderError,
    },

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one code.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every configured field is already cached; nothing requested or written.
    UpToDate,
    /// Merged table written.
    Saved {
        added: Vec<FieldName>,
        /// Requested but not returned by the provider; retried next run.
        still_missing: Vec<FieldName>,
    },
    /// A group came back with a non-zero status; nothing written.
    Rejected { group: String, status: i64 },
    /// A provider call failed after retries under [`EscalationPolicy::Skip`].
    Abandoned { group: String, reason: String },
}

pub struct FactorFetcher<'a> {
    provider: &'a dyn FactorProvider,
    store: &'a FactorStore,
    groups: &'a [FieldGroup],
    begin: NaiveDate,
    end: NaiveDate,
    retry: RetryPolicy,
    on_exhausted: EscalationPolicy,
}

impl<'a> FactorFetcher<'a> {
    pub fn new(
        provider: &'a dyn FactorProvider,
        store: &'a FactorStore,
        config: &'a FetchConfig,
    ) -> Self {
        Self {
            provider,
            store,
            groups: &config.groups,
            begin: config.window.begin,
            end: config.window.end,
            retry: config.retry.policy(),
            on_exhausted: config.retry.on_exhausted,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_escalation(mut self, policy: EscalationPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// Bring the cached table for `code` up to date with the configured fields.
    pub fn process(&self, code: &str) -> Result<Outcome, FetchError> {
        let cached = self.store.load(code)?;
        let presence = FieldPresence::evaluate(
            self.groups,
            cached.iter().flat_map(|t| t.field_names()),
        );

        let plan: Vec<(&FieldGroup, Vec<FieldName>)> = self
            .groups
            .iter()
            .map(|g| (g, g.missing(&presence)))
            .collect();

        if plan.iter().all(|(_, missing)| missing.is_empty()) {
            debug!("{code}: all {} fields cached", presence.iter().count());
            return Ok(Outcome::UpToDate);
        }

        let mut batches: Vec<FactorTable> = Vec::with_capacity(plan.len());
        for (group, missing) in &plan {
            if missing.is_empty() {
                continue;
            }

            let reply = match self.fetch_group(code, group, missing) {
                Ok(reply) => reply,
                Err(source) => {
                    return match self.on_exhausted {
                        EscalationPolicy::Halt => Err(FetchError::Provider {
                            code: code.to_string(),
                            group: group.name.clone(),
                            source,
                        }),
                        EscalationPolicy::Skip => {
                            error!("{code}: group '{}' failed, skipping code: {source}", group.name);
                            Ok(Outcome::Abandoned {
                                group: group.name.clone(),
                                reason: source.to_string(),
                            })
                        }
                    };
                }
            };

            if !reply.is_ok() {
                error!(
                    "{code}: request for {} failed with error code {}",
                    join_fields(missing),
                    reply.status
                );
                return Ok(Outcome::Rejected {
                    group: group.name.clone(),
                    status: reply.status,
                });
            }
            batches.push(reply.table);
        }

        let mut merged = cached.unwrap_or_default();
        for batch in &batches {
            merged.merge(batch);
        }

        let (added, still_missing): (Vec<FieldName>, Vec<FieldName>) = plan
            .into_iter()
            .flat_map(|(_, missing)| missing)
            .partition(|f| merged.has_field(f));

        let path = self.store.save(code, &merged)?;
        info!("{code}: saved {} rows to {}", merged.height(), path.display());

        Ok(Outcome::Saved {
            added,
            still_missing,
        })
    }

    /// Process `codes` in order. Returns early only on a halting failure.
    pub fn run(
        &self,
        codes: &[String],
        progress: &dyn FetchProgress,
    ) -> Result<RunSummary, FetchError> {
        let total = codes.len();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        for (i, code) in codes.iter().enumerate() {
            progress.on_start(code, i, total);
            let outcome = self.process(code)?;
            progress.on_complete(code, i, total, &outcome);
            summary.record(code, outcome);
        }

        progress.on_batch_complete(&summary);
        Ok(summary)
    }

    fn fetch_group(
        &self,
        code: &str,
        group: &FieldGroup,
        fields: &[FieldName],
    ) -> Result<ProviderReply, ProviderError> {
        info!("{code}: requesting {}", join_fields(fields));

        let request = FetchRequest {
            code: code.to_string(),
            fields: fields.to_vec(),
            begin: self.begin,
            end: self.end,
            options: group.options.clone(),
        };
        let label = format!("{code}/{}", group.name);
        call_with_retry(&self.retry, &label, || self.provider.fetch(&request))
    }
}

fn join_fields(fields: &[FieldName]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub up_to_date: usize,
    pub saved: usize,
    pub rejected: usize,
    pub abandoned: usize,
    /// Codes that were rejected or abandoned, with their outcome.
    pub failures: Vec<(String, Outcome)>,
}

impl RunSummary {
    fn record(&mut self, code: &str, outcome: Outcome) {
        match outcome {
            Outcome::UpToDate => self.up_to_date += 1,
            Outcome::Saved { .. } => self.saved += 1,
            Outcome::Rejected { .. } => {
                self.rejected += 1;
                self.failures.push((code.to_string(), outcome));
            }
            Outcome::Abandoned { .. } => {
                self.abandoned += 1;
                self.failures.push((code.to_string(), outcome));
            }
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}
