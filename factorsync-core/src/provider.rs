//! Factor provider trait and structured error types.
//!
//! The FactorProvider trait abstracts over the market-data terminal so the
//! fetcher can run against the HTTP gateway in production and a scripted
//! provider in tests. Providers know nothing about the on-disk store.

use crate::fields::FieldName;
use crate::table::FactorTable;
use chrono::NaiveDate;
use thiserror::Error;

/// Raised failures of a provider call.
///
/// A non-zero status code is not an error at this level; it comes back
/// inside [`ProviderReply`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("provider session not started")]
    NotStarted,
}

impl ProviderError {
    /// Timeout-class failures are the only ones worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

/// One time-series request for one code and one field group.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub code: String,
    pub fields: Vec<FieldName>,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    /// Group-specific supplemental parameters, passed through verbatim.
    pub options: String,
}

/// Status code plus table, as returned by the terminal.
///
/// `status == 0` means success; otherwise `table` is undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub status: i64,
    pub table: FactorTable,
}

impl ProviderReply {
    pub fn ok(table: FactorTable) -> Self {
        Self { status: 0, table }
    }

    pub fn failed(status: i64) -> Self {
        Self {
            status,
            table: FactorTable::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// A market-data terminal session.
///
/// The caller owns the lifecycle: `start` once before the batch, `stop`
/// once after it.
pub trait FactorProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Open (authenticate) the session.
    fn start(&mut self) -> Result<(), ProviderError>;

    /// Close the session. Safe to call when not started.
    fn stop(&mut self);

    /// Fetch date-indexed factor values for one code.
    fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError>;
}
