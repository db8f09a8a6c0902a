//! factorsync core: incremental factor fetching.
//!
//! - Field names, field groups and presence tracking
//! - Date-indexed factor tables with outer-join merge and CSV I/O
//! - Per-code CSV store
//! - Provider trait and the HTTP gateway client for the terminal API
//! - Fixed-delay retry, the fetcher itself and progress reporting

pub mod config;
pub mod fetcher;
pub mod fields;
pub mod gateway;
pub mod progress;
pub mod provider;
pub mod retry;
pub mod roster;
pub mod store;
pub mod table;

pub use config::{ConfigError, EscalationPolicy, FetchConfig};
pub use fetcher::{FactorFetcher, FetchError, Outcome, RunSummary};
pub use fields::{FieldGroup, FieldName, FieldPresence};
pub use gateway::GatewayProvider;
pub use progress::{FetchProgress, LogProgress};
pub use provider::{FactorProvider, FetchRequest, ProviderError, ProviderReply};
pub use retry::RetryPolicy;
pub use roster::{Roster, RosterError};
pub use store::{CodeStatus, FactorStore, StoreError};
pub use table::{FactorTable, TableError};
