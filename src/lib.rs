//! Account onboarding core for the Mira account manager.
//!
//! Owns the add-account dialog's state machine: OAuth (automated and
//! manually finished), pasted authorization codes, pasted token pairs,
//! batch refresh-token import, and database imports, plus the per-account
//! proxy override editor. Network, storage, and the OAuth exchange itself
//! live behind the [`modules::backend::AccountBackend`] boundary.

pub mod models;
pub mod modules;

pub use models::{
    Account, BatchOutcome, FlowState, FlowStatus, KiroCreditSummary, ModelQuota, OnboardingTab,
    PreparedOauthSession, Provider, QuotaData,
};
pub use modules::account_detail::ProxyOverrideEditor;
pub use modules::backend::{AccountBackend, BackendEvent, FilePicker};
pub use modules::onboarding::{FlowError, OnboardingController};
pub use modules::token_extractor::extract_refresh_tokens;
