pub mod account;
pub mod onboarding;

pub use account::{visible_models, Account, KiroCreditSummary, ModelQuota, QuotaData};
pub use onboarding::{
    BatchOutcome, FlowState, FlowStatus, OnboardingTab, PreparedOauthSession, Provider,
};
