use serde::{Deserialize, Serialize};

use super::onboarding::Provider;

/// Pseudo-model names Kiro quota data uses to smuggle credit counters
/// through the per-model list. Their payload rides in `reset_time`.
const KIRO_CREDITS: &str = "kiro-credits";
const KIRO_MONTHLY_LIMIT: &str = "kiro-monthly-limit";
const KIRO_MONTHLY_USED: &str = "kiro-monthly-used";
const KIRO_TRIAL_LIMIT: &str = "kiro-trial-limit";
const KIRO_TRIAL_USED: &str = "kiro-trial-used";
const KIRO_TRIAL_STATUS: &str = "kiro-trial-status";

/// One account in the local registry, as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub provider: Provider,
    #[serde(default)]
    pub status: Option<String>,
    /// Per-account proxy override; `None` means the global proxy applies.
    #[serde(default)]
    pub individual_proxy: Option<String>,
    #[serde(default)]
    pub quota: Option<QuotaData>,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaData {
    #[serde(default)]
    pub models: Vec<ModelQuota>,
    #[serde(default)]
    pub fetched_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelQuota {
    pub name: String,
    /// Remaining quota in percent, 0-100.
    pub percentage: i64,
    /// Reset timestamp for real models; for `kiro-*` pseudo entries this
    /// carries the raw counter or status text instead.
    #[serde(default)]
    pub reset_time: String,
}

impl QuotaData {
    pub fn find_model(&self, name: &str) -> Option<&ModelQuota> {
        self.models.iter().find(|model| model.name == name)
    }

    fn pseudo_number(&self, name: &str) -> f64 {
        self.find_model(name)
            .and_then(|model| model.reset_time.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

/// Per-model entries suitable for display: Kiro's `kiro-*` pseudo entries
/// are bookkeeping, not models, and are filtered out.
pub fn visible_models(provider: Provider, quota: &QuotaData) -> Vec<&ModelQuota> {
    quota
        .models
        .iter()
        .filter(|model| provider != Provider::Kiro || !model.name.starts_with("kiro-"))
        .collect()
}

/// Credit counters decoded from a Kiro account's pseudo-model entries.
#[derive(Debug, Clone, PartialEq)]
pub struct KiroCreditSummary {
    pub credits_percentage: i64,
    pub credits_reset_time: Option<String>,
    pub monthly_limit: f64,
    pub monthly_used: f64,
    pub trial_limit: f64,
    pub trial_used: f64,
    pub trial_active: bool,
}

impl KiroCreditSummary {
    pub fn from_quota(quota: &QuotaData) -> Self {
        let credits = quota.find_model(KIRO_CREDITS);
        let trial_limit = quota.pseudo_number(KIRO_TRIAL_LIMIT);
        let trial_status = quota
            .find_model(KIRO_TRIAL_STATUS)
            .map(|model| model.reset_time.trim().to_string())
            .unwrap_or_default();

        Self {
            credits_percentage: credits.map(|model| model.percentage).unwrap_or(0),
            credits_reset_time: credits
                .map(|model| model.reset_time.clone())
                .filter(|value| !value.is_empty()),
            monthly_limit: quota.pseudo_number(KIRO_MONTHLY_LIMIT),
            monthly_used: quota.pseudo_number(KIRO_MONTHLY_USED),
            trial_limit,
            trial_used: quota.pseudo_number(KIRO_TRIAL_USED),
            trial_active: trial_status == "ACTIVE" && trial_limit > 0.0,
        }
    }

    pub fn monthly_remaining(&self) -> f64 {
        self.monthly_limit - self.monthly_used
    }

    pub fn trial_remaining(&self) -> f64 {
        self.trial_limit - self.trial_used
    }
}
