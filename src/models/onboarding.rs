use serde::{Deserialize, Serialize};

/// Account providers that can be onboarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Kiro,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Kiro => "kiro",
        }
    }

    /// Tab shown when the provider is selected.
    pub fn default_tab(&self) -> OnboardingTab {
        match self {
            Provider::Gemini => OnboardingTab::OAuth,
            Provider::Kiro => OnboardingTab::Manual,
        }
    }

    /// Tabs offered in the provider's tab strip. Kiro additionally accepts
    /// the OAuth tab when the host surfaces the prepared-URL panel (the
    /// code-paste path lives there).
    pub fn available_tabs(&self) -> &'static [OnboardingTab] {
        match self {
            Provider::Gemini => &[
                OnboardingTab::OAuth,
                OnboardingTab::Token,
                OnboardingTab::Import,
            ],
            Provider::Kiro => &[OnboardingTab::Manual, OnboardingTab::Import],
        }
    }

    pub fn accepts_tab(&self, tab: OnboardingTab) -> bool {
        tab == OnboardingTab::OAuth || self.available_tabs().contains(&tab)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingTab {
    OAuth,
    Token,
    Import,
    Manual,
}

/// Per-attempt lifecycle of whatever flow is active in the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// A backend-reserved authorization URL plus its local callback listener.
/// At most one is live per dialog instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedOauthSession {
    pub provider: Provider,
    pub url: String,
    pub consumed: bool,
}

impl PreparedOauthSession {
    pub fn new(provider: Provider, url: String) -> Self {
        Self {
            provider,
            url,
            consumed: false,
        }
    }
}

/// Everything the add-account dialog needs to render one attempt.
///
/// Created when the dialog opens, reset on open and on every tab change,
/// discarded on close. The controller owns it behind a shared cell so that
/// long-lived event handlers always observe the current value.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub dialog_id: String,
    pub is_open: bool,
    pub provider: Provider,
    pub active_tab: OnboardingTab,
    pub status: FlowStatus,
    pub message: String,
    pub oauth: Option<PreparedOauthSession>,
    /// Batch paste area for refresh tokens.
    pub token_input: String,
    /// Kiro authorization code or full callback URL.
    pub manual_code: String,
    pub manual_access_token: String,
    pub manual_refresh_token: String,
}

impl Default for FlowState {
    fn default() -> Self {
        Self::new(Provider::Kiro)
    }
}

impl FlowState {
    pub fn new(provider: Provider) -> Self {
        Self {
            dialog_id: String::new(),
            is_open: false,
            provider,
            active_tab: provider.default_tab(),
            status: FlowStatus::Idle,
            message: String::new(),
            oauth: None,
            token_input: String::new(),
            manual_code: String::new(),
            manual_access_token: String::new(),
            manual_refresh_token: String::new(),
        }
    }

    /// Clears every per-attempt field. Provider, tab, and dialog identity
    /// survive a reset; they change through their own transitions.
    pub fn reset(&mut self) {
        self.status = FlowStatus::Idle;
        self.message.clear();
        self.oauth = None;
        self.token_input.clear();
        self.manual_code.clear();
        self.manual_access_token.clear();
        self.manual_refresh_token.clear();
    }

    pub fn oauth_url(&self) -> Option<&str> {
        self.oauth.as_ref().map(|session| session.url.as_str())
    }
}

/// Result of one batch refresh-token submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Full { added: usize },
    Partial { added: usize, failed: usize },
    Failed { attempted: usize },
}

impl BatchOutcome {
    pub fn classify(added: usize, failed: usize) -> Self {
        if failed == 0 {
            BatchOutcome::Full { added }
        } else if added > 0 {
            BatchOutcome::Partial { added, failed }
        } else {
            BatchOutcome::Failed { attempted: failed }
        }
    }

    /// Full success is the only outcome that auto-closes the dialog.
    pub fn closes_dialog(&self) -> bool {
        matches!(self, BatchOutcome::Full { .. })
    }
}
