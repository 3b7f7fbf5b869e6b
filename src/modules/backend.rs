//! Command boundary between the onboarding core and the account backend.
//!
//! The backend owns everything with a network or disk footprint: the OAuth
//! exchange, credential storage, quota retrieval, and database import
//! parsing. The core only sequences commands and consumes the two pushed
//! event streams.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::{Account, Provider};

/// Events the backend pushes without acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A prepared authorization URL is ready. Also returned from the
    /// prepare call directly; both paths converge, last write wins.
    OauthUrlGenerated(String),
    /// The local callback listener saw the browser redirect.
    OauthCallbackReceived,
}

/// Operations the onboarding controller invokes on the backend.
///
/// Every fallible method reports errors as human-readable strings; the
/// controller classifies them, the backend never panics through here.
#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn prepare_oauth_url(&self) -> Result<String, String>;
    async fn prepare_kiro_oauth_url(&self) -> Result<String, String>;

    /// Opens the system browser; completion arrives by event.
    async fn start_oauth_login(&self) -> Result<(), String>;
    async fn start_kiro_oauth_login(&self) -> Result<(), String>;

    /// Finalizes and persists the account for the pending flow. Fails with
    /// a token-missing error when no refresh token was obtained.
    async fn complete_oauth_login(&self) -> Result<(), String>;
    async fn complete_kiro_oauth_login(&self) -> Result<(), String>;

    /// Releases the reserved local callback listener.
    async fn cancel_oauth_login(&self) -> Result<(), String>;

    async fn submit_kiro_oauth_code(&self, code: &str) -> Result<(), String>;

    async fn manual_kiro_token_input(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: u64,
    ) -> Result<(), String>;

    /// Registers one account from a refresh token; used once per batch entry.
    async fn add_account(&self, email: &str, refresh_token: &str) -> Result<Account, String>;

    async fn fetch_accounts(&self) -> Result<Vec<Account>, String>;

    /// Sets or clears the per-account proxy override.
    async fn update_account_individual_proxy(
        &self,
        account_id: &str,
        proxy_url: Option<&str>,
    ) -> Result<(), String>;

    async fn import_from_db(&self) -> Result<(), String>;
    async fn import_v1_accounts(&self) -> Result<(), String>;
    async fn import_from_custom_db(&self, path: &Path) -> Result<(), String>;

    fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent>;
}

/// File-selection boundary for the external-database import. Hosts back it
/// with a native dialog filtered to `vscdb` plus an all-files escape hatch.
#[async_trait]
pub trait FilePicker: Send + Sync {
    async fn pick_database_file(&self) -> Option<PathBuf>;
}

/// Extension the database picker filters on.
pub const IMPORT_DB_EXTENSION: &str = "vscdb";

/// Phases of the OAuth flow that dispatch to provider-specific commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthPhase {
    Prepare,
    Start,
    Complete,
}

/// Concrete backend commands the OAuth flow resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingCommand {
    PrepareOauthUrl,
    PrepareKiroOauthUrl,
    StartOauthLogin,
    StartKiroOauthLogin,
    CompleteOauthLogin,
    CompleteKiroOauthLogin,
}

/// Lookup table mapping (provider, phase) to the concrete command.
pub fn oauth_command(provider: Provider, phase: OauthPhase) -> OnboardingCommand {
    match (provider, phase) {
        (Provider::Gemini, OauthPhase::Prepare) => OnboardingCommand::PrepareOauthUrl,
        (Provider::Gemini, OauthPhase::Start) => OnboardingCommand::StartOauthLogin,
        (Provider::Gemini, OauthPhase::Complete) => OnboardingCommand::CompleteOauthLogin,
        (Provider::Kiro, OauthPhase::Prepare) => OnboardingCommand::PrepareKiroOauthUrl,
        (Provider::Kiro, OauthPhase::Start) => OnboardingCommand::StartKiroOauthLogin,
        (Provider::Kiro, OauthPhase::Complete) => OnboardingCommand::CompleteKiroOauthLogin,
    }
}

/// Runs one OAuth command; prepare commands yield the authorization URL.
pub async fn dispatch_oauth(
    backend: &dyn AccountBackend,
    command: OnboardingCommand,
) -> Result<Option<String>, String> {
    match command {
        OnboardingCommand::PrepareOauthUrl => backend.prepare_oauth_url().await.map(Some),
        OnboardingCommand::PrepareKiroOauthUrl => backend.prepare_kiro_oauth_url().await.map(Some),
        OnboardingCommand::StartOauthLogin => backend.start_oauth_login().await.map(|_| None),
        OnboardingCommand::StartKiroOauthLogin => {
            backend.start_kiro_oauth_login().await.map(|_| None)
        }
        OnboardingCommand::CompleteOauthLogin => backend.complete_oauth_login().await.map(|_| None),
        OnboardingCommand::CompleteKiroOauthLogin => {
            backend.complete_kiro_oauth_login().await.map(|_| None)
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::models::QuotaData;

    /// Scriptable in-memory backend: records every call in order and fails
    /// the calls listed in `failures`.
    pub struct MockBackend {
        pub calls: Mutex<Vec<String>>,
        pub failures: Mutex<HashMap<String, String>>,
        pub events: broadcast::Sender<BackendEvent>,
    }

    impl MockBackend {
        pub fn new() -> std::sync::Arc<Self> {
            let (events, _) = broadcast::channel(16);
            std::sync::Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(HashMap::new()),
                events,
            })
        }

        pub fn fail_with(&self, call: &str, message: &str) {
            self.failures
                .lock()
                .expect("failures lock")
                .insert(call.to_string(), message.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub fn count_calls(&self, prefix: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }

        fn record(&self, call: &str) -> Result<(), String> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(call.to_string());
            let failures = self.failures.lock().expect("failures lock");
            if let Some(message) = failures.get(call) {
                return Err(message.clone());
            }
            if let Some((name, _)) = call.split_once(':') {
                if let Some(message) = failures.get(name) {
                    return Err(message.clone());
                }
            }
            Ok(())
        }

        fn account(email: &str) -> Account {
            Account {
                id: "acc-1".to_string(),
                email: email.to_string(),
                name: None,
                provider: Provider::Gemini,
                status: None,
                individual_proxy: None,
                quota: Some(QuotaData::default()),
                created_at: 0,
            }
        }
    }

    #[async_trait]
    impl AccountBackend for MockBackend {
        async fn prepare_oauth_url(&self) -> Result<String, String> {
            self.record("prepare_oauth_url")?;
            Ok("https://auth.example/gemini".to_string())
        }

        async fn prepare_kiro_oauth_url(&self) -> Result<String, String> {
            self.record("prepare_kiro_oauth_url")?;
            Ok("https://auth.example/kiro".to_string())
        }

        async fn start_oauth_login(&self) -> Result<(), String> {
            self.record("start_oauth_login")
        }

        async fn start_kiro_oauth_login(&self) -> Result<(), String> {
            self.record("start_kiro_oauth_login")
        }

        async fn complete_oauth_login(&self) -> Result<(), String> {
            self.record("complete_oauth_login")
        }

        async fn complete_kiro_oauth_login(&self) -> Result<(), String> {
            self.record("complete_kiro_oauth_login")
        }

        async fn cancel_oauth_login(&self) -> Result<(), String> {
            self.record("cancel_oauth_login")
        }

        async fn submit_kiro_oauth_code(&self, code: &str) -> Result<(), String> {
            self.record(&format!("submit_kiro_oauth_code:{}", code))
        }

        async fn manual_kiro_token_input(
            &self,
            access_token: &str,
            refresh_token: &str,
            expires_in: u64,
        ) -> Result<(), String> {
            self.record(&format!(
                "manual_kiro_token_input:{}:{}:{}",
                access_token, refresh_token, expires_in
            ))
        }

        async fn add_account(&self, email: &str, refresh_token: &str) -> Result<Account, String> {
            self.record(&format!("add_account:{}", refresh_token))?;
            Ok(Self::account(email))
        }

        async fn fetch_accounts(&self) -> Result<Vec<Account>, String> {
            self.record("fetch_accounts")?;
            Ok(vec![Self::account("user@example.com")])
        }

        async fn update_account_individual_proxy(
            &self,
            account_id: &str,
            proxy_url: Option<&str>,
        ) -> Result<(), String> {
            self.record(&format!(
                "update_account_individual_proxy:{}:{}",
                account_id,
                proxy_url.unwrap_or("<none>")
            ))
        }

        async fn import_from_db(&self) -> Result<(), String> {
            self.record("import_from_db")
        }

        async fn import_v1_accounts(&self) -> Result<(), String> {
            self.record("import_v1_accounts")
        }

        async fn import_from_custom_db(&self, path: &Path) -> Result<(), String> {
            self.record(&format!("import_from_custom_db:{}", path.display()))
        }

        fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent> {
            self.events.subscribe()
        }
    }

    /// Picker stub that returns a preset path (or nothing).
    pub struct MockFilePicker {
        pub selection: Option<PathBuf>,
        pub calls: Mutex<usize>,
    }

    impl MockFilePicker {
        pub fn selecting(path: &str) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                selection: Some(PathBuf::from(path)),
                calls: Mutex::new(0),
            })
        }

        pub fn dismissed() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                selection: None,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl FilePicker for MockFilePicker {
        async fn pick_database_file(&self) -> Option<PathBuf> {
            *self.calls.lock().expect("calls lock") += 1;
            self.selection.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_table_is_provider_exhaustive() {
        assert_eq!(
            oauth_command(Provider::Gemini, OauthPhase::Prepare),
            OnboardingCommand::PrepareOauthUrl
        );
        assert_eq!(
            oauth_command(Provider::Gemini, OauthPhase::Start),
            OnboardingCommand::StartOauthLogin
        );
        assert_eq!(
            oauth_command(Provider::Gemini, OauthPhase::Complete),
            OnboardingCommand::CompleteOauthLogin
        );
        assert_eq!(
            oauth_command(Provider::Kiro, OauthPhase::Prepare),
            OnboardingCommand::PrepareKiroOauthUrl
        );
        assert_eq!(
            oauth_command(Provider::Kiro, OauthPhase::Start),
            OnboardingCommand::StartKiroOauthLogin
        );
        assert_eq!(
            oauth_command(Provider::Kiro, OauthPhase::Complete),
            OnboardingCommand::CompleteKiroOauthLogin
        );
    }

    #[tokio::test]
    async fn dispatch_routes_prepare_to_url() {
        let backend = mock::MockBackend::new();
        let url = dispatch_oauth(backend.as_ref(), OnboardingCommand::PrepareKiroOauthUrl)
            .await
            .expect("prepare succeeds");
        assert_eq!(url.as_deref(), Some("https://auth.example/kiro"));
        assert_eq!(backend.calls(), vec!["prepare_kiro_oauth_url"]);
    }
}
