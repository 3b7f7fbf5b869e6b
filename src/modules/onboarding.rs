//! Add-account dialog controller.
//!
//! Orchestrates the onboarding flows (automated OAuth, manual code/URL,
//! manual token pair, batch refresh tokens, database imports) against the
//! backend boundary. One flow attempt is in flight per dialog instance at a
//! time; backend-pushed events are consumed for the controller's lifetime
//! and always read the current flow state through the shared cell, never a
//! captured copy.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::{
    BatchOutcome, FlowState, FlowStatus, OnboardingTab, PreparedOauthSession, Provider,
};
use crate::modules::backend::{
    dispatch_oauth, oauth_command, AccountBackend, BackendEvent, FilePicker, OauthPhase,
};
use crate::modules::config;
use crate::modules::logger;
use crate::modules::token_extractor::extract_refresh_tokens;

/// Expiry submitted with a manually pasted token pair, in seconds.
pub const MANUAL_TOKEN_EXPIRES_IN: u64 = 3600;

/// Placeholder base for callback fragments pasted without a scheme.
const CALLBACK_PLACEHOLDER_BASE: &str = "http://localhost:3128";

const ACTION_OAUTH: &str = "OAuth sign-in";
const ACTION_SUBMIT_CODE: &str = "Submit authorization code";
const ACTION_MANUAL_TOKENS: &str = "Add Kiro account";
const ACTION_IMPORT_DB: &str = "Import from database";
const ACTION_IMPORT_V1: &str = "Import v1 accounts";
const ACTION_IMPORT_CUSTOM: &str = "Import custom database";

const MSG_CODE_REQUIRED: &str = "Please enter the authorization code or callback URL";
const MSG_TOKEN_PAIR_REQUIRED: &str = "Please enter both Access Token and Refresh Token";
const MSG_TOKEN_REQUIRED: &str = "Please paste at least one refresh token";
const MSG_NO_TOKENS_FOUND: &str = "No valid refresh token found in the input";
const MSG_BATCH_ALL_FAILED: &str = "Failed to add any account, check the tokens and retry";

/// Error classes surfaced by a flow attempt. The display string is what the
/// dialog shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// Input rejected before any backend call.
    #[error("{0}")]
    Validation(String),
    /// The exchange yielded no refresh token; the backend message carries
    /// remediation steps, so it is shown verbatim.
    #[error("{0}")]
    TokenMissing(String),
    /// Backend or host runtime unavailable.
    #[error("Environment error: {0}")]
    Environment(String),
    #[error("{action} failed: {raw}")]
    Backend { action: String, raw: String },
}

fn classify_backend_error(action: &str, raw: &str) -> FlowError {
    if raw.contains("Refresh Token") || raw.contains("refresh_token") {
        FlowError::TokenMissing(raw.to_string())
    } else if raw.contains("Tauri") || raw.to_lowercase().contains("environment") {
        FlowError::Environment(raw.to_string())
    } else {
        FlowError::Backend {
            action: action.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Pulls the authorization code out of pasted input.
///
/// Accepts a bare code, a full callback URL, or a path-and-query fragment;
/// anything that fails URL parsing is treated as the code itself.
fn extract_authorization_code(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.contains("code=") {
        return trimmed.to_string();
    }

    let candidate = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("{}{}", CALLBACK_PLACEHOLDER_BASE, trimmed)
    };

    match url::Url::parse(&candidate) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| trimmed.to_string()),
        Err(_) => trimmed.to_string(),
    }
}

pub struct OnboardingController {
    backend: Arc<dyn AccountBackend>,
    picker: Arc<dyn FilePicker>,
    state: Arc<Mutex<FlowState>>,
    auto_close_delay: Duration,
    batch_delay: Duration,
    auto_close_task: Mutex<Option<JoinHandle<()>>>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
    self_ref: OnceLock<Weak<Self>>,
}

impl OnboardingController {
    /// Builds a controller with timings and default provider from the user
    /// config. Must run inside a tokio runtime (the event pump is spawned
    /// here).
    pub fn new(backend: Arc<dyn AccountBackend>, picker: Arc<dyn FilePicker>) -> Arc<Self> {
        let config = config::get_config();
        Self::with_settings(
            backend,
            picker,
            config.default_provider,
            Duration::from_millis(config.auto_close_ms),
            Duration::from_millis(config.batch_submit_delay_ms),
        )
    }

    pub fn with_settings(
        backend: Arc<dyn AccountBackend>,
        picker: Arc<dyn FilePicker>,
        default_provider: Provider,
        auto_close_delay: Duration,
        batch_delay: Duration,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            backend,
            picker,
            state: Arc::new(Mutex::new(FlowState::new(default_provider))),
            auto_close_delay,
            batch_delay,
            auto_close_task: Mutex::new(None),
            event_pump: Mutex::new(None),
            self_ref: OnceLock::new(),
        });
        let _ = controller.self_ref.set(Arc::downgrade(&controller));
        controller.spawn_event_pump();
        controller
    }

    /// Snapshot for rendering.
    pub fn state(&self) -> FlowState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    pub fn set_token_input(&self, value: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.token_input = value.into();
        }
    }

    pub fn set_manual_code(&self, value: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.manual_code = value.into();
        }
    }

    pub fn set_manual_access_token(&self, value: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.manual_access_token = value.into();
        }
    }

    pub fn set_manual_refresh_token(&self, value: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.manual_refresh_token = value.into();
        }
    }

    /// Opens (or re-opens) the dialog: fresh instance id, clean state, and
    /// an OAuth URL prepared when the landing tab needs one.
    pub async fn open(&self) {
        let (dialog_id, provider, tab) = {
            let Ok(mut state) = self.state.lock() else { return };
            state.dialog_id = uuid::Uuid::new_v4().to_string();
            state.is_open = true;
            state.reset();
            (state.dialog_id.clone(), state.provider, state.active_tab)
        };
        self.abort_auto_close();
        logger::log_info(&format!(
            "[Onboarding] Dialog opened: dialog_id={}, provider={}",
            dialog_id,
            provider.as_str()
        ));
        if tab == OnboardingTab::OAuth {
            self.ensure_oauth_url_prepared().await;
        }
    }

    /// Closes the dialog, canceling any live OAuth session or in-flight
    /// OAuth attempt (best effort, exactly one cancel call).
    pub async fn close(&self) {
        let (needs_cancel, dialog_id) = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            let live_session = state
                .oauth
                .take()
                .map(|session| !session.consumed)
                .unwrap_or(false);
            let mid_oauth = state.status == FlowStatus::Loading
                && state.active_tab == OnboardingTab::OAuth;
            let dialog_id = state.dialog_id.clone();
            state.is_open = false;
            state.reset();
            (live_session || mid_oauth, dialog_id)
        };
        self.abort_auto_close();
        if needs_cancel {
            if let Err(err) = self.backend.cancel_oauth_login().await {
                // Cancel failures are swallowed by design; the state reset
                // above already prevents URL reuse.
                logger::log_debug(&format!(
                    "[Onboarding] cancel_oauth_login failed (ignored): {}",
                    err
                ));
            }
        }
        logger::log_info(&format!(
            "[Onboarding] Dialog closed: dialog_id={}",
            dialog_id
        ));
    }

    /// Switches tabs. Always resets the attempt state; leaving the OAuth
    /// tab releases the prepared session first.
    pub async fn select_tab(&self, tab: OnboardingTab) {
        let leaving_session = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open || state.active_tab == tab {
                return;
            }
            if !state.provider.accepts_tab(tab) {
                logger::log_warn(&format!(
                    "[Onboarding] Tab {:?} is not available for provider {}",
                    tab,
                    state.provider.as_str()
                ));
                return;
            }
            let leaving = tab != OnboardingTab::OAuth
                && state
                    .oauth
                    .take()
                    .map(|session| !session.consumed)
                    .unwrap_or(false);
            state.active_tab = tab;
            state.reset();
            leaving
        };
        if leaving_session {
            if let Err(err) = self.backend.cancel_oauth_login().await {
                logger::log_debug(&format!(
                    "[Onboarding] cancel_oauth_login failed (ignored): {}",
                    err
                ));
            }
        }
        if tab == OnboardingTab::OAuth {
            self.ensure_oauth_url_prepared().await;
        }
    }

    /// Switches providers: releases the old session, lands on the new
    /// provider's default tab, and prepares an authorization URL (Gemini
    /// lands on the OAuth tab; Kiro pre-generates so the code-paste panel
    /// has a URL to show).
    pub async fn select_provider(&self, provider: Provider) {
        let had_session = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open || state.provider == provider {
                return;
            }
            let had = state
                .oauth
                .take()
                .map(|session| !session.consumed)
                .unwrap_or(false);
            state.provider = provider;
            state.active_tab = provider.default_tab();
            state.reset();
            had
        };
        if had_session {
            if let Err(err) = self.backend.cancel_oauth_login().await {
                logger::log_debug(&format!(
                    "[Onboarding] cancel_oauth_login failed (ignored): {}",
                    err
                ));
            }
        }
        self.ensure_oauth_url_prepared().await;
    }

    /// Requests a prepared authorization URL unless one already exists for
    /// the current provider. Failures stay off the status line; starting
    /// the flow surfaces its own error.
    pub async fn ensure_oauth_url_prepared(&self) {
        let provider = {
            let Ok(state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            if let Some(session) = &state.oauth {
                if session.provider == state.provider {
                    return;
                }
            }
            state.provider
        };

        let command = oauth_command(provider, OauthPhase::Prepare);
        match dispatch_oauth(self.backend.as_ref(), command).await {
            Ok(Some(url)) if !url.is_empty() => {
                if let Ok(mut state) = self.state.lock() {
                    if state.is_open {
                        state.oauth = Some(PreparedOauthSession::new(provider, url));
                    }
                }
                logger::log_info(&format!(
                    "[Onboarding] OAuth URL prepared: provider={}",
                    provider.as_str()
                ));
            }
            Ok(_) => {}
            Err(err) => {
                logger::log_error(&format!(
                    "[Onboarding] Failed to prepare OAuth URL: {}",
                    err
                ));
            }
        }
    }

    /// Default OAuth path: the backend opens the browser and resolves once
    /// the callback lands.
    pub async fn start_oauth(&self) {
        let Some(provider) = self.current_provider_if_open() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_OAUTH, false, move || async move {
            dispatch_oauth(backend.as_ref(), oauth_command(provider, OauthPhase::Start)).await?;
            Ok(())
        })
        .await;
    }

    /// Manual OAuth finish: the user already authorized in an external
    /// browser; exchange and persist, then refresh the registry.
    pub async fn finish_oauth(&self) {
        let Some(provider) = self.current_provider_if_open() else {
            return;
        };
        self.complete_oauth_flow(provider).await;
    }

    /// Kiro-only: submit a pasted authorization code or callback URL.
    pub async fn submit_manual_code(&self) {
        let raw = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            if state.provider != Provider::Kiro {
                logger::log_warn("[Onboarding] Manual code submission is Kiro-only");
                return;
            }
            if matches!(state.status, FlowStatus::Loading | FlowStatus::Success) {
                return;
            }
            let raw = state.manual_code.trim().to_string();
            if raw.is_empty() {
                fail_validation(&mut state, MSG_CODE_REQUIRED);
                return;
            }
            raw
        };

        let code = extract_authorization_code(&raw);
        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_SUBMIT_CODE, false, move || async move {
            backend.submit_kiro_oauth_code(&code).await?;
            backend.fetch_accounts().await?;
            Ok(())
        })
        .await;
    }

    /// Kiro-only: register an account directly from a pasted token pair.
    pub async fn submit_manual_tokens(&self) {
        let (access_token, refresh_token) = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            if state.provider != Provider::Kiro {
                logger::log_warn("[Onboarding] Manual token input is Kiro-only");
                return;
            }
            if matches!(state.status, FlowStatus::Loading | FlowStatus::Success) {
                return;
            }
            let access_token = state.manual_access_token.trim().to_string();
            let refresh_token = state.manual_refresh_token.trim().to_string();
            if access_token.is_empty() || refresh_token.is_empty() {
                fail_validation(&mut state, MSG_TOKEN_PAIR_REQUIRED);
                return;
            }
            (access_token, refresh_token)
        };

        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_MANUAL_TOKENS, true, move || async move {
            backend
                .manual_kiro_token_input(&access_token, &refresh_token, MANUAL_TOKEN_EXPIRES_IN)
                .await?;
            backend.fetch_accounts().await?;
            Ok(())
        })
        .await;
    }

    /// Batch path: extract tokens from the paste area and submit each as an
    /// independent account-add, strictly in order. Per-entry failures are
    /// counted, never aborting the rest of the batch.
    pub async fn submit_token_batch(&self) {
        let input = {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            if matches!(state.status, FlowStatus::Loading | FlowStatus::Success) {
                logger::log_debug("[Onboarding] Batch submit ignored while busy");
                return;
            }
            if state.token_input.trim().is_empty() {
                fail_validation(&mut state, MSG_TOKEN_REQUIRED);
                return;
            }
            state.status = FlowStatus::Loading;
            state.message.clear();
            state.token_input.clone()
        };

        let tokens = extract_refresh_tokens(&input);
        if tokens.is_empty() {
            if let Ok(mut state) = self.state.lock() {
                fail_validation(&mut state, MSG_NO_TOKENS_FOUND);
            }
            return;
        }

        let total = tokens.len();
        let mut added = 0usize;
        let mut failed = 0usize;

        for (index, token) in tokens.iter().enumerate() {
            if let Ok(mut state) = self.state.lock() {
                state.message = format!("Adding account {}/{}...", index + 1, total);
            }
            match self.backend.add_account("", token).await {
                Ok(account) => {
                    added += 1;
                    logger::log_info(&format!(
                        "[Onboarding] Batch entry {}/{} added: {}",
                        index + 1,
                        total,
                        account.email
                    ));
                }
                Err(err) => {
                    failed += 1;
                    logger::log_error(&format!(
                        "[Onboarding] Batch entry {}/{} failed: {}",
                        index + 1,
                        total,
                        err
                    ));
                }
            }
            // Pace submissions; the backend never sees concurrent adds.
            tokio::time::sleep(self.batch_delay).await;
        }

        let outcome = BatchOutcome::classify(added, failed);
        if let Ok(mut state) = self.state.lock() {
            match outcome {
                BatchOutcome::Full { added } => {
                    state.status = FlowStatus::Success;
                    state.message = format!("Added {} account(s)!", added);
                }
                BatchOutcome::Partial { added, failed } => {
                    // Still green, but the dialog stays open so the user
                    // sees the failure count.
                    state.status = FlowStatus::Success;
                    state.message = format!("Added {} account(s), {} failed", added, failed);
                }
                BatchOutcome::Failed { .. } => {
                    state.status = FlowStatus::Error;
                    state.message = MSG_BATCH_ALL_FAILED.to_string();
                }
            }
        }
        if outcome.closes_dialog() {
            self.schedule_auto_close();
        }
    }

    pub async fn import_from_db(&self) {
        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_IMPORT_DB, true, move || async move {
            backend.import_from_db().await
        })
        .await;
    }

    pub async fn import_v1_accounts(&self) {
        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_IMPORT_V1, true, move || async move {
            backend.import_v1_accounts().await
        })
        .await;
    }

    /// External-file import: only proceeds when the picker returns a path.
    pub async fn import_from_custom_db(&self) {
        if self.current_provider_if_open().is_none() {
            return;
        }
        let Some(path) = self.picker.pick_database_file().await else {
            logger::log_debug("[Onboarding] Custom DB import aborted: no file selected");
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.run_action(ACTION_IMPORT_CUSTOM, true, move || async move {
            backend.import_from_custom_db(&path).await
        })
        .await;
    }

    fn current_provider_if_open(&self) -> Option<Provider> {
        let state = self.state.lock().ok()?;
        state.is_open.then_some(state.provider)
    }

    async fn complete_oauth_flow(&self, provider: Provider) {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        self.run_action(ACTION_OAUTH, false, move || async move {
            dispatch_oauth(backend.as_ref(), oauth_command(provider, OauthPhase::Complete))
                .await?;
            if let Ok(mut state) = state.lock() {
                if let Some(session) = state.oauth.as_mut() {
                    session.consumed = true;
                }
            }
            backend.fetch_accounts().await?;
            Ok(())
        })
        .await;
    }

    /// Shared Begin/Execute/Resolve envelope. Begin guards re-entry and
    /// sets the loading message; Resolve classifies errors and schedules
    /// the auto-close on success.
    async fn run_action<F, Fut>(&self, action: &str, clear_oauth_url: bool, op: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        {
            let Ok(mut state) = self.state.lock() else { return };
            if !state.is_open {
                return;
            }
            if matches!(state.status, FlowStatus::Loading | FlowStatus::Success) {
                logger::log_debug(&format!(
                    "[Onboarding] {} ignored while {:?}",
                    action, state.status
                ));
                return;
            }
            state.status = FlowStatus::Loading;
            state.message = format!("{}...", action);
            if clear_oauth_url {
                state.oauth = None;
            }
        }

        match op().await {
            Ok(()) => {
                if let Ok(mut state) = self.state.lock() {
                    state.status = FlowStatus::Success;
                    state.message = format!("{} succeeded!", action);
                }
                self.schedule_auto_close();
            }
            Err(raw) => {
                logger::log_error(&format!("[Onboarding] {} failed: {}", action, raw));
                let error = classify_backend_error(action, &raw);
                if let Ok(mut state) = self.state.lock() {
                    state.status = FlowStatus::Error;
                    state.message = error.to_string();
                }
            }
        }
    }

    /// Backend saw the browser callback. Completion fires only when the
    /// dialog is open on the OAuth tab with a prepared URL and no attempt
    /// already running; anything else is a stale signal from an earlier
    /// dialog instance.
    async fn handle_oauth_callback_received(&self) {
        let provider = {
            let Ok(state) = self.state.lock() else { return };
            if !state.is_open
                || state.active_tab != OnboardingTab::OAuth
                || matches!(state.status, FlowStatus::Loading | FlowStatus::Success)
                || state.oauth.is_none()
            {
                logger::log_debug(&format!(
                    "[Onboarding] Stale oauth-callback-received ignored: dialog_id={}, open={}, tab={:?}, status={:?}",
                    state.dialog_id, state.is_open, state.active_tab, state.status
                ));
                return;
            }
            state.provider
        };
        logger::log_info("[Onboarding] Callback received, auto-completing OAuth flow");
        self.complete_oauth_flow(provider).await;
    }

    /// URL may arrive by event as well as by direct return; last write
    /// wins, duplicates are harmless.
    fn handle_oauth_url_generated(&self, url: String) {
        let Ok(mut state) = self.state.lock() else { return };
        if !state.is_open || url.is_empty() {
            return;
        }
        let provider = state.provider;
        state.oauth = Some(PreparedOauthSession::new(provider, url));
    }

    fn spawn_event_pump(&self) {
        let Some(weak) = self.self_ref.get().cloned() else {
            return;
        };
        let mut events = self.backend.subscribe_events();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BackendEvent::OauthUrlGenerated(url)) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.handle_oauth_url_generated(url);
                    }
                    Ok(BackendEvent::OauthCallbackReceived) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.handle_oauth_callback_received().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        logger::log_warn(&format!(
                            "[Onboarding] Event stream lagged, {} events dropped",
                            skipped
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Ok(mut slot) = self.event_pump.lock() {
            *slot = Some(handle);
        }
    }

    fn schedule_auto_close(&self) {
        let Some(weak) = self.self_ref.get().cloned() else {
            return;
        };
        let delay = self.auto_close_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = weak.upgrade() else { return };
            let still_success = controller
                .state
                .lock()
                .map(|state| state.is_open && state.status == FlowStatus::Success)
                .unwrap_or(false);
            if still_success {
                controller.close().await;
            }
        });
        if let Ok(mut slot) = self.auto_close_task.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    fn abort_auto_close(&self) {
        if let Ok(mut slot) = self.auto_close_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for OnboardingController {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.event_pump.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        if let Ok(mut slot) = self.auto_close_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

fn fail_validation(state: &mut FlowState, message: &str) {
    state.status = FlowStatus::Error;
    state.message = FlowError::Validation(message.to_string()).to_string();
}
