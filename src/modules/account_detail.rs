//! Account detail editing: the per-account proxy override.
//!
//! Small by design. The editor keeps a local draft, pushes it through the
//! backend on save, and reports the result as a transient notice. A failed
//! save leaves the draft untouched so the user can retry; there is no
//! automatic retry.

use std::sync::{Arc, Mutex};

use crate::models::Account;
use crate::modules::backend::AccountBackend;
use crate::modules::logger;

/// One-shot save result, consumed by the next render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveNotice {
    pub success: bool,
    pub message: String,
    pub at: i64,
}

impl SaveNotice {
    fn now(success: bool, message: String) -> Self {
        Self {
            success,
            message,
            at: chrono::Utc::now().timestamp(),
        }
    }
}

pub struct ProxyOverrideEditor {
    backend: Arc<dyn AccountBackend>,
    account_id: String,
    draft: Mutex<String>,
    notice: Mutex<Option<SaveNotice>>,
}

impl ProxyOverrideEditor {
    pub fn for_account(backend: Arc<dyn AccountBackend>, account: &Account) -> Self {
        Self {
            backend,
            account_id: account.id.clone(),
            draft: Mutex::new(account.individual_proxy.clone().unwrap_or_default()),
            notice: Mutex::new(None),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn draft(&self) -> String {
        self.draft
            .lock()
            .map(|draft| draft.clone())
            .unwrap_or_default()
    }

    pub fn set_draft(&self, value: impl Into<String>) {
        if let Ok(mut draft) = self.draft.lock() {
            *draft = value.into();
        }
    }

    /// Sends the current draft to the backend; an empty draft clears the
    /// override. Returns whether the save succeeded.
    pub async fn save(&self) -> bool {
        let trimmed = self.draft().trim().to_string();
        let proxy_url = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        };
        self.push(proxy_url).await
    }

    /// Clears the override without touching the draft first; the draft is
    /// emptied only once the backend confirms.
    pub async fn clear(&self) -> bool {
        let cleared = self.push(None).await;
        if cleared {
            self.set_draft("");
        }
        cleared
    }

    pub fn take_notice(&self) -> Option<SaveNotice> {
        self.notice.lock().ok().and_then(|mut notice| notice.take())
    }

    async fn push(&self, proxy_url: Option<String>) -> bool {
        let result = self
            .backend
            .update_account_individual_proxy(&self.account_id, proxy_url.as_deref())
            .await;

        let notice = match result {
            Ok(()) => {
                let message = if proxy_url.is_some() {
                    "Proxy override saved".to_string()
                } else {
                    "Proxy override cleared".to_string()
                };
                logger::log_info(&format!(
                    "[AccountDetail] Proxy override updated: account_id={}",
                    self.account_id
                ));
                SaveNotice::now(true, message)
            }
            Err(err) => {
                logger::log_error(&format!(
                    "[AccountDetail] Proxy override update failed: account_id={}, error={}",
                    self.account_id, err
                ));
                SaveNotice::now(false, format!("Failed to update proxy override: {}", err))
            }
        };

        let success = notice.success;
        if let Ok(mut slot) = self.notice.lock() {
            *slot = Some(notice);
        }
        success
    }
}
