//! Best-effort webhook notifications.
//!
//! The core emits structured events; message text comes from config
//! templates. Delivery is fire-and-forget: failures only log, except a 401
//! from the sink, which disables that webhook for the rest of the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::config::WebhookConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    FileUpload,
    FileDelete,
    ForceFileDelete,
    FileRestore,
    UrlShorten,
    UrlDelete,
    ForceUrlDelete,
    ForceUserCreate,
    UserEdit,
    ForceUserEdit,
    AdminToggleOn,
    AdminToggleOff,
    ForceUserDelete,
    UserTokenReset,
    ForceUserTokenReset,
}

impl Event {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileUpload => "FILE_UPLOAD",
            Self::FileDelete => "FILE_DELETE",
            Self::ForceFileDelete => "FORCE_FILE_DELETE",
            Self::FileRestore => "FILE_RESTORE",
            Self::UrlShorten => "URL_SHORTEN",
            Self::UrlDelete => "URL_DELETE",
            Self::ForceUrlDelete => "FORCE_URL_DELETE",
            Self::ForceUserCreate => "FORCE_USER_CREATE",
            Self::UserEdit => "USER_EDIT",
            Self::ForceUserEdit => "FORCE_USER_EDIT",
            Self::AdminToggleOn => "ADMIN_TOGGLE_ON",
            Self::AdminToggleOff => "ADMIN_TOGGLE_OFF",
            Self::ForceUserDelete => "FORCE_USER_DELETE",
            Self::UserTokenReset => "USER_TOKEN_RESET",
            Self::ForceUserTokenReset => "FORCE_USER_TOKEN_RESET",
        }
    }
}

struct Hook {
    url: String,
    username: String,
    events: Vec<String>,
    disabled: AtomicBool,
}

#[derive(Clone)]
pub struct Notifier {
    enabled: bool,
    client: reqwest::Client,
    hooks: Arc<Vec<Hook>>,
    messages: Arc<HashMap<String, String>>,
}

impl Notifier {
    #[must_use]
    pub fn new(config: &WebhookConfig, client: reqwest::Client) -> Self {
        let hooks = config
            .hooks
            .iter()
            .map(|h| Hook {
                url: h.url.clone(),
                username: h.username.clone(),
                events: h.events.clone(),
                disabled: AtomicBool::new(false),
            })
            .collect();

        Self {
            enabled: config.enabled,
            client,
            hooks: Arc::new(hooks),
            messages: Arc::new(config.messages.clone()),
        }
    }

    /// Dispatch an event without waiting for delivery. Never fails.
    pub fn notify(&self, event: Event, fields: HashMap<String, String>) {
        if !self.enabled {
            return;
        }

        let Some(template) = self.messages.get(event.as_str()).cloned() else {
            return;
        };

        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.deliver(event, &template, &fields).await;
        });
    }

    async fn deliver(&self, event: Event, template: &str, fields: &HashMap<String, String>) {
        let Some(idx) = self.hooks.iter().position(|h| {
            !h.disabled.load(Ordering::Relaxed) && h.events.iter().any(|e| e == event.as_str())
        }) else {
            return;
        };

        let hook = &self.hooks[idx];
        let content = render(template, fields);

        let response = self
            .client
            .post(&hook.url)
            .json(&serde_json::json!({
                "content": content,
                "username": hook.username,
            }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                warn!("Webhook rejected our credentials, disabling it");
                hook.disabled.store(true, Ordering::Relaxed);
            }
            Ok(resp) if !resp.status().is_success() => {
                debug!("Webhook delivery returned {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Webhook delivery failed: {e}");
            }
        }
    }
}

/// Fill `{name}` placeholders from the field map. Unknown placeholders are
/// left as-is.
#[must_use]
pub fn render(template: &str, fields: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (name, value) in fields {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
