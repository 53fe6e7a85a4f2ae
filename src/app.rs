//! Application controller — wires the REST client, the AI optimizer, and
//! guarded controls, and turns outcomes into notices.
//!
//! DESIGN
//! ======
//! Each user action is a `handle_*` method: validate input, run the call
//! through the control's `ReentrancyGuard`, report the outcome through the
//! `Notifier`, and hand the value back to the caller (or `None` when there
//! is nothing to show). Failures never escape as errors; they become
//! notices, with `Cancelled` kept silent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::config::Cooldowns;
use crate::models::{Credentials, Note, NoteDraft, NoteError};
use crate::net::api::ApiClient;
use crate::net::types::ApiError;
use crate::services::ai::{AiError, AiOptimizer, OptimizationResult, OptimizeMode};
use crate::ui::guard::{Control, GuardConfig, GuardKind, Invocation, ReentrancyGuard};
use crate::ui::notice::{Notice, Notifier, ai_failure_notice, failure_notice};

pub const LOGIN_REQUIRED: &str = "请先登录";
pub const CONTENT_REQUIRED: &str = "请先输入笔记内容";

/// The buttons whose clicks the app guards.
#[derive(Clone)]
pub struct Controls {
    pub optimize: Arc<dyn Control>,
    pub save: Arc<dyn Control>,
    pub delete: Arc<dyn Control>,
}

struct Guards {
    optimize: ReentrancyGuard,
    save: ReentrancyGuard,
    delete: ReentrancyGuard,
}

impl Guards {
    fn build(cooldowns: &Cooldowns, controls: Option<Controls>) -> Self {
        let make = |kind, control: Option<Arc<dyn Control>>| {
            let config = GuardConfig::for_kind(kind, cooldowns);
            match control {
                Some(control) => ReentrancyGuard::new(config, control),
                None => ReentrancyGuard::detached(config),
            }
        };
        let (optimize, save, delete) = match controls {
            Some(c) => (Some(c.optimize), Some(c.save), Some(c.delete)),
            None => (None, None, None),
        };
        Self {
            optimize: make(GuardKind::Ai, optimize),
            save: make(GuardKind::Persist, save),
            delete: make(GuardKind::Persist, delete),
        }
    }
}

pub struct NotesApp {
    api: ApiClient,
    ai: AiOptimizer,
    guards: Guards,
    cooldowns: Cooldowns,
    logged_in: AtomicBool,
    notifier: Arc<dyn Notifier>,
}

impl NotesApp {
    /// An app with guards that are not attached to any control.
    #[must_use]
    pub fn new(api: ApiClient, cooldowns: Cooldowns, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ai: AiOptimizer::new(api.clone()),
            api,
            guards: Guards::build(&cooldowns, None),
            cooldowns,
            logged_in: AtomicBool::new(false),
            notifier,
        }
    }

    /// Attach the buttons the guards should drive.
    #[must_use]
    pub fn with_controls(mut self, controls: Controls) -> Self {
        self.guards = Guards::build(&self.cooldowns, Some(controls));
        self
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn optimizer(&self) -> &AiOptimizer {
        &self.ai
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Refresh the login flag from `GET /config`. A failed call counts as
    /// logged out.
    pub async fn check_login_status(&self) -> bool {
        let logged_in = match self.api.config().await {
            Ok(config) => config.logged_in,
            Err(e) => {
                warn!(error = %e, "app: login status check failed");
                false
            }
        };
        self.logged_in.store(logged_in, Ordering::SeqCst);
        logged_in
    }

    /// # Errors
    ///
    /// Returns the backend's error after reporting it.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), ApiError> {
        match self.api.login(credentials).await {
            Ok(_) => {
                self.logged_in.store(true, Ordering::SeqCst);
                info!(api_url = %credentials.api_url, model = %credentials.model, "app: logged in");
                self.notify(Notice::Success("登录成功".into()));
                Ok(())
            }
            Err(e) => {
                self.notify(failure_notice(&e));
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// Returns the backend's error after reporting it.
    pub async fn logout(&self) -> Result<(), ApiError> {
        match self.api.logout().await {
            Ok(_) => {
                self.logged_in.store(false, Ordering::SeqCst);
                self.ai.reset_state();
                self.notify(Notice::Success("已退出登录".into()));
                Ok(())
            }
            Err(e) => {
                self.notify(failure_notice(&e));
                Err(e)
            }
        }
    }

    // =========================================================================
    // AI
    // =========================================================================

    /// Run a guarded optimize. Returns the result only when this call
    /// produced one; refusals, ignored clicks, and failures yield `None`.
    pub async fn handle_optimize(&self, content: &str, prompt: Option<&str>) -> Option<OptimizationResult> {
        if !self.is_logged_in() {
            self.notify(Notice::Error(LOGIN_REQUIRED.into()));
            return None;
        }
        if content.trim().is_empty() {
            self.notify(Notice::Error(CONTENT_REQUIRED.into()));
            return None;
        }

        match self.guards.optimize.run(self.ai.optimize(content, prompt)).await {
            Ok(Invocation::Completed(result)) => {
                let done = match result.mode {
                    OptimizeMode::Analyze => "分析标题分类完成",
                    OptimizeMode::Rewrite => "AI优化重写完成",
                };
                self.notify(Notice::Success(done.into()));
                Some(result)
            }
            Ok(Invocation::Ignored) => None,
            Err(e) => {
                if e == AiError::Unauthenticated {
                    self.logged_in.store(false, Ordering::SeqCst);
                }
                if let Some(notice) = ai_failure_notice(&e) {
                    self.notify(notice);
                }
                None
            }
        }
    }

    pub fn reset_ai_state(&self) {
        self.ai.reset_state();
        info!("app: AI optimization state reset");
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Create (`id` is `None`) or update a note behind the save guard.
    pub async fn handle_save(&self, id: Option<i64>, draft: &NoteDraft) -> Option<Note> {
        if let Err(NoteError::Invalid(errors)) = draft.validate() {
            self.notify(Notice::Error(errors.join(", ")));
            return None;
        }

        let call = async {
            match id {
                Some(id) => self.api.update_note(id, draft).await,
                None => self.api.create_note(draft).await,
            }
        };
        match self.guards.save.run(call).await {
            Ok(Invocation::Completed(note)) => {
                let done = if id.is_some() { "笔记更新成功" } else { "笔记创建成功" };
                self.notify(Notice::Success(done.into()));
                Some(note)
            }
            Ok(Invocation::Ignored) => None,
            Err(e) => {
                self.notify(failure_notice(&e));
                None
            }
        }
    }

    /// Delete a note behind the delete guard. Returns whether it was deleted.
    pub async fn handle_delete(&self, id: i64) -> bool {
        match self.guards.delete.run(self.api.delete_note(id)).await {
            Ok(Invocation::Completed(_)) => {
                self.notify(Notice::Success("笔记删除成功".into()));
                true
            }
            Ok(Invocation::Ignored) => false,
            Err(e) => {
                self.notify(failure_notice(&e));
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
