//! Reentrancy guard — one action at a time per control, then a cooldown.
//!
//! DESIGN
//! ======
//! A guard wraps an async action bound to one UI control. While the action
//! runs, and for a fixed cooldown after it settles, further invocations are
//! ignored without touching the action. The control is disabled and shows a
//! loading label while the action runs; a drop guard puts the original label
//! and disabled flag back on every exit path, including errors, panics, and
//! the caller dropping the future.
//!
//! State machine: `Idle -> Executing -> (CoolingDown) -> Idle`. The cooldown
//! is a deadline checked lazily, so no timer task is needed to leave it.
//!
//! TRADE-OFFS
//! ==========
//! The guard never swallows errors; `Ignored` is the only outcome it adds.
//! Cooldown deadlines use `tokio::time::Instant`, which follows a paused
//! test clock.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::Cooldowns;

pub const TOGGLE_LOADING_LABEL: &str = "切换中...";
pub const PERSIST_LOADING_LABEL: &str = "保存中...";
pub const AI_LOADING_LABEL: &str = "AI优化中...";
pub const AI_BUSY_NOTICE: &str = "AI优化重写中，请稍候...";

// =============================================================================
// CONTROL
// =============================================================================

/// The visual surface a guard drives: a button or anything button-like.
///
/// Methods take `&self`; implementations handle their own interior
/// mutability, as UI handles usually do.
pub trait Control: Send + Sync {
    fn label(&self) -> String;
    fn set_label(&self, label: &str);
    fn is_disabled(&self) -> bool;
    fn set_disabled(&self, disabled: bool);

    /// Toggle a "working" style such as an animated background.
    fn set_busy(&self, _busy: bool) {}

    /// Briefly tell the user an ignored click was noticed.
    fn flash(&self, _notice: &str) {}
}

// =============================================================================
// CONFIG
// =============================================================================

/// Preset classes of guarded actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    /// Fast UI toggles such as switching a view.
    Toggle,
    /// Create, update, delete.
    Persist,
    /// AI rewrite or analysis.
    Ai,
}

impl GuardKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::Persist => "persist",
            Self::Ai => "ai",
        }
    }

    #[must_use]
    pub fn cooldown(self, cooldowns: &Cooldowns) -> Duration {
        let ms = match self {
            Self::Toggle => cooldowns.toggle_ms,
            Self::Persist => cooldowns.persist_ms,
            Self::Ai => cooldowns.ai_ms,
        };
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn loading_label(self) -> &'static str {
        match self {
            Self::Toggle => TOGGLE_LOADING_LABEL,
            Self::Persist => PERSIST_LOADING_LABEL,
            Self::Ai => AI_LOADING_LABEL,
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub name: &'static str,
    /// How long invocations stay ignored after the action settles.
    pub cooldown: Duration,
    /// Label shown while executing. `None` leaves the label alone.
    pub loading_label: Option<String>,
    /// Apply the control's busy style while executing.
    pub busy: bool,
    /// Flashed on the control when an invocation arrives while the action is
    /// still executing. Cooldown clicks are not flashed.
    pub notice: Option<String>,
}

impl GuardConfig {
    /// Base variant: no cooldown, no label swap.
    #[must_use]
    pub fn immediate() -> Self {
        Self { name: "immediate", cooldown: Duration::ZERO, loading_label: None, busy: false, notice: None }
    }

    #[must_use]
    pub fn for_kind(kind: GuardKind, cooldowns: &Cooldowns) -> Self {
        let ai = kind == GuardKind::Ai;
        Self {
            name: kind.as_str(),
            cooldown: kind.cooldown(cooldowns),
            loading_label: Some(kind.loading_label().to_owned()),
            busy: ai,
            notice: ai.then(|| AI_BUSY_NOTICE.to_owned()),
        }
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Idle,
    Executing,
    CoolingDown { until: Instant },
}

/// Outcome of a guarded invocation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation<T> {
    Completed(T),
    /// The guard was busy; the action was not called.
    Ignored,
}

impl<T> Invocation<T> {
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Ignored => None,
        }
    }
}

/// Clones share phase and control.
#[derive(Clone)]
pub struct ReentrancyGuard {
    config: Arc<GuardConfig>,
    control: Option<Arc<dyn Control>>,
    phase: Arc<Mutex<GuardPhase>>,
}

impl ReentrancyGuard {
    #[must_use]
    pub fn new(config: GuardConfig, control: Arc<dyn Control>) -> Self {
        Self::build(config, Some(control))
    }

    /// A guard with no control to decorate; only the phase logic applies.
    #[must_use]
    pub fn detached(config: GuardConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: GuardConfig, control: Option<Arc<dyn Control>>) -> Self {
        Self { config: Arc::new(config), control, phase: Arc::new(Mutex::new(GuardPhase::Idle)) }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Current phase. An expired cooldown reads as `Idle`.
    #[must_use]
    pub fn phase(&self) -> GuardPhase {
        let mut phase = self.lock();
        if let GuardPhase::CoolingDown { until } = *phase {
            if Instant::now() >= until {
                *phase = GuardPhase::Idle;
            }
        }
        *phase
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.phase() == GuardPhase::Executing
    }

    /// Run `action` unless the guard is executing or cooling down.
    ///
    /// `action` is not polled when the invocation is ignored.
    ///
    /// # Errors
    ///
    /// Returns the action's own error after the control is restored.
    pub async fn run<T, E, Fut>(&self, action: Fut) -> Result<Invocation<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(blocked) = self.try_enter() {
            debug!(guard = self.config.name, phase = ?blocked, "guard: invocation ignored");
            // Cooldown clicks are dropped silently.
            if let (GuardPhase::Executing, Some(control), Some(notice)) =
                (blocked, &self.control, &self.config.notice)
            {
                control.flash(notice);
            }
            return Ok(Invocation::Ignored);
        }

        let settle = Settle::begin(self);
        let result = action.await;
        drop(settle);
        result.map(Invocation::Completed)
    }

    /// Bind `action` to this guard.
    #[must_use]
    pub fn guard<F>(&self, action: F) -> Guarded<F> {
        Guarded { guard: self.clone(), action }
    }

    /// Claim the guard, or report the phase that blocked the claim.
    fn try_enter(&self) -> Result<(), GuardPhase> {
        let mut phase = self.lock();
        let free = match *phase {
            GuardPhase::Idle => true,
            GuardPhase::Executing => false,
            GuardPhase::CoolingDown { until } => Instant::now() >= until,
        };
        if !free {
            return Err(*phase);
        }
        *phase = GuardPhase::Executing;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, GuardPhase> {
        self.phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ReentrancyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrancyGuard")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// An action bound to a guard; see [`ReentrancyGuard::guard`].
#[derive(Clone)]
pub struct Guarded<F> {
    guard: ReentrancyGuard,
    action: F,
}

impl<F> Guarded<F> {
    #[must_use]
    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    /// Invoke the action through the guard.
    ///
    /// # Errors
    ///
    /// Returns the action's error, unchanged.
    pub async fn call<A, T, E, Fut>(&self, arg: A) -> Result<Invocation<T>, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Deferred so an ignored call never reaches the closure.
        self.guard
            .run(async { (self.action)(arg).await })
            .await
    }
}

// =============================================================================
// SETTLE
// =============================================================================

struct Saved {
    label: String,
    disabled: bool,
}

/// Applies loading visuals on creation; restores them and leaves
/// `Executing` on drop.
struct Settle<'a> {
    guard: &'a ReentrancyGuard,
    saved: Option<Saved>,
}

impl<'a> Settle<'a> {
    fn begin(guard: &'a ReentrancyGuard) -> Self {
        let saved = guard.control.as_ref().map(|control| {
            let saved = Saved { label: control.label(), disabled: control.is_disabled() };
            control.set_disabled(true);
            if let Some(label) = &guard.config.loading_label {
                control.set_label(label);
            }
            if guard.config.busy {
                control.set_busy(true);
            }
            saved
        });
        Self { guard, saved }
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        let config = &self.guard.config;
        if let (Some(control), Some(saved)) = (&self.guard.control, self.saved.take()) {
            control.set_label(&saved.label);
            control.set_disabled(saved.disabled);
            if config.busy {
                control.set_busy(false);
            }
        }
        let next = if config.cooldown.is_zero() {
            GuardPhase::Idle
        } else {
            GuardPhase::CoolingDown { until: Instant::now() + config.cooldown }
        };
        *self.guard.lock() = next;
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
