//! # Rate Limiter
//!
//! Per-(command, account) cooldowns for on-demand operations.
//!
//! ## Overview
//!
//! Each command name owns its own map of account id to expiry, so commands
//! are limited independently. A request is allowed when the stored expiry
//! has passed (or none exists), and the expiry is then pushed to
//! `now + window`. A rejected request does not extend the cooldown.
//!
//! State is process-local and starts empty on every boot.

use crate::error::{Result, SyncError};
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

type Expiries = HashMap<String, HashMap<String, DateTime<Utc>>>;

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    default_window: Duration,
    windows: HashMap<String, Duration>,
    expiries: Mutex<Expiries>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, default_window: Duration) -> Self {
        Self {
            clock,
            default_window,
            windows: HashMap::new(),
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// Use `window` instead of the default for `command`.
    pub fn with_window(mut self, command: impl Into<String>, window: Duration) -> Self {
        self.windows.insert(command.into(), window);
        self
    }

    pub fn window(&self, command: &str) -> Duration {
        self.windows
            .get(command)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// Admit or reject a request.
    ///
    /// # Errors
    ///
    /// [`SyncError::OnCooldown`] with the time left when the account used
    /// `command` less than one window ago.
    pub fn check(&self, command: &str, account: &str) -> Result<()> {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.window(command))
            .map_err(|e| SyncError::Scheduler(format!("invalid cooldown window: {}", e)))?;

        let mut expiries = self.lock();
        let per_account = expiries.entry(command.to_string()).or_default();

        if let Some(expiry) = per_account.get(account) {
            if now < *expiry {
                let remaining = (*expiry - now).to_std().unwrap_or_default();
                debug!(command, account, remaining_ms = remaining.as_millis() as u64, "Request on cooldown");
                return Err(SyncError::OnCooldown {
                    command: command.to_string(),
                    remaining,
                });
            }
        }

        per_account.insert(account.to_string(), now + window);
        Ok(())
    }

    /// Time left on the cooldown, if any.
    pub fn remaining(&self, command: &str, account: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.lock()
            .get(command)
            .and_then(|m| m.get(account))
            .filter(|expiry| now < **expiry)
            .and_then(|expiry| (*expiry - now).to_std().ok())
    }

    /// Drop the cooldown of one account.
    pub fn reset(&self, command: &str, account: &str) {
        if let Some(per_account) = self.lock().get_mut(command) {
            per_account.remove(account);
        }
    }

    /// Drop every elapsed cooldown. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut expiries = self.lock();
        let mut removed = 0;

        for per_account in expiries.values_mut() {
            let before = per_account.len();
            per_account.retain(|_, expiry| now < *expiry);
            removed += before - per_account.len();
        }
        expiries.retain(|_, per_account| !per_account.is_empty());
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Expiries> {
        self.expiries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
