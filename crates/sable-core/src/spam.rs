//! Per-sender and global rate limiting with temporary bans.
//!
//! Senders are identified by their coarse fingerprint (first 16 hex chars of
//! the pubkey hash). Each sender gets a 60-second rolling window; exceeding
//! the per-sender cap bans the sender for the configured duration. A second
//! global window caps total non-coinbase admissions regardless of sender.
//!
//! Check and record are a single step here: admission happens exactly once
//! on the engine's write path, so there is no separate decide/commit phase.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::constants::{SPAM_BAN_MS, SPAM_MAX_GLOBAL, SPAM_MAX_PER_SENDER, SPAM_WINDOW_MS};
use crate::error::MempoolError;

/// Tunables for the spam guard.
#[derive(Clone, Debug)]
pub struct SpamPolicy {
    /// Max admissions per sender inside one window.
    pub max_per_sender: u32,
    /// Max admissions globally inside one window.
    pub max_global: u32,
    /// Rolling window length in milliseconds.
    pub window_ms: u64,
    /// Ban duration after a sender exceeds its cap, in milliseconds.
    pub ban_ms: u64,
}

impl Default for SpamPolicy {
    fn default() -> Self {
        Self {
            max_per_sender: SPAM_MAX_PER_SENDER,
            max_global: SPAM_MAX_GLOBAL,
            window_ms: SPAM_WINDOW_MS,
            ban_ms: SPAM_BAN_MS,
        }
    }
}

/// Per-sender admission state.
#[derive(Clone, Debug, Default)]
struct SenderState {
    /// Admission timestamps inside the current window, oldest first.
    admissions: VecDeque<u64>,
    /// Instant until which the sender is banned, if any.
    banned_until: Option<u64>,
}

impl SenderState {
    fn prune(&mut self, now: u64, window_ms: u64) {
        let cutoff = now.saturating_sub(window_ms);
        while self.admissions.front().is_some_and(|&t| t <= cutoff) {
            self.admissions.pop_front();
        }
    }
}

/// Sliding-window spam guard over transaction admissions.
#[derive(Debug)]
pub struct SpamGuard {
    policy: SpamPolicy,
    senders: HashMap<String, SenderState>,
    /// Global admission timestamps inside the current window.
    global: VecDeque<u64>,
}

impl SpamGuard {
    pub fn new(policy: SpamPolicy) -> Self {
        Self {
            policy,
            senders: HashMap::new(),
            global: VecDeque::new(),
        }
    }

    fn prune_global(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.policy.window_ms);
        while self.global.front().is_some_and(|&t| t <= cutoff) {
            self.global.pop_front();
        }
    }

    /// Admit one transaction from `sender` at instant `now` (ms).
    ///
    /// Rejects banned senders, senders over their window cap (banning them),
    /// and admissions over the global cap. On success the admission is
    /// recorded in both windows.
    pub fn admit(&mut self, sender: &str, now: u64) -> Result<(), MempoolError> {
        self.prune_global(now);
        if self.global.len() >= self.policy.max_global as usize {
            return Err(MempoolError::RateLimited("global transaction rate".into()));
        }

        let window_ms = self.policy.window_ms;
        let state = self.senders.entry(sender.to_string()).or_default();

        if let Some(until) = state.banned_until {
            if now < until {
                return Err(MempoolError::RateLimited(format!(
                    "sender {sender} banned until {until}"
                )));
            }
            state.banned_until = None;
        }

        state.prune(now, window_ms);
        if state.admissions.len() >= self.policy.max_per_sender as usize {
            let until = now + self.policy.ban_ms;
            state.banned_until = Some(until);
            debug!(sender, until, "spam: sender banned");
            return Err(MempoolError::RateLimited(format!(
                "sender {sender} exceeded per-sender rate"
            )));
        }

        state.admissions.push_back(now);
        self.global.push_back(now);
        Ok(())
    }

    /// Whether `sender` is currently banned.
    pub fn is_banned(&self, sender: &str, now: u64) -> bool {
        self.senders
            .get(sender)
            .and_then(|s| s.banned_until)
            .is_some_and(|until| now < until)
    }

    /// Drop sender entries whose window is empty and whose ban has lapsed.
    pub fn cleanup(&mut self, now: u64) {
        let window_ms = self.policy.window_ms;
        self.senders.retain(|_, state| {
            state.prune(now, window_ms);
            let ban_live = state.banned_until.is_some_and(|until| now < until);
            ban_live || !state.admissions.is_empty()
        });
        self.prune_global(now);
    }

    /// Number of tracked senders (monitoring).
    pub fn tracked_senders(&self) -> usize {
        self.senders.len()
    }
}
