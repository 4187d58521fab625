//! Review prompt timing.
//!
//! The decision itself is a pure function of "now" and the stored counters.
//! `ReviewPromptManager` persists the counters and talks to the platform's
//! review prompt.

use crate::{
    errors::Result,
    storage::{KeyValueStore, load_json, persist_or_log, save_json},
};
use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const REVIEW_STATE_KEY: &str = "yasasuma_review_state";

/// Counters the review decision is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPromptState {
    /// How many times the app was launched
    pub launch_count: u32,
    /// First launch ever
    pub first_launch_date: DateTime<Utc>,
    /// Last time the prompt was shown
    pub last_prompt_date: Option<DateTime<Utc>>,
    /// Prompts shown during `last_prompt_year`
    pub prompt_count_this_year: u32,
    /// Calendar year of the last prompt, 0 when never prompted
    pub last_prompt_year: i32,
    /// Set when the user opted out of prompts for good
    pub prompt_disabled: bool,
}

impl ReviewPromptState {
    /// State for an app first launched at `first_launch`
    #[must_use]
    pub const fn new(first_launch: DateTime<Utc>) -> Self {
        Self {
            launch_count: 0,
            first_launch_date: first_launch,
            last_prompt_date: None,
            prompt_count_this_year: 0,
            last_prompt_year: 0,
            prompt_disabled: false,
        }
    }
}

/// Milestones after which a prompt may be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTrigger {
    /// Third event added
    AddedEvents,
    /// Third favorite contact added
    AddedFavoriteContacts,
    /// Third destination added
    AddedDestinations,
    /// A plan was purchased
    PurchasedPro,
}

/// Time and count windows for the review prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReviewPromptPolicy {
    /// Days that must pass after the first launch
    pub min_days_since_first_launch: i64,
    /// Launches required before prompting
    pub min_launch_count: u32,
    /// Prompts allowed per calendar year
    pub max_prompts_per_year: u32,
    /// Days between two prompts
    pub min_days_between_prompts: i64,
}

impl Default for ReviewPromptPolicy {
    fn default() -> Self {
        Self {
            min_days_since_first_launch: 3,
            min_launch_count: 3,
            max_prompts_per_year: 4,
            min_days_between_prompts: 30,
        }
    }
}

impl ReviewPromptPolicy {
    /// Prompts already shown in the calendar year of `now`.
    #[must_use]
    pub fn count_this_year<Tz: TimeZone>(&self, now: &DateTime<Tz>, state: &ReviewPromptState) -> u32 {
        if state.last_prompt_year == 0 || state.last_prompt_year != now.year() {
            0
        } else {
            state.prompt_count_this_year
        }
    }

    /// Whether the prompt may be shown at `now`.
    #[must_use]
    pub fn should_prompt<Tz: TimeZone>(&self, now: &DateTime<Tz>, state: &ReviewPromptState) -> bool {
        if state.prompt_disabled {
            return false;
        }
        let now_utc = now.with_timezone(&Utc);
        // A window too large to represent is never over.
        let Some(since_first) = TimeDelta::try_days(self.min_days_since_first_launch) else {
            return false;
        };
        if now_utc - state.first_launch_date < since_first {
            return false;
        }
        if state.launch_count < self.min_launch_count {
            return false;
        }
        if self.count_this_year(now, state) >= self.max_prompts_per_year {
            return false;
        }
        if let Some(last) = state.last_prompt_date {
            match TimeDelta::try_days(self.min_days_between_prompts) {
                Some(gap) if now_utc - last >= gap => {}
                _ => return false,
            }
        }
        true
    }

    /// State after a prompt was shown at `now`.
    #[must_use]
    pub fn record_prompt<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        state: &ReviewPromptState,
    ) -> ReviewPromptState {
        ReviewPromptState {
            last_prompt_date: Some(now.with_timezone(&Utc)),
            last_prompt_year: now.year(),
            prompt_count_this_year: self.count_this_year(now, state) + 1,
            ..*state
        }
    }
}

/// The platform's review prompt.
pub trait ReviewPresenter: Send + Sync {
    /// Whether a foreground window exists to present in
    fn has_foreground_scene(&self) -> bool;

    /// Shows the prompt. Fire and forget.
    fn request_review(&self);
}

/// Presenter for headless runs: never has a foreground scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPresenter;

impl ReviewPresenter for NoPresenter {
    fn has_foreground_scene(&self) -> bool {
        false
    }

    fn request_review(&self) {}
}

/// Persists review counters and shows the prompt when the policy allows.
pub struct ReviewPromptManager<S: KeyValueStore> {
    store: Arc<S>,
    policy: ReviewPromptPolicy,
    presenter: Box<dyn ReviewPresenter>,
    state: ReviewPromptState,
}

impl<S: KeyValueStore> std::fmt::Debug for ReviewPromptManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPromptManager")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> ReviewPromptManager<S> {
    /// Loads stored counters. On the very first load `now` becomes the first
    /// launch date and is written straight away.
    pub async fn load(
        store: Arc<S>,
        policy: ReviewPromptPolicy,
        presenter: Box<dyn ReviewPresenter>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let stored: Option<ReviewPromptState> = load_json(store.as_ref(), REVIEW_STATE_KEY).await?;
        let manager = Self {
            store,
            policy,
            presenter,
            state: stored.unwrap_or_else(|| ReviewPromptState::new(now)),
        };
        if stored.is_none() {
            info!("First launch recorded at {}", now);
            manager.persist().await;
        }
        Ok(manager)
    }

    /// Current counters
    #[must_use]
    pub const fn state(&self) -> &ReviewPromptState {
        &self.state
    }

    /// Counts one app launch.
    pub async fn notify_app_launched(&mut self) {
        self.state.launch_count = self.state.launch_count.saturating_add(1);
        debug!("App launch #{}", self.state.launch_count);
        self.persist().await;
    }

    /// Shows the review prompt if the policy allows it and a foreground scene is
    /// available. Returns whether the prompt was requested.
    pub async fn maybe_request_review<Tz: TimeZone>(
        &mut self,
        trigger: ReviewTrigger,
        now: &DateTime<Tz>,
    ) -> bool {
        if !self.policy.should_prompt(now, &self.state) {
            debug!("Review prompt for {:?} not due", trigger);
            return false;
        }
        if !self.presenter.has_foreground_scene() {
            debug!("No foreground scene for review prompt ({:?})", trigger);
            return false;
        }

        self.presenter.request_review();
        self.state = self.policy.record_prompt(now, &self.state);
        info!(
            "Review prompt requested after {:?} ({} this year)",
            trigger, self.state.prompt_count_this_year
        );
        self.persist().await;
        true
    }

    /// Turns prompts off permanently.
    pub async fn disable_prompt(&mut self) {
        self.state.prompt_disabled = true;
        self.persist().await;
    }

    async fn persist(&self) {
        persist_or_log(
            REVIEW_STATE_KEY,
            save_json(self.store.as_ref(), REVIEW_STATE_KEY, &self.state),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_utils::{RecordingPresenter, at};
    use chrono::FixedOffset;

    fn eligible() -> ReviewPromptState {
        ReviewPromptState {
            launch_count: 5,
            ..ReviewPromptState::new(at(2025, 1, 1, 9, 0))
        }
    }

    #[test]
    fn test_blocked_by_first_launch_window() {
        let policy = ReviewPromptPolicy::default();
        let state = eligible();
        assert!(!policy.should_prompt(&at(2025, 1, 3, 9, 0), &state));
        assert!(!policy.should_prompt(&at(2025, 1, 4, 8, 59), &state));
        assert!(policy.should_prompt(&at(2025, 1, 4, 9, 0), &state));
    }

    #[test]
    fn test_unrepresentable_windows_never_open() -> Result<()> {
        let config = crate::config::app::parse_config(
            "[review]\nmin_days_between_prompts = 9223372036854775807\n",
        )?;
        let prompted = ReviewPromptState {
            last_prompt_date: Some(at(2025, 1, 5, 9, 0)),
            last_prompt_year: 2025,
            prompt_count_this_year: 1,
            ..eligible()
        };
        assert!(!config.review.should_prompt(&at(2025, 12, 1, 9, 0), &prompted));

        let policy = ReviewPromptPolicy {
            min_days_since_first_launch: i64::MAX,
            ..ReviewPromptPolicy::default()
        };
        assert!(!policy.should_prompt(&at(2030, 1, 1, 9, 0), &eligible()));
        Ok(())
    }

    #[test]
    fn test_blocked_by_launch_count_and_disable() {
        let policy = ReviewPromptPolicy::default();
        let now = at(2025, 2, 1, 9, 0);
        let few = ReviewPromptState {
            launch_count: 2,
            ..eligible()
        };
        assert!(!policy.should_prompt(&now, &few));
        let disabled = ReviewPromptState {
            prompt_disabled: true,
            ..eligible()
        };
        assert!(!policy.should_prompt(&now, &disabled));
    }

    #[test]
    fn test_blocked_right_after_prompt_then_allowed_after_thirty_days() {
        let policy = ReviewPromptPolicy::default();
        let first = at(2025, 2, 1, 9, 0);
        assert!(policy.should_prompt(&first, &eligible()));

        let state = policy.record_prompt(&first, &eligible());
        assert_eq!(state.prompt_count_this_year, 1);
        assert_eq!(state.last_prompt_year, 2025);
        assert!(!policy.should_prompt(&first, &state));
        assert!(!policy.should_prompt(&at(2025, 3, 3, 8, 59), &state));
        assert!(policy.should_prompt(&at(2025, 3, 3, 9, 0), &state));
    }

    #[test]
    fn test_yearly_cap_and_rollover() {
        let policy = ReviewPromptPolicy::default();
        let mut state = eligible();
        for month in [2, 4, 6, 8] {
            let now = at(2025, month, 1, 9, 0);
            assert!(policy.should_prompt(&now, &state), "month {month}");
            state = policy.record_prompt(&now, &state);
        }
        assert_eq!(state.prompt_count_this_year, 4);
        assert!(!policy.should_prompt(&at(2025, 11, 1, 9, 0), &state));

        let new_year = at(2026, 1, 2, 9, 0);
        assert_eq!(policy.count_this_year(&new_year, &state), 0);
        assert!(policy.should_prompt(&new_year, &state));
        let state = policy.record_prompt(&new_year, &state);
        assert_eq!(state.prompt_count_this_year, 1);
        assert_eq!(state.last_prompt_year, 2026);
    }

    #[test]
    fn test_year_follows_local_calendar() {
        let policy = ReviewPromptPolicy::default();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        // 2025-12-31 20:00 UTC is already 2026 in Tokyo
        let now = at(2025, 12, 31, 20, 0).with_timezone(&tokyo);
        let state = policy.record_prompt(&now, &eligible());
        assert_eq!(state.last_prompt_year, 2026);
    }

    #[tokio::test]
    async fn test_manager_records_first_launch_once() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let first = at(2025, 1, 1, 9, 0);
        let manager = ReviewPromptManager::load(
            Arc::clone(&store),
            ReviewPromptPolicy::default(),
            Box::new(RecordingPresenter::foreground()),
            first,
        )
        .await?;
        assert_eq!(manager.state().first_launch_date, first);

        let later = ReviewPromptManager::load(
            store,
            ReviewPromptPolicy::default(),
            Box::new(RecordingPresenter::foreground()),
            at(2025, 5, 1, 9, 0),
        )
        .await?;
        assert_eq!(later.state().first_launch_date, first);
        Ok(())
    }

    #[tokio::test]
    async fn test_manager_prompts_once_due() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let presenter = RecordingPresenter::foreground();
        let mut manager = ReviewPromptManager::load(
            Arc::clone(&store),
            ReviewPromptPolicy::default(),
            Box::new(presenter.clone()),
            at(2025, 1, 1, 9, 0),
        )
        .await?;
        for _ in 0..3 {
            manager.notify_app_launched().await;
        }

        let now = at(2025, 1, 10, 9, 0);
        assert!(manager.maybe_request_review(ReviewTrigger::AddedEvents, &now).await);
        assert!(!manager.maybe_request_review(ReviewTrigger::AddedEvents, &now).await);
        assert_eq!(presenter.requests(), 1);

        let stored: Option<ReviewPromptState> = load_json(store.as_ref(), REVIEW_STATE_KEY).await?;
        assert_eq!(stored.unwrap().prompt_count_this_year, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_manager_skips_without_foreground_scene() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let presenter = RecordingPresenter::background();
        let mut manager = ReviewPromptManager::load(
            store,
            ReviewPromptPolicy::default(),
            Box::new(presenter.clone()),
            at(2025, 1, 1, 9, 0),
        )
        .await?;
        for _ in 0..3 {
            manager.notify_app_launched().await;
        }

        let now = at(2025, 1, 10, 9, 0);
        assert!(!manager.maybe_request_review(ReviewTrigger::PurchasedPro, &now).await);
        assert_eq!(presenter.requests(), 0);
        assert!(manager.state().last_prompt_date.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_disable_prompt_persists() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let mut manager = ReviewPromptManager::load(
            Arc::clone(&store),
            ReviewPromptPolicy::default(),
            Box::new(NoPresenter),
            at(2025, 1, 1, 9, 0),
        )
        .await?;
        manager.disable_prompt().await;

        let reloaded = ReviewPromptManager::load(
            store,
            ReviewPromptPolicy::default(),
            Box::new(NoPresenter),
            at(2025, 6, 1, 9, 0),
        )
        .await?;
        assert!(reloaded.state().prompt_disabled);
        Ok(())
    }
}
