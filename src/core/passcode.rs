//! Settings passcode - stored settings and the per-presentation lock.
//!
//! The lock only engages when it is enabled *and* the stored value has exactly
//! four digits; every other combination opens straight away. A forgotten
//! passcode can only be reset, which disables the lock altogether.

use crate::{
    errors::{Error, Result},
    storage::{KeyValueStore, load_bool, persist_or_log},
};
use tracing::{debug, info};

const ENABLED_KEY: &str = "yasasumaPasscodeEnabled";
const VALUE_KEY: &str = "yasasumaPasscodeValue";

/// Number of digits in a passcode.
pub const PASSCODE_LEN: usize = 4;

/// Message shown after a wrong passcode
pub const WRONG_PASSCODE_MESSAGE: &str = "パスコードがちがいます。もう一度おためしください。";

/// Keeps only ASCII digits and truncates to four of them.
#[must_use]
pub fn sanitize_passcode_input(input: &str) -> String {
    digits_of(input).chars().take(PASSCODE_LEN).collect()
}

fn digits_of(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Persisted passcode settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasscodeSettings {
    /// Whether the lock is switched on
    pub enabled: bool,
    /// Stored passcode, empty when none was saved
    pub value: String,
}

impl PasscodeSettings {
    /// Reads the stored settings; absent keys mean disabled with no passcode.
    pub async fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        Ok(Self {
            enabled: load_bool(store, ENABLED_KEY, false).await?,
            value: store.get(VALUE_KEY).await?.unwrap_or_default(),
        })
    }

    /// Whether the lock engages on the next presentation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && digits_of(&self.value).len() == PASSCODE_LEN
    }

    /// Turns the lock on or off without touching the stored passcode.
    pub async fn set_enabled<S: KeyValueStore>(&mut self, store: &S, enabled: bool) {
        self.enabled = enabled;
        persist_or_log(
            ENABLED_KEY,
            store.set(ENABLED_KEY, if enabled { "true" } else { "false" }),
        )
        .await;
    }

    /// Saves a new passcode from form input.
    ///
    /// # Errors
    /// `InvalidPasscode` unless the input holds exactly four digits.
    pub async fn set_passcode<S: KeyValueStore>(&mut self, store: &S, input: &str) -> Result<()> {
        let digits = digits_of(input);
        if digits.len() != PASSCODE_LEN {
            return Err(Error::InvalidPasscode {
                digits: digits.len(),
            });
        }
        self.value = digits;
        persist_or_log(VALUE_KEY, store.set(VALUE_KEY, &self.value)).await;
        info!("Settings passcode saved");
        Ok(())
    }

    /// Forgets the passcode and disables the lock.
    pub async fn clear<S: KeyValueStore>(&mut self, store: &S) {
        self.value.clear();
        self.enabled = false;
        persist_or_log(VALUE_KEY, store.set(VALUE_KEY, "")).await;
        persist_or_log(ENABLED_KEY, store.set(ENABLED_KEY, "false")).await;
    }
}

/// State of one presentation of the settings lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasscodeGateState {
    /// Waiting for the passcode
    Locked {
        /// Error from the last attempt, if it failed
        error: Option<&'static str>,
    },
    /// Settings may be shown
    Unlocked,
}

/// The lock in front of the settings screens.
///
/// Create a new gate every time the settings are entered; an unlock is only
/// remembered for the lifetime of the value.
#[derive(Debug, Clone)]
pub struct PasscodeGate {
    settings: PasscodeSettings,
    state: PasscodeGateState,
}

impl PasscodeGate {
    /// Starts a fresh presentation: locked when the lock is active, open otherwise.
    #[must_use]
    pub fn enter(settings: PasscodeSettings) -> Self {
        let state = if settings.is_active() {
            PasscodeGateState::Locked { error: None }
        } else {
            debug!("Passcode lock inactive, opening settings");
            PasscodeGateState::Unlocked
        };
        Self { settings, state }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &PasscodeGateState {
        &self.state
    }

    /// Whether settings may be shown
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        matches!(self.state, PasscodeGateState::Unlocked)
    }

    /// Checks `input` against the stored passcode. Both are reduced to digits
    /// and the input truncated to four. Wrong attempts are unlimited.
    pub fn submit(&mut self, input: &str) -> &PasscodeGateState {
        if self.is_unlocked() {
            return &self.state;
        }
        let entered = sanitize_passcode_input(input);
        let stored = digits_of(&self.settings.value);
        if stored.len() == PASSCODE_LEN && stored == entered {
            info!("Settings unlocked");
            self.state = PasscodeGateState::Unlocked;
        } else {
            debug!("Wrong passcode entered");
            self.state = PasscodeGateState::Locked {
                error: Some(WRONG_PASSCODE_MESSAGE),
            };
        }
        &self.state
    }

    /// "Forgot passcode": clears and disables the lock, then opens settings.
    /// Only reachable through the owner of the live settings, which must pick
    /// up the cleared values afterwards.
    pub(crate) async fn reset<S: KeyValueStore>(&mut self, store: &S) -> &PasscodeGateState {
        info!("Passcode reset by user, lock disabled");
        self.settings.clear(store).await;
        self.state = PasscodeGateState::Unlocked;
        &self.state
    }

    /// Settings as this gate last saw them
    #[must_use]
    pub const fn settings(&self) -> &PasscodeSettings {
        &self.settings
    }
}
