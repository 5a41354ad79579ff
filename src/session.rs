// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The session: one explicit object owning the selected instrument, the
//! trigger engine, the held-key set, and the session state machine.
//!
//! The session is also the input router: physical key events are mapped to
//! string indices through the active configuration's key bindings, pointer
//! events arrive with the string index already resolved, and everything
//! funnels into the trigger engine. The state machine is deliberately
//! small: `NotStarted <-> Started`, with the sample loader's status gating
//! entry into `Started`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::catalog::{normalize_key, Catalog, InstrumentConfig};
use crate::events::EventBus;
use crate::sampler::{
    LoadStatus, SampleLoader, Trigger, TriggerEngine, ENVELOPE_DECAY, ENVELOPE_INITIAL_GAIN,
    MIN_RETRIGGER_INTERVAL,
};
use crate::visual::{PresentationState, BODY_RESONANCE_DURATION, STRING_VIBRATE_DURATION};

/// Delay between selecting an instrument and the introductory strum.
pub const STRUM_START_DELAY: Duration = Duration::from_millis(350);

/// Stagger between successive strings of the introductory strum.
pub const STRUM_STAGGER: Duration = Duration::from_millis(80);

/// Tunable timing and level parameters, overridable from the player config.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// The per-string debounce window.
    pub retrigger_interval: Duration,
    /// Initial envelope gain for each voice.
    pub envelope_gain: f32,
    /// Time for a voice's envelope to decay to the floor.
    pub envelope_decay: Duration,
    /// How long a string shows as vibrating.
    pub string_vibrate: Duration,
    /// How long the body shows as resonating.
    pub body_resonance: Duration,
    /// Delay before the introductory strum.
    pub strum_start_delay: Duration,
    /// Stagger between strum notes.
    pub strum_stagger: Duration,
}

impl Default for Tuning {
    fn default() -> Tuning {
        Tuning {
            retrigger_interval: MIN_RETRIGGER_INTERVAL,
            envelope_gain: ENVELOPE_INITIAL_GAIN,
            envelope_decay: ENVELOPE_DECAY,
            string_vibrate: STRING_VIBRATE_DURATION,
            body_resonance: BODY_RESONANCE_DURATION,
            strum_start_delay: STRUM_START_DELAY,
            strum_stagger: STRUM_STAGGER,
        }
    }
}

/// The session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No instrument selected; inputs are ignored.
    NotStarted,
    /// An instrument is selected and playable.
    Started,
}

/// Errors produced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("the instrument sample is not ready ({0})")]
    SampleNotReady(LoadStatus),

    #[error("no instrument named '{0}'")]
    UnknownInstrument(String),
}

struct Inner {
    state: SessionState,
    engine: Option<Arc<TriggerEngine>>,
    /// Physically held trigger keys; added on first key-down, removed on
    /// any key-up, cleared when the instrument changes.
    active_keys: HashSet<String>,
}

/// One playing session of the instrument.
pub struct Session {
    catalog: Catalog,
    loader: Arc<SampleLoader>,
    events: EventBus,
    tuning: Tuning,
    presentation: Arc<PresentationState>,
    inner: Mutex<Inner>,
}

impl Session {
    /// Creates a session in the `NotStarted` state.
    pub fn new(
        catalog: Catalog,
        loader: Arc<SampleLoader>,
        events: EventBus,
        presentation: Arc<PresentationState>,
        tuning: Tuning,
    ) -> Session {
        Session {
            catalog,
            loader,
            events,
            tuning,
            presentation,
            inner: Mutex::new(Inner {
                state: SessionState::NotStarted,
                engine: None,
                active_keys: HashSet::new(),
            }),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The selected instrument, if any.
    pub fn current_instrument(&self) -> Option<Arc<InstrumentConfig>> {
        self.inner
            .lock()
            .engine
            .as_ref()
            .map(|engine| engine.config().clone())
    }

    /// The presentation state driven by this session's triggers.
    pub fn presentation(&self) -> &Arc<PresentationState> {
        &self.presentation
    }

    /// Selects an instrument, entering `Started`.
    ///
    /// Requires the sample to be ready. Resets all per-string and per-key
    /// transient state, then schedules the introductory strum: every string
    /// once, ascending, with a fixed stagger, through the normal trigger
    /// path (debounce rules included).
    pub fn select_instrument(&self, id: &str) -> Result<(), SessionError> {
        let status = self.loader.status();
        if status != LoadStatus::Ready {
            return Err(SessionError::SampleNotReady(status));
        }

        let config = self
            .catalog
            .get(id)
            .ok_or_else(|| SessionError::UnknownInstrument(id.to_string()))?;

        let engine = Arc::new(TriggerEngine::new(
            config.clone(),
            self.events.clone(),
            self.tuning.envelope_gain,
            self.tuning.retrigger_interval,
        ));

        {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Started;
            inner.engine = Some(engine.clone());
            inner.active_keys.clear();
        }
        self.presentation.reset(config.string_count());

        info!(
            instrument = config.id(),
            strings = config.string_count(),
            "Session started."
        );

        tokio::spawn(Session::strum(
            engine,
            self.tuning.strum_start_delay,
            self.tuning.strum_stagger,
        ));
        Ok(())
    }

    /// Returns to the menu, entering `NotStarted`. Voices already playing
    /// and pending visual clears are left to finish on their own.
    pub fn return_to_menu(&self) {
        let mut inner = self.inner.lock();
        inner.state = SessionState::NotStarted;
        inner.engine = None;
        inner.active_keys.clear();
        info!("Session returned to menu.");
    }

    /// Routes a physical key press.
    ///
    /// OS key repeats are ignored entirely; only the first press of a
    /// key-down/up cycle triggers a voice and marks the key active. Keys
    /// that match no string are ignored. Returns None when nothing was
    /// routed.
    pub fn key_down(&self, key: &str, repeat: bool) -> Option<Trigger> {
        if repeat {
            return None;
        }

        let key = normalize_key(key);
        let engine = {
            let mut inner = self.inner.lock();
            let engine = inner.engine.clone()?;
            engine.config().string_for_key(&key)?;
            inner.active_keys.insert(key.clone());
            engine
        };

        let string = engine.config().string_for_key(&key)?;
        Some(engine.trigger(string, Instant::now()))
    }

    /// Routes a physical key release. The key leaves the active set whether
    /// or not it matched a string; stray releases must never wedge a key as
    /// held.
    pub fn key_up(&self, key: &str) {
        let key = normalize_key(key);
        self.inner.lock().active_keys.remove(&key);
    }

    /// Routes a pointer press on a string's hit region.
    pub fn pluck(&self, string: usize) -> Option<Trigger> {
        let engine = self.inner.lock().engine.clone()?;
        Some(engine.trigger(string, Instant::now()))
    }

    /// Routes a pointer hover onto a string's hit region. Hover triggers
    /// exactly like a press; the debounce window is the only limiter.
    pub fn hover(&self, string: usize) -> Option<Trigger> {
        self.pluck(string)
    }

    /// A sorted snapshot of the held trigger keys.
    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().active_keys.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Plays the introductory strum through the normal trigger path.
    async fn strum(engine: Arc<TriggerEngine>, start_delay: Duration, stagger: Duration) {
        tokio::time::sleep(start_delay).await;

        let strings = engine.config().string_count();
        for string in 0..strings {
            if string > 0 {
                tokio::time::sleep(stagger).await;
            }
            engine.trigger(string, Instant::now());
        }
    }
}
