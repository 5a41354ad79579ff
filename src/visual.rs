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

//! Presentation state: which strings look like they are vibrating and
//! whether the instrument body is resonating.
//!
//! These flags are cosmetic and never authoritative for audio. Each trigger
//! sets them and schedules independent one-shot clears. The clears are
//! deliberately never cancelled: a rapid retrigger lets the older clear fire
//! first and briefly blank the flag. That flicker matches the instrument's
//! long-standing behavior and is not a bug.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::events::StringTriggered;

/// How long a string shows as vibrating after a trigger.
pub const STRING_VIBRATE_DURATION: Duration = Duration::from_millis(300);

/// How long the body shows as resonating after a trigger. Slightly longer
/// than the string flash so the body glow outlasts it.
pub const BODY_RESONANCE_DURATION: Duration = Duration::from_millis(450);

/// The short-lived visual flags for the instrument.
pub struct PresentationState {
    /// Per-string vibration flags.
    vibrating: RwLock<Vec<bool>>,
    /// The shared body resonance flag.
    body_resonating: AtomicBool,
}

impl PresentationState {
    /// Creates presentation state for an instrument with the given strings.
    pub fn new(string_count: usize) -> PresentationState {
        PresentationState {
            vibrating: RwLock::new(vec![false; string_count]),
            body_resonating: AtomicBool::new(false),
        }
    }

    /// Resets all flags for a newly selected instrument.
    pub fn reset(&self, string_count: usize) {
        let mut vibrating = self.vibrating.write();
        vibrating.clear();
        vibrating.resize(string_count, false);
        self.body_resonating.store(false, Ordering::Relaxed);
    }

    /// Sets one string's vibration flag.
    pub fn set_vibrating(&self, string: usize, value: bool) {
        let mut vibrating = self.vibrating.write();
        if let Some(flag) = vibrating.get_mut(string) {
            *flag = value;
        }
    }

    /// Returns one string's vibration flag.
    /// Exported for view code and testing.
    #[allow(dead_code)]
    pub fn is_vibrating(&self, string: usize) -> bool {
        self.vibrating.read().get(string).copied().unwrap_or(false)
    }

    /// A snapshot of all vibration flags.
    pub fn vibrating(&self) -> Vec<bool> {
        self.vibrating.read().clone()
    }

    /// Sets the body resonance flag.
    pub fn set_body_resonating(&self, value: bool) {
        self.body_resonating.store(value, Ordering::Relaxed);
    }

    /// Returns the body resonance flag.
    pub fn body_resonating(&self) -> bool {
        self.body_resonating.load(Ordering::Relaxed)
    }
}

/// Consumes trigger events and drives the presentation state.
pub struct PresentationSink {
    state: Arc<PresentationState>,
    string_clear: Duration,
    body_clear: Duration,
}

impl PresentationSink {
    /// Creates a sink with the given clear delays.
    pub fn new(
        state: Arc<PresentationState>,
        string_clear: Duration,
        body_clear: Duration,
    ) -> PresentationSink {
        PresentationSink {
            state,
            string_clear,
            body_clear,
        }
    }

    /// Flips the flags for a trigger and schedules their one-shot clears.
    ///
    /// The clears reflect the most recent trigger's schedule only by
    /// accident of ordering; an earlier trigger's clear may fire first.
    /// Never cancelled.
    pub fn handle(&self, event: &StringTriggered) {
        self.state.set_vibrating(event.string, true);
        self.state.set_body_resonating(true);

        let string = event.string;
        let state = self.state.clone();
        let string_clear = self.string_clear;
        tokio::spawn(async move {
            tokio::time::sleep(string_clear).await;
            state.set_vibrating(string, false);
        });

        let state = self.state.clone();
        let body_clear = self.body_clear;
        tokio::spawn(async move {
            tokio::time::sleep(body_clear).await;
            state.set_body_resonating(false);
        });
    }

    /// Consumes the event stream until the bus closes.
    pub fn run(self, mut events: broadcast::Receiver<StringTriggered>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Presentation sink lagged behind trigger events.");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}
