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

//! The trigger engine: turns validated string triggers into events.
//!
//! The engine owns the per-string debounce table for the selected
//! instrument. An accepted trigger is published as a [`StringTriggered`]
//! event; the audio sink and the presentation sink each react to the same
//! event independently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::audio::mixer::VoiceSender;
use crate::catalog::InstrumentConfig;
use crate::events::{EventBus, StringTriggered};

use super::loader::SampleBuffer;
use super::voice::Voice;

/// Minimum time between accepted triggers on the same string. Inputs inside
/// the window are silently dropped; the window is the instrument's only
/// throttle.
pub const MIN_RETRIGGER_INTERVAL: Duration = Duration::from_millis(50);

/// Global playback rate scale applied on top of each string's pitch ratio.
pub const PITCH_SCALE: f32 = 1.5;

/// The outcome of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The trigger was accepted and an event was published.
    Fired,
    /// The string index is outside the configuration.
    OutOfRange,
    /// The string was triggered again inside the debounce window.
    Debounced,
    /// A computed playback parameter was not finite.
    NonFinite,
}

/// Validates triggers for one selected instrument and publishes events.
pub struct TriggerEngine {
    /// The selected instrument configuration.
    config: Arc<InstrumentConfig>,
    /// Initial envelope gain handed to each voice.
    gain: f32,
    /// The debounce window.
    retrigger_interval: Duration,
    /// Per-string timestamp of the last accepted trigger.
    last_trigger: Mutex<Vec<Option<Instant>>>,
    /// Where accepted triggers are published.
    events: EventBus,
}

impl TriggerEngine {
    /// Creates an engine for the given instrument.
    pub fn new(
        config: Arc<InstrumentConfig>,
        events: EventBus,
        gain: f32,
        retrigger_interval: Duration,
    ) -> TriggerEngine {
        let strings = config.string_count();
        TriggerEngine {
            config,
            gain,
            retrigger_interval,
            last_trigger: Mutex::new(vec![None; strings]),
            events,
        }
    }

    /// The instrument this engine triggers.
    pub fn config(&self) -> &Arc<InstrumentConfig> {
        &self.config
    }

    /// Requests a trigger of the given string at `now`.
    ///
    /// Out-of-range indices, retriggers inside the debounce window, and
    /// non-finite playback parameters are all silent no-ops that leave the
    /// debounce table untouched.
    pub fn trigger(&self, string: usize, now: Instant) -> Trigger {
        let ratio = match self.config.ratio(string) {
            Some(ratio) => ratio,
            None => {
                debug!(
                    string,
                    strings = self.config.string_count(),
                    "Trigger outside the string range."
                );
                return Trigger::OutOfRange;
            }
        };

        let pitch = ratio * PITCH_SCALE;
        if !pitch.is_finite() || !self.gain.is_finite() {
            // Non-finite parameters would corrupt playback; skip the whole
            // operation rather than hand them to the mixer.
            warn!(string, pitch, gain = self.gain, "Skipping non-finite trigger.");
            return Trigger::NonFinite;
        }

        let mut last_trigger = self.last_trigger.lock();
        if let Some(previous) = last_trigger[string] {
            if now.saturating_duration_since(previous) < self.retrigger_interval {
                return Trigger::Debounced;
            }
        }
        last_trigger[string] = Some(now);
        drop(last_trigger);

        self.events.publish(StringTriggered {
            string,
            pitch,
            gain: self.gain,
            at: now,
        });
        Trigger::Fired
    }
}

#[cfg(test)]
impl TriggerEngine {
    /// Clears the debounce table (test only).
    pub fn reset(&self) {
        let mut last_trigger = self.last_trigger.lock();
        last_trigger.iter_mut().for_each(|entry| *entry = None);
    }

    /// The last accepted trigger time for a string (test only).
    pub fn last_trigger(&self, string: usize) -> Option<Instant> {
        self.last_trigger.lock().get(string).copied().flatten()
    }
}

/// Consumes trigger events and starts voices on the mixer.
pub struct AudioSink {
    buffer: Arc<SampleBuffer>,
    voice_tx: VoiceSender,
    decay: Duration,
}

impl AudioSink {
    /// Creates a sink playing the given buffer through the mixer channel.
    pub fn new(buffer: Arc<SampleBuffer>, voice_tx: VoiceSender, decay: Duration) -> AudioSink {
        AudioSink {
            buffer,
            voice_tx,
            decay,
        }
    }

    /// Starts one voice for a trigger event. A failure to hand the voice to
    /// the mixer is logged and swallowed; one dead note must not take the
    /// instrument down.
    pub fn handle(&self, event: &StringTriggered) {
        let voice = Voice::new(self.buffer.clone(), event.pitch, event.gain, self.decay);
        if let Err(e) = self.voice_tx.send(voice) {
            error!(string = event.string, err = %e, "Failed to hand voice to the mixer.");
        }
    }

    /// Consumes the event stream until the bus closes.
    pub fn run(self, mut events: broadcast::Receiver<StringTriggered>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Audio sink lagged behind trigger events.");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Catalog;
    use crate::events::EventBus;
    use crate::sampler::ENVELOPE_INITIAL_GAIN;

    use super::*;

    fn six_string_engine(events: EventBus) -> TriggerEngine {
        let config = Catalog::built_in().get("6-string").unwrap();
        TriggerEngine::new(config, events, ENVELOPE_INITIAL_GAIN, MIN_RETRIGGER_INTERVAL)
    }

    #[tokio::test]
    async fn test_trigger_publishes_event_with_scaled_pitch() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let engine = six_string_engine(events);

        let now = Instant::now();
        assert_eq!(engine.trigger(2, now), Trigger::Fired);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.string, 2);
        // 0.891 * 1.5
        assert!((event.pitch - 1.3365).abs() < 1e-6);
        assert_eq!(event.at, now);
    }

    #[tokio::test]
    async fn test_out_of_range_is_noop() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let engine = six_string_engine(events);

        assert_eq!(engine.trigger(6, Instant::now()), Trigger::OutOfRange);
        assert_eq!(engine.trigger(usize::MAX, Instant::now()), Trigger::OutOfRange);

        assert!(rx.try_recv().is_err());
        assert_eq!(engine.last_trigger(5), None);
    }

    #[test]
    fn test_debounce_suppresses_second_trigger() {
        let engine = six_string_engine(EventBus::new());

        let first = Instant::now();
        let second = first + Duration::from_millis(10);

        assert_eq!(engine.trigger(1, first), Trigger::Fired);
        assert_eq!(engine.trigger(1, second), Trigger::Debounced);

        // The suppressed trigger must not move the debounce timestamp.
        assert_eq!(engine.last_trigger(1), Some(first));
    }

    #[test]
    fn test_triggers_outside_window_both_fire() {
        let engine = six_string_engine(EventBus::new());

        let first = Instant::now();
        let second = first + Duration::from_millis(60);

        assert_eq!(engine.trigger(1, first), Trigger::Fired);
        assert_eq!(engine.trigger(1, second), Trigger::Fired);
        assert_eq!(engine.last_trigger(1), Some(second));
    }

    #[test]
    fn test_debounce_is_per_string() {
        let engine = six_string_engine(EventBus::new());

        let now = Instant::now();
        assert_eq!(engine.trigger(0, now), Trigger::Fired);
        assert_eq!(engine.trigger(1, now), Trigger::Fired);
    }

    #[tokio::test]
    async fn test_non_finite_gain_skips_trigger() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let config = Catalog::built_in().get("6-string").unwrap();
        let engine = TriggerEngine::new(config, events, f32::NAN, MIN_RETRIGGER_INTERVAL);

        assert_eq!(engine.trigger(0, Instant::now()), Trigger::NonFinite);
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.last_trigger(0), None);
    }

    #[test]
    fn test_overflowing_pitch_skips_trigger() {
        use crate::catalog::InstrumentConfig;

        // A huge (but finite) ratio overflows once the pitch scale is
        // applied; the trigger must be skipped, not propagated as infinity.
        let config = Arc::new(
            InstrumentConfig::new("wide", "Wide", vec![f32::MAX], vec!["a"], "").unwrap(),
        );
        let engine = TriggerEngine::new(
            config,
            EventBus::new(),
            ENVELOPE_INITIAL_GAIN,
            MIN_RETRIGGER_INTERVAL,
        );

        assert_eq!(engine.trigger(0, Instant::now()), Trigger::NonFinite);
    }

    #[test]
    fn test_audio_sink_hands_voice_to_mixer() {
        use crate::audio::mixer::VoiceMixer;
        use crate::sampler::ENVELOPE_DECAY;

        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 256], 48000));
        let (mixer, voice_tx) = VoiceMixer::new(2, 48000);
        let sink = AudioSink::new(buffer, voice_tx, ENVELOPE_DECAY);

        sink.handle(&StringTriggered {
            string: 0,
            pitch: 1.3365,
            gain: ENVELOPE_INITIAL_GAIN,
            at: Instant::now(),
        });

        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_audio_sink_swallows_mixer_failure() {
        use crate::audio::mixer::VoiceMixer;
        use crate::sampler::ENVELOPE_DECAY;

        let buffer = Arc::new(SampleBuffer::new(vec![0.5; 256], 48000));
        let (mixer, voice_tx) = VoiceMixer::new(2, 48000);
        // Dropping the mixer closes the channel; a dead note is logged, not
        // raised.
        drop(mixer);
        let sink = AudioSink::new(buffer, voice_tx, ENVELOPE_DECAY);

        sink.handle(&StringTriggered {
            string: 0,
            pitch: 1.0,
            gain: ENVELOPE_INITIAL_GAIN,
            at: Instant::now(),
        });
    }

    #[test]
    fn test_reset_clears_debounce_table() {
        let engine = six_string_engine(EventBus::new());

        let now = Instant::now();
        assert_eq!(engine.trigger(3, now), Trigger::Fired);
        engine.reset();

        // Immediately after a reset the same string may fire again.
        assert_eq!(
            engine.trigger(3, now + Duration::from_millis(1)),
            Trigger::Fired
        );
    }
}
