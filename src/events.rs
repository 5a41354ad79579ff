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

//! The trigger event stream.
//!
//! The trigger engine publishes one [`StringTriggered`] event per accepted
//! trigger. The audio sink and the presentation sink consume the same stream
//! independently, so starting a voice and flipping the visual flags stay
//! simultaneous without either side calling into the other.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the event channel. Events are tiny and consumers are fast;
/// a lagging consumer drops the oldest events rather than blocking input.
const EVENT_CAPACITY: usize = 64;

/// A string was triggered and a voice should start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringTriggered {
    /// The string index within the active configuration.
    pub string: usize,
    /// The playback rate multiplier for the voice.
    pub pitch: f32,
    /// The initial envelope gain for the voice.
    pub gain: f32,
    /// When the trigger was accepted.
    pub at: Instant,
}

/// A broadcast bus for trigger events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StringTriggered>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> EventBus {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { tx }
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: StringTriggered) {
        // A send error only means there are no subscribers right now, which
        // is normal before the sinks have started.
        if self.tx.send(event).is_err() {
            debug!(string = event.string, "No subscribers for trigger event.");
        }
    }

    /// Subscribes to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StringTriggered> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> EventBus {
        EventBus::new()
    }
}
