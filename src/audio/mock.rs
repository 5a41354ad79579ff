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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::info;

use crate::audio::mixer::VoiceMixer;
use crate::shutdown::Shutdown;

/// Output rate reported by the mock device.
const MOCK_SAMPLE_RATE: u32 = 48000;

/// Channel count reported by the mock device.
const MOCK_CHANNELS: u16 = 2;

/// A mock audio device. Doesn't open a stream; tests (and headless runs)
/// drive the mixer by hand through [`Device::render`].
#[derive(Clone)]
pub struct Device {
    name: String,
    started: Arc<AtomicBool>,
    mixer: Arc<Mutex<Option<Arc<VoiceMixer>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            started: Arc::new(AtomicBool::new(false)),
            mixer: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns true once start() has been called.
    #[cfg(test)]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Renders the given number of interleaved frames from the attached
    /// mixer, standing in for the output callback.
    #[cfg(test)]
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0f32; frames * MOCK_CHANNELS as usize];
        if let Some(mixer) = self.mixer.lock().as_ref() {
            mixer.fill(&mut output);
        }
        output
    }
}

impl crate::audio::Device for Device {
    fn start(
        &self,
        mixer: Arc<VoiceMixer>,
        _shutdown: Shutdown,
    ) -> Result<(), crate::audio::AudioError> {
        info!(device = self.name, "Mock output started.");
        *self.mixer.lock() = Some(mixer);
        self.started.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn channels(&self) -> u16 {
        MOCK_CHANNELS
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
