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
use std::{fmt, sync::Arc};

use crate::audio::mixer::VoiceMixer;
use crate::shutdown::Shutdown;

pub mod cpal;
pub mod mixer;
pub mod mock;

/// Errors produced by the audio output layer.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device named '{0}'")]
    NoDevice(String),

    #[error("no default audio output device")]
    NoDefaultDevice,

    #[error("audio device error: {0}")]
    Device(String),
}

/// An audio output device that continuously renders a voice mixer.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts the output stream pulling from the given mixer. The stream
    /// runs until the shutdown handle is requested.
    fn start(&self, mixer: Arc<VoiceMixer>, shutdown: Shutdown) -> Result<(), AudioError>;

    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// The output channel count.
    fn channels(&self) -> u16;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, AudioError> {
    cpal::Device::list()
}

/// Gets a device by name, the default output device when None. Names
/// starting with "mock" resolve to the mock device for tests and headless
/// runs.
pub fn get_device(name: Option<&str>) -> Result<Arc<dyn Device>, AudioError> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Arc::new(mock::Device::get(name)));
        }
    }

    Ok(Arc::new(cpal::Device::get(name)?))
}
