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
use std::{fmt, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, span, Level};

use crate::audio::mixer::VoiceMixer;
use crate::audio::{AudioError, Device as AudioDevice};
use crate::shutdown::Shutdown;

/// A small wrapper around a cpal::Device carrying its negotiated output
/// configuration.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The device's default output configuration.
    config: cpal::SupportedStreamConfig,
}

impl Device {
    /// Lists cpal devices behind the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, AudioError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Gets a device by name, or the default output device when None.
    pub fn get(name: Option<&str>) -> Result<Device, AudioError> {
        match name {
            Some(name) => Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name.trim())
                .ok_or_else(|| AudioError::NoDevice(name.to_string())),
            None => {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or(AudioError::NoDefaultDevice)?;
                Device::wrap(device)
            }
        }
    }

    /// Lists cpal output devices.
    fn list_cpal_devices() -> Result<Vec<Device>, AudioError> {
        let host = cpal::default_host();
        let outputs = host
            .output_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let mut devices: Vec<Device> = Vec::new();
        for device in outputs {
            match Device::wrap(device) {
                Ok(device) => devices.push(device),
                Err(e) => debug!(err = %e, "Skipping output device."),
            }
        }
        Ok(devices)
    }

    /// Wraps a cpal device with its default output configuration.
    fn wrap(device: cpal::Device) -> Result<Device, AudioError> {
        let name = device
            .name()
            .unwrap_or_else(|_| "unknown device".to_string());
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(format!("{}: {}", name, e)))?;
        Ok(Device {
            name,
            device,
            config,
        })
    }
}

impl AudioDevice for Device {
    /// Starts the continuous output stream on its own thread. The stream
    /// lives until the shutdown handle is requested, then is dropped.
    fn start(&self, mixer: Arc<VoiceMixer>, shutdown: Shutdown) -> Result<(), AudioError> {
        let device = self.device.clone();
        let stream_config = self.config.config();
        let sample_format = self.config.sample_format();
        let name = self.name.clone();

        thread::spawn(move || {
            let span = span!(Level::INFO, "audio output");
            let _enter = span.enter();

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    let mixer = mixer.clone();
                    device.build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            mixer.fill(data);
                        },
                        |err| error!("Output stream error: {}", err),
                        None,
                    )
                }
                cpal::SampleFormat::I16 => {
                    let mut callback = converting_callback::<i16>(mixer.clone());
                    device.build_output_stream(
                        &stream_config,
                        move |data: &mut [i16], info: &cpal::OutputCallbackInfo| {
                            callback(data, info);
                        },
                        |err| error!("Output stream error: {}", err),
                        None,
                    )
                }
                cpal::SampleFormat::U16 => {
                    let mut callback = converting_callback::<u16>(mixer.clone());
                    device.build_output_stream(
                        &stream_config,
                        move |data: &mut [u16], info: &cpal::OutputCallbackInfo| {
                            callback(data, info);
                        },
                        |err| error!("Output stream error: {}", err),
                        None,
                    )
                }
                other => {
                    error!(format = ?other, "Unsupported output sample format.");
                    return;
                }
            };

            match stream_result {
                Ok(stream) => {
                    if let Err(e) = stream.play() {
                        error!(err = %e, "Failed to start output stream.");
                        return;
                    }
                    info!(device = name, "Output stream started.");

                    // Keep the stream alive until shutdown.
                    shutdown.wait();
                    info!(device = name, "Output stream stopped.");
                }
                Err(e) => error!(err = %e, "Failed to create output stream."),
            }
        });

        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate()
    }

    fn channels(&self) -> u16 {
        self.config.channels()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (channels={}, rate={})",
            self.name,
            self.config.channels(),
            self.config.sample_rate(),
        )
    }
}

/// Produces a callback that mixes into a scratch f32 buffer and converts to
/// the device's integer sample format.
fn converting_callback<T: cpal::SizedSample + cpal::FromSample<f32>>(
    mixer: Arc<VoiceMixer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.fill(&mut scratch);
        for (dst, src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(*src);
        }
    }
}
