// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Physical device backends

use anyhow::{bail, Result};

use super::traits::{AudioCapture, BlockCallback, Device, Frame, Microphone};

/// Camera addressed by device index. No capture backend is compiled in, so
/// opening fails and the camera worker reports no cameras.
pub struct HardwareCamera {
    id: String,
    index: u32,
}

impl HardwareCamera {
    pub fn new(id: &str, index: u32) -> Self {
        Self {
            id: id.to_string(),
            index,
        }
    }
}

impl Device for HardwareCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<()> {
        bail!("Hardware not connected: no capture backend for device {}", self.index)
    }

    fn is_open(&self) -> bool {
        false
    }

    fn read(&mut self) -> Result<Frame> {
        bail!("Hardware not connected")
    }

    fn release(&mut self) {}
}

/// Placeholder used when the crate is built without the `audio` feature
pub struct UnavailableMicrophone;

impl Microphone for UnavailableMicrophone {
    fn name(&self) -> &str {
        "none"
    }

    fn open(&mut self, _on_block: BlockCallback) -> Result<Box<dyn AudioCapture>> {
        bail!("Hardware not connected: built without the audio feature")
    }
}

#[cfg(feature = "audio")]
pub use cpal_backend::CpalMicrophone;

#[cfg(feature = "audio")]
mod cpal_backend {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use crate::sensors::audio::downmix;
    use crate::sensors::traits::{AudioCapture, BlockCallback, Microphone};

    /// Default input device through cpal
    pub struct CpalMicrophone {
        sample_rate: u32,
        chunk_size: usize,
    }

    impl CpalMicrophone {
        pub fn new(sample_rate: u32, chunk_size: u32) -> Self {
            Self {
                sample_rate,
                chunk_size: chunk_size.max(1) as usize,
            }
        }
    }

    struct CpalCapture {
        _stream: cpal::Stream,
        healthy: Arc<AtomicBool>,
    }

    impl AudioCapture for CpalCapture {
        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::Relaxed)
        }
    }

    impl Microphone for CpalMicrophone {
        fn name(&self) -> &str {
            "default input"
        }

        fn open(&mut self, mut on_block: BlockCallback) -> Result<Box<dyn AudioCapture>> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("no default input device"))?;
            let default = device.default_input_config()?;
            let channels = default.channels();

            info!(
                "Using audio device {} ({} ch)",
                device.name().unwrap_or_else(|_| "unknown".into()),
                channels
            );

            let config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(self.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let healthy = Arc::new(AtomicBool::new(true));
            let flag = healthy.clone();
            let chunk = self.chunk_size;
            let mut pending: Vec<f32> = Vec::with_capacity(chunk * 2);

            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend(downmix(data, usize::from(channels)));
                    while pending.len() >= chunk {
                        let block: Vec<f32> = pending.drain(..chunk).collect();
                        on_block(&block);
                    }
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                    flag.store(false, Ordering::Relaxed);
                },
                None,
            )?;
            stream.play()?;

            Ok(Box::new(CpalCapture {
                _stream: stream,
                healthy,
            }))
        }
    }
}
