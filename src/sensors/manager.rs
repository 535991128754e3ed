// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor manager - owns the camera and audio workers

use tracing::info;

use super::audio::AudioTask;
use super::camera::CameraTask;
use super::hardware::HardwareCamera;
use super::simulator::{Scene, SimulatedCamera, SimulatedMicrophone};
use super::traits::{Device, Microphone};
use super::worker::{Worker, WorkerError};
use crate::config::Config;
use crate::core::{sources, EventSender};

/// Manages both sensing workers
pub struct SensorManager {
    camera: Worker,
    audio: Worker,
}

impl SensorManager {
    /// Build workers on simulated devices in demo mode, physical ones otherwise
    pub fn new(config: &Config, sender: EventSender) -> Self {
        let (cam0, cam10, microphone): (Box<dyn Device>, Box<dyn Device>, Box<dyn Microphone>) =
            if config.demo_mode {
                info!("Adding demo sensors...");
                (
                    Box::new(SimulatedCamera::new(sources::CAM0, Scene::Floor)),
                    Box::new(SimulatedCamera::new(sources::CAM10, Scene::Checkpoint)),
                    Box::new(SimulatedMicrophone::new(
                        config.audio_sample_rate,
                        config.audio_chunk_size,
                    )),
                )
            } else {
                (
                    Box::new(HardwareCamera::new(sources::CAM0, config.cam0_device)),
                    Box::new(HardwareCamera::new(sources::CAM10, config.cam10_device)),
                    physical_microphone(config),
                )
            };

        Self::with_devices(config, sender, cam0, cam10, microphone)
    }

    pub fn with_devices(
        config: &Config,
        sender: EventSender,
        cam0: Box<dyn Device>,
        cam10: Box<dyn Device>,
        microphone: Box<dyn Microphone>,
    ) -> Self {
        let camera = CameraTask::from_config(config, sender.clone(), cam0, cam10);
        let audio = AudioTask::new(microphone, sender, config.noise_threshold);

        Self {
            camera: Worker::new("camera", camera),
            audio: Worker::new("audio", audio),
        }
    }

    pub fn camera(&self) -> &Worker {
        &self.camera
    }

    pub fn audio(&self) -> &Worker {
        &self.audio
    }

    pub fn start_camera(&self) -> Result<(), WorkerError> {
        self.camera.start()
    }

    pub fn start_audio(&self) -> Result<(), WorkerError> {
        self.audio.start()
    }

    /// Request both workers to stop
    pub fn stop_all(&self) {
        self.camera.stop();
        self.audio.stop();
    }

    /// Wait for both workers to finish teardown
    pub fn join_all(&self) {
        self.camera.join();
        self.audio.join();
    }
}

#[cfg(feature = "audio")]
fn physical_microphone(config: &Config) -> Box<dyn Microphone> {
    Box::new(super::hardware::CpalMicrophone::new(
        config.audio_sample_rate,
        config.audio_chunk_size,
    ))
}

#[cfg(not(feature = "audio"))]
fn physical_microphone(_config: &Config) -> Box<dyn Microphone> {
    tracing::warn!("Built without the audio feature; audio monitoring unavailable");
    Box::new(super::hardware::UnavailableMicrophone)
}
