// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor module - capture devices, detectors and sensing workers

mod audio;
mod camera;
mod detectors;
mod hardware;
mod manager;
mod simulator;
mod traits;
mod worker;

pub use audio::{downmix, AudioTask};
pub use camera::{
    CameraChannel, CameraTask, FpsCounter, FrameAnalyzer, PeopleAnalyzer, PpeAnalyzer,
};
pub use detectors::{
    calculate_db, find_regions, PeopleCounter, PostureDetector, PpeDetector, Region,
    SoundLevelMeter,
};
#[cfg(feature = "audio")]
pub use hardware::CpalMicrophone;
pub use hardware::{HardwareCamera, UnavailableMicrophone};
pub use manager::SensorManager;
pub use simulator::{Scene, SimulatedCamera, SimulatedMicrophone};
pub use traits::{
    detect_or_default, AccidentAssessment, AudioCapture, BlockCallback, Detector, Device, Frame,
    Microphone, PeopleCount, PpeAssessment, SoundLevel,
};
pub use worker::{Worker, WorkerControl, WorkerError, WorkerState, WorkerTask};
