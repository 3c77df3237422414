#![no_std]

// Reset and ISP-entry sequencing for a target held behind two output lines.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Backends plug in through the traits exposed by `line`,
// `config`, and `endpoints`; everything else is shared business logic.

pub mod config;
pub mod console;
pub mod contract;
pub mod controller;
pub mod device;
pub mod endpoints;
pub mod error;
pub mod line;
pub mod sequencer;
pub mod telemetry;

pub use config::{DeviceConfig, PropertySource, PropertyValue, ResetPolarity};
pub use contract::{ResetControl, ResetControllerHandle, ResetId};
pub use device::ResetDevice;
pub use error::{AttachError, EndpointError, ResetError};
pub use line::{DigitalLine, LineId, LineProvider};
pub use sequencer::{ResetSequencer, SequenceKind};
