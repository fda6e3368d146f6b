#![warn(missing_docs)]

//! Machine directive emission for the extrudo toolpath engine.
//!
//! This crate turns processed layers into `Move`/`Line`/`Arc`/`Command`
//! directives, applying the speed and filament-feed limits of a machine
//! profile.
//!
//! # Example
//!
//! ```ignore
//! use extrudo_toolpath::{process_layers, EngineSettings, NoProgress};
//! use extrudo_gcode::{Emitter, MachineProfile};
//!
//! let settings = EngineSettings::default();
//! let (layers, _) = process_layers(&inputs, start, &settings, &NoProgress)?;
//!
//! let limits = MachineProfile::prusa_mk4().emitter_settings(&settings.speeds);
//! let mut emitter = Emitter::new(&limits);
//! for layer in &layers {
//!     emitter.emit_layer(&layer.segments);
//! }
//! let directives = emitter.finish();
//! ```

pub mod directive;
pub mod emitter;
pub mod error;
pub mod printer;

pub use directive::Directive;
pub use emitter::{emit, Emitter, EmitterSettings};
pub use error::{EmitError, Result};
pub use printer::{MachineProfile, PROFILE_KEYS};
