//! Onboard sensor-ingest and actuation core for a small mobile robot.
//!
//! See `SPEC_FULL.md` and `DESIGN.md` at the repository root for the
//! requirements this crate implements and the provenance of each module.

#[macro_use]
extern crate failure_derive;
extern crate failure;

#[macro_use]
extern crate log;

#[macro_use]
extern crate bitflags;
extern crate crossbeam_channel;
#[macro_use]
extern crate enum_primitive;
extern crate libc;
extern crate nix;
extern crate num;

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate toml;

extern crate strum;
extern crate strum_macros;

pub mod adsb;
pub mod ascii_packet;
pub mod binary_packet;
pub mod buffer;
pub mod checksum;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod kangaroo;
pub mod log_sink;
pub mod mailbox;
pub mod protocol;
pub mod runtime;
pub mod serial;
pub mod tcp;
pub mod thread_rt;
pub mod util;
pub mod vn200;

pub use error::{Error, Result};
