//! The hardware module contains platform implementations an XCP slave can run on
//!
//! Physical targets implement [crate::channel::XcpPlatform] in their own firmware crate, or
//! through the callback table of the `ffi` crate. This module only ships the
//! [simulation::SimulationPlatform] used for bench testing.

pub mod simulation;
