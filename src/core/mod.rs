//! Core module containing the receiver protocol stack
//!
//! This module provides:
//! - Transport layer with deadline-bounded reads (live serial, replay)
//! - NMEA 0183 and SiRF binary codecs
//! - Typed message catalog with a static decode registry
//! - Mode/line-settings autodetection
//! - Session management with message dispatch and mode switching

pub mod detect;
pub mod protocol;
pub mod session;
pub mod transport;
