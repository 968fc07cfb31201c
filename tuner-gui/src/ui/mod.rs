//! # UI Module
//!
//! Layout of the tuner window.

pub mod main_display;
