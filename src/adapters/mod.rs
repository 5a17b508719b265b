//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - CanoKey USB vendor control transfers via libusb
//! - A scripted in-memory device for tests and offline runs

pub mod scripted;
pub mod usb;
