//! Chip support for the Samsung S3C24xx full-speed USB device controller.

#![cfg_attr(not(test), no_std)]

pub mod support;
pub mod udc;
