//! ESP32-S3 board adapters for the winesp32 shell.

#![cfg_attr(not(test), no_std)]

pub mod network;
pub mod storage;
