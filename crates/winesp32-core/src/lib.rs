//! Portable core of the winesp32 shell: persisted system settings and the
//! BLE file-transfer state machine.
//!
//! Everything here is hardware-free so it can be exercised on the host with
//! `cargo test`; the board crate plugs real storage in through
//! [`storage::FileStore`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod settings;
pub mod storage;
pub mod text;
pub mod transfer;
