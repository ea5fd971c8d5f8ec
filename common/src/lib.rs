#![cfg_attr(not(any(test, feature = "std")), no_std)]
//! Types shared between the wifi-xBridge firmware and the host tools.

pub mod transmitter_id;
