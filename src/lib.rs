#![cfg_attr(not(test), no_std)]

// 启用 alloc
extern crate alloc;

pub mod at;
pub mod drivers;
pub mod error;
pub mod event;
pub mod nat;
pub mod relay;
