// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level peripheral drivers.
//!
//! Each module carries the register overlay of one peripheral, its `Config` struct with the
//! vendor reset defaults and a driver wrapping the register block.

pub mod can;
pub mod codec;
pub mod gdma;
pub mod i2c;
pub mod i2s;
pub mod nvic;
pub mod pinmux;
pub mod rcc;
pub mod rtc;
pub mod spi;
pub mod spi3w;
pub mod uart;

pub use can::Can;
pub use codec::Codec;
pub use gdma::Gdma;
pub use i2c::I2c;
pub use i2s::I2s;
pub use nvic::Nvic;
pub use pinmux::{Pad, Pin, Pinmux};
pub use rcc::Rcc;
pub use rtc::Rtc;
pub use spi::{ChipSelect, Spi};
pub use spi3w::Spi3w;
pub use uart::Uart;

/// Poll budget for busy-wait loops that have a timeout.
pub(crate) const TIMEOUT: u32 = 0x1_FFFF;
