// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # RTL87x2G Board Support Package
//!
//! Register-level drivers for the Realtek RTL87x2G (Cortex-M33) written in Rust, together with
//! the DLPS (Deep Low Power Save) register save/restore sequencer.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`peripherals`] | Base addresses and owned peripheral handles |
//! | [`irq`] | Interrupt numbers and the vector table (`rt` feature) |
//! | [`hw`] | MCU-level drivers: UART, SPI, I2C, GDMA, CAN, I2S, CODEC, RTC, SPI3W, etc. |
//! | [`power`] | DLPS enter/exit sequencer |
//! | [`drivers`] | Device-level drivers (e.g., GD25Q128E SPI NOR flash) |
//! | [`logger`] | `log` backend printing over a UART |
//!
//! ## Getting Started
//!
//! Build docs:
//!
//! ```bash
//! cargo doc --no-deps --open
//! ```
//!
//! Run a sample on the EVB:
//!
//! ```bash
//! cd samples/uart_rx_polling
//! cargo run --release
//! ```
//!
//! ## Features
#![doc = document_features::document_features!()]
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible to the other modules.
mod fmt;

pub mod drivers;
pub mod hw;
pub mod irq;
#[cfg(feature = "log")]
pub mod logger;
pub mod peripherals;
#[cfg(feature = "dlps")]
pub mod power;

pub use irq::Interrupt;
pub use irq::Interrupt as interrupt;
pub use peripherals::Peripherals;

#[cfg(feature = "rt")]
pub use cortex_m_rt::interrupt;

/// Frequency of the APB peripheral clock feeding UART, SPI, I2C, I2S and CAN.
pub const PERIPH_CLOCK_HZ: u32 = 40_000_000;

#[cfg(test)]
pub(crate) mod testutil {
    //! RAM-backed register blocks for host tests.

    /// Leak a zeroed register block so drivers can borrow it for `'static`.
    pub fn regs<T>() -> &'static T {
        // SAFETY: register blocks are plain `UnsafeCell<uN>` arrays, all-zero is a valid value.
        Box::leak(Box::new(unsafe { core::mem::zeroed::<T>() }))
    }

    /// Store `value` into a register the driver can only read (status, FIFO level, ...).
    pub fn poke<T>(reg: &T, value: u32) {
        assert_eq!(core::mem::size_of::<T>(), 4);
        // SAFETY: tock-registers types are transparent over `UnsafeCell<u32>` at this width,
        // and the block is leaked and owned by the test.
        unsafe {
            let cell = &*(reg as *const T as *const core::cell::UnsafeCell<u32>);
            cell.get().write_volatile(value)
        }
    }
}
