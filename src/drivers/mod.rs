// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device-Specific Drivers
//!
//! This module contains device-specific drivers that sit above the raw `hw/` layer and below the
//! application logic.
//!
//! ## Existing drivers
//!
//! - [`spi_flash`] – GigaDevice GD25Q128E SPI NOR flash

pub mod spi_flash;

pub use spi_flash::SpiFlash;
