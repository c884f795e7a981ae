// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Peripheral base addresses and owned handles.
//!
//! Each handle is a zero-sized token that dereferences to the register block of its peripheral.
//! [`Peripherals::take`] hands every token out exactly once.

use core::{
    marker::PhantomData,
    ops::Deref,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::hw::{can, codec, gdma, i2c, i2s, nvic, pinmux, rcc, rtc, spi, spi3w, uart};

macro_rules! peripheral {
    ($(#[$attr:meta])* $name:ident: $block:ty = $addr:expr) => {
        $(#[$attr])*
        pub struct $name {
            _marker: PhantomData<*const ()>,
        }

        unsafe impl Send for $name {}

        impl $name {
            /// Pointer to the register block.
            pub const PTR: *const $block = $addr as *const _;

            #[inline(always)]
            pub const fn ptr() -> *const $block {
                Self::PTR
            }

            /// Conjure the handle out of thin air.
            ///
            /// # Safety
            ///
            /// The caller must make sure no other driver owns the same peripheral.
            #[inline]
            pub unsafe fn steal() -> Self {
                Self { _marker: PhantomData }
            }
        }

        impl Deref for $name {
            type Target = $block;

            #[inline(always)]
            fn deref(&self) -> &Self::Target {
                // SAFETY: fixed MMIO address of the peripheral.
                unsafe { &*Self::PTR }
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

peripheral!(/// RTC and its comparators.
    RTC: rtc::RegisterBlock = 0x5000_1800);
peripheral!(/// Pad control (power, pull, wakeup).
    PAD: pinmux::PadRegisterBlock = 0x5000_1900);
peripheral!(/// `PERI_ON` clock and function enables.
    RCC: rcc::RegisterBlock = 0x5000_2000);
peripheral!(/// Pin multiplexer.
    PINMUX: pinmux::RegisterBlock = 0x5000_2500);
peripheral!(/// SoC vendor registers holding the low-priority interrupt routing.
    SOC_VENDOR: nvic::VendorRegisterBlock = 0x5000_6000);
peripheral!(SPI0: spi::RegisterBlock = 0x5001_3000);
peripheral!(SPI1: spi::RegisterBlock = 0x5001_3500);
peripheral!(/// SPI0 in slave mode.
    SPI_SLAVE: spi::RegisterBlock = 0x5001_3800);
peripheral!(I2S0: i2s::RegisterBlock = 0x5002_0000);
peripheral!(I2S1: i2s::RegisterBlock = 0x5002_1000);
peripheral!(CODEC: codec::RegisterBlock = 0x5002_2000);
peripheral!(GDMA: gdma::RegisterBlock = 0x5002_5000);
peripheral!(CAN: can::RegisterBlock = 0x5002_8000);
peripheral!(UART0: uart::RegisterBlock = 0x5003_4400);
peripheral!(UART1: uart::RegisterBlock = 0x5003_4500);
peripheral!(UART2: uart::RegisterBlock = 0x5003_4800);
peripheral!(UART3: uart::RegisterBlock = 0x5003_4C00);
peripheral!(UART4: uart::RegisterBlock = 0x5003_5000);
peripheral!(UART5: uart::RegisterBlock = 0x5003_5500);
peripheral!(I2C0: i2c::RegisterBlock = 0x5003_5800);
peripheral!(I2C1: i2c::RegisterBlock = 0x5003_5C00);
peripheral!(I2C2: i2c::RegisterBlock = 0x5003_6000);
peripheral!(I2C3: i2c::RegisterBlock = 0x5003_6500);
peripheral!(SPI3W: spi3w::RegisterBlock = 0x5003_6800);
peripheral!(/// NVIC enable, pending and priority banks.
    NVIC: nvic::RegisterBlock = 0xE000_E100);

static TAKEN: AtomicBool = AtomicBool::new(false);

/// All peripherals of the device.
#[allow(non_snake_case)]
pub struct Peripherals {
    pub RTC: RTC,
    pub PAD: PAD,
    pub RCC: RCC,
    pub PINMUX: PINMUX,
    pub SOC_VENDOR: SOC_VENDOR,
    pub SPI0: SPI0,
    pub SPI1: SPI1,
    pub SPI_SLAVE: SPI_SLAVE,
    pub I2S0: I2S0,
    pub I2S1: I2S1,
    pub CODEC: CODEC,
    pub GDMA: GDMA,
    pub CAN: CAN,
    pub UART0: UART0,
    pub UART1: UART1,
    pub UART2: UART2,
    pub UART3: UART3,
    pub UART4: UART4,
    pub UART5: UART5,
    pub I2C0: I2C0,
    pub I2C1: I2C1,
    pub I2C2: I2C2,
    pub I2C3: I2C3,
    pub SPI3W: SPI3W,
    pub NVIC: NVIC,
}

impl Peripherals {
    /// Returns all the peripherals *once*.
    pub fn take() -> Option<Self> {
        critical_section::with(|_| {
            if TAKEN.load(Ordering::Relaxed) {
                None
            } else {
                TAKEN.store(true, Ordering::Relaxed);
                // SAFETY: guarded by `TAKEN`.
                Some(unsafe { Self::steal() })
            }
        })
    }

    /// Unchecked version of [`Peripherals::take`].
    ///
    /// # Safety
    ///
    /// Each returned handle must be used by at most one driver at a time.
    pub unsafe fn steal() -> Self {
        TAKEN.store(true, Ordering::Relaxed);
        Self {
            RTC: RTC::steal(),
            PAD: PAD::steal(),
            RCC: RCC::steal(),
            PINMUX: PINMUX::steal(),
            SOC_VENDOR: SOC_VENDOR::steal(),
            SPI0: SPI0::steal(),
            SPI1: SPI1::steal(),
            SPI_SLAVE: SPI_SLAVE::steal(),
            I2S0: I2S0::steal(),
            I2S1: I2S1::steal(),
            CODEC: CODEC::steal(),
            GDMA: GDMA::steal(),
            CAN: CAN::steal(),
            UART0: UART0::steal(),
            UART1: UART1::steal(),
            UART2: UART2::steal(),
            UART3: UART3::steal(),
            UART4: UART4::steal(),
            UART5: UART5::steal(),
            I2C0: I2C0::steal(),
            I2C1: I2C1::steal(),
            I2C2: I2C2::steal(),
            I2C3: I2C3::steal(),
            SPI3W: SPI3W::steal(),
            NVIC: NVIC::steal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_hands_out_peripherals_once() {
        let first = Peripherals::take();
        assert!(first.is_some());
        assert!(Peripherals::take().is_none());
    }

    #[test]
    fn uart_bases_do_not_overlap() {
        let size = core::mem::size_of::<uart::RegisterBlock>();
        let bases = [
            UART0::PTR as usize,
            UART1::PTR as usize,
            UART2::PTR as usize,
            UART3::PTR as usize,
            UART4::PTR as usize,
            UART5::PTR as usize,
        ];
        for pair in bases.windows(2) {
            assert!(pair[0] + size <= pair[1]);
        }
    }
}
