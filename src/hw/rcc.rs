// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Peripheral clock gating (RCC).
//!
//! Every APB peripheral has a *function enable* bit and a *clock enable* bit sitting next to
//! each other in one of the `PERI_ON` clock registers. The register is picked by the vendor
//! `APBPeriph_*` selector: the upper byte selects a 0x100-byte bank, the low byte the word
//! inside that bank.

use core::ops::Deref;

use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::ReadWrite,
};

register_structs! {
    /// `PERI_ON` clock/function control window.
    pub RegisterBlock {
        (0x000 => pub reg: [ReadWrite<u32>; 576]),
        (0x900 => @END),
    }
}

/// Peripherals whose clocks are gated through [`Rcc`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Periph {
    Gdma,
    Spi0,
    Spi1,
    Spi0Slave,
    I2c0,
    I2c1,
    I2c2,
    I2c3,
    Uart0,
    Uart1,
    Uart2,
    Uart3,
    Uart4,
    Uart5,
    Spi3w,
    Can,
    GpioA,
    GpioB,
    Codec,
    I2s0,
    I2s1,
}

impl Periph {
    /// Vendor `APBPeriph_*` function selector.
    pub const fn selector(self) -> u32 {
        use Periph::*;
        match self {
            Gdma => 0x3,
            Spi0 | Spi1 | Spi0Slave => 0x4,
            I2c0 | I2c1 | I2c2 | I2c3 => 0x5,
            Uart0 | Uart1 | Uart2 | Uart3 => 0x6,
            Spi3w => 0x7,
            GpioA | GpioB => 0x8,
            Uart4 | Uart5 => 0x23,
            Codec | I2s0 | I2s1 => 0x100,
            Can => 0x808,
        }
    }

    /// Bit position of the `APBPeriph_*_CLOCK` enable.
    pub const fn clock_bit(self) -> u32 {
        use Periph::*;
        match self {
            Gdma | Spi0 | I2c0 | GpioA | I2s0 => 1,
            Uart0 | Uart4 => 2,
            I2s1 => 3,
            GpioB => 5,
            Spi1 | I2c1 | Codec => 9,
            Uart1 | Uart5 => 10,
            Spi3w => 15,
            Spi0Slave | I2c2 => 17,
            Uart2 => 18,
            Can => 24,
            I2c3 => 25,
            Uart3 => 26,
        }
    }

    /// Clock enable and function enable bits.
    #[inline]
    pub const fn mask(self) -> u32 {
        let bit = self.clock_bit();
        (1 << bit) | (1 << (bit - 1))
    }

    #[inline]
    fn word_index(self) -> usize {
        let sel = self.selector();
        ((sel >> 8) as usize) * 0x40 + (sel & 0xFF) as usize
    }
}

/// Clock controller.
pub struct Rcc<R> {
    rcc: R,
}

impl<R> Rcc<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(rcc: R) -> Self {
        Self { rcc }
    }

    /// Enable or disable the clock and function of `periph`.
    pub fn periph_clock_cmd(&self, periph: Periph, enable: bool) {
        let reg = &self.rcc.reg[periph.word_index()];
        let mask = periph.mask();
        if enable {
            reg.set(reg.get() | mask);
        } else {
            reg.set(reg.get() & !mask);
        }
    }

    /// Returns `true` when both the clock and function bits of `periph` are set.
    pub fn is_enabled(&self, periph: Periph) -> bool {
        let mask = periph.mask();
        self.rcc.reg[periph.word_index()].get() & mask == mask
    }

    pub fn free(self) -> R {
        self.rcc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn uart3_clock_lands_in_uart_word() {
        let regs = testutil::regs::<RegisterBlock>();
        let rcc = Rcc::new(regs);

        rcc.periph_clock_cmd(Periph::Uart3, true);

        assert_eq!(regs.reg[0x6].get(), (1 << 26) | (1 << 25));
        assert!(rcc.is_enabled(Periph::Uart3));
        assert!(!rcc.is_enabled(Periph::Uart2));
    }

    #[test]
    fn banked_selectors_use_their_own_window() {
        let regs = testutil::regs::<RegisterBlock>();
        let rcc = Rcc::new(regs);

        rcc.periph_clock_cmd(Periph::Can, true);
        rcc.periph_clock_cmd(Periph::Codec, true);

        assert_eq!(regs.reg[0x208].get(), (1 << 24) | (1 << 23));
        assert_eq!(regs.reg[0x40].get(), (1 << 9) | (1 << 8));
    }

    #[test]
    fn disable_keeps_neighbours() {
        let regs = testutil::regs::<RegisterBlock>();
        let rcc = Rcc::new(regs);

        rcc.periph_clock_cmd(Periph::I2c0, true);
        rcc.periph_clock_cmd(Periph::I2c1, true);
        rcc.periph_clock_cmd(Periph::I2c0, false);

        assert!(!rcc.is_enabled(Periph::I2c0));
        assert!(rcc.is_enabled(Periph::I2c1));
    }
}
