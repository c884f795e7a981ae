// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Nested Vectored Interrupt Controller (NVIC) helpers.
//!
//! Thin layer over the NVIC enable/pending/priority banks, plus the SoC vendor registers that
//! route low-priority interrupts. The DLPS sequencer snapshots both.

use core::ops::Deref;

use cortex_m::interrupt::InterruptNumber;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_structs,
    registers::{ReadOnly, ReadWrite},
};

/// Implemented priority bits.
pub const PRIO_BITS: u8 = 3;

/// Lowest (numerically largest) usable priority.
pub const LOWEST_PRIORITY: u8 = (1 << PRIO_BITS) - 1;

register_structs! {
    /// NVIC banks starting at `0xE000_E100`.
    pub RegisterBlock {
        (0x000 => pub iser: [ReadWrite<u32>; 16]),
        (0x040 => _reserved0),
        (0x080 => pub icer: [ReadWrite<u32>; 16]),
        (0x0C0 => _reserved1),
        (0x100 => pub ispr: [ReadWrite<u32>; 16]),
        (0x140 => _reserved2),
        (0x180 => pub icpr: [ReadWrite<u32>; 16]),
        (0x1C0 => _reserved3),
        (0x200 => pub iabr: [ReadOnly<u32>; 16]),
        (0x240 => _reserved4),
        (0x300 => pub ipr: [ReadWrite<u8>; 496]),
        (0x4F0 => @END),
    }
}

register_structs! {
    /// SoC vendor block.
    pub VendorRegisterBlock {
        (0x000 => _reserved0),
        (0x008 => pub low_pri_int_mode: ReadWrite<u32>),
        (0x00C => pub low_pri_int_en: ReadWrite<u32>),
        (0x010 => @END),
    }
}

/// NVIC_InitTypeDef analogue.
#[derive(Copy, Clone, Debug)]
pub struct NvicInit<I> {
    pub channel: I,
    /// Preemption priority, `0..=LOWEST_PRIORITY`.
    pub priority: u8,
    pub enable: bool,
}

pub struct Nvic<R> {
    nvic: R,
}

#[inline]
fn split<I: InterruptNumber>(irq: I) -> (usize, u32) {
    let n = irq.number() as usize;
    (n / 32, 1 << (n % 32))
}

impl<R> Nvic<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(nvic: R) -> Self {
        Self { nvic }
    }

    /// Program the priority of `cfg.channel` and enable or disable it.
    pub fn init<I: InterruptNumber>(&self, cfg: &NvicInit<I>) {
        if cfg.enable {
            self.set_priority(cfg.channel, cfg.priority);
            self.enable(cfg.channel);
        } else {
            self.disable(cfg.channel);
        }
    }

    #[inline]
    pub fn enable<I: InterruptNumber>(&self, irq: I) {
        let (word, mask) = split(irq);
        self.nvic.iser[word].set(mask);
    }

    #[inline]
    pub fn disable<I: InterruptNumber>(&self, irq: I) {
        let (word, mask) = split(irq);
        self.nvic.icer[word].set(mask);
    }

    pub fn is_enabled<I: InterruptNumber>(&self, irq: I) -> bool {
        let (word, mask) = split(irq);
        self.nvic.iser[word].get() & mask != 0
    }

    #[inline]
    pub fn pend<I: InterruptNumber>(&self, irq: I) {
        let (word, mask) = split(irq);
        self.nvic.ispr[word].set(mask);
    }

    #[inline]
    pub fn unpend<I: InterruptNumber>(&self, irq: I) {
        let (word, mask) = split(irq);
        self.nvic.icpr[word].set(mask);
    }

    pub fn is_pending<I: InterruptNumber>(&self, irq: I) -> bool {
        let (word, mask) = split(irq);
        self.nvic.ispr[word].get() & mask != 0
    }

    /// Set the preemption priority. Values above [`LOWEST_PRIORITY`] are clamped.
    pub fn set_priority<I: InterruptNumber>(&self, irq: I, priority: u8) {
        let prio = priority.min(LOWEST_PRIORITY);
        self.nvic.ipr[irq.number() as usize].set(prio << (8 - PRIO_BITS));
    }

    pub fn priority<I: InterruptNumber>(&self, irq: I) -> u8 {
        self.nvic.ipr[irq.number() as usize].get() >> (8 - PRIO_BITS)
    }

    pub fn free(self) -> R {
        self.nvic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testutil, Interrupt};

    #[test]
    fn init_writes_shifted_priority_and_enable_bit() {
        let regs = testutil::regs::<RegisterBlock>();
        let nvic = Nvic::new(regs);

        nvic.init(&NvicInit {
            channel: Interrupt::UART2,
            priority: 3,
            enable: true,
        });

        assert_eq!(regs.ipr[22].get(), 3 << 5);
        assert_eq!(regs.iser[0].get(), 1 << 22);
        assert_eq!(nvic.priority(Interrupt::UART2), 3);
    }

    #[test]
    fn high_lines_use_the_second_word() {
        let regs = testutil::regs::<RegisterBlock>();
        let nvic = Nvic::new(regs);

        nvic.disable(Interrupt::CAN);
        nvic.pend(Interrupt::ADC);

        assert_eq!(regs.icer[1].get(), 1 << (37 - 32));
        assert!(nvic.is_pending(Interrupt::ADC));
        assert!(!nvic.is_pending(Interrupt::CAN));
    }

    #[test]
    fn priority_is_clamped() {
        let regs = testutil::regs::<RegisterBlock>();
        let nvic = Nvic::new(regs);

        nvic.set_priority(Interrupt::RTC, 200);

        assert_eq!(nvic.priority(Interrupt::RTC), LOWEST_PRIORITY);
    }
}
