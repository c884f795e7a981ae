// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Real-time counter (RTC) in the always-on domain.
//!
//! A 12-bit prescaler divides the 32 kHz clock into a 32-bit counter with four comparators,
//! four "greater than" comparators and a prescaler comparator. Interrupt and wakeup sources
//! share one status register; the clear bit of a source is its status bit shifted right by 8.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

/// Largest prescaler and prescaler-compare value.
pub const PRESCALER_MAX: u32 = 0xFFF;

register_bitfields! [u32,
    pub CR0 [
        START OFFSET(0) NUMBITS(1) [],
        CNT_RST OFFSET(1) NUMBITS(1) [],
        PRE_CNT_RST OFFSET(2) NUMBITS(1) [],
        NV_EN OFFSET(3) NUMBITS(1) []
    ],
    pub WAKEUP_EN [
        SYS_WAKEUP OFFSET(0) NUMBITS(1) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub cr0: ReadWrite<u32, CR0::Register>),
        (0x004 => pub wakeup_en: ReadWrite<u32, WAKEUP_EN::Register>),
        (0x008 => pub int_sr: ReadOnly<u32>),
        (0x00C => pub int_clr: ReadWrite<u32>),
        (0x010 => pub prescaler: ReadWrite<u32>),
        (0x014 => pub comp: [ReadWrite<u32>; 4]),
        (0x024 => pub comp_gt: [ReadWrite<u32>; 4]),
        (0x034 => pub pre_comp: ReadWrite<u32>),
        (0x038 => pub cnt: ReadOnly<u32>),
        (0x03C => pub pre_cnt: ReadOnly<u32>),
        (0x040 => pub backup: ReadWrite<u32>),
        (0x044 => @END),
    }
}

/// Interrupt sources (`RTC_INT_*`).
pub mod int {
    pub const TICK: u32 = 1 << 8;
    pub const OVF: u32 = 1 << 9;
    pub const PRE_COMP: u32 = 1 << 10;
    pub const PRE_COMP3: u32 = 1 << 11;
    pub const COMP0: u32 = 1 << 16;
    pub const COMP1: u32 = 1 << 17;
    pub const COMP2: u32 = 1 << 18;
    pub const COMP3: u32 = 1 << 19;

    pub const ALL: u32 = TICK | OVF | PRE_COMP | PRE_COMP3 | COMP0 | COMP1 | COMP2 | COMP3;

    /// Interrupt of comparator `index`.
    #[inline]
    pub const fn comp(index: u8) -> u32 {
        COMP0 << index
    }
}

/// Wakeup sources (`RTC_WK_*`).
pub mod wk {
    pub const TICK: u32 = 1 << 8;
    pub const OVF: u32 = 1 << 9;
    pub const PRE_COMP: u32 = 1 << 10;
    pub const PRE_COMP3: u32 = 1 << 11;
    pub const COMP0GT: u32 = 1 << 12;
    pub const COMP1GT: u32 = 1 << 13;
    pub const COMP2GT: u32 = 1 << 14;
    pub const COMP3GT: u32 = 1 << 15;
    pub const COMP0: u32 = 1 << 20;
    pub const COMP1: u32 = 1 << 21;
    pub const COMP2: u32 = 1 << 22;
    pub const COMP3: u32 = 1 << 23;

    pub const ALL_COMP: u32 = COMP0 | COMP1 | COMP2 | COMP3;
    pub const ALL_COMP_GT: u32 = COMP0GT | COMP1GT | COMP2GT | COMP3GT;
}

/// Comparator index (`RTC_COMP0..3`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Comp {
    Comp0 = 0,
    Comp1 = 1,
    Comp2 = 2,
    Comp3 = 3,
}

pub struct Rtc<R> {
    rtc: R,
}

impl<R> Rtc<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(rtc: R) -> Self {
        Self { rtc }
    }

    /// Stop the counter, mask everything and clear all pending sources.
    pub fn deinit(&self) {
        self.rtc.cr0.set(0);
        self.rtc.wakeup_en.set(0);
        self.rtc.prescaler.set(0);
        for c in self.rtc.comp.iter().chain(self.rtc.comp_gt.iter()) {
            c.set(0);
        }
        self.rtc.pre_comp.set(0);
        self.clear_interrupt(int::ALL);
        self.clear_wakeup_status(wk::ALL_COMP | wk::ALL_COMP_GT);
    }

    /// Counter tick = 32 kHz / (`value` + 1).
    pub fn set_prescaler(&self, value: u16) {
        self.rtc.prescaler.set(value as u32 & PRESCALER_MAX);
    }

    pub fn cmd(&self, enable: bool) {
        self.rtc.cr0.modify(CR0::START.val(enable as u32));
    }

    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        let mask = mask & int::ALL;
        let v = self.rtc.cr0.get();
        self.rtc.cr0.set(if enable { v | mask } else { v & !mask });
    }

    pub fn wakeup_config(&self, mask: u32, enable: bool) {
        let mask = mask & !1;
        let v = self.rtc.wakeup_en.get();
        self.rtc.wakeup_en.set(if enable { v | mask } else { v & !mask });
    }

    /// Route RTC interrupts to the NVIC.
    pub fn nv_cmd(&self, enable: bool) {
        self.rtc.cr0.modify(CR0::NV_EN.val(enable as u32));
    }

    /// Let RTC wakeup sources wake the system from DLPS.
    pub fn system_wakeup_config(&self, enable: bool) {
        self.rtc
            .wakeup_en
            .modify(WAKEUP_EN::SYS_WAKEUP.val(enable as u32));
    }

    pub fn reset_counter(&self) {
        self.rtc.cr0.modify(CR0::CNT_RST::SET);
        self.rtc.cr0.modify(CR0::CNT_RST::CLEAR);
    }

    pub fn reset_prescaler_counter(&self) {
        self.rtc.cr0.modify(CR0::PRE_CNT_RST::SET);
        self.rtc.cr0.modify(CR0::PRE_CNT_RST::CLEAR);
    }

    #[inline]
    pub fn interrupt_status(&self, flags: u32) -> bool {
        self.rtc.int_sr.get() & flags != 0
    }

    #[inline]
    pub fn clear_interrupt(&self, flags: u32) {
        self.rtc.int_clr.set((flags & int::ALL) >> 8);
    }

    pub fn clear_comp_interrupt(&self, index: Comp) {
        self.clear_interrupt(int::comp(index as u8));
    }

    pub fn clear_overflow_interrupt(&self) {
        self.clear_interrupt(int::OVF);
    }

    pub fn clear_tick_interrupt(&self) {
        self.clear_interrupt(int::TICK);
    }

    #[inline]
    pub fn wakeup_status(&self, flags: u32) -> bool {
        self.rtc.int_sr.get() & flags != 0
    }

    #[inline]
    pub fn clear_wakeup_status(&self, flags: u32) {
        self.rtc.int_clr.set(flags >> 8);
    }

    #[inline]
    pub fn set_comp_value(&self, index: Comp, value: u32) {
        self.rtc.comp[index as usize].set(value);
    }

    #[inline]
    pub fn comp_value(&self, index: Comp) -> u32 {
        self.rtc.comp[index as usize].get()
    }

    #[inline]
    pub fn set_comp_gt_value(&self, index: Comp, value: u32) {
        self.rtc.comp_gt[index as usize].set(value);
    }

    #[inline]
    pub fn comp_gt_value(&self, index: Comp) -> u32 {
        self.rtc.comp_gt[index as usize].get()
    }

    #[inline]
    pub fn set_pre_comp_value(&self, value: u32) {
        self.rtc.pre_comp.set(value & PRESCALER_MAX);
    }

    #[inline]
    pub fn pre_comp_value(&self) -> u32 {
        self.rtc.pre_comp.get()
    }

    #[inline]
    pub fn counter(&self) -> u32 {
        self.rtc.cnt.get()
    }

    #[inline]
    pub fn pre_counter(&self) -> u32 {
        self.rtc.pre_cnt.get()
    }

    /// The backup register survives DLPS and power-down.
    #[inline]
    pub fn write_backup_reg(&self, value: u32) {
        self.rtc.backup.set(value);
    }

    #[inline]
    pub fn read_backup_reg(&self) -> u32 {
        self.rtc.backup.get()
    }

    pub fn free(self) -> R {
        self.rtc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn clear_bits_are_status_shifted_by_8() {
        let regs = testutil::regs::<RegisterBlock>();
        let rtc = Rtc::new(regs);

        rtc.clear_comp_interrupt(Comp::Comp2);
        assert_eq!(regs.int_clr.get(), 1 << 10);

        rtc.clear_tick_interrupt();
        assert_eq!(regs.int_clr.get(), 1);

        rtc.clear_wakeup_status(wk::COMP0GT | wk::COMP3);
        assert_eq!(regs.int_clr.get(), (1 << 4) | (1 << 15));
    }

    #[test]
    fn comparator_setup_for_10hz_tick() {
        let regs = testutil::regs::<RegisterBlock>();
        let rtc = Rtc::new(regs);

        rtc.set_prescaler(3200 - 1);
        rtc.set_comp_value(Comp::Comp0, 10);
        rtc.interrupt_config(int::COMP0 | int::TICK, true);
        rtc.nv_cmd(true);
        rtc.cmd(true);

        assert_eq!(regs.prescaler.get(), 3199);
        assert_eq!(rtc.comp_value(Comp::Comp0), 10);
        assert_eq!(regs.cr0.get() & int::ALL, int::COMP0 | int::TICK);
        assert!(regs.cr0.is_set(CR0::START));
        assert!(regs.cr0.is_set(CR0::NV_EN));

        rtc.interrupt_config(int::TICK, false);
        assert_eq!(regs.cr0.get() & int::ALL, int::COMP0);
    }

    #[test]
    fn prescaler_is_12_bits() {
        let regs = testutil::regs::<RegisterBlock>();
        let rtc = Rtc::new(regs);

        rtc.set_prescaler(0xFFFF);
        rtc.set_pre_comp_value(0x1234);

        assert_eq!(regs.prescaler.get(), 0xFFF);
        assert_eq!(rtc.pre_comp_value(), 0x234);
    }

    #[test]
    fn wakeup_config_keeps_system_wakeup_bit() {
        let regs = testutil::regs::<RegisterBlock>();
        let rtc = Rtc::new(regs);

        rtc.system_wakeup_config(true);
        rtc.wakeup_config(wk::COMP1GT | wk::COMP1, true);
        rtc.set_comp_gt_value(Comp::Comp1, 0x40);

        assert_eq!(regs.wakeup_en.get(), 1 | wk::COMP1GT | wk::COMP1);
        assert_eq!(rtc.comp_gt_value(Comp::Comp1), 0x40);

        rtc.wakeup_config(wk::COMP1, false);
        assert_eq!(regs.wakeup_en.get(), 1 | wk::COMP1GT);
    }

    #[test]
    fn backup_register_round_trips() {
        let regs = testutil::regs::<RegisterBlock>();
        let rtc = Rtc::new(regs);

        rtc.write_backup_reg(0xA5A5_0001);
        assert_eq!(rtc.read_backup_reg(), 0xA5A5_0001);
    }
}
