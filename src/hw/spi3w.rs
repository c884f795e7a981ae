// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! 2/3-wire SPI master (SPI3W) for sensor register access.
//!
//! - Each transaction is one 7-bit address plus one data byte (write) or up to
//!   [`MAX_READ_LEN`] bytes collected in the read data registers.
//! - [`Spi3w::read_byte`] and [`Spi3w::write_byte`] poll `BUSY` for at most [`super::TIMEOUT`]
//!   rounds.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

use super::TIMEOUT;

pub const MAX_READ_LEN: u8 = 15;
pub const MAX_READ_DELAY: u8 = 0x1F;
pub const MAX_RESYNC_TIME: u8 = 0xF;

register_bitfields! [u32,
    pub CFGR [
        DIV OFFSET(0) NUMBITS(8) [],
        OE_DELAY OFFSET(8) NUMBITS(1) [],
        THREE_WIRE OFFSET(9) NUMBITS(1) [],
        EXT_MODE OFFSET(10) NUMBITS(1) [],
        RD_DELAY OFFSET(11) NUMBITS(5) [],
        RESYNC_TIME OFFSET(16) NUMBITS(4) [],
        RESYNC_EN OFFSET(20) NUMBITS(1) [],
        EN OFFSET(31) NUMBITS(1) []
    ],
    pub CR [
        DATA OFFSET(0) NUMBITS(8) [],
        ADDR OFFSET(8) NUMBITS(7) [],
        RD_NUM OFFSET(16) NUMBITS(4) [],
        WRITE OFFSET(20) NUMBITS(1) [],
        RUN OFFSET(21) NUMBITS(1) []
    ],
    pub INTCR [
        INT_EN OFFSET(0) NUMBITS(1) [],
        INT_CLR OFFSET(1) NUMBITS(1) [],
        RX_NUM_CLR OFFSET(2) NUMBITS(1) [],
        RX_FIFO_CLR OFFSET(3) NUMBITS(1) []
    ],
    pub SR [
        RX_NUM OFFSET(0) NUMBITS(4) [],
        BUSY OFFSET(4) NUMBITS(1) [],
        INT_IND OFFSET(5) NUMBITS(1) [],
        RESYNC_BUSY OFFSET(6) NUMBITS(1) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub cfgr: ReadWrite<u32, CFGR::Register>),
        (0x004 => pub cr: ReadWrite<u32, CR::Register>),
        (0x008 => pub intcr: ReadWrite<u32, INTCR::Register>),
        (0x00C => pub sr: ReadOnly<u32, SR::Register>),
        (0x010 => pub rd_data: [ReadOnly<u32>; 16]),
        (0x050 => @END),
    }
}

/// Status flags (`SPI3W_FLAG_*`).
pub mod flag {
    pub const BUSY: u32 = 1 << 4;
    pub const INT_IND: u32 = 1 << 5;
    pub const RESYNC_BUSY: u32 = 1 << 6;
}

/// Interrupt sources (`SPI3W_INT_*`).
pub mod int {
    pub const BIT: u32 = 1 << 0;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    TwoWire,
    ThreeWire,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputDelay {
    None,
    OneT,
}

#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub sys_clock: u32,
    pub speed: u32,
    pub mode: Mode,
    /// Address-to-data gap in half SCK periods minus one, 0..=0x1F.
    pub read_delay: u8,
    pub output_delay: OutputDelay,
    /// Extended output-enable timing window.
    pub ext_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sys_clock: crate::PERIPH_CLOCK_HZ,
            speed: 800_000,
            mode: Mode::TwoWire,
            read_delay: 0,
            output_delay: OutputDelay::None,
            ext_mode: false,
        }
    }
}

impl Config {
    /// SCK = sys_clock / (2 * (div + 1)).
    pub fn divider(&self) -> u32 {
        if self.speed == 0 {
            return 0xFF;
        }
        (self.sys_clock / (2 * self.speed)).saturating_sub(1).min(0xFF)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// BUSY or the expected read data never showed up.
    Timeout,
}

pub struct Spi3w<R> {
    spi: R,
}

impl<R> Spi3w<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(spi: R, cfg: &Config) -> Self {
        let spi = Self { spi };
        spi.init(cfg);
        spi
    }

    pub fn init(&self, cfg: &Config) {
        self.spi.cfgr.write(
            CFGR::DIV.val(cfg.divider())
                + CFGR::OE_DELAY.val((cfg.output_delay == OutputDelay::OneT) as u32)
                + CFGR::THREE_WIRE.val((cfg.mode == Mode::ThreeWire) as u32)
                + CFGR::EXT_MODE.val(cfg.ext_mode as u32)
                + CFGR::RD_DELAY.val(cfg.read_delay.min(MAX_READ_DELAY) as u32),
        );
        self.clear_rx_fifo();
        self.clear_rx_data_len();
    }

    pub fn deinit(&self) {
        self.spi.cfgr.set(0);
        self.spi.intcr.set(0);
    }

    pub fn cmd(&self, enable: bool) {
        self.spi.cfgr.modify(CFGR::EN.val(enable as u32));
    }

    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        if mask & int::BIT != 0 {
            self.spi.intcr.modify(INTCR::INT_EN.val(enable as u32));
        }
    }

    /// Resync pulse length in half SCK periods, 0..=0xF.
    pub fn set_resync_time(&self, value: u8) {
        self.spi
            .cfgr
            .modify(CFGR::RESYNC_TIME.val(value.min(MAX_RESYNC_TIME) as u32));
    }

    /// Only valid while the block is disabled.
    pub fn resync_signal_cmd(&self, enable: bool) {
        self.spi.cfgr.modify(CFGR::RESYNC_EN.val(enable as u32));
    }

    #[inline]
    pub fn rx_data_len(&self) -> u8 {
        self.spi.sr.read(SR::RX_NUM) as u8
    }

    pub fn clear_rx_data_len(&self) {
        self.spi.intcr.modify(INTCR::RX_NUM_CLR::SET);
        self.spi.intcr.modify(INTCR::RX_NUM_CLR::CLEAR);
    }

    pub fn clear_rx_fifo(&self) {
        self.spi.intcr.modify(INTCR::RX_FIFO_CLR::SET);
        self.spi.intcr.modify(INTCR::RX_FIFO_CLR::CLEAR);
    }

    pub fn start_write(&self, address: u8, data: u8) {
        self.spi.cr.write(
            CR::ADDR.val(address as u32)
                + CR::DATA.val(data as u32)
                + CR::WRITE::SET
                + CR::RUN::SET,
        );
    }

    /// Start a burst read of `len` (1..=15) bytes.
    pub fn start_read(&self, address: u8, len: u8) {
        self.spi.cr.write(
            CR::ADDR.val(address as u32)
                + CR::RD_NUM.val(len.clamp(1, MAX_READ_LEN) as u32)
                + CR::WRITE::CLEAR
                + CR::RUN::SET,
        );
    }

    /// Copy received bytes out of the read data registers.
    pub fn read_buf(&self, buf: &mut [u8]) {
        for (b, reg) in buf.iter_mut().zip(self.spi.rd_data.iter()) {
            *b = reg.get() as u8;
        }
    }

    #[inline]
    pub fn flag_status(&self, flag: u32) -> bool {
        self.spi.sr.get() & flag != 0
    }

    pub fn clear_interrupt(&self, mask: u32) {
        if mask & int::BIT != 0 {
            self.spi.intcr.modify(INTCR::INT_CLR::SET);
        }
    }

    fn wait_idle(&self) -> Result<(), Error> {
        for _ in 0..TIMEOUT {
            if !self.flag_status(flag::BUSY) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        warn!("spi3w busy timeout");
        Err(Error::Timeout)
    }

    /// Blocking single-register read.
    pub fn read_byte(&self, address: u8) -> Result<u8, Error> {
        self.wait_idle()?;
        self.clear_rx_data_len();
        self.start_read(address, 1);
        self.wait_idle()?;

        for _ in 0..TIMEOUT {
            if self.rx_data_len() >= 1 {
                let mut b = [0u8];
                self.read_buf(&mut b);
                return Ok(b[0]);
            }
            core::hint::spin_loop();
        }
        warn!("spi3w read timeout at {:#x}", address);
        Err(Error::Timeout)
    }

    /// Blocking single-register write.
    pub fn write_byte(&self, address: u8, data: u8) -> Result<(), Error> {
        self.wait_idle()?;
        self.start_write(address, data);
        self.wait_idle()
    }

    pub fn free(self) -> R {
        self.spi
    }
}

/// Register snapshot kept across DLPS.
#[derive(Copy, Clone, Debug, Default)]
pub struct DlpsStore {
    cfgr: u32,
    intcr: u32,
}

impl DlpsStore {
    pub fn save(regs: &RegisterBlock) -> Self {
        Self {
            cfgr: regs.cfgr.get(),
            intcr: regs.intcr.get() & 1,
        }
    }

    pub fn restore(&self, regs: &RegisterBlock) {
        regs.cfgr.set(self.cfgr & !(1 << 31));
        regs.intcr.set(self.intcr);
        regs.cfgr.set(self.cfgr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn divider_from_speed() {
        let cfg = Config::default();
        assert_eq!(cfg.divider(), 24);
        assert_eq!(Config { speed: 0, ..cfg }.divider(), 0xFF);
        assert_eq!(Config { speed: 1_000, ..cfg }.divider(), 0xFF);
    }

    #[test]
    fn init_programs_mode_and_delay() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi3w::new(
            regs,
            &Config {
                mode: Mode::ThreeWire,
                read_delay: 0x40,
                ..Default::default()
            },
        );

        assert!(regs.cfgr.is_set(CFGR::THREE_WIRE));
        assert_eq!(regs.cfgr.read(CFGR::RD_DELAY), 0x1F);
        assert!(!regs.cfgr.is_set(CFGR::EN));

        spi.cmd(true);
        assert!(regs.cfgr.is_set(CFGR::EN));
    }

    #[test]
    fn write_byte_issues_write_transaction() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi3w::new(regs, &Config::default());

        assert_eq!(spi.write_byte(0x06, 0x80), Ok(()));
        assert_eq!(regs.cr.read(CR::ADDR), 0x06);
        assert_eq!(regs.cr.read(CR::DATA), 0x80);
        assert!(regs.cr.is_set(CR::WRITE));
        assert!(regs.cr.is_set(CR::RUN));
    }

    #[test]
    fn read_byte_returns_first_data_register() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi3w::new(regs, &Config::default());
        testutil::poke(&regs.rd_data[0], 0x31);
        testutil::poke(&regs.sr, 1);

        assert_eq!(spi.read_byte(0x00), Ok(0x31));
        assert_eq!(regs.cr.read(CR::RD_NUM), 1);
        assert!(!regs.cr.is_set(CR::WRITE));
    }

    #[test]
    fn busy_bus_times_out() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi3w::new(regs, &Config::default());
        testutil::poke(&regs.sr, flag::BUSY);

        assert_eq!(spi.write_byte(0x01, 0x02), Err(Error::Timeout));
        assert_eq!(spi.read_byte(0x01), Err(Error::Timeout));
    }

    #[test]
    fn dlps_restore_enables_last() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi3w::new(regs, &Config::default());
        spi.interrupt_config(int::BIT, true);
        spi.cmd(true);

        let store = DlpsStore::save(regs);
        regs.cfgr.set(0);
        regs.intcr.set(0);
        store.restore(regs);

        assert!(regs.cfgr.is_set(CFGR::EN));
        assert_eq!(regs.cfgr.read(CFGR::DIV), 24);
        assert!(regs.intcr.is_set(INTCR::INT_EN));
    }
}
