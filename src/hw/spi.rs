// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Serial Peripheral Interface (SPI) driver.
//!
//! - `Spi` drives one DesignWare SSI block (SPI0, SPI1 or SPI0 in slave mode).
//! - `ChipSelect` names one of the hardware CS lines routed through the `SER` register.
//!
//! Most configuration registers only accept writes while `SSIENR` is clear, so every
//! reconfiguring call disables the block first and re-enables it afterwards.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

use super::TIMEOUT;

/// Highest SPI clock the block supports.
pub const MAX_CLOCK_HZ: u32 = 40_000_000;

/// TX/RX FIFO depth in frames.
pub const FIFO_DEPTH: u8 = 64;

register_bitfields! [u32,
    pub CTRLR0 [
        FRF OFFSET(4) NUMBITS(2) [
            Motorola = 0,
            TexasInstruments = 1,
            Microwire = 2
        ],
        SCPH OFFSET(6) NUMBITS(1) [],
        SCPOL OFFSET(7) NUMBITS(1) [],
        TMOD OFFSET(8) NUMBITS(2) [
            FullDuplex = 0,
            TxOnly = 1,
            RxOnly = 2,
            Eeprom = 3
        ],
        SLV_OE OFFSET(10) NUMBITS(1) [],
        SRL OFFSET(11) NUMBITS(1) [],
        DFS_32 OFFSET(16) NUMBITS(5) [],
        SLAVE OFFSET(31) NUMBITS(1) []
    ],
    pub SR [
        BUSY OFFSET(0) NUMBITS(1) [],
        TFNF OFFSET(1) NUMBITS(1) [],
        TFE OFFSET(2) NUMBITS(1) [],
        RFNE OFFSET(3) NUMBITS(1) [],
        RFF OFFSET(4) NUMBITS(1) [],
        TXE OFFSET(5) NUMBITS(1) [],
        DCOL OFFSET(6) NUMBITS(1) []
    ],
    pub DMACR [
        RDMAE OFFSET(0) NUMBITS(1) [],
        TDMAE OFFSET(1) NUMBITS(1) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub ctrlr0: ReadWrite<u32, CTRLR0::Register>),
        (0x004 => pub ctrlr1: ReadWrite<u32>),
        (0x008 => pub ssienr: ReadWrite<u32>),
        (0x00C => pub mwcr: ReadWrite<u32>),
        (0x010 => pub ser: ReadWrite<u32>),
        (0x014 => pub baudr: ReadWrite<u32>),
        (0x018 => pub txftlr: ReadWrite<u32>),
        (0x01C => pub rxftlr: ReadWrite<u32>),
        (0x020 => pub txflr: ReadOnly<u32>),
        (0x024 => pub rxflr: ReadOnly<u32>),
        (0x028 => pub sr: ReadOnly<u32, SR::Register>),
        (0x02C => pub imr: ReadWrite<u32>),
        (0x030 => pub isr: ReadOnly<u32>),
        (0x034 => pub risr: ReadOnly<u32>),
        (0x038 => pub txoicr: ReadOnly<u32>),
        (0x03C => pub rxoicr: ReadOnly<u32>),
        (0x040 => pub rxuicr: ReadOnly<u32>),
        (0x044 => pub msticr: ReadOnly<u32>),
        (0x048 => pub icr: ReadOnly<u32>),
        (0x04C => pub dmacr: ReadWrite<u32, DMACR::Register>),
        (0x050 => pub dmatdlr: ReadWrite<u32>),
        (0x054 => pub dmardlr: ReadWrite<u32>),
        (0x058 => pub idr: ReadOnly<u32>),
        (0x05C => pub version: ReadOnly<u32>),
        (0x060 => pub dr: ReadWrite<u32>),
        (0x064 => _reserved0),
        (0x0F0 => pub rx_sample_dly: ReadWrite<u32>),
        (0x0F4 => @END),
    }
}

/// Interrupt bits (`SPI_INT_*`).
pub mod int {
    pub const TXE: u32 = 1 << 0;
    pub const TXO: u32 = 1 << 1;
    pub const RXU: u32 = 1 << 2;
    pub const RXO: u32 = 1 << 3;
    pub const RXF: u32 = 1 << 4;
    /// Multi-master contention (master only).
    pub const MST: u32 = 1 << 5;
    /// RX frame does not match DFS (slave only).
    pub const FAE: u32 = 1 << 5;
    pub const TUF: u32 = 1 << 6;
    pub const RIG: u32 = 1 << 7;
}

/// Status flags (`SPI_FLAG_*`).
pub mod flag {
    pub const BUSY: u32 = 1 << 0;
    pub const TFNF: u32 = 1 << 1;
    pub const TFE: u32 = 1 << 2;
    pub const RFNE: u32 = 1 << 3;
    pub const RFF: u32 = 1 << 4;
    pub const TXE: u32 = 1 << 5;
    pub const DCOL: u32 = 1 << 6;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    FullDuplex,
    TxOnly,
    RxOnly,
    /// Send the command bytes, then clock in `ndf` frames.
    Eeprom,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Master,
    Slave,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameFormat {
    Motorola,
    TexasInstruments,
    Microwire,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GdmaRequest {
    Tx,
    Rx,
}

/// SPI_InitTypeDef analogue.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub direction: Direction,
    pub mode: Mode,
    /// Frame size in bits, 4..=32.
    pub data_size: u8,
    /// Clock idles high.
    pub cpol: bool,
    /// Sample on the second edge.
    pub cpha: bool,
    pub frame_format: FrameFormat,
    /// Even divider, 2..=65534.
    pub baud_rate_prescaler: u16,
    pub tx_threshold: u8,
    pub rx_threshold: u8,
    /// Frames to receive in `RxOnly`/`Eeprom` mode.
    pub ndf: u32,
    pub tx_dma: bool,
    pub rx_dma: bool,
    pub tx_water_level: u8,
    pub rx_water_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            direction: Direction::FullDuplex,
            mode: Mode::Master,
            data_size: 8,
            cpol: true,
            cpha: true,
            frame_format: FrameFormat::Motorola,
            baud_rate_prescaler: 128,
            tx_threshold: 1,
            rx_threshold: 0,
            ndf: 1,
            tx_dma: false,
            rx_dma: false,
            tx_water_level: 35,
            rx_water_level: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The FIFO never reached the expected state.
    Timeout,
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

/// Hardware chip-select line driven through `SER`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChipSelect(u8);

impl ChipSelect {
    pub const CS0: ChipSelect = ChipSelect(0);
    pub const CS1: ChipSelect = ChipSelect(1);
    pub const CS2: ChipSelect = ChipSelect(2);

    #[inline]
    pub fn line(self) -> u8 {
        self.0
    }
}

fn tmod(dir: Direction) -> tock_registers::fields::FieldValue<u32, CTRLR0::Register> {
    match dir {
        Direction::FullDuplex => CTRLR0::TMOD::FullDuplex,
        Direction::TxOnly => CTRLR0::TMOD::TxOnly,
        Direction::RxOnly => CTRLR0::TMOD::RxOnly,
        Direction::Eeprom => CTRLR0::TMOD::Eeprom,
    }
}

pub struct Spi<R> {
    spi: R,
}

impl<R> Spi<R>
where
    R: Deref<Target = RegisterBlock>,
{
    /// Wrap, initialize and enable the block.
    pub fn new(spi: R, cfg: &Config) -> Self {
        let this = Self { spi };
        this.init(cfg);
        this.cmd(true);
        this
    }

    pub fn init(&self, cfg: &Config) {
        self.cmd(false);

        let frf = match cfg.frame_format {
            FrameFormat::Motorola => CTRLR0::FRF::Motorola,
            FrameFormat::TexasInstruments => CTRLR0::FRF::TexasInstruments,
            FrameFormat::Microwire => CTRLR0::FRF::Microwire,
        };
        let size = cfg.data_size.clamp(4, 32) as u32 - 1;
        self.spi.ctrlr0.write(
            frf + tmod(cfg.direction)
                + CTRLR0::SCPH.val(cfg.cpha as u32)
                + CTRLR0::SCPOL.val(cfg.cpol as u32)
                + CTRLR0::DFS_32.val(size)
                + CTRLR0::SLAVE.val((cfg.mode == Mode::Slave) as u32),
        );

        if matches!(cfg.direction, Direction::RxOnly | Direction::Eeprom) {
            self.spi.ctrlr1.set(cfg.ndf.saturating_sub(1));
        }

        self.spi.baudr.set((cfg.baud_rate_prescaler & !1) as u32);
        self.spi.txftlr.set(cfg.tx_threshold as u32);
        self.spi.rxftlr.set(cfg.rx_threshold as u32);
        self.spi.imr.set(0);

        self.spi.dmacr.write(
            DMACR::TDMAE.val(cfg.tx_dma as u32) + DMACR::RDMAE.val(cfg.rx_dma as u32),
        );
        self.spi.dmatdlr.set(cfg.tx_water_level as u32);
        self.spi.dmardlr.set(cfg.rx_water_level as u32);

        if cfg.mode == Mode::Master {
            self.spi.ser.set(1);
        }
    }

    pub fn deinit(&self) {
        self.cmd(false);
        self.spi.imr.set(0);
        self.spi.dmacr.set(0);
    }

    #[inline]
    pub fn cmd(&self, enable: bool) {
        self.spi.ssienr.set(enable as u32);
    }

    pub fn send_buffer(&self, buf: &[u8]) {
        for &b in buf {
            self.spi.dr.set(b as u32);
        }
    }

    pub fn send_halfword(&self, buf: &[u16]) {
        for &h in buf {
            self.spi.dr.set(h as u32);
        }
    }

    pub fn send_word(&self, buf: &[u32]) {
        for &w in buf {
            self.spi.dr.set(w);
        }
    }

    #[inline]
    pub fn send_data(&self, data: u32) {
        self.spi.dr.set(data);
    }

    #[inline]
    pub fn receive_data(&self) -> u32 {
        self.spi.dr.get()
    }

    #[inline]
    pub fn tx_fifo_len(&self) -> u8 {
        self.spi.txflr.get() as u8
    }

    #[inline]
    pub fn rx_fifo_len(&self) -> u8 {
        self.spi.rxflr.get() as u8
    }

    pub fn change_direction(&self, dir: Direction) {
        self.cmd(false);
        self.spi.ctrlr0.modify(tmod(dir));
        self.cmd(true);
    }

    /// Frames to clock in for `RxOnly`/`Eeprom` transfers.
    pub fn set_read_len(&self, len: u16) {
        self.cmd(false);
        self.spi.ctrlr1.set((len as u32).saturating_sub(1));
        self.cmd(true);
    }

    pub fn set_cs_number(&self, number: u8) {
        self.spi.ser.set(1 << number);
    }

    /// Route the next transfers to `cs`.
    #[inline]
    pub fn select(&self, cs: ChipSelect) {
        self.set_cs_number(cs.line());
    }

    /// Release every chip-select line.
    #[inline]
    pub fn deselect(&self) {
        self.spi.ser.set(0);
    }

    /// Unmask (`enable`) or mask the `int::*` sources in `mask`.
    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        let v = self.spi.imr.get();
        self.spi.imr.set(if enable { v | mask } else { v & !mask });
    }

    #[inline]
    pub fn interrupt_status(&self, mask: u32) -> bool {
        self.spi.isr.get() & mask != 0
    }

    /// Clear the overflow/underflow/contention interrupts in `mask`. Reads clear.
    pub fn clear_interrupt(&self, mask: u32) {
        if mask & int::TXO != 0 {
            let _ = self.spi.txoicr.get();
        }
        if mask & int::RXU != 0 {
            let _ = self.spi.rxuicr.get();
        }
        if mask & int::RXO != 0 {
            let _ = self.spi.rxoicr.get();
        }
        if mask & int::MST != 0 {
            let _ = self.spi.msticr.get();
        }
    }

    #[inline]
    pub fn flag_state(&self, flag: u32) -> bool {
        self.spi.sr.get() & flag != 0
    }

    pub fn gdma_cmd(&self, req: GdmaRequest, enable: bool) {
        match req {
            GdmaRequest::Tx => self.spi.dmacr.modify(DMACR::TDMAE.val(enable as u32)),
            GdmaRequest::Rx => self.spi.dmacr.modify(DMACR::RDMAE.val(enable as u32)),
        }
    }

    pub fn change_clock(&self, prescaler: u16) {
        self.cmd(false);
        self.spi.baudr.set((prescaler & !1) as u32);
        self.cmd(true);
    }

    pub fn set_rx_sample_delay(&self, delay: u8) {
        self.cmd(false);
        self.spi.rx_sample_dly.set(delay as u32);
        self.cmd(true);
    }

    fn wait_for(&self, flag: tock_registers::fields::Field<u32, SR::Register>) -> Result<(), Error> {
        for _ in 0..TIMEOUT {
            if self.spi.sr.is_set(flag) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout)
    }

    /// Perform a blocking, full-duplex transfer of one byte.
    pub fn transfer_byte(&mut self, byte: u8) -> Result<u8, Error> {
        self.wait_for(SR::TFNF)?;
        self.spi.dr.set(byte as u32);
        self.wait_for(SR::RFNE)?;
        Ok(self.spi.dr.get() as u8)
    }

    /// Send a byte, ignoring the response.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        let _ = self.transfer_byte(byte)?;
        Ok(())
    }

    /// Read a byte, sending 0x00.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        self.transfer_byte(0x00)
    }

    /// Transfer a byte buffer in-place.
    pub fn transfer_in_place(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for b in buf.iter_mut() {
            *b = self.transfer_byte(*b)?;
        }
        Ok(())
    }

    pub fn free(self) -> R {
        self.spi
    }
}

impl<R> embedded_hal::spi::ErrorType for Spi<R>
where
    R: Deref<Target = RegisterBlock>,
{
    type Error = Error;
}

impl<R> embedded_hal::spi::SpiBus<u8> for Spi<R>
where
    R: Deref<Target = RegisterBlock>,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Error> {
        for w in words.iter_mut() {
            *w = self.read_byte()?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Error> {
        for &w in words {
            self.write_byte(w)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Error> {
        let len = read.len().max(write.len());
        for i in 0..len {
            let out = write.get(i).copied().unwrap_or(0);
            let input = self.transfer_byte(out)?;
            if let Some(r) = read.get_mut(i) {
                *r = input;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Error> {
        Spi::transfer_in_place(self, words)
    }

    fn flush(&mut self) -> Result<(), Error> {
        for _ in 0..TIMEOUT {
            if !self.spi.sr.is_set(SR::BUSY) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout)
    }
}

/// Position of a FIFO pump inside an operation list.
#[derive(Copy, Clone, Default)]
struct Cursor {
    op: usize,
    off: usize,
}

fn op_len(op: &embedded_hal::spi::Operation<'_, u8>) -> usize {
    use embedded_hal::spi::Operation;
    match op {
        Operation::Read(buf) => buf.len(),
        Operation::Write(buf) => buf.len(),
        Operation::Transfer(read, write) => read.len().max(write.len()),
        Operation::TransferInPlace(buf) => buf.len(),
        Operation::DelayNs(_) => 0,
    }
}

fn tx_frame(op: &embedded_hal::spi::Operation<'_, u8>, i: usize) -> u8 {
    use embedded_hal::spi::Operation;
    match op {
        Operation::Write(buf) => buf[i],
        Operation::TransferInPlace(buf) => buf[i],
        Operation::Transfer(_, write) => write.get(i).copied().unwrap_or(0),
        Operation::Read(_) | Operation::DelayNs(_) => 0,
    }
}

fn rx_frame(op: &mut embedded_hal::spi::Operation<'_, u8>, i: usize, frame: u8) {
    use embedded_hal::spi::Operation;
    match op {
        Operation::Read(buf) | Operation::TransferInPlace(buf) => buf[i] = frame,
        Operation::Transfer(read, _) => {
            if let Some(r) = read.get_mut(i) {
                *r = frame;
            }
        }
        Operation::Write(_) | Operation::DelayNs(_) => {}
    }
}

fn delay_ns(ns: u32) {
    // One spin is at least one core cycle, which is under 25 ns at 40 MHz.
    for _ in 0..(ns / 25) {
        core::hint::spin_loop();
    }
}

/// One transaction per hardware chip-select assertion.
///
/// `SER` holds CS only while the TX FIFO has frames queued, so all operations are streamed
/// through one pump that writes ahead up to [`FIFO_DEPTH`] frames and drains RX as it fills.
/// A `DelayNs` waits for the pipeline to empty first and lets CS drop.
impl<R> embedded_hal::spi::SpiDevice<u8> for Spi<R>
where
    R: Deref<Target = RegisterBlock>,
{
    fn transaction(
        &mut self,
        operations: &mut [embedded_hal::spi::Operation<'_, u8>],
    ) -> Result<(), Error> {
        use embedded_hal::spi::{Operation, SpiBus};

        let mut tx = Cursor::default();
        let mut rx = Cursor::default();
        let mut in_flight = 0usize;
        let mut idle = 0u32;

        loop {
            let mut progressed = false;

            while tx.op < operations.len() {
                if let Operation::DelayNs(ns) = &operations[tx.op] {
                    if in_flight > 0 {
                        break;
                    }
                    delay_ns(*ns);
                    tx = Cursor { op: tx.op + 1, off: 0 };
                    progressed = true;
                    continue;
                }
                if tx.off >= op_len(&operations[tx.op]) {
                    tx = Cursor { op: tx.op + 1, off: 0 };
                    continue;
                }
                if in_flight >= FIFO_DEPTH as usize || !self.spi.sr.is_set(SR::TFNF) {
                    break;
                }
                self.spi.dr.set(tx_frame(&operations[tx.op], tx.off) as u32);
                tx.off += 1;
                in_flight += 1;
                progressed = true;
            }

            while in_flight > 0 && self.spi.sr.is_set(SR::RFNE) {
                while rx.off >= op_len(&operations[rx.op]) {
                    rx = Cursor { op: rx.op + 1, off: 0 };
                }
                let frame = self.spi.dr.get() as u8;
                rx_frame(&mut operations[rx.op], rx.off, frame);
                rx.off += 1;
                in_flight -= 1;
                progressed = true;
            }

            if tx.op >= operations.len() && in_flight == 0 {
                break;
            }
            if progressed {
                idle = 0;
            } else {
                idle += 1;
                if idle >= TIMEOUT {
                    return Err(Error::Timeout);
                }
                core::hint::spin_loop();
            }
        }
        SpiBus::flush(self)
    }
}

/// Register snapshot kept across DLPS.
#[derive(Copy, Clone, Debug, Default)]
pub struct DlpsStore {
    ctrlr0: u32,
    ctrlr1: u32,
    ssienr: u32,
    ser: u32,
    baudr: u32,
    txftlr: u32,
    rxftlr: u32,
    imr: u32,
    dmacr: u32,
    dmatdlr: u32,
    dmardlr: u32,
    rx_sample_dly: u32,
}

impl DlpsStore {
    pub fn save(regs: &RegisterBlock) -> Self {
        Self {
            ctrlr0: regs.ctrlr0.get(),
            ctrlr1: regs.ctrlr1.get(),
            ssienr: regs.ssienr.get(),
            ser: regs.ser.get(),
            baudr: regs.baudr.get(),
            txftlr: regs.txftlr.get(),
            rxftlr: regs.rxftlr.get(),
            imr: regs.imr.get(),
            dmacr: regs.dmacr.get(),
            dmatdlr: regs.dmatdlr.get(),
            dmardlr: regs.dmardlr.get(),
            rx_sample_dly: regs.rx_sample_dly.get(),
        }
    }

    pub fn restore(&self, regs: &RegisterBlock) {
        regs.ssienr.set(0);
        regs.ctrlr0.set(self.ctrlr0);
        regs.ctrlr1.set(self.ctrlr1);
        regs.ser.set(self.ser);
        regs.baudr.set(self.baudr);
        regs.txftlr.set(self.txftlr);
        regs.rxftlr.set(self.rxftlr);
        regs.imr.set(self.imr);
        regs.dmacr.set(self.dmacr);
        regs.dmatdlr.set(self.dmatdlr);
        regs.dmardlr.set(self.dmardlr);
        regs.rx_sample_dly.set(self.rx_sample_dly);
        regs.ssienr.set(self.ssienr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use embedded_hal::spi::SpiBus;

    fn ready(regs: &RegisterBlock) {
        testutil::poke(&regs.sr, (SR::TFNF::SET + SR::RFNE::SET).value);
    }

    #[test]
    fn init_programs_ctrlr0_and_enables() {
        let regs = testutil::regs::<RegisterBlock>();
        let _spi = Spi::new(
            regs,
            &Config {
                direction: Direction::Eeprom,
                cpol: false,
                cpha: false,
                ndf: 3,
                baud_rate_prescaler: 100,
                ..Default::default()
            },
        );

        assert_eq!(regs.ctrlr0.read(CTRLR0::TMOD), 3);
        assert_eq!(regs.ctrlr0.read(CTRLR0::DFS_32), 7);
        assert!(!regs.ctrlr0.is_set(CTRLR0::SCPOL));
        assert_eq!(regs.ctrlr1.get(), 2);
        assert_eq!(regs.baudr.get(), 100);
        assert_eq!(regs.ser.get(), 1);
        assert_eq!(regs.ssienr.get(), 1);
    }

    #[test]
    fn odd_prescaler_is_rounded_down() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi::new(regs, &Config::default());

        spi.change_clock(7);

        assert_eq!(regs.baudr.get(), 6);
        assert_eq!(regs.ssienr.get(), 1);
    }

    #[test]
    fn direction_and_read_len_round_trip_through_disable() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi::new(regs, &Config::default());

        spi.change_direction(Direction::RxOnly);
        spi.set_read_len(16);

        assert_eq!(regs.ctrlr0.read(CTRLR0::TMOD), 2);
        assert_eq!(regs.ctrlr1.get(), 15);
        assert_eq!(regs.ssienr.get(), 1);
    }

    #[test]
    fn chip_select_drives_ser() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi::new(regs, &Config::default());

        spi.select(ChipSelect::CS2);
        assert_eq!(regs.ser.get(), 1 << 2);

        spi.deselect();
        assert_eq!(regs.ser.get(), 0);
    }

    #[test]
    fn spibus_transfer_echoes_through_dr() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut spi = Spi::new(regs, &Config::default());
        ready(regs);

        // The RAM-backed DR hands back the last word written, like a MOSI/MISO loopback.
        let mut rx = [0u8; 3];
        spi.transfer(&mut rx, &[0x9F, 0x11]).unwrap();

        assert_eq!(rx, [0x9F, 0x11, 0x00]);
    }

    #[test]
    fn transfer_times_out_when_fifo_never_fills() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut spi = Spi::new(regs, &Config::default());
        testutil::poke(&regs.sr, SR::TFNF::SET.value);

        assert_eq!(spi.transfer_byte(0xAA), Err(Error::Timeout));
    }

    #[test]
    fn device_transaction_writes_ahead_of_rx() {
        use embedded_hal::spi::{Operation, SpiDevice};

        let regs = testutil::regs::<RegisterBlock>();
        let mut spi = Spi::new(regs, &Config::default());
        ready(regs);

        // DR hands back the last word written, so every RX pop taken after the whole
        // command is queued sees its final byte.
        let mut id = [0u8; 3];
        spi.transaction(&mut [Operation::Write(&[0x9F, 0x42]), Operation::Read(&mut id)])
            .unwrap();

        assert_eq!(id, [0x00; 3]);
        assert_eq!(regs.dr.get(), 0x00);

        let mut rx = [0u8; 2];
        spi.transaction(&mut [Operation::Transfer(&mut rx, &[0x03, 0x7E])]).unwrap();
        assert_eq!(rx, [0x7E, 0x7E]);
    }

    #[test]
    fn device_transaction_never_queues_past_fifo_depth() {
        use embedded_hal::spi::{Operation, SpiDevice};

        let regs = testutil::regs::<RegisterBlock>();
        let mut spi = Spi::new(regs, &Config::default());
        ready(regs);

        let depth = FIFO_DEPTH as usize;
        let mut buf = [0u8; FIFO_DEPTH as usize + 2];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = i as u8;
        }
        spi.transaction(&mut [Operation::TransferInPlace(&mut buf)]).unwrap();

        // First burst stops at a full FIFO, the tail goes out in a second burst.
        assert!(buf[..depth].iter().all(|&b| b == (depth - 1) as u8));
        assert_eq!(buf[depth..], [(depth + 1) as u8; 2]);
    }

    #[test]
    fn device_transaction_times_out_without_rx() {
        use embedded_hal::spi::{Operation, SpiDevice};

        let regs = testutil::regs::<RegisterBlock>();
        let mut spi = Spi::new(regs, &Config::default());
        testutil::poke(&regs.sr, SR::TFNF::SET.value);

        assert_eq!(
            spi.transaction(&mut [Operation::Write(&[0x06])]),
            Err(Error::Timeout)
        );
    }

    #[test]
    fn dlps_restore_reenables_last() {
        let regs = testutil::regs::<RegisterBlock>();
        let spi = Spi::new(regs, &Config::default());
        spi.interrupt_config(int::RXF, true);

        let store = DlpsStore::save(regs);
        spi.deinit();
        regs.ctrlr0.set(0);
        store.restore(regs);

        assert_eq!(regs.imr.get(), int::RXF);
        assert_eq!(regs.ctrlr0.read(CTRLR0::DFS_32), 7);
        assert_eq!(regs.ssienr.get(), 1);
    }
}
