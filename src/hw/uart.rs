// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Universal Asynchronous Receiver/Transmitter (UART).
//!
//! Register-level driver for the six UART blocks. Console output ([`Uart::write_all`],
//! `core::fmt::Write`, `embedded-io`) fills the TX FIFO a free-slot burst at a time and gives
//! up with [`Error::TxTimeout`] when it stays full, so a stalled line (CTS held off, clock
//! gated) never hangs the caller. Line endings are CRLF.
//!
//! The baud rate is programmed as a `(div, ovsr, ovsr_adj)` triple; see [`BaudRate`] for the
//! values that match a 40 MHz UART clock.

use core::{fmt, ops::Deref};

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{Aliased, ReadOnly, ReadWrite},
};

use super::TIMEOUT;

/// Depth of the TX FIFO in bytes.
pub const TX_FIFO_SIZE: u8 = 16;
/// Depth of the RX FIFO in bytes.
pub const RX_FIFO_SIZE: u8 = 32;

register_bitfields! [u32,
    pub IER [
        RD_AVA OFFSET(0) NUMBITS(1) [],
        TX_FIFO_EMPTY OFFSET(1) NUMBITS(1) [],
        RX_LINE_STS OFFSET(2) NUMBITS(1) [],
        TX_DONE OFFSET(4) NUMBITS(1) [],
        TX_THD OFFSET(5) NUMBITS(1) [],
        RX_IDLE OFFSET(7) NUMBITS(1) []
    ],
    pub IID [
        /// 1 = no interrupt pending.
        NOT_PENDING OFFSET(0) NUMBITS(1) [],
        ID OFFSET(1) NUMBITS(3) []
    ],
    pub FCR [
        FIFO_EN OFFSET(0) NUMBITS(1) [],
        RX_CLEAR OFFSET(1) NUMBITS(1) [],
        TX_CLEAR OFFSET(2) NUMBITS(1) [],
        DMA_MODE OFFSET(3) NUMBITS(1) [],
        RX_TRIGGER OFFSET(6) NUMBITS(2) [
            Byte1 = 0,
            Byte4 = 1,
            Byte8 = 2,
            Byte14 = 3
        ]
    ],
    pub LCR [
        WORD_LEN_8 OFFSET(0) NUMBITS(1) [],
        STOP_2 OFFSET(2) NUMBITS(1) [],
        PARITY OFFSET(3) NUMBITS(2) [
            None = 0,
            Odd = 1,
            Even = 3
        ],
        BREAK OFFSET(6) NUMBITS(1) [],
        DLAB OFFSET(7) NUMBITS(1) []
    ],
    pub MCR [
        RTS OFFSET(1) NUMBITS(1) [],
        LOOPBACK OFFSET(4) NUMBITS(1) [],
        AFE OFFSET(5) NUMBITS(1) []
    ],
    pub LSR [
        RX_DATA_AVA OFFSET(0) NUMBITS(1) [],
        RX_OVERRUN OFFSET(1) NUMBITS(1) [],
        RX_PARITY_ERR OFFSET(2) NUMBITS(1) [],
        RX_FRAME_ERR OFFSET(3) NUMBITS(1) [],
        RX_BREAK_ERR OFFSET(4) NUMBITS(1) [],
        TX_FIFO_EMPTY OFFSET(5) NUMBITS(1) [],
        TX_EMPTY OFFSET(6) NUMBITS(1) [],
        RX_FIFO_ERR OFFSET(7) NUMBITS(1) [],
        RX_IDLE OFFSET(9) NUMBITS(1) [],
        TX_DONE OFFSET(10) NUMBITS(1) [],
        TX_THD OFFSET(11) NUMBITS(1) []
    ],
    pub SPR [
        /// Shadow of the last value written to the write-only FCR.
        FCR_IMAGE OFFSET(0) NUMBITS(8) [],
        OVSR_ADJ OFFSET(16) NUMBITS(11) []
    ],
    pub STSR [
        OVSR OFFSET(4) NUMBITS(4) []
    ],
    pub MISCR [
        ONE_WIRE OFFSET(0) NUMBITS(1) [],
        TXDMA_EN OFFSET(1) NUMBITS(1) [],
        RXDMA_EN OFFSET(2) NUMBITS(1) [],
        TX_WATER_LEVEL OFFSET(3) NUMBITS(5) [],
        RX_WATER_LEVEL OFFSET(8) NUMBITS(6) []
    ],
    pub RXIDLE_TOCR [
        IDLE_TIME OFFSET(0) NUMBITS(4) [],
        EN OFFSET(31) NUMBITS(1) []
    ],
    pub FIFO_LEVEL [
        TX OFFSET(0) NUMBITS(5) [],
        RX OFFSET(8) NUMBITS(6) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub dll: ReadWrite<u32>),
        /// `DLH` while `LCR.DLAB` is set, interrupt enable otherwise.
        (0x004 => pub dlh_intcr: ReadWrite<u32, IER::Register>),
        (0x008 => pub intid_fcr: Aliased<u32, IID::Register, FCR::Register>),
        (0x00C => pub lcr: ReadWrite<u32, LCR::Register>),
        (0x010 => pub mcr: ReadWrite<u32, MCR::Register>),
        (0x014 => pub lsr: ReadOnly<u32, LSR::Register>),
        (0x018 => pub spr: ReadWrite<u32, SPR::Register>),
        (0x01C => pub stsr: ReadWrite<u32, STSR::Register>),
        (0x020 => pub rb_thr: ReadWrite<u32>),
        (0x024 => pub miscr: ReadWrite<u32, MISCR::Register>),
        (0x028 => pub txplsr: ReadWrite<u32>),
        (0x02C => _reserved0),
        (0x030 => pub baudmonr: ReadOnly<u32>),
        (0x034 => _reserved1),
        (0x038 => pub dbg: ReadOnly<u32>),
        (0x03C => _reserved2),
        (0x040 => pub rxidle_tocr: ReadWrite<u32, RXIDLE_TOCR::Register>),
        (0x044 => pub rxidle_sr: ReadWrite<u32>),
        (0x048 => pub rxidle_intcr: ReadWrite<u32>),
        (0x04C => pub fifo_level: ReadOnly<u32, FIFO_LEVEL::Register>),
        (0x050 => pub int_mask: ReadWrite<u32>),
        (0x054 => @END),
    }
}

/// Interrupt enable bits (`UART_INT_*`).
pub mod int {
    pub const RD_AVA: u32 = 1 << 0;
    pub const TX_FIFO_EMPTY: u32 = 1 << 1;
    pub const RX_LINE_STS: u32 = 1 << 2;
    pub const TX_DONE: u32 = 1 << 4;
    pub const TX_THD: u32 = 1 << 5;
    pub const RX_IDLE: u32 = 1 << 7;
}

/// Interrupt mask bits (`UART_INT_MASK_*`).
pub mod int_mask {
    pub const RD_AVA: u32 = 1 << 0;
    pub const TX_FIFO_EMPTY: u32 = 1 << 1;
    pub const RX_LINE_STS: u32 = 1 << 2;
    pub const RX_IDLE: u32 = 1 << 5;
    pub const TX_DONE: u32 = 1 << 6;
    pub const TX_THD: u32 = 1 << 7;
}

/// Line status flags (`UART_FLAG_*`).
pub mod flag {
    pub const RX_DATA_AVA: u32 = 1 << 0;
    pub const RX_OVERRUN: u32 = 1 << 1;
    pub const RX_PARITY_ERR: u32 = 1 << 2;
    pub const RX_FRAME_ERR: u32 = 1 << 3;
    pub const RX_BREAK_ERR: u32 = 1 << 4;
    pub const TX_FIFO_EMPTY: u32 = 1 << 5;
    pub const TX_EMPTY: u32 = 1 << 6;
    pub const RX_FIFO_ERR: u32 = 1 << 7;
    pub const RX_IDLE: u32 = 1 << 9;
    pub const TX_DONE: u32 = 1 << 10;
    pub const TX_THD: u32 = 1 << 11;
}

/// Decoded interrupt identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptId {
    LineStatus,
    RxLevelReached,
    RxDataTimeout,
    TxFifoEmpty,
    Other(u8),
}

impl InterruptId {
    fn from_iid(id: u32) -> Self {
        match id {
            0x3 => InterruptId::LineStatus,
            0x2 => InterruptId::RxLevelReached,
            0x6 => InterruptId::RxDataTimeout,
            0x1 => InterruptId::TxFifoEmpty,
            other => InterruptId::Other(other as u8),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WordLength {
    Bits7,
    Bits8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// RX FIFO level that raises `RD_AVA`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RxTrigger {
    Byte1,
    Byte4,
    Byte8,
    Byte14,
}

/// RX idle timeout, expressed in byte times (`1 << n`).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum IdleTime {
    Byte1 = 0,
    Byte2,
    Byte4,
    Byte8,
    Byte16,
    Byte32,
    Byte64,
    Byte128,
    Byte256,
    Byte512,
    Byte1024,
    Byte2048,
    Byte4096,
    Byte8192,
    Byte16384,
    Byte32768,
}

/// Baud rates with known divisor settings for a 40 MHz UART clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BaudRate {
    B9600,
    B19200,
    B115200,
    B230400,
    B256000,
    B384000,
    B460800,
    B921600,
    B1000000,
    B2000000,
    B3000000,
}

impl BaudRate {
    /// `(div, ovsr, ovsr_adj)`.
    pub const fn params(self) -> (u16, u8, u16) {
        use BaudRate::*;
        match self {
            B9600 => (271, 10, 0x24A),
            B19200 => (150, 8, 0x3EF),
            B115200 => (20, 12, 0x252),
            B230400 => (11, 10, 0x3BB),
            B256000 => (11, 9, 0x084),
            B384000 => (7, 9, 0x3EF),
            B460800 => (6, 9, 0x0AA),
            B921600 => (3, 9, 0x0AA),
            B1000000 => (4, 5, 0),
            B2000000 => (2, 5, 0),
            B3000000 => (1, 8, 0x292),
        }
    }
}

/// UART_InitTypeDef analogue.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub div: u16,
    pub ovsr: u8,
    pub ovsr_adj: u16,
    pub word_length: WordLength,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub rx_trigger: RxTrigger,
    pub idle_time: IdleTime,
    pub hw_flow_control: bool,
    pub tx_dma: bool,
    pub rx_dma: bool,
    /// DMA TX water level, 1..=16.
    pub tx_water_level: u8,
    /// DMA RX water level, 1..=31.
    pub rx_water_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        let (div, ovsr, ovsr_adj) = BaudRate::B115200.params();
        Self {
            div,
            ovsr,
            ovsr_adj,
            word_length: WordLength::Bits8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            rx_trigger: RxTrigger::Byte1,
            idle_time: IdleTime::Byte2,
            hw_flow_control: false,
            tx_dma: false,
            rx_dma: false,
            tx_water_level: 15,
            rx_water_level: 1,
        }
    }
}

impl Config {
    pub fn baud_rate(mut self, baud: BaudRate) -> Self {
        let (div, ovsr, ovsr_adj) = baud.params();
        self.div = div;
        self.ovsr = ovsr;
        self.ovsr_adj = ovsr_adj;
        self
    }
}

/// Line status receive errors and the TX drain timeout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Overrun,
    Parity,
    Framing,
    Break,
    /// TX FIFO or shift register did not drain within the poll budget.
    TxTimeout,
}

impl embedded_hal_nb::serial::Error for Error {
    fn kind(&self) -> embedded_hal_nb::serial::ErrorKind {
        use embedded_hal_nb::serial::ErrorKind;
        match self {
            Error::Overrun => ErrorKind::Overrun,
            Error::Parity => ErrorKind::Parity,
            Error::Framing => ErrorKind::FrameFormat,
            Error::Break | Error::TxTimeout => ErrorKind::Other,
        }
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Error::TxTimeout => embedded_io::ErrorKind::TimedOut,
            _ => embedded_io::ErrorKind::InvalidData,
        }
    }
}

pub struct Uart<R> {
    uart: R,
}

impl<R> Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    /// Wrap and initialize the UART with `cfg`.
    pub fn new(uart: R, cfg: &Config) -> Self {
        let this = Self { uart };
        this.init(cfg);
        this
    }

    /// Wrap an already configured UART without touching it.
    pub fn wrap(uart: R) -> Self {
        Self { uart }
    }

    pub fn init(&self, cfg: &Config) {
        self.set_baud_rate(cfg.div, cfg.ovsr, cfg.ovsr_adj);
        self.set_params(cfg.word_length, cfg.parity, cfg.stop_bits);

        let trigger = match cfg.rx_trigger {
            RxTrigger::Byte1 => FCR::RX_TRIGGER::Byte1,
            RxTrigger::Byte4 => FCR::RX_TRIGGER::Byte4,
            RxTrigger::Byte8 => FCR::RX_TRIGGER::Byte8,
            RxTrigger::Byte14 => FCR::RX_TRIGGER::Byte14,
        };
        let dma = cfg.tx_dma || cfg.rx_dma;
        self.write_fcr(
            (FCR::FIFO_EN::SET + FCR::DMA_MODE.val(dma as u32) + trigger).value,
            FCR::RX_CLEAR::SET + FCR::TX_CLEAR::SET,
        );

        if cfg.hw_flow_control {
            self.uart.mcr.modify(MCR::AFE::SET + MCR::RTS::SET);
        } else {
            self.uart.mcr.modify(MCR::AFE::CLEAR + MCR::RTS::CLEAR);
        }

        self.uart.miscr.modify(
            MISCR::TXDMA_EN.val(cfg.tx_dma as u32)
                + MISCR::RXDMA_EN.val(cfg.rx_dma as u32)
                + MISCR::TX_WATER_LEVEL.val(cfg.tx_water_level as u32)
                + MISCR::RX_WATER_LEVEL.val(cfg.rx_water_level as u32),
        );

        self.uart
            .rxidle_tocr
            .write(RXIDLE_TOCR::IDLE_TIME.val(cfg.idle_time as u32));
    }

    /// Return the UART to its reset state. The clock gate is left to [`super::rcc`].
    pub fn deinit(&self) {
        self.uart.dlh_intcr.set(0);
        self.uart.int_mask.set(0);
        self.uart.rxidle_tocr.set(0);
        self.uart.rxidle_intcr.set(0);
        self.uart.miscr.set(0);
        self.uart.mcr.set(0);
        self.write_fcr(0, FCR::RX_CLEAR::SET + FCR::TX_CLEAR::SET);
    }

    /// Program divisor and oversampling. Interrupt enables are preserved.
    pub fn set_baud_rate(&self, div: u16, ovsr: u8, ovsr_adj: u16) {
        let ier = self.uart.dlh_intcr.get();
        self.uart.lcr.modify(LCR::DLAB::SET);
        self.uart.dll.set((div & 0xFF) as u32);
        self.uart.dlh_intcr.set(((div >> 8) & 0xFF) as u32);
        self.uart.lcr.modify(LCR::DLAB::CLEAR);
        self.uart.dlh_intcr.set(ier);

        self.uart.stsr.modify(STSR::OVSR.val(ovsr as u32));
        self.uart.spr.modify(SPR::OVSR_ADJ.val(ovsr_adj as u32));
    }

    pub fn set_params(&self, word_length: WordLength, parity: Parity, stop_bits: StopBits) {
        let parity = match parity {
            Parity::None => LCR::PARITY::None,
            Parity::Odd => LCR::PARITY::Odd,
            Parity::Even => LCR::PARITY::Even,
        };
        self.uart.lcr.modify(
            LCR::WORD_LEN_8.val((word_length == WordLength::Bits8) as u32)
                + LCR::STOP_2.val((stop_bits == StopBits::Two) as u32)
                + parity,
        );
    }

    /// Enable or disable the `int::*` interrupts in `mask`.
    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        let v = self.uart.dlh_intcr.get();
        let v = if enable { v | mask } else { v & !mask };
        self.uart.dlh_intcr.set(v);
    }

    /// Mask or unmask the `int_mask::*` sources in `mask`.
    pub fn mask_interrupt_config(&self, mask: u32, masked: bool) {
        let v = self.uart.int_mask.get();
        let v = if masked { v | mask } else { v & !mask };
        self.uart.int_mask.set(v);
    }

    /// Push `buf` into the TX FIFO. The caller makes sure it fits.
    pub fn send_data(&self, buf: &[u8]) {
        for &b in buf {
            self.uart.rb_thr.set(b as u32);
        }
    }

    /// Pop `buf.len()` bytes from the RX FIFO. The caller makes sure they are there.
    pub fn receive_data(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.uart.rb_thr.get() as u8;
        }
    }

    #[inline]
    pub fn send_byte(&self, b: u8) {
        self.uart.rb_thr.set(b as u32);
    }

    #[inline]
    pub fn receive_byte(&self) -> u8 {
        self.uart.rb_thr.get() as u8
    }

    /// Returns `true` when the `flag::*` bit is set.
    #[inline]
    pub fn flag_status(&self, flag: u32) -> bool {
        self.uart.lsr.get() & flag != 0
    }

    #[inline]
    pub fn line_status(&self) -> u32 {
        self.uart.lsr.get()
    }

    /// Highest-priority pending interrupt, or `None`.
    pub fn interrupt_id(&self) -> Option<InterruptId> {
        let iid = self.uart.intid_fcr.extract();
        if iid.is_set(IID::NOT_PENDING) {
            None
        } else {
            Some(InterruptId::from_iid(iid.read(IID::ID)))
        }
    }

    pub fn clear_tx_fifo(&self) {
        self.write_fcr(self.fcr_image(), FCR::TX_CLEAR::SET);
    }

    pub fn clear_rx_fifo(&self) {
        self.write_fcr(self.fcr_image(), FCR::RX_CLEAR::SET);
    }

    #[inline]
    pub fn tx_fifo_len(&self) -> u8 {
        self.uart.fifo_level.read(FIFO_LEVEL::TX) as u8
    }

    #[inline]
    pub fn rx_fifo_len(&self) -> u8 {
        self.uart.fifo_level.read(FIFO_LEVEL::RX) as u8
    }

    pub fn tx_dma_cmd(&self, enable: bool) {
        self.uart.miscr.modify(MISCR::TXDMA_EN.val(enable as u32));
        self.sync_dma_mode();
    }

    pub fn rx_dma_cmd(&self, enable: bool) {
        self.uart.miscr.modify(MISCR::RXDMA_EN.val(enable as u32));
        self.sync_dma_mode();
    }

    pub fn loopback_cmd(&self, enable: bool) {
        self.uart.mcr.modify(MCR::LOOPBACK.val(enable as u32));
    }

    /// Start or stop the RX idle timer.
    pub fn rx_idle_cmd(&self, enable: bool) {
        self.uart.rxidle_tocr.modify(RXIDLE_TOCR::EN.val(enable as u32));
    }

    /// Half-duplex on the TX pin.
    pub fn one_wire_config(&self, enable: bool) {
        self.uart.miscr.modify(MISCR::ONE_WIRE.val(enable as u32));
    }

    pub fn free(self) -> R {
        self.uart
    }

    #[inline]
    fn fcr_image(&self) -> u32 {
        self.uart.spr.read(SPR::FCR_IMAGE)
    }

    /// FCR is write-only; keep a copy of the persistent bits in SPR for readback and DLPS.
    fn write_fcr(&self, image: u32, pulse: tock_registers::fields::FieldValue<u32, FCR::Register>) {
        let persistent = image & !(pulse.mask());
        self.uart.intid_fcr.set(image | pulse.value);
        self.uart.spr.modify(SPR::FCR_IMAGE.val(persistent & 0xFF));
    }

    fn sync_dma_mode(&self) {
        let miscr = self.uart.miscr.extract();
        let dma = miscr.is_set(MISCR::TXDMA_EN) || miscr.is_set(MISCR::RXDMA_EN);
        let image = (self.fcr_image() & !FCR::DMA_MODE::SET.value)
            | FCR::DMA_MODE.val(dma as u32).value;
        self.uart.intid_fcr.set(image);
        self.uart.spr.modify(SPR::FCR_IMAGE.val(image));
    }

    // Console output

    /// Queue `bytes`, topping the TX FIFO up to [`TX_FIFO_SIZE`] each round.
    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        let mut stalled = 0;
        while !bytes.is_empty() {
            let room = TX_FIFO_SIZE.saturating_sub(self.tx_fifo_len()) as usize;
            if room == 0 {
                stalled += 1;
                if stalled >= TIMEOUT {
                    return Err(Error::TxTimeout);
                }
                core::hint::spin_loop();
                continue;
            }
            stalled = 0;
            let (burst, rest) = bytes.split_at(room.min(bytes.len()));
            self.send_data(burst);
            bytes = rest;
        }
        Ok(())
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) -> Result<(), Error> {
        self.write_all(&[b])
    }

    /// `line` then CRLF.
    pub fn println(&mut self, line: &str) -> Result<(), Error> {
        self.write_all(line.as_bytes())?;
        self.write_all(b"\r\n")
    }

    /// `0x` and the low `digits` nibbles of `n` (1..=8), upper case.
    pub fn print_hex(&mut self, n: u32, digits: u8) -> Result<(), Error> {
        let digits = digits.clamp(1, 8) as usize;
        let mut out = *b"0x00000000";
        for (i, c) in out[2..2 + digits].iter_mut().enumerate() {
            let nibble = (n >> (4 * (digits - 1 - i))) & 0xF;
            *c = b"0123456789ABCDEF"[nibble as usize];
        }
        self.write_all(&out[..2 + digits])
    }

    pub fn print_dec(&mut self, n: u32) -> Result<(), Error> {
        let mut buf = itoa::Buffer::new();
        self.write_all(buf.format(n).as_bytes())
    }

    /// Wait for the TX FIFO and shift register to drain.
    pub fn flush(&mut self) -> Result<(), Error> {
        for _ in 0..TIMEOUT {
            if self.uart.lsr.is_set(LSR::TX_EMPTY) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(Error::TxTimeout)
    }
}

impl<R> embedded_hal_nb::serial::ErrorType for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    type Error = Error;
}

impl<R> embedded_hal_nb::serial::Read<u8> for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    fn read(&mut self) -> nb::Result<u8, Error> {
        let lsr = self.uart.lsr.extract();
        if lsr.is_set(LSR::RX_OVERRUN) {
            Err(nb::Error::Other(Error::Overrun))
        } else if lsr.is_set(LSR::RX_PARITY_ERR) {
            Err(nb::Error::Other(Error::Parity))
        } else if lsr.is_set(LSR::RX_FRAME_ERR) {
            Err(nb::Error::Other(Error::Framing))
        } else if lsr.is_set(LSR::RX_BREAK_ERR) {
            Err(nb::Error::Other(Error::Break))
        } else if lsr.is_set(LSR::RX_DATA_AVA) {
            Ok(self.receive_byte())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<R> embedded_hal_nb::serial::Write<u8> for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    fn write(&mut self, word: u8) -> nb::Result<(), Error> {
        if self.tx_fifo_len() < TX_FIFO_SIZE {
            self.send_byte(word);
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn flush(&mut self) -> nb::Result<(), Error> {
        if self.uart.lsr.is_set(LSR::TX_EMPTY) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<R> embedded_io::ErrorType for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    type Error = Error;
}

impl<R> embedded_io::Write for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    /// Accepts as much of `buf` as fits once the FIFO has room.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut room = 0;
        for _ in 0..TIMEOUT {
            room = TX_FIFO_SIZE.saturating_sub(self.tx_fifo_len()) as usize;
            if room > 0 {
                break;
            }
            core::hint::spin_loop();
        }
        if room == 0 {
            return Err(Error::TxTimeout);
        }
        let n = room.min(buf.len());
        self.send_data(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Uart::flush(self)
    }
}

impl<R> fmt::Write for Uart<R>
where
    R: Deref<Target = RegisterBlock>,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// Register snapshot kept across DLPS.
#[derive(Copy, Clone, Debug, Default)]
pub struct DlpsStore {
    dll: u32,
    dlh: u32,
    ier: u32,
    lcr: u32,
    mcr: u32,
    spr: u32,
    stsr: u32,
    miscr: u32,
    rxidle_tocr: u32,
    rxidle_intcr: u32,
    int_mask: u32,
}

impl DlpsStore {
    pub fn save(regs: &RegisterBlock) -> Self {
        let lcr = regs.lcr.get();
        regs.lcr.modify(LCR::DLAB::SET);
        let dll = regs.dll.get();
        let dlh = regs.dlh_intcr.get();
        regs.lcr.modify(LCR::DLAB::CLEAR);

        Self {
            dll,
            dlh,
            ier: regs.dlh_intcr.get(),
            lcr,
            mcr: regs.mcr.get(),
            spr: regs.spr.get(),
            stsr: regs.stsr.get(),
            miscr: regs.miscr.get(),
            rxidle_tocr: regs.rxidle_tocr.get(),
            rxidle_intcr: regs.rxidle_intcr.get(),
            int_mask: regs.int_mask.get(),
        }
    }

    pub fn restore(&self, regs: &RegisterBlock) {
        regs.lcr.modify(LCR::DLAB::SET);
        regs.dll.set(self.dll);
        regs.dlh_intcr.set(self.dlh);
        regs.lcr.modify(LCR::DLAB::CLEAR);

        regs.stsr.set(self.stsr);
        regs.spr.set(self.spr);
        regs.intid_fcr.set(
            (self.spr & 0xFF) | (FCR::RX_CLEAR::SET + FCR::TX_CLEAR::SET).value,
        );
        regs.lcr.set(self.lcr & !LCR::DLAB::SET.value);
        regs.mcr.set(self.mcr);
        regs.miscr.set(self.miscr);
        regs.rxidle_tocr.set(self.rxidle_tocr);
        regs.rxidle_intcr.set(self.rxidle_intcr);
        regs.int_mask.set(self.int_mask);
        regs.dlh_intcr.set(self.ier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use core::fmt::Write as _;

    #[test]
    fn default_config_is_115200_8n1() {
        let regs = testutil::regs::<RegisterBlock>();
        let _uart = Uart::new(regs, &Config::default());

        assert_eq!(regs.dll.get(), 20);
        assert_eq!(regs.stsr.read(STSR::OVSR), 12);
        assert_eq!(regs.spr.read(SPR::OVSR_ADJ), 0x252);
        assert!(regs.lcr.is_set(LCR::WORD_LEN_8));
        assert!(!regs.lcr.is_set(LCR::STOP_2));
        assert_eq!(regs.lcr.read(LCR::PARITY), 0);
        assert!(!regs.lcr.is_set(LCR::DLAB));
        assert!(!regs.mcr.is_set(MCR::AFE));
        // FIFO enabled, trigger 1 byte, no DMA.
        assert_eq!(regs.spr.read(SPR::FCR_IMAGE), 0x01);
    }

    #[test]
    fn high_divisor_byte_goes_to_dlh() {
        let regs = testutil::regs::<RegisterBlock>();
        let uart = Uart::new(regs, &Config::default().baud_rate(BaudRate::B9600));

        assert_eq!(regs.dll.get(), 271 & 0xFF);
        // DLH and IER share the word; init leaves the IER image in place.
        uart.interrupt_config(int::RD_AVA | int::RX_IDLE, true);
        assert_eq!(regs.dlh_intcr.get(), int::RD_AVA | int::RX_IDLE);
        uart.interrupt_config(int::RD_AVA, false);
        assert_eq!(regs.dlh_intcr.get(), int::RX_IDLE);
    }

    #[test]
    fn even_parity_two_stop_bits() {
        let regs = testutil::regs::<RegisterBlock>();
        let uart = Uart::wrap(regs);

        uart.set_params(WordLength::Bits7, Parity::Even, StopBits::Two);

        assert_eq!(regs.lcr.get(), (3 << 3) | (1 << 2));
    }

    #[test]
    fn interrupt_id_decodes_pending_bit() {
        let regs = testutil::regs::<RegisterBlock>();
        let uart = Uart::wrap(regs);

        regs.intid_fcr.set(0x01);
        assert_eq!(uart.interrupt_id(), None);

        regs.intid_fcr.set(0x0C);
        assert_eq!(uart.interrupt_id(), Some(InterruptId::RxDataTimeout));

        regs.intid_fcr.set(0x04);
        assert_eq!(uart.interrupt_id(), Some(InterruptId::RxLevelReached));
    }

    #[test]
    fn rx_dma_sets_fifo_dma_mode() {
        let regs = testutil::regs::<RegisterBlock>();
        let uart = Uart::new(regs, &Config::default());

        uart.rx_dma_cmd(true);

        assert!(regs.miscr.is_set(MISCR::RXDMA_EN));
        assert_eq!(regs.spr.read(SPR::FCR_IMAGE) & (1 << 3), 1 << 3);

        uart.rx_dma_cmd(false);
        assert_eq!(regs.spr.read(SPR::FCR_IMAGE) & (1 << 3), 0);
    }

    #[test]
    fn nb_read_reports_line_errors() {
        use embedded_hal_nb::serial::Read;

        let regs = testutil::regs::<RegisterBlock>();
        let mut uart = Uart::wrap(regs);

        assert_eq!(uart.read(), Err(nb::Error::WouldBlock));

        testutil::poke(&regs.lsr, 0b1001);
        assert_eq!(uart.read(), Err(nb::Error::Other(Error::Framing)));

        testutil::poke(&regs.lsr, 0b1);
        regs.rb_thr.set(b'k' as u32);
        assert_eq!(uart.read(), Ok(b'k'));
    }

    #[test]
    fn console_output_lands_in_thr() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut uart = Uart::wrap(regs);

        uart.print_dec(4096).unwrap();
        assert_eq!(regs.rb_thr.get(), b'6' as u32);

        uart.print_hex(0xA5, 2).unwrap();
        assert_eq!(regs.rb_thr.get(), b'5' as u32);
        uart.print_hex(0x1234_5678, 3).unwrap();
        assert_eq!(regs.rb_thr.get(), b'8' as u32);

        write!(uart, "x={}\r\n", 7).unwrap();
        assert_eq!(regs.rb_thr.get(), b'\n' as u32);
    }

    #[test]
    fn full_tx_fifo_times_out_instead_of_hanging() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut uart = Uart::wrap(regs);
        testutil::poke(&regs.fifo_level, TX_FIFO_SIZE as u32);

        assert_eq!(uart.println("stalled"), Err(Error::TxTimeout));
        assert!(write!(uart, "{}", 1).is_err());
        assert_eq!(embedded_io::Write::write(&mut uart, b"a"), Err(Error::TxTimeout));
        assert_eq!(regs.rb_thr.get(), 0);
    }

    #[test]
    fn flush_waits_for_tx_empty() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut uart = Uart::wrap(regs);

        assert_eq!(uart.flush(), Err(Error::TxTimeout));
        testutil::poke(&regs.lsr, flag::TX_EMPTY);
        assert_eq!(uart.flush(), Ok(()));
    }

    #[test]
    fn dlps_store_restores_divisor_and_interrupts() {
        let regs = testutil::regs::<RegisterBlock>();
        let uart = Uart::new(regs, &Config::default().baud_rate(BaudRate::B921600));
        uart.interrupt_config(int::RD_AVA, true);
        uart.rx_idle_cmd(true);

        let store = DlpsStore::save(regs);
        uart.deinit();
        regs.dll.set(0);
        regs.lcr.set(0);
        store.restore(regs);

        assert_eq!(regs.dll.get(), 3);
        assert_eq!(regs.dlh_intcr.get(), int::RD_AVA);
        assert!(regs.lcr.is_set(LCR::WORD_LEN_8));
        assert!(regs.rxidle_tocr.is_set(RXIDLE_TOCR::EN));
        assert_eq!(regs.stsr.read(STSR::OVSR), 9);
    }
}
