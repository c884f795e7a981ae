// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Controller Area Network (CAN) controller.
//!
//! - 16 message buffers (MB) live in controller RAM. They are reached through a single
//!   RAM window (`RAM_DATA`/`RAM_ARB`/`RAM_MASK`/`RAM_CS`) moved by `RAM_CMD`.
//! - When the RX FIFO is enabled, MB 12..=15 form the receive FIFO.
//! - [`Can`] implements `embedded_can::nb::Can` with [`CanFrame`].

use core::ops::Deref;

use embedded_can::{ErrorKind, ExtendedId, Frame, Id, StandardId};
use tock_registers::{
    fields::FieldValue,
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

use super::TIMEOUT;

pub const MESSAGE_BUFFER_COUNT: u8 = 16;

/// Bit of message buffer `index` in the per-buffer flag registers, zero when out of range.
#[inline]
const fn mb_bit(index: u8) -> u32 {
    if index < MESSAGE_BUFFER_COUNT {
        1 << index
    } else {
        0
    }
}
pub const MESSAGE_FIFO_START_ID: u8 = 12;
pub const DEFAULT_ERROR_WARN_THRESHOLD: u8 = 96;
pub const STANDARD_DATA_MAX_LEN: usize = 8;
pub const STANDARD_ID_POS: u32 = 18;
pub const STANDARD_ID_MAX: u16 = 0x7FF;
pub const EXTEND_ID_MAX: u32 = 0x3FFFF;

/// MB used by the `embedded_can` transmit path.
pub const TX_MESSAGE_BUFFER: u8 = 0;

register_bitfields! [u32,
    pub CTL [
        BUS_ON_REQ OFFSET(0) NUMBITS(1) [],
        TRI_SAMPLE OFFSET(1) NUMBITS(1) [],
        AUTO_RE_TX OFFSET(2) NUMBITS(1) [],
        RX_FIFO_EN OFFSET(3) NUMBITS(1) [],
        TEST_MODE_EN OFFSET(4) NUMBITS(1) [],
        RXDMA_EN OFFSET(5) NUMBITS(1) []
    ],
    pub STS [
        BUS_ON OFFSET(0) NUMBITS(1) [],
        ERROR_PASSIVE OFFSET(1) NUMBITS(1) [],
        BUS_OFF OFFSET(2) NUMBITS(1) [],
        ERROR_WARNING OFFSET(3) NUMBITS(1) []
    ],
    pub FIFO_STS [
        EMPTY OFFSET(0) NUMBITS(1) [],
        FULL OFFSET(1) NUMBITS(1) [],
        OVERFLOW OFFSET(2) NUMBITS(1) [],
        LEVEL OFFSET(4) NUMBITS(3) []
    ],
    pub BIT_TIMING [
        TSEG1 OFFSET(0) NUMBITS(8) [],
        TSEG2 OFFSET(8) NUMBITS(8) [],
        SJW OFFSET(16) NUMBITS(3) [],
        BRP OFFSET(24) NUMBITS(8) []
    ],
    pub ERR_CNT_CTL [
        TX_ERR_CNT_CLR OFFSET(0) NUMBITS(1) [],
        RX_ERR_CNT_CLR OFFSET(1) NUMBITS(1) [],
        ERR_WARN_TH OFFSET(8) NUMBITS(8) []
    ],
    pub ERR_CNT_STS [
        TEC OFFSET(0) NUMBITS(9) [],
        REC OFFSET(16) NUMBITS(9) []
    ],
    pub TIME_STAMP [
        COUNT OFFSET(0) NUMBITS(16) [],
        DIV OFFSET(16) NUMBITS(8) [],
        EN OFFSET(31) NUMBITS(1) []
    ],
    pub MB_TRIGGER [
        BEGIN OFFSET(0) NUMBITS(16) [],
        CLOSE_OFFSET OFFSET(16) NUMBITS(8) [],
        EN OFFSET(24) NUMBITS(1) []
    ],
    pub SLEEP_MODE [
        REQ OFFSET(0) NUMBITS(1) [],
        STATUS OFFSET(1) NUMBITS(1) [],
        WAKEUP OFFSET(2) NUMBITS(1) []
    ],
    pub TEST [
        MODE OFFSET(0) NUMBITS(2) [
            None = 0,
            Silence = 1,
            ExtLoopback = 2,
            IntLoopback = 3
        ]
    ],
    pub MB_STS [
        TX_REQ OFFSET(0) NUMBITS(1) [],
        TX_FINISH OFFSET(1) NUMBITS(1) [],
        RX_RDY OFFSET(2) NUMBITS(1) [],
        RX_VLD OFFSET(3) NUMBITS(1) []
    ],
    pub RAM_ARB [
        ID OFFSET(0) NUMBITS(29) [],
        IDE OFFSET(29) NUMBITS(1) [],
        RTR OFFSET(30) NUMBITS(1) []
    ],
    pub RAM_MASK [
        ID_MASK OFFSET(0) NUMBITS(29) [],
        IDE_MASK OFFSET(29) NUMBITS(1) [],
        RTR_MASK OFFSET(30) NUMBITS(1) []
    ],
    pub RAM_CS [
        DLC OFFSET(0) NUMBITS(4) [],
        LOST OFFSET(4) NUMBITS(1) [],
        RXTX OFFSET(5) NUMBITS(1) [],
        AUTOREPLY OFFSET(6) NUMBITS(1) [],
        RXDMA_EN OFFSET(7) NUMBITS(1) [],
        EDL OFFSET(8) NUMBITS(1) [],
        ESI OFFSET(10) NUMBITS(1) [],
        TIMESTAMP OFFSET(16) NUMBITS(16) []
    ],
    pub RAM_CMD [
        ACC_NUM OFFSET(0) NUMBITS(8) [],
        ACC_MASK OFFSET(8) NUMBITS(1) [],
        ACC_CS OFFSET(9) NUMBITS(1) [],
        ACC_ARB OFFSET(10) NUMBITS(1) [],
        ACC_DATA OFFSET(11) NUMBITS(16) [],
        BUFFER_EN OFFSET(29) NUMBITS(1) [],
        DIR OFFSET(30) NUMBITS(1) [
            Read = 0,
            Write = 1
        ],
        START OFFSET(31) NUMBITS(1) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub ctl: ReadWrite<u32, CTL::Register>),
        (0x004 => pub sts: ReadOnly<u32, STS::Register>),
        (0x008 => pub fifo_sts: ReadOnly<u32, FIFO_STS::Register>),
        (0x00C => pub bit_timing: ReadWrite<u32, BIT_TIMING::Register>),
        (0x010 => pub int_en: ReadWrite<u32>),
        (0x014 => pub mb_rxint_en: ReadWrite<u32>),
        (0x018 => pub mb_txint_en: ReadWrite<u32>),
        (0x01C => pub int_flag: ReadWrite<u32>),
        (0x020 => pub err_status: ReadWrite<u32>),
        (0x024 => pub err_cnt_ctl: ReadWrite<u32, ERR_CNT_CTL::Register>),
        (0x028 => pub err_cnt_sts: ReadOnly<u32, ERR_CNT_STS::Register>),
        (0x02C => pub tx_error_flag: ReadWrite<u32>),
        (0x030 => pub tx_done: ReadWrite<u32>),
        (0x034 => pub rx_done: ReadWrite<u32>),
        (0x038 => pub time_stamp: ReadWrite<u32, TIME_STAMP::Register>),
        (0x03C => pub mb_trigger: ReadWrite<u32, MB_TRIGGER::Register>),
        (0x040 => pub rxdma_cfg: ReadWrite<u32>),
        (0x044 => pub rx_dma_data: ReadOnly<u32>),
        (0x048 => pub sleep_mode: ReadWrite<u32, SLEEP_MODE::Register>),
        (0x04C => pub test: ReadWrite<u32, TEST::Register>),
        (0x050 => _reserved0),
        (0x100 => pub mb_sts: [ReadOnly<u32, MB_STS::Register>; 16]),
        (0x140 => _reserved1),
        (0x200 => pub ram_data: [ReadWrite<u32>; 16]),
        (0x240 => pub ram_arb: ReadWrite<u32, RAM_ARB::Register>),
        (0x244 => pub ram_mask: ReadWrite<u32, RAM_MASK::Register>),
        (0x248 => pub ram_cs: ReadWrite<u32, RAM_CS::Register>),
        (0x24C => pub ram_cmd: ReadWrite<u32, RAM_CMD::Register>),
        (0x250 => @END),
    }
}

/// Interrupt enables and flags (`CAN_*_INT`).
pub mod int {
    pub const TX: u32 = 1 << 0;
    pub const RX: u32 = 1 << 1;
    pub const ERROR: u32 = 1 << 2;
    pub const WAKE_UP: u32 = 1 << 3;
    pub const BUS_OFF: u32 = 1 << 4;
    pub const RAM_MOVE_DONE: u32 = 1 << 5;
    pub const ALL: u32 = 0x3F;
}

/// Protocol error bits (`CAN_ERROR_*`).
pub mod error_status {
    pub const BIT0: u32 = 1 << 0;
    pub const BIT1: u32 = 1 << 1;
    pub const FORM: u32 = 1 << 2;
    pub const CRC: u32 = 1 << 3;
    pub const STUFF: u32 = 1 << 4;
    pub const ACK: u32 = 1 << 5;
    pub const TX: u32 = 1 << 8;
    pub const RX: u32 = 1 << 9;
}

/// `CANError_TypeDef` without the `NO_ERR` variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Message buffer index out of range.
    MsgId,
    /// Frame identifier out of range.
    Id,
    DataLen,
    /// Frame type is not a classic data or remote frame.
    Type,
    /// The RAM window is still moving a previous buffer.
    RamState,
    Timeout,
}

impl embedded_can::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestMode {
    Silence,
    ExtLoopback,
    IntLoopback,
    None,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusState {
    Off,
    On,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RamState {
    Idle,
    Exchanging,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameType {
    Invalid,
    StdData,
    ExtData,
    StdRemote,
    ExtRemote,
}

impl FrameType {
    fn is_extended(self) -> bool {
        matches!(self, FrameType::ExtData | FrameType::ExtRemote)
    }

    fn is_remote(self) -> bool {
        matches!(self, FrameType::StdRemote | FrameType::ExtRemote)
    }
}

/// Bit timing in time quanta.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BitTiming {
    pub brp: u8,
    pub sjw: u8,
    pub tseg1: u8,
    pub tseg2: u8,
}

impl BitTiming {
    /// 500 kbit/s from the 40 MHz peripheral clock.
    pub const KBPS_500: Self = Self { brp: 3, sjw: 3, tseg1: 13, tseg2: 4 };

    /// Resulting bit rate in bit/s.
    pub const fn bitrate(&self) -> u32 {
        let tq = 1 + (self.tseg1 as u32 + 1) + (self.tseg2 as u32 + 1);
        crate::PERIPH_CLOCK_HZ / ((self.brp as u32 + 1) * tq)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub auto_re_tx: bool,
    pub rx_fifo: bool,
    pub rx_dma: bool,
    pub tri_sample: bool,
    pub test_mode: TestMode,
    pub error_warn_threshold: u8,
    pub bit_timing: BitTiming,
    /// Timestamp counter divider, `None` keeps the counter stopped.
    pub timestamp_div: Option<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_re_tx: false,
            rx_fifo: false,
            rx_dma: false,
            tri_sample: false,
            test_mode: TestMode::None,
            error_warn_threshold: DEFAULT_ERROR_WARN_THRESHOLD,
            bit_timing: BitTiming::KBPS_500,
            timestamp_div: None,
        }
    }
}

/// Parameters for a transmit message buffer.
#[derive(Copy, Clone, Debug)]
pub struct TxFrame {
    pub msg_buf_id: u8,
    pub auto_reply: bool,
    pub frame_type: FrameType,
    pub standard_frame_id: u16,
    pub extend_frame_id: u32,
}

/// Parameters for a receive message buffer (acceptance filter).
///
/// Mask bits set to 1 are "don't care".
#[derive(Copy, Clone, Debug)]
pub struct RxFrame {
    pub msg_buf_id: u8,
    pub rx_dma: bool,
    pub rtr_mask: bool,
    pub ide_mask: bool,
    pub id_mask: u32,
    pub rtr: bool,
    pub ide: bool,
    pub auto_reply: bool,
    pub standard_frame_id: u16,
    pub extend_frame_id: u32,
}

impl Default for RxFrame {
    fn default() -> Self {
        Self {
            msg_buf_id: 0,
            rx_dma: false,
            rtr_mask: false,
            ide_mask: false,
            id_mask: 0,
            rtr: false,
            ide: false,
            auto_reply: false,
            standard_frame_id: 0,
            extend_frame_id: 0,
        }
    }
}

/// Message buffer contents as read back from controller RAM.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MsgBufInfo {
    pub rtr_mask: bool,
    pub ide_mask: bool,
    pub id_mask: u32,
    pub esi: bool,
    pub auto_reply: bool,
    pub rxtx: bool,
    pub rx_lost: bool,
    pub data_length: u8,
    pub rx_dma: bool,
    pub edl: bool,
    pub rtr: bool,
    pub ide: bool,
    pub rx_timestamp: u16,
    pub standard_frame_id: u16,
    pub extend_frame_id: u32,
}

impl MsgBufInfo {
    /// Decode raw `RAM_ARB`, `RAM_MASK` and `RAM_CS` words.
    pub fn from_raw(arb: u32, mask: u32, cs: u32) -> Self {
        let id = arb & 0x1FFF_FFFF;
        Self {
            rtr_mask: mask & (1 << 30) != 0,
            ide_mask: mask & (1 << 29) != 0,
            id_mask: mask & 0x1FFF_FFFF,
            esi: cs & (1 << 10) != 0,
            auto_reply: cs & (1 << 6) != 0,
            rxtx: cs & (1 << 5) != 0,
            rx_lost: cs & (1 << 4) != 0,
            data_length: (cs & 0xF) as u8,
            rx_dma: cs & (1 << 7) != 0,
            edl: cs & (1 << 8) != 0,
            rtr: arb & (1 << 30) != 0,
            ide: arb & (1 << 29) != 0,
            rx_timestamp: (cs >> 16) as u16,
            standard_frame_id: (id >> STANDARD_ID_POS) as u16,
            extend_frame_id: id & EXTEND_ID_MAX,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        check_frame_type(self.rtr, self.ide, self.edl)
    }

    /// Identifier in `embedded_can` form.
    pub fn id(&self) -> Option<Id> {
        if self.ide {
            let raw = ((self.standard_frame_id as u32) << STANDARD_ID_POS) | self.extend_frame_id;
            ExtendedId::new(raw).map(Id::Extended)
        } else {
            StandardId::new(self.standard_frame_id).map(Id::Standard)
        }
    }
}

/// `FifoStatus` snapshot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FifoStatus {
    pub level: u8,
    pub overflow: bool,
    pub empty: bool,
    pub full: bool,
}

/// Classify a frame from its RTR, IDE and EDL bits.
pub fn check_frame_type(rtr: bool, ide: bool, edl: bool) -> FrameType {
    match (edl, rtr, ide) {
        (true, _, _) => FrameType::Invalid,
        (false, false, false) => FrameType::StdData,
        (false, false, true) => FrameType::ExtData,
        (false, true, false) => FrameType::StdRemote,
        (false, true, true) => FrameType::ExtRemote,
    }
}

/// Classic CAN frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanFrame {
    id: Id,
    remote: bool,
    dlc: u8,
    data: [u8; STANDARD_DATA_MAX_LEN],
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > STANDARD_DATA_MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; STANDARD_DATA_MAX_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self { id: id.into(), remote: false, dlc: data.len() as u8, data: bytes })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > STANDARD_DATA_MAX_LEN {
            return None;
        }
        Some(Self {
            id: id.into(),
            remote: true,
            dlc: dlc as u8,
            data: [0; STANDARD_DATA_MAX_LEN],
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }
}

/// Bit mask of the RAM data words needed for `len` bytes.
#[inline]
fn data_words_mask(len: usize) -> u32 {
    let words = len.div_ceil(4) as u32;
    (1 << words) - 1
}

pub struct Can<R> {
    can: R,
}

impl<R> Can<R>
where
    R: Deref<Target = RegisterBlock>,
{
    /// Configure the controller. The bus stays off until [`Can::cmd`].
    pub fn new(can: R, cfg: &Config) -> Self {
        let can = Self { can };
        can.init(cfg);
        can
    }

    pub fn init(&self, cfg: &Config) {
        let t = cfg.bit_timing;
        self.can.bit_timing.write(
            BIT_TIMING::BRP.val(t.brp as u32)
                + BIT_TIMING::SJW.val(t.sjw as u32)
                + BIT_TIMING::TSEG1.val(t.tseg1 as u32)
                + BIT_TIMING::TSEG2.val(t.tseg2 as u32),
        );
        self.can
            .err_cnt_ctl
            .write(ERR_CNT_CTL::ERR_WARN_TH.val(cfg.error_warn_threshold as u32));

        match cfg.timestamp_div {
            Some(div) => self
                .can
                .time_stamp
                .write(TIME_STAMP::DIV.val(div as u32) + TIME_STAMP::EN::SET),
            None => self.can.time_stamp.set(0),
        }

        let mode = match cfg.test_mode {
            TestMode::Silence => TEST::MODE::Silence,
            TestMode::ExtLoopback => TEST::MODE::ExtLoopback,
            TestMode::IntLoopback => TEST::MODE::IntLoopback,
            TestMode::None => TEST::MODE::None,
        };
        self.can.test.write(mode);

        self.can.ctl.write(
            CTL::TRI_SAMPLE.val(cfg.tri_sample as u32)
                + CTL::AUTO_RE_TX.val(cfg.auto_re_tx as u32)
                + CTL::RX_FIFO_EN.val(cfg.rx_fifo as u32)
                + CTL::TEST_MODE_EN.val((cfg.test_mode != TestMode::None) as u32)
                + CTL::RXDMA_EN.val(cfg.rx_dma as u32),
        );
        debug!("can {} bit/s", t.bitrate());
    }

    /// Return the controller to its reset state.
    pub fn deinit(&self) {
        self.can.ctl.set(0);
        self.can.int_en.set(0);
        self.can.mb_rxint_en.set(0);
        self.can.mb_txint_en.set(0);
        self.can.int_flag.set(int::ALL);
        self.can.err_status.set(0x3FF);
        self.can.time_stamp.set(0);
        self.can.mb_trigger.set(0);
        self.can.test.set(0);
    }

    /// Request bus on (`true`) or bus off.
    pub fn cmd(&self, enable: bool) {
        self.can.ctl.modify(CTL::BUS_ON_REQ.val(enable as u32));
    }

    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        let v = self.can.int_en.get();
        self.can.int_en.set(if enable { v | mask } else { v & !mask });
    }

    /// Flag state regardless of the enable bit.
    #[inline]
    pub fn interrupt_raw_status(&self, flag: u32) -> bool {
        self.can.int_flag.get() & flag != 0
    }

    /// Flag state of an enabled interrupt.
    #[inline]
    pub fn interrupt_status(&self, flag: u32) -> bool {
        self.can.int_flag.get() & self.can.int_en.get() & flag != 0
    }

    #[inline]
    pub fn clear_interrupt(&self, flag: u32) {
        self.can.int_flag.set(flag);
    }

    #[inline]
    pub fn error_status(&self, status: u32) -> bool {
        self.can.err_status.get() & status != 0
    }

    #[inline]
    pub fn clear_error_status(&self, status: u32) {
        self.can.err_status.set(status);
    }

    /// Transmit and receive error counters.
    pub fn error_counters(&self) -> (u16, u16) {
        (
            self.can.err_cnt_sts.read(ERR_CNT_STS::TEC) as u16,
            self.can.err_cnt_sts.read(ERR_CNT_STS::REC) as u16,
        )
    }

    fn check_ram_idle(&self) -> Result<(), Error> {
        match self.ram_state() {
            RamState::Idle => Ok(()),
            RamState::Exchanging => Err(Error::RamState),
        }
    }

    fn wait_ram_idle(&self) -> Result<(), Error> {
        for _ in 0..TIMEOUT {
            if self.ram_state() == RamState::Idle {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        warn!("can ram move timeout");
        Err(Error::Timeout)
    }

    fn arb_id(ide: bool, standard: u16, extend: u32) -> Result<u32, Error> {
        if standard > STANDARD_ID_MAX || (ide && extend > EXTEND_ID_MAX) {
            return Err(Error::Id);
        }
        let mut id = (standard as u32) << STANDARD_ID_POS;
        if ide {
            id |= extend;
        }
        Ok(id)
    }

    /// Load a frame into a transmit message buffer.
    pub fn set_msg_buf_tx_mode(&self, frame: &TxFrame, data: &[u8]) -> Result<(), Error> {
        if frame.msg_buf_id >= MESSAGE_BUFFER_COUNT {
            return Err(Error::MsgId);
        }
        if data.len() > STANDARD_DATA_MAX_LEN {
            return Err(Error::DataLen);
        }
        if frame.frame_type == FrameType::Invalid {
            return Err(Error::Type);
        }
        let ide = frame.frame_type.is_extended();
        let rtr = frame.frame_type.is_remote();
        let id = Self::arb_id(ide, frame.standard_frame_id, frame.extend_frame_id)?;
        self.check_ram_idle()?;

        let mut acc_data = 0;
        if !rtr {
            for (i, chunk) in data.chunks(4).enumerate() {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                self.can.ram_data[i].set(u32::from_le_bytes(word));
            }
            acc_data = data_words_mask(data.len());
        }

        self.can.ram_arb.write(
            RAM_ARB::ID.val(id) + RAM_ARB::IDE.val(ide as u32) + RAM_ARB::RTR.val(rtr as u32),
        );
        self.can.ram_mask.set(0);
        self.can.ram_cs.write(
            RAM_CS::DLC.val(data.len() as u32)
                + RAM_CS::RXTX::SET
                + RAM_CS::AUTOREPLY.val(frame.auto_reply as u32),
        );
        self.can.ram_cmd.write(
            RAM_CMD::ACC_NUM.val(frame.msg_buf_id as u32)
                + RAM_CMD::ACC_MASK::SET
                + RAM_CMD::ACC_CS::SET
                + RAM_CMD::ACC_ARB::SET
                + RAM_CMD::ACC_DATA.val(acc_data)
                + RAM_CMD::DIR::Write
                + RAM_CMD::START::SET,
        );
        self.wait_ram_idle()
    }

    /// Configure a message buffer to receive frames matching `frame`.
    pub fn set_msg_buf_rx_mode(&self, frame: &RxFrame) -> Result<(), Error> {
        if frame.msg_buf_id >= MESSAGE_BUFFER_COUNT {
            return Err(Error::MsgId);
        }
        let id = Self::arb_id(frame.ide, frame.standard_frame_id, frame.extend_frame_id)?;
        self.check_ram_idle()?;

        self.can.ram_arb.write(
            RAM_ARB::ID.val(id)
                + RAM_ARB::IDE.val(frame.ide as u32)
                + RAM_ARB::RTR.val(frame.rtr as u32),
        );
        self.can.ram_mask.write(
            RAM_MASK::ID_MASK.val(frame.id_mask & 0x1FFF_FFFF)
                + RAM_MASK::IDE_MASK.val(frame.ide_mask as u32)
                + RAM_MASK::RTR_MASK.val(frame.rtr_mask as u32),
        );
        self.can.ram_cs.write(
            RAM_CS::AUTOREPLY.val(frame.auto_reply as u32)
                + RAM_CS::RXDMA_EN.val(frame.rx_dma as u32),
        );
        self.can.ram_cmd.write(
            RAM_CMD::ACC_NUM.val(frame.msg_buf_id as u32)
                + RAM_CMD::ACC_MASK::SET
                + RAM_CMD::ACC_CS::SET
                + RAM_CMD::ACC_ARB::SET
                + RAM_CMD::DIR::Write
                + RAM_CMD::START::SET,
        );
        self.wait_ram_idle()
    }

    /// Move message buffer `msg_buf_id` into the RAM window and decode it.
    pub fn msg_buf_info(&self, msg_buf_id: u8) -> Result<MsgBufInfo, Error> {
        if msg_buf_id >= MESSAGE_BUFFER_COUNT {
            return Err(Error::MsgId);
        }
        self.check_ram_idle()?;
        self.can.ram_cmd.write(
            RAM_CMD::ACC_NUM.val(msg_buf_id as u32)
                + RAM_CMD::ACC_MASK::SET
                + RAM_CMD::ACC_CS::SET
                + RAM_CMD::ACC_ARB::SET
                + RAM_CMD::ACC_DATA.val(data_words_mask(STANDARD_DATA_MAX_LEN))
                + RAM_CMD::DIR::Read
                + RAM_CMD::START::SET,
        );
        self.wait_ram_idle()?;
        Ok(MsgBufInfo::from_raw(
            self.can.ram_arb.get(),
            self.can.ram_mask.get(),
            self.can.ram_cs.get(),
        ))
    }

    /// Copy `buf.len()` bytes from the RAM data window.
    pub fn ram_data(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() > STANDARD_DATA_MAX_LEN {
            return Err(Error::DataLen);
        }
        for (i, chunk) in buf.chunks_mut(4).enumerate() {
            let word = self.can.ram_data[i].get().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }

    pub fn mb_tx_interrupt_config(&self, index: u8, enable: bool) {
        let v = self.can.mb_txint_en.get();
        let bit = mb_bit(index);
        self.can.mb_txint_en.set(if enable { v | bit } else { v & !bit });
    }

    pub fn mb_rx_interrupt_config(&self, index: u8, enable: bool) {
        let v = self.can.mb_rxint_en.get();
        let bit = mb_bit(index);
        self.can.mb_rxint_en.set(if enable { v | bit } else { v & !bit });
    }

    pub fn fifo_status(&self) -> FifoStatus {
        let sts = self.can.fifo_sts.extract();
        FifoStatus {
            level: sts.read(FIFO_STS::LEVEL) as u8,
            overflow: sts.is_set(FIFO_STS::OVERFLOW),
            empty: sts.is_set(FIFO_STS::EMPTY),
            full: sts.is_set(FIFO_STS::FULL),
        }
    }

    /// Gate transmission to a window of the timestamp counter.
    pub fn tx_trigger_config(&self, enable: bool, begin: u16, close_offset: u8) {
        self.can.mb_trigger.write(
            MB_TRIGGER::BEGIN.val(begin as u32)
                + MB_TRIGGER::CLOSE_OFFSET.val(close_offset as u32)
                + MB_TRIGGER::EN.val(enable as u32),
        );
    }

    pub fn bus_state(&self) -> BusState {
        if self.can.sts.is_set(STS::BUS_ON) {
            BusState::On
        } else {
            BusState::Off
        }
    }

    pub fn ram_state(&self) -> RamState {
        if self.can.ram_cmd.is_set(RAM_CMD::START) {
            RamState::Exchanging
        } else {
            RamState::Idle
        }
    }

    #[inline]
    pub fn mb_tx_done(&self, index: u8) -> bool {
        self.can.tx_done.get() & mb_bit(index) != 0
    }

    #[inline]
    pub fn clear_mb_tx_done(&self, index: u8) {
        self.can.tx_done.set(mb_bit(index));
    }

    #[inline]
    pub fn mb_tx_error(&self, index: u8) -> bool {
        self.can.tx_error_flag.get() & mb_bit(index) != 0
    }

    #[inline]
    pub fn clear_mb_tx_error(&self, index: u8) {
        self.can.tx_error_flag.set(mb_bit(index));
    }

    #[inline]
    pub fn mb_rx_done(&self, index: u8) -> bool {
        self.can.rx_done.get() & mb_bit(index) != 0
    }

    #[inline]
    pub fn clear_mb_rx_done(&self, index: u8) {
        self.can.rx_done.set(mb_bit(index));
    }

    fn mb_status(&self, index: u8) -> Option<&ReadOnly<u32, MB_STS::Register>> {
        self.can.mb_sts.get(index as usize)
    }

    pub fn mb_status_tx_finish(&self, index: u8) -> bool {
        self.mb_status(index)
            .is_some_and(|r| r.is_set(MB_STS::TX_FINISH))
    }

    pub fn mb_status_tx_req(&self, index: u8) -> bool {
        self.mb_status(index).is_some_and(|r| r.is_set(MB_STS::TX_REQ))
    }

    pub fn mb_status_rx_valid(&self, index: u8) -> bool {
        self.mb_status(index).is_some_and(|r| r.is_set(MB_STS::RX_VLD))
    }

    pub fn mb_status_rx_ready(&self, index: u8) -> bool {
        self.mb_status(index).is_some_and(|r| r.is_set(MB_STS::RX_RDY))
    }

    pub fn timestamp_config(&self, enable: bool) {
        self.can.time_stamp.modify(TIME_STAMP::EN.val(enable as u32));
    }

    #[inline]
    pub fn timestamp_count(&self) -> u16 {
        self.can.time_stamp.read(TIME_STAMP::COUNT) as u16
    }

    pub fn rx_dma_cmd(&self, enable: bool) {
        self.can.ctl.modify(CTL::RXDMA_EN.val(enable as u32));
    }

    /// Request sleep (`true`) or wake the controller manually.
    pub fn sleep_mode_cmd(&self, enable: bool) {
        let v: FieldValue<u32, SLEEP_MODE::Register> = if enable {
            SLEEP_MODE::REQ::SET + SLEEP_MODE::WAKEUP::CLEAR
        } else {
            SLEEP_MODE::REQ::CLEAR + SLEEP_MODE::WAKEUP::SET
        };
        self.can.sleep_mode.modify(v);
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.can.sleep_mode.is_set(SLEEP_MODE::STATUS)
    }

    fn receive_from(&self, index: u8) -> Result<CanFrame, Error> {
        let info = self.msg_buf_info(index)?;
        self.clear_mb_rx_done(index);
        let id = info.id().ok_or(Error::Id)?;
        let len = (info.data_length as usize).min(STANDARD_DATA_MAX_LEN);
        let frame = match info.frame_type() {
            FrameType::Invalid => return Err(Error::Type),
            t if t.is_remote() => CanFrame::new_remote(id, len),
            _ => {
                let mut data = [0u8; STANDARD_DATA_MAX_LEN];
                self.ram_data(&mut data[..len])?;
                CanFrame::new(id, &data[..len])
            }
        };
        frame.ok_or(Error::DataLen)
    }

    pub fn free(self) -> R {
        self.can
    }
}

impl<R> embedded_can::nb::Can for Can<R>
where
    R: Deref<Target = RegisterBlock>,
{
    type Frame = CanFrame;
    type Error = Error;

    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        if self.mb_status_tx_req(TX_MESSAGE_BUFFER) || self.ram_state() == RamState::Exchanging {
            return Err(nb::Error::WouldBlock);
        }
        let (standard_frame_id, extend_frame_id) = match frame.id() {
            Id::Standard(id) => (id.as_raw(), 0),
            Id::Extended(id) => (
                (id.as_raw() >> STANDARD_ID_POS) as u16,
                id.as_raw() & EXTEND_ID_MAX,
            ),
        };
        let frame_type = check_frame_type(frame.is_remote_frame(), frame.is_extended(), false);
        let tx = TxFrame {
            msg_buf_id: TX_MESSAGE_BUFFER,
            auto_reply: false,
            frame_type,
            standard_frame_id,
            extend_frame_id,
        };
        let data = if frame.is_remote_frame() {
            &frame.data[..frame.dlc()]
        } else {
            frame.data()
        };
        self.set_msg_buf_tx_mode(&tx, data)
            .map_err(nb::Error::Other)?;
        Ok(None)
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        let first = if self.can.ctl.is_set(CTL::RX_FIFO_EN) {
            MESSAGE_FIFO_START_ID
        } else {
            0
        };
        let index = (first..MESSAGE_BUFFER_COUNT)
            .find(|&i| i != TX_MESSAGE_BUFFER && self.mb_rx_done(i))
            .ok_or(nb::Error::WouldBlock)?;
        self.receive_from(index).map_err(nb::Error::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use embedded_can::nb::Can as _;

    #[test]
    fn default_timing_is_500k() {
        assert_eq!(BitTiming::KBPS_500.bitrate(), 500_000);
    }

    #[test]
    fn init_programs_timing_and_loopback() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(
            regs,
            &Config {
                auto_re_tx: true,
                test_mode: TestMode::IntLoopback,
                timestamp_div: Some(39),
                ..Default::default()
            },
        );

        assert_eq!(regs.bit_timing.read(BIT_TIMING::BRP), 3);
        assert_eq!(regs.bit_timing.read(BIT_TIMING::TSEG1), 13);
        assert_eq!(regs.err_cnt_ctl.read(ERR_CNT_CTL::ERR_WARN_TH), 96);
        assert!(regs.ctl.is_set(CTL::TEST_MODE_EN));
        assert!(regs.ctl.is_set(CTL::AUTO_RE_TX));
        assert!(!regs.ctl.is_set(CTL::BUS_ON_REQ));
        assert!(regs.test.matches_all(TEST::MODE::IntLoopback));
        assert!(regs.time_stamp.is_set(TIME_STAMP::EN));

        can.cmd(true);
        assert!(regs.ctl.is_set(CTL::BUS_ON_REQ));
    }

    #[test]
    fn tx_mode_rejects_bad_parameters() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(regs, &Config::default());
        let mut frame = TxFrame {
            msg_buf_id: 16,
            auto_reply: false,
            frame_type: FrameType::StdData,
            standard_frame_id: 0x123,
            extend_frame_id: 0,
        };

        assert_eq!(can.set_msg_buf_tx_mode(&frame, &[0; 8]), Err(Error::MsgId));
        frame.msg_buf_id = 1;
        assert_eq!(can.set_msg_buf_tx_mode(&frame, &[0; 9]), Err(Error::DataLen));
        frame.frame_type = FrameType::Invalid;
        assert_eq!(can.set_msg_buf_tx_mode(&frame, &[0; 8]), Err(Error::Type));
        frame.frame_type = FrameType::StdData;
        frame.standard_frame_id = 0x800;
        assert_eq!(can.set_msg_buf_tx_mode(&frame, &[0; 8]), Err(Error::Id));
        frame.standard_frame_id = 0x123;
        regs.ram_cmd.modify(RAM_CMD::START::SET);
        assert_eq!(can.set_msg_buf_tx_mode(&frame, &[0; 8]), Err(Error::RamState));
    }

    #[test]
    fn tx_mode_fills_ram_window() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(regs, &Config::default());
        let frame = TxFrame {
            msg_buf_id: 2,
            auto_reply: false,
            frame_type: FrameType::ExtData,
            standard_frame_id: 0x12,
            extend_frame_id: 0x345,
        };

        // RAM-backed START never self-clears, so the move "times out".
        let res = can.set_msg_buf_tx_mode(&frame, &[1, 2, 3, 4, 5]);
        assert_eq!(res, Err(Error::Timeout));

        assert_eq!(regs.ram_data[0].get(), 0x0403_0201);
        assert_eq!(regs.ram_data[1].get(), 0x05);
        assert_eq!(regs.ram_arb.read(RAM_ARB::ID), (0x12 << 18) | 0x345);
        assert!(regs.ram_arb.is_set(RAM_ARB::IDE));
        assert_eq!(regs.ram_cs.read(RAM_CS::DLC), 5);
        assert!(regs.ram_cs.is_set(RAM_CS::RXTX));
        assert_eq!(regs.ram_cmd.read(RAM_CMD::ACC_NUM), 2);
        assert_eq!(regs.ram_cmd.read(RAM_CMD::ACC_DATA), 0b11);
        assert!(regs.ram_cmd.matches_all(RAM_CMD::DIR::Write));
    }

    #[test]
    fn msg_buf_info_decodes_raw_words() {
        let arb = (1 << 30) | (0x7FF << 18);
        let cs = (0x1234 << 16) | (1 << 5) | 3;
        let info = MsgBufInfo::from_raw(arb, 1 << 29, cs);

        assert_eq!(info.standard_frame_id, 0x7FF);
        assert!(info.rtr && !info.ide && info.ide_mask);
        assert_eq!(info.data_length, 3);
        assert_eq!(info.rx_timestamp, 0x1234);
        assert_eq!(info.frame_type(), FrameType::StdRemote);
        assert_eq!(info.id(), StandardId::new(0x7FF).map(Id::Standard));
    }

    #[test]
    fn frame_type_truth_table() {
        assert_eq!(check_frame_type(false, false, false), FrameType::StdData);
        assert_eq!(check_frame_type(false, true, false), FrameType::ExtData);
        assert_eq!(check_frame_type(true, false, false), FrameType::StdRemote);
        assert_eq!(check_frame_type(true, true, false), FrameType::ExtRemote);
        assert_eq!(check_frame_type(false, false, true), FrameType::Invalid);
    }

    #[test]
    fn ram_data_unpacks_little_endian() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(regs, &Config::default());
        regs.ram_data[0].set(0xDDCC_BBAA);
        regs.ram_data[1].set(0x0000_FFEE);

        let mut buf = [0u8; 6];
        assert_eq!(can.ram_data(&mut buf), Ok(()));
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(can.ram_data(&mut [0u8; 9]), Err(Error::DataLen));
    }

    #[test]
    fn receive_would_block_without_rx_done() {
        let regs = testutil::regs::<RegisterBlock>();
        let mut can = Can::new(regs, &Config::default());

        assert!(matches!(can.receive(), Err(nb::Error::WouldBlock)));
    }

    #[test]
    fn mb_flags_are_write_one_to_clear_bits() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(regs, &Config::default());

        can.mb_rx_interrupt_config(12, true);
        can.mb_tx_interrupt_config(0, true);
        assert_eq!(regs.mb_rxint_en.get(), 1 << 12);
        assert_eq!(regs.mb_txint_en.get(), 1);

        regs.rx_done.set(1 << 12);
        assert!(can.mb_rx_done(12));
        assert!(!can.mb_rx_done(11));
    }

    #[test]
    fn out_of_range_message_buffer_is_ignored() {
        let regs = testutil::regs::<RegisterBlock>();
        let can = Can::new(regs, &Config::default());
        regs.tx_done.set(u32::MAX);

        assert!(!can.mb_tx_done(MESSAGE_BUFFER_COUNT));
        assert!(!can.mb_tx_done(40));
        can.mb_tx_interrupt_config(31, true);
        assert_eq!(regs.mb_txint_en.get(), 0);
        can.clear_mb_rx_done(200);
        assert!(!can.mb_status_rx_valid(200));
    }

    #[test]
    fn frame_accessors() {
        let id = StandardId::new(0x55).map(Id::Standard);
        let frame = id.and_then(|id| CanFrame::new(id, &[9, 8, 7]));
        let frame = frame.as_ref();

        assert_eq!(frame.map(|f| f.data()), Some(&[9u8, 8, 7][..]));
        assert_eq!(frame.map(|f| f.is_extended()), Some(false));
        assert!(CanFrame::new(Id::Standard(StandardId::ZERO), &[0; 9]).is_none());
    }
}
