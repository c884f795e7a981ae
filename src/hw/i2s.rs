// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! I2S (SPORT) controller.
//!
//! TX and RX run from separate BCLK generators: `BCLK = 40 MHz * Ni / Mi`.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

pub const FIFO_DEPTH: u8 = 64;
pub const FRAME_SYNC_OFFSET_DEFAULT: u32 = 0x81;

register_bitfields! [u32,
    pub CTRL0 [
        RESET OFFSET(0) NUMBITS(1) [],
        TX_DISABLE OFFSET(1) NUMBITS(1) [],
        START_TX OFFSET(2) NUMBITS(1) [],
        SLAVE_MODE OFFSET(3) NUMBITS(1) [],
        DATA_FORMAT_TX OFFSET(8) NUMBITS(2) [],
        MONO_TX OFFSET(10) NUMBITS(1) [],
        DATA_LEN_TX OFFSET(12) NUMBITS(3) [],
        LOOPBACK OFFSET(15) NUMBITS(1) [],
        TX_LSB_FIRST OFFSET(16) NUMBITS(1) [],
        RX_DISABLE OFFSET(17) NUMBITS(1) [],
        START_RX OFFSET(18) NUMBITS(1) [],
        TX_SWAP_BYTES OFFSET(19) NUMBITS(1) [],
        TX_SWAP_LR OFFSET(20) NUMBITS(1) [],
        RX_SWAP_BYTES OFFSET(21) NUMBITS(1) [],
        RX_SWAP_LR OFFSET(22) NUMBITS(1) [],
        CLK_SRC OFFSET(24) NUMBITS(2) []
    ],
    pub CTRL1 [
        TX_WATER OFFSET(0) NUMBITS(6) [],
        TX_DMA_EN OFFSET(6) NUMBITS(1) [],
        RX_WATER OFFSET(8) NUMBITS(6) [],
        RX_DMA_EN OFFSET(14) NUMBITS(1) [],
        TX_CH_SEQ OFFSET(16) NUMBITS(2) [],
        RX_CH_SEQ OFFSET(18) NUMBITS(2) []
    ],
    pub CTRL2 [
        CH_LEN_TX OFFSET(0) NUMBITS(3) [],
        CH_LEN_RX OFFSET(4) NUMBITS(3) [],
        DATA_LEN_RX OFFSET(8) NUMBITS(3) [],
        DATA_FORMAT_RX OFFSET(12) NUMBITS(2) [],
        MONO_RX OFFSET(14) NUMBITS(1) [],
        RX_LSB_FIRST OFFSET(15) NUMBITS(1) []
    ],
    pub BCLK [
        MI OFFSET(0) NUMBITS(16) [],
        NI OFFSET(16) NUMBITS(15) [],
        UPDATE OFFSET(31) NUMBITS(1) []
    ],
    pub FIFO_STS [
        TX_FREE OFFSET(0) NUMBITS(7) [],
        RX_CNT OFFSET(8) NUMBITS(7) []
    ],
    pub ERR_CNT [
        TX OFFSET(0) NUMBITS(8) [],
        CLR_TX OFFSET(12) NUMBITS(1) [],
        CLR_RX OFFSET(13) NUMBITS(1) [],
        RX OFFSET(15) NUMBITS(8) []
    ],
    pub BCLK_STS [
        TX_READY OFFSET(0) NUMBITS(1) [],
        RX_READY OFFSET(1) NUMBITS(1) []
    ]
];

register_structs! {
    pub RegisterBlock {
        (0x000 => pub tx_dr: WriteOnly<u32>),
        (0x004 => pub ctrl0: ReadWrite<u32, CTRL0::Register>),
        (0x008 => pub int_ctrl: ReadWrite<u32>),
        (0x00C => pub int_clr: WriteOnly<u32>),
        (0x010 => pub rx_dr: ReadOnly<u32>),
        (0x014 => pub bclk_tx: ReadWrite<u32, BCLK::Register>),
        (0x018 => pub fifo_sts: ReadOnly<u32, FIFO_STS::Register>),
        (0x01C => pub int_sts: ReadOnly<u32>),
        (0x020 => pub err_cnt: ReadWrite<u32, ERR_CNT::Register>),
        (0x024 => pub ctrl2: ReadWrite<u32, CTRL2::Register>),
        (0x028 => pub bclk_rx: ReadWrite<u32, BCLK::Register>),
        (0x02C => pub bclk_sts: ReadOnly<u32, BCLK_STS::Register>),
        (0x030 => pub frame_sync: ReadWrite<u32>),
        (0x034 => pub ctrl1: ReadWrite<u32, CTRL1::Register>),
        (0x038 => @END),
    }
}

/// Interrupt enables and status (`I2S_INT_*`).
pub mod int {
    pub const TX_READY: u32 = 1 << 0;
    pub const RX_READY: u32 = 1 << 1;
    pub const TF_FULL: u32 = 1 << 2;
    pub const RF_FULL: u32 = 1 << 3;
    pub const TF_EMPTY: u32 = 1 << 4;
    pub const RF_EMPTY: u32 = 1 << 5;
    pub const TX_IDLE: u32 = 1 << 6;
    pub const TX_VALID: u32 = 1 << 7;
}

/// Clear bit for an `int::*` source.
#[inline]
pub const fn clear_bit(flags: u32) -> u32 {
    if flags & int::TX_VALID != 0 {
        (flags & !int::TX_VALID) | (1 << 14)
    } else {
        flags
    }
}

/// Direction selector for [`I2s::cmd`].
pub mod mode {
    pub const TX: u32 = 1 << 0;
    pub const RX: u32 = 1 << 1;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Tx,
    Rx,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClockSource {
    Clk40M = 0,
    Clk128Fs = 1,
    Clk256Fs = 2,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataFormat {
    I2s = 0,
    LeftJustified = 1,
    PcmA = 2,
    PcmB = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelType {
    Stereo,
    Mono,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataWidth {
    W16 = 0,
    W20 = 1,
    W24 = 2,
    W8 = 3,
    W32 = 4,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceMode {
    Master,
    Slave,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelSequence {
    LR = 0,
    RL = 1,
    LL = 2,
    RR = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitSequence {
    MsbFirst,
    LsbFirst,
}

#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub clock_source: ClockSource,
    pub tx_bclk_mi: u16,
    pub tx_bclk_ni: u16,
    pub rx_bclk_mi: u16,
    pub rx_bclk_ni: u16,
    pub device_mode: DeviceMode,
    pub tx_channel_type: ChannelType,
    pub rx_channel_type: ChannelType,
    pub tx_data_format: DataFormat,
    pub rx_data_format: DataFormat,
    pub tx_data_width: DataWidth,
    pub rx_data_width: DataWidth,
    pub tx_channel_width: DataWidth,
    pub rx_channel_width: DataWidth,
    pub tx_channel_sequence: ChannelSequence,
    pub rx_channel_sequence: ChannelSequence,
    pub tx_bit_sequence: BitSequence,
    pub rx_bit_sequence: BitSequence,
    /// DMA watermark, 1..=63.
    pub tx_water_level: u8,
    pub rx_water_level: u8,
    pub tx_dma: bool,
    pub rx_dma: bool,
}

impl Default for Config {
    /// 16 kHz stereo, 16-bit samples in 32-bit slots.
    fn default() -> Self {
        Self {
            clock_source: ClockSource::Clk40M,
            tx_bclk_mi: 0x271,
            tx_bclk_ni: 0x10,
            rx_bclk_mi: 0x271,
            rx_bclk_ni: 0x10,
            device_mode: DeviceMode::Master,
            tx_channel_type: ChannelType::Stereo,
            rx_channel_type: ChannelType::Stereo,
            tx_data_format: DataFormat::I2s,
            rx_data_format: DataFormat::I2s,
            tx_data_width: DataWidth::W16,
            rx_data_width: DataWidth::W16,
            tx_channel_width: DataWidth::W32,
            rx_channel_width: DataWidth::W32,
            tx_channel_sequence: ChannelSequence::LR,
            rx_channel_sequence: ChannelSequence::LR,
            tx_bit_sequence: BitSequence::MsbFirst,
            rx_bit_sequence: BitSequence::MsbFirst,
            tx_water_level: 16,
            rx_water_level: 16,
            tx_dma: true,
            rx_dma: true,
        }
    }
}

/// BCLK produced by a Mi/Ni pair.
pub const fn bclk_hz(mi: u16, ni: u16) -> u32 {
    if mi == 0 {
        return 0;
    }
    ((crate::PERIPH_CLOCK_HZ as u64 * ni as u64) / mi as u64) as u32
}

pub struct I2s<R> {
    i2s: R,
}

impl<R> I2s<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(i2s: R, cfg: &Config) -> Self {
        let i2s = Self { i2s };
        i2s.init(cfg);
        i2s
    }

    pub fn init(&self, cfg: &Config) {
        self.i2s.ctrl0.modify(CTRL0::RESET::SET);
        self.i2s.ctrl0.modify(CTRL0::RESET::CLEAR);

        self.i2s.ctrl0.write(
            CTRL0::TX_DISABLE::SET
                + CTRL0::RX_DISABLE::SET
                + CTRL0::SLAVE_MODE.val((cfg.device_mode == DeviceMode::Slave) as u32)
                + CTRL0::DATA_FORMAT_TX.val(cfg.tx_data_format as u32)
                + CTRL0::MONO_TX.val((cfg.tx_channel_type == ChannelType::Mono) as u32)
                + CTRL0::DATA_LEN_TX.val(cfg.tx_data_width as u32)
                + CTRL0::TX_LSB_FIRST.val((cfg.tx_bit_sequence == BitSequence::LsbFirst) as u32)
                + CTRL0::CLK_SRC.val(cfg.clock_source as u32),
        );
        self.i2s.ctrl1.write(
            CTRL1::TX_WATER.val(cfg.tx_water_level as u32)
                + CTRL1::TX_DMA_EN.val(cfg.tx_dma as u32)
                + CTRL1::RX_WATER.val(cfg.rx_water_level as u32)
                + CTRL1::RX_DMA_EN.val(cfg.rx_dma as u32)
                + CTRL1::TX_CH_SEQ.val(cfg.tx_channel_sequence as u32)
                + CTRL1::RX_CH_SEQ.val(cfg.rx_channel_sequence as u32),
        );
        self.i2s.ctrl2.write(
            CTRL2::CH_LEN_TX.val(cfg.tx_channel_width as u32)
                + CTRL2::CH_LEN_RX.val(cfg.rx_channel_width as u32)
                + CTRL2::DATA_LEN_RX.val(cfg.rx_data_width as u32)
                + CTRL2::DATA_FORMAT_RX.val(cfg.rx_data_format as u32)
                + CTRL2::MONO_RX.val((cfg.rx_channel_type == ChannelType::Mono) as u32)
                + CTRL2::RX_LSB_FIRST.val((cfg.rx_bit_sequence == BitSequence::LsbFirst) as u32),
        );
        self.i2s.frame_sync.set(FRAME_SYNC_OFFSET_DEFAULT);
        self.update_bclk(Direction::Tx, cfg.tx_bclk_mi, cfg.tx_bclk_ni);
        self.update_bclk(Direction::Rx, cfg.rx_bclk_mi, cfg.rx_bclk_ni);
        debug!(
            "i2s bclk tx {} rx {}",
            bclk_hz(cfg.tx_bclk_mi, cfg.tx_bclk_ni),
            bclk_hz(cfg.rx_bclk_mi, cfg.rx_bclk_ni)
        );
    }

    pub fn deinit(&self) {
        self.i2s
            .ctrl0
            .write(CTRL0::TX_DISABLE::SET + CTRL0::RX_DISABLE::SET);
        self.i2s.int_ctrl.set(0);
        self.i2s.ctrl1.set(0);
    }

    /// Start or stop the directions in `dirs` (`mode::TX | mode::RX`).
    pub fn cmd(&self, dirs: u32, enable: bool) {
        if dirs & mode::TX != 0 {
            self.i2s.ctrl0.modify(
                CTRL0::TX_DISABLE.val(!enable as u32) + CTRL0::START_TX.val(enable as u32),
            );
        }
        if dirs & mode::RX != 0 {
            self.i2s.ctrl0.modify(
                CTRL0::RX_DISABLE.val(!enable as u32) + CTRL0::START_RX.val(enable as u32),
            );
        }
    }

    pub fn interrupt_config(&self, mask: u32, enable: bool) {
        let v = self.i2s.int_ctrl.get();
        self.i2s.int_ctrl.set(if enable { v | mask } else { v & !mask });
    }

    #[inline]
    pub fn interrupt_status(&self, flag: u32) -> bool {
        self.i2s.int_sts.get() & flag != 0
    }

    /// `flags` uses the `int::*` names; the TX_VALID clear bit is remapped.
    #[inline]
    pub fn clear_interrupt(&self, flags: u32) {
        self.i2s.int_clr.set(clear_bit(flags));
    }

    #[inline]
    pub fn send_data(&self, data: u32) {
        self.i2s.tx_dr.set(data);
    }

    #[inline]
    pub fn receive_fifo_data(&self) -> u32 {
        self.i2s.rx_dr.get()
    }

    #[inline]
    pub fn tx_fifo_free_len(&self) -> u8 {
        self.i2s.fifo_sts.read(FIFO_STS::TX_FREE) as u8
    }

    #[inline]
    pub fn rx_fifo_len(&self) -> u8 {
        self.i2s.fifo_sts.read(FIFO_STS::RX_CNT) as u8
    }

    #[inline]
    pub fn tx_error_count(&self) -> u8 {
        self.i2s.err_cnt.read(ERR_CNT::TX) as u8
    }

    #[inline]
    pub fn rx_error_count(&self) -> u8 {
        self.i2s.err_cnt.read(ERR_CNT::RX) as u8
    }

    pub fn clear_error_counts(&self) {
        self.i2s
            .err_cnt
            .modify(ERR_CNT::CLR_TX::SET + ERR_CNT::CLR_RX::SET);
        self.i2s
            .err_cnt
            .modify(ERR_CNT::CLR_TX::CLEAR + ERR_CNT::CLR_RX::CLEAR);
    }

    pub fn swap_bytes_for_send(&self, enable: bool) {
        self.i2s.ctrl0.modify(CTRL0::TX_SWAP_BYTES.val(enable as u32));
    }

    pub fn swap_bytes_for_read(&self, enable: bool) {
        self.i2s.ctrl0.modify(CTRL0::RX_SWAP_BYTES.val(enable as u32));
    }

    pub fn swap_lr_for_send(&self, enable: bool) {
        self.i2s.ctrl0.modify(CTRL0::TX_SWAP_LR.val(enable as u32));
    }

    pub fn swap_lr_for_read(&self, enable: bool) {
        self.i2s.ctrl0.modify(CTRL0::RX_SWAP_LR.val(enable as u32));
    }

    pub fn loopback_cmd(&self, enable: bool) {
        self.i2s.ctrl0.modify(CTRL0::LOOPBACK.val(enable as u32));
    }

    /// Load a new Mi/Ni pair and latch it.
    pub fn update_bclk(&self, dir: Direction, mi: u16, ni: u16) {
        let reg = match dir {
            Direction::Tx => &self.i2s.bclk_tx,
            Direction::Rx => &self.i2s.bclk_rx,
        };
        reg.write(BCLK::MI.val(mi as u32) + BCLK::NI.val(ni as u32) + BCLK::UPDATE::SET);
    }

    /// Returns `true` once the BCLK generator of `dir` has locked onto its Mi/Ni.
    pub fn bclk_status(&self, dir: Direction) -> bool {
        match dir {
            Direction::Tx => self.i2s.bclk_sts.is_set(BCLK_STS::TX_READY),
            Direction::Rx => self.i2s.bclk_sts.is_set(BCLK_STS::RX_READY),
        }
    }

    pub fn free(self) -> R {
        self.i2s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn default_bclk_is_1024k() {
        assert_eq!(bclk_hz(0x271, 0x10), 1_024_000);
        assert_eq!(bclk_hz(0, 0x10), 0);
    }

    #[test]
    fn init_leaves_both_directions_stopped() {
        let regs = testutil::regs::<RegisterBlock>();
        let _i2s = I2s::new(regs, &Config::default());

        assert!(regs.ctrl0.is_set(CTRL0::TX_DISABLE));
        assert!(regs.ctrl0.is_set(CTRL0::RX_DISABLE));
        assert!(!regs.ctrl0.is_set(CTRL0::START_TX));
        assert_eq!(regs.ctrl2.read(CTRL2::CH_LEN_TX), DataWidth::W32 as u32);
        assert_eq!(regs.ctrl1.read(CTRL1::TX_WATER), 16);
        assert_eq!(regs.bclk_tx.read(BCLK::MI), 0x271);
        assert_eq!(regs.bclk_rx.read(BCLK::NI), 0x10);
        assert!(regs.bclk_tx.is_set(BCLK::UPDATE));
        assert_eq!(regs.frame_sync.get(), 0x81);
    }

    #[test]
    fn cmd_starts_only_selected_direction() {
        let regs = testutil::regs::<RegisterBlock>();
        let i2s = I2s::new(regs, &Config::default());

        i2s.cmd(mode::TX, true);
        assert!(regs.ctrl0.is_set(CTRL0::START_TX));
        assert!(!regs.ctrl0.is_set(CTRL0::TX_DISABLE));
        assert!(regs.ctrl0.is_set(CTRL0::RX_DISABLE));

        i2s.cmd(mode::TX | mode::RX, false);
        assert!(!regs.ctrl0.is_set(CTRL0::START_TX));
        assert!(regs.ctrl0.is_set(CTRL0::TX_DISABLE));
    }

    #[test]
    fn tx_valid_clear_bit_moves_to_14() {
        assert_eq!(clear_bit(int::TX_VALID), 1 << 14);
        assert_eq!(clear_bit(int::TX_VALID | int::TX_READY), (1 << 14) | 1);
        assert_eq!(clear_bit(int::RF_FULL), int::RF_FULL);
    }

    #[test]
    fn swaps_toggle_their_own_bits() {
        let regs = testutil::regs::<RegisterBlock>();
        let i2s = I2s::new(regs, &Config::default());

        i2s.swap_bytes_for_send(true);
        i2s.swap_lr_for_send(true);
        assert!(regs.ctrl0.is_set(CTRL0::TX_SWAP_BYTES));
        assert!(regs.ctrl0.is_set(CTRL0::TX_SWAP_LR));
        assert!(!regs.ctrl0.is_set(CTRL0::RX_SWAP_LR));

        i2s.swap_lr_for_send(false);
        assert!(!regs.ctrl0.is_set(CTRL0::TX_SWAP_LR));
    }
}
