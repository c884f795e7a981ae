// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! General-purpose DMA (GDMA) controller.
//!
//! DesignWare AHB DMAC with nine channels. Channels 0..=7 sit at a 0x58 stride from the base,
//! channel 8 lives above the global register bank. Every per-channel operation takes the
//! channel number.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

use super::TIMEOUT;

/// Number of channels.
pub const CHANNEL_NUM: u8 = 9;

/// Largest block size in data items.
pub const MAX_BUFFER_SIZE: u32 = 65_535;

register_bitfields! [u32,
    pub CTL_LOW [
        INT_EN OFFSET(0) NUMBITS(1) [],
        DST_TR_WIDTH OFFSET(1) NUMBITS(3) [],
        SRC_TR_WIDTH OFFSET(4) NUMBITS(3) [],
        DINC OFFSET(7) NUMBITS(2) [],
        SINC OFFSET(9) NUMBITS(2) [],
        DEST_MSIZE OFFSET(11) NUMBITS(3) [],
        SRC_MSIZE OFFSET(14) NUMBITS(3) [],
        TT_FC OFFSET(20) NUMBITS(3) [],
        LLP_DST_EN OFFSET(27) NUMBITS(1) [],
        LLP_SRC_EN OFFSET(28) NUMBITS(1) []
    ],
    pub CTL_HIGH [
        BLOCK_TS OFFSET(0) NUMBITS(16) []
    ],
    pub CFG_LOW [
        CH_PRIOR OFFSET(4) NUMBITS(4) [],
        CH_SUSP OFFSET(8) NUMBITS(1) [],
        FIFO_EMPTY OFFSET(9) NUMBITS(1) [],
        HS_SEL_DST OFFSET(10) NUMBITS(1) [],
        HS_SEL_SRC OFFSET(11) NUMBITS(1) [],
        RELOAD_SRC OFFSET(30) NUMBITS(1) [],
        RELOAD_DST OFFSET(31) NUMBITS(1) []
    ],
    pub CFG_HIGH [
        SUSP_CH_STS OFFSET(0) NUMBITS(1) [],
        SUSP_CMD_STS OFFSET(1) NUMBITS(2) [],
        SRC_PER OFFSET(7) NUMBITS(7) [],
        DEST_PER OFFSET(14) NUMBITS(7) []
    ]
];

register_structs! {
    pub Channel {
        (0x000 => pub sar: ReadWrite<u32>),
        (0x004 => _reserved0),
        (0x008 => pub dar: ReadWrite<u32>),
        (0x00C => _reserved1),
        (0x010 => pub llp: ReadWrite<u32>),
        (0x014 => _reserved2),
        (0x018 => pub ctl_low: ReadWrite<u32, CTL_LOW::Register>),
        (0x01C => pub ctl_high: ReadWrite<u32, CTL_HIGH::Register>),
        (0x020 => pub sstat: ReadWrite<u32>),
        (0x024 => _reserved3),
        (0x028 => pub dstat: ReadWrite<u32>),
        (0x02C => _reserved4),
        (0x030 => pub sstatar: ReadWrite<u32>),
        (0x034 => _reserved5),
        (0x038 => pub dstatar: ReadWrite<u32>),
        (0x03C => _reserved6),
        (0x040 => pub cfg_low: ReadWrite<u32, CFG_LOW::Register>),
        (0x044 => pub cfg_high: ReadWrite<u32, CFG_HIGH::Register>),
        (0x048 => pub sgr: ReadWrite<u32>),
        (0x04C => _reserved7),
        (0x050 => pub dsr: ReadWrite<u32>),
        (0x054 => _reserved8),
        (0x058 => @END),
    }
}

register_structs! {
    pub RegisterBlock {
        (0x000 => pub ch: [Channel; 8]),
        (0x2C0 => pub raw_tfr: ReadOnly<u32>),
        (0x2C4 => _reserved0),
        (0x2C8 => pub raw_block: ReadOnly<u32>),
        (0x2CC => _reserved1),
        (0x2D0 => pub raw_src_tran: ReadOnly<u32>),
        (0x2D4 => _reserved2),
        (0x2D8 => pub raw_dst_tran: ReadOnly<u32>),
        (0x2DC => _reserved3),
        (0x2E0 => pub raw_err: ReadOnly<u32>),
        (0x2E4 => _reserved4),
        (0x2E8 => pub status_tfr: ReadOnly<u32>),
        (0x2EC => _reserved5),
        (0x2F0 => pub status_block: ReadOnly<u32>),
        (0x2F4 => _reserved6),
        (0x2F8 => pub status_src_tran: ReadOnly<u32>),
        (0x2FC => _reserved7),
        (0x300 => pub status_dst_tran: ReadOnly<u32>),
        (0x304 => _reserved8),
        (0x308 => pub status_err: ReadOnly<u32>),
        (0x30C => _reserved9),
        (0x310 => pub mask_tfr: ReadWrite<u32>),
        (0x314 => _reserved10),
        (0x318 => pub mask_block: ReadWrite<u32>),
        (0x31C => _reserved11),
        (0x320 => pub mask_src_tran: ReadWrite<u32>),
        (0x324 => _reserved12),
        (0x328 => pub mask_dst_tran: ReadWrite<u32>),
        (0x32C => _reserved13),
        (0x330 => pub mask_err: ReadWrite<u32>),
        (0x334 => _reserved14),
        (0x338 => pub clear_tfr: ReadWrite<u32>),
        (0x33C => _reserved15),
        (0x340 => pub clear_block: ReadWrite<u32>),
        (0x344 => _reserved16),
        (0x348 => pub clear_src_tran: ReadWrite<u32>),
        (0x34C => _reserved17),
        (0x350 => pub clear_dst_tran: ReadWrite<u32>),
        (0x354 => _reserved18),
        (0x358 => pub clear_err: ReadWrite<u32>),
        (0x35C => _reserved19),
        (0x360 => pub status_int: ReadOnly<u32>),
        (0x364 => _reserved20),
        (0x398 => pub dma_cfg_reg: ReadWrite<u32>),
        (0x39C => _reserved21),
        (0x3A0 => pub ch_en_reg: ReadWrite<u32>),
        (0x3A4 => _reserved22),
        (0x3A8 => pub dma_id_reg: ReadOnly<u32>),
        (0x3AC => _reserved23),
        (0x400 => pub ch8: Channel),
        (0x458 => _reserved24),
        (0x460 => @END),
    }
}

/// Interrupt types (`GDMA_INT_*`).
pub mod int {
    pub const TRANSFER: u32 = 1 << 0;
    pub const BLOCK: u32 = 1 << 1;
    pub const ERROR: u32 = 1 << 4;
}

/// Hardware handshake indexes.
pub mod handshake {
    pub const SPI0_TX: u8 = 0;
    pub const SPI0_RX: u8 = 1;
    pub const SPI1_TX: u8 = 2;
    pub const SPI1_RX: u8 = 3;
    pub const I2C0_TX: u8 = 4;
    pub const I2C0_RX: u8 = 5;
    pub const I2C1_TX: u8 = 6;
    pub const I2C1_RX: u8 = 7;
    pub const UART0_TX: u8 = 8;
    pub const UART0_RX: u8 = 9;
    pub const UART1_TX: u8 = 10;
    pub const UART1_RX: u8 = 11;
    pub const I2S0_TX: u8 = 12;
    pub const I2S0_RX: u8 = 13;
    pub const I2S1_TX: u8 = 14;
    pub const I2S1_RX: u8 = 15;
    pub const UART2_TX: u8 = 16;
    pub const UART2_RX: u8 = 17;
    pub const UART3_TX: u8 = 18;
    pub const UART3_RX: u8 = 19;
    pub const CAN_RX: u8 = 20;
    pub const SPI3W_RX: u8 = 21;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    MemoryToMemory = 0,
    MemoryToPeripheral = 1,
    PeripheralToMemory = 2,
    PeripheralToPeripheral = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressMode {
    Increment = 0,
    Decrement = 1,
    Fixed = 2,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataSize {
    Byte = 0,
    HalfWord = 1,
    Word = 2,
}

/// Burst length in data items.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Msize {
    M1 = 0,
    M4 = 1,
    M8 = 2,
    M16 = 3,
    M32 = 4,
    M64 = 5,
    M128 = 6,
    M256 = 7,
}

/// Multi-block transfer mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MultiBlockMode {
    AutoReloadWithContiguousSar,
    AutoReloadWithContiguousDar,
    AutoReload,
    LliWithContiguousSar,
    LliWithAutoReloadSar,
    LliWithContiguousDar,
    LliWithAutoReloadDar,
    Lli,
}

impl MultiBlockMode {
    /// `(llp_dst, llp_src, reload_src, reload_dst)`.
    fn bits(self) -> (bool, bool, bool, bool) {
        use MultiBlockMode::*;
        match self {
            AutoReloadWithContiguousSar => (false, false, false, true),
            AutoReloadWithContiguousDar => (false, false, true, false),
            AutoReload => (false, false, true, true),
            LliWithContiguousSar => (true, false, false, false),
            LliWithAutoReloadSar => (true, false, true, false),
            LliWithContiguousDar => (false, true, false, false),
            LliWithAutoReloadDar => (false, true, false, true),
            Lli => (true, true, false, false),
        }
    }
}

/// Linked-list item fetched by the controller in LLI modes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Lli {
    pub sar: u32,
    pub dar: u32,
    pub llp: u32,
    pub ctl_low: u32,
    pub ctl_high: u32,
}

/// GDMA_InitTypeDef analogue.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub channel: u8,
    pub direction: Direction,
    /// Block size in source data items, `1..=MAX_BUFFER_SIZE`.
    pub buffer_size: u32,
    pub source_inc: AddressMode,
    pub destination_inc: AddressMode,
    pub source_data_size: DataSize,
    pub destination_data_size: DataSize,
    pub source_msize: Msize,
    pub destination_msize: Msize,
    pub source_addr: u32,
    pub destination_addr: u32,
    /// 0..=9, higher wins.
    pub channel_priority: u8,
    /// `Some` to chain blocks.
    pub multi_block: Option<MultiBlockMode>,
    /// Address of the first [`Lli`] in LLI modes.
    pub multi_block_struct: u32,
    pub source_handshake: u8,
    pub destination_handshake: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: 0,
            direction: Direction::MemoryToMemory,
            buffer_size: 200,
            source_inc: AddressMode::Increment,
            destination_inc: AddressMode::Increment,
            source_data_size: DataSize::Byte,
            destination_data_size: DataSize::Byte,
            source_msize: Msize::M1,
            destination_msize: Msize::M1,
            source_addr: 0,
            destination_addr: 0,
            channel_priority: 0,
            multi_block: None,
            multi_block_struct: 0,
            source_handshake: 0,
            destination_handshake: 0,
        }
    }
}

impl Config {
    /// `CTL_LOW` image for this configuration, usable in [`Lli::ctl_low`].
    pub fn ctl_low(&self) -> u32 {
        let (llp_dst, llp_src) = match self.multi_block {
            Some(mode) => {
                let (d, s, _, _) = mode.bits();
                (d, s)
            }
            None => (false, false),
        };
        (CTL_LOW::INT_EN::SET
            + CTL_LOW::DST_TR_WIDTH.val(self.destination_data_size as u32)
            + CTL_LOW::SRC_TR_WIDTH.val(self.source_data_size as u32)
            + CTL_LOW::DINC.val(self.destination_inc as u32)
            + CTL_LOW::SINC.val(self.source_inc as u32)
            + CTL_LOW::DEST_MSIZE.val(self.destination_msize as u32)
            + CTL_LOW::SRC_MSIZE.val(self.source_msize as u32)
            + CTL_LOW::TT_FC.val(self.direction as u32)
            + CTL_LOW::LLP_DST_EN.val(llp_dst as u32)
            + CTL_LOW::LLP_SRC_EN.val(llp_src as u32))
        .value
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The channel FIFO never drained after a suspend request.
    Timeout,
}

/// Bit of `ch` in the shared enable, mask and clear registers.
#[inline]
const fn bit(ch: u8) -> u32 {
    assert!(ch < CHANNEL_NUM, "gdma channel out of range");
    1 << ch
}

/// Value bit plus its write-enable bit in the upper half.
#[inline]
const fn we(ch: u8) -> u32 {
    bit(ch) | (bit(ch) << 16)
}

pub struct Gdma<R> {
    gdma: R,
}

impl<R> Gdma<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(gdma: R) -> Self {
        Self { gdma }
    }

    /// Register window of channel `ch` (0..=8).
    ///
    /// # Panics
    ///
    /// If `ch` is not below [`CHANNEL_NUM`].
    pub fn channel(&self, ch: u8) -> &Channel {
        match ch {
            0..=7 => &self.gdma.ch[ch as usize],
            8 => &self.gdma.ch8,
            _ => panic!("gdma channel {} out of range", ch),
        }
    }

    pub fn init(&self, cfg: &Config) {
        let ch = cfg.channel;
        self.gdma.dma_cfg_reg.set(1);
        self.cmd(ch, false);
        self.clear_all_interrupts(ch);

        let regs = self.channel(ch);
        regs.sar.set(cfg.source_addr);
        regs.dar.set(cfg.destination_addr);
        regs.ctl_low.set(cfg.ctl_low());
        regs.ctl_high
            .write(CTL_HIGH::BLOCK_TS.val(cfg.buffer_size.min(MAX_BUFFER_SIZE)));

        let (reload_src, reload_dst) = match cfg.multi_block {
            Some(mode) => {
                let (_, _, s, d) = mode.bits();
                (s, d)
            }
            None => (false, false),
        };
        regs.cfg_low.write(
            CFG_LOW::CH_PRIOR.val(cfg.channel_priority as u32)
                + CFG_LOW::RELOAD_SRC.val(reload_src as u32)
                + CFG_LOW::RELOAD_DST.val(reload_dst as u32),
        );
        regs.cfg_high.write(
            CFG_HIGH::SRC_PER.val(cfg.source_handshake as u32)
                + CFG_HIGH::DEST_PER.val(cfg.destination_handshake as u32),
        );
        regs.llp.set(if cfg.multi_block.is_some() {
            cfg.multi_block_struct
        } else {
            0
        });
    }

    /// Turn the controller off.
    pub fn deinit(&self) {
        self.gdma.dma_cfg_reg.set(0);
    }

    pub fn cmd(&self, ch: u8, enable: bool) {
        self.gdma
            .ch_en_reg
            .set(if enable { we(ch) } else { bit(ch) << 16 });
    }

    /// Unmask (`enable`) or mask the `int::*` types in `mask` for `ch`.
    pub fn interrupt_config(&self, ch: u8, mask: u32, enable: bool) {
        let v = if enable { we(ch) } else { bit(ch) << 16 };
        if mask & int::TRANSFER != 0 {
            self.gdma.mask_tfr.set(v);
        }
        if mask & int::BLOCK != 0 {
            self.gdma.mask_block.set(v);
        }
        if mask & int::ERROR != 0 {
            self.gdma.mask_err.set(v);
        }
    }

    /// Returns `true` when `ch` has a pending transfer-complete interrupt.
    #[inline]
    pub fn transfer_interrupt_status(&self, ch: u8) -> bool {
        self.gdma.status_tfr.get() & bit(ch) != 0
    }

    pub fn clear_interrupt(&self, ch: u8, mask: u32) {
        if mask & int::TRANSFER != 0 {
            self.gdma.clear_tfr.set(bit(ch));
        }
        if mask & int::BLOCK != 0 {
            self.gdma.clear_block.set(bit(ch));
        }
        if mask & int::ERROR != 0 {
            self.gdma.clear_err.set(bit(ch));
        }
    }

    pub fn clear_all_interrupts(&self, ch: u8) {
        self.gdma.clear_tfr.set(bit(ch));
        self.gdma.clear_block.set(bit(ch));
        self.gdma.clear_src_tran.set(bit(ch));
        self.gdma.clear_dst_tran.set(bit(ch));
        self.gdma.clear_err.set(bit(ch));
    }

    /// Returns `true` while `ch` is enabled (transfer in progress).
    #[inline]
    pub fn channel_status(&self, ch: u8) -> bool {
        self.gdma.ch_en_reg.get() & bit(ch) != 0
    }

    #[inline]
    pub fn set_source_address(&self, ch: u8, addr: u32) {
        self.channel(ch).sar.set(addr);
    }

    #[inline]
    pub fn set_destination_address(&self, ch: u8, addr: u32) {
        self.channel(ch).dar.set(addr);
    }

    #[inline]
    pub fn set_llp_address(&self, ch: u8, addr: u32) {
        self.channel(ch).llp.set(addr);
    }

    pub fn set_buffer_size(&self, ch: u8, size: u32) {
        self.channel(ch)
            .ctl_high
            .modify(CTL_HIGH::BLOCK_TS.val(size.min(MAX_BUFFER_SIZE)));
    }

    /// Items moved so far in the current block.
    #[inline]
    pub fn transfer_len(&self, ch: u8) -> u16 {
        self.channel(ch).ctl_high.read(CTL_HIGH::BLOCK_TS) as u16
    }

    pub fn suspend_cmd(&self, ch: u8, suspend: bool) {
        self.channel(ch)
            .cfg_low
            .modify(CFG_LOW::CH_SUSP.val(suspend as u32));
    }

    /// Returns `true` when the channel FIFO is empty.
    #[inline]
    pub fn fifo_status(&self, ch: u8) -> bool {
        self.channel(ch).cfg_low.is_set(CFG_LOW::FIFO_EMPTY)
    }

    /// Suspend `ch` and wait for its FIFO to drain.
    pub fn safe_suspend(&self, ch: u8) -> Result<(), Error> {
        self.suspend_cmd(ch, true);
        for _ in 0..TIMEOUT {
            if self.fifo_status(ch) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        warn!("gdma ch{} suspend timeout", ch);
        Err(Error::Timeout)
    }

    pub fn free(self) -> R {
        self.gdma
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn channel8_sits_above_the_global_bank() {
        assert_eq!(core::mem::size_of::<Channel>(), 0x58);
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        let base = regs as *const RegisterBlock as usize;
        assert_eq!(gdma.channel(1) as *const Channel as usize - base, 0x58);
        assert_eq!(gdma.channel(8) as *const Channel as usize - base, 0x400);
    }

    #[test]
    fn enable_bits_pair_value_with_write_enable() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        gdma.cmd(8, true);
        assert_eq!(regs.ch_en_reg.get(), (1 << 8) | (1 << 24));
        gdma.cmd(8, false);
        assert_eq!(regs.ch_en_reg.get(), 1 << 24);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn channel_past_the_last_panics() {
        let gdma = Gdma::new(testutil::regs::<RegisterBlock>());
        gdma.channel(CHANNEL_NUM);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn enable_past_the_last_channel_panics() {
        let gdma = Gdma::new(testutil::regs::<RegisterBlock>());
        gdma.cmd(16, true);
    }

    #[test]
    fn m2m_init_programs_ctl_and_cfg() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        gdma.init(&Config {
            channel: 2,
            buffer_size: 64,
            source_data_size: DataSize::Word,
            destination_data_size: DataSize::Word,
            source_msize: Msize::M4,
            destination_msize: Msize::M4,
            source_addr: 0x0020_0000,
            destination_addr: 0x0020_1000,
            channel_priority: 3,
            ..Default::default()
        });

        let ch = &regs.ch[2];
        assert_eq!(regs.dma_cfg_reg.get(), 1);
        assert_eq!(ch.sar.get(), 0x0020_0000);
        assert_eq!(ch.dar.get(), 0x0020_1000);
        assert_eq!(ch.ctl_low.read(CTL_LOW::SRC_TR_WIDTH), 2);
        assert_eq!(ch.ctl_low.read(CTL_LOW::DEST_MSIZE), 1);
        assert_eq!(ch.ctl_low.read(CTL_LOW::TT_FC), 0);
        assert!(ch.ctl_low.is_set(CTL_LOW::INT_EN));
        assert_eq!(gdma.transfer_len(2), 64);
        assert_eq!(ch.cfg_low.read(CFG_LOW::CH_PRIOR), 3);
        assert_eq!(ch.llp.get(), 0);
    }

    #[test]
    fn lli_mode_sets_llp_bits() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);
        let lli = [Lli::default(); 2];

        gdma.init(&Config {
            channel: 8,
            direction: Direction::MemoryToPeripheral,
            multi_block: Some(MultiBlockMode::LliWithContiguousSar),
            multi_block_struct: lli.as_ptr() as u32,
            destination_handshake: handshake::UART0_TX,
            ..Default::default()
        });

        let ch = &regs.ch8;
        assert!(ch.ctl_low.is_set(CTL_LOW::LLP_DST_EN));
        assert!(!ch.ctl_low.is_set(CTL_LOW::LLP_SRC_EN));
        assert_eq!(ch.ctl_low.read(CTL_LOW::TT_FC), 1);
        assert_eq!(ch.llp.get(), lli.as_ptr() as u32);
        assert_eq!(ch.cfg_high.read(CFG_HIGH::DEST_PER), 8);
    }

    #[test]
    fn enable_writes_write_enable_bit() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        gdma.cmd(3, true);
        assert_eq!(regs.ch_en_reg.get(), (1 << 3) | (1 << 19));
        assert!(gdma.channel_status(3));

        gdma.cmd(3, false);
        assert_eq!(regs.ch_en_reg.get(), 1 << 19);
    }

    #[test]
    fn interrupt_masks_per_type() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        gdma.interrupt_config(1, int::TRANSFER | int::ERROR, true);

        assert_eq!(regs.mask_tfr.get(), (1 << 1) | (1 << 17));
        assert_eq!(regs.mask_err.get(), (1 << 1) | (1 << 17));
        assert_eq!(regs.mask_block.get(), 0);
    }

    #[test]
    fn safe_suspend_times_out_on_full_fifo() {
        let regs = testutil::regs::<RegisterBlock>();
        let gdma = Gdma::new(regs);

        assert_eq!(gdma.safe_suspend(0), Err(Error::Timeout));
        assert!(regs.ch[0].cfg_low.is_set(CFG_LOW::CH_SUSP));

        regs.ch[0].cfg_low.modify(CFG_LOW::FIFO_EMPTY::SET);
        assert_eq!(gdma.safe_suspend(0), Ok(()));
    }
}
