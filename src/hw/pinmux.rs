// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin multiplexer and pad control.
//!
//! - [`Pinmux`] selects which peripheral signal drives a pin (one byte per pin, four pins per
//!   configuration word).
//! - [`Pad`] owns the electrical side of the pin: power, pull, software output, driving current
//!   and the DLPS wakeup sources.
//!
//! Pins are numbered `Pn_m = n * 8 + m`.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::ReadWrite,
};

/// Number of bonded pins (`P0_0` ..= `P9_7`).
pub const TOTAL_PIN_NUM: usize = 80;

const CFG_WORDS: usize = TOTAL_PIN_NUM / 4;

register_structs! {
    /// Pinmux function selectors.
    pub RegisterBlock {
        (0x000 => pub cfg: [ReadWrite<u32>; CFG_WORDS]),
        (0x050 => @END),
    }
}

register_bitfields! [u32,
    pub PAD [
        POWER OFFSET(0) NUMBITS(1) [],
        OUT_EN OFFSET(1) NUMBITS(1) [],
        OUT_VAL OFFSET(2) NUMBITS(1) [],
        PULL_EN OFFSET(3) NUMBITS(1) [],
        PULL_UP OFFSET(4) NUMBITS(1) [],
        PULL_STRONG OFFSET(5) NUMBITS(1) [],
        DRIVING OFFSET(6) NUMBITS(2) [],
        PINMUX_MODE OFFSET(8) NUMBITS(1) [],
        WAKEUP_EN OFFSET(9) NUMBITS(1) [],
        WAKEUP_POL_LOW OFFSET(10) NUMBITS(1) [],
        DEBOUNCE_EN OFFSET(11) NUMBITS(1) [],
        WAKEUP_STS OFFSET(15) NUMBITS(1) []
    ],
    pub DEBOUNCE [
        FREQ OFFSET(0) NUMBITS(6) [],
        CLEAR OFFSET(31) NUMBITS(1) []
    ]
];

register_structs! {
    /// Per-pin pad control words.
    pub PadRegisterBlock {
        (0x000 => pub pad: [ReadWrite<u32, PAD::Register>; TOTAL_PIN_NUM]),
        (0x140 => pub debounce: ReadWrite<u32, DEBOUNCE::Register>),
        (0x144 => @END),
    }
}

/// Pin number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin(u8);

macro_rules! pins {
    ($($name:ident = $num:expr,)*) => {
        impl Pin {
            $(pub const $name: Pin = Pin($num);)*
        }
        $(pub const $name: Pin = Pin::$name;)*
    };
}

pins! {
    P0_0 = 0,
    P0_1 = 1,
    P0_2 = 2,
    P0_3 = 3,
    P0_4 = 4,
    P0_5 = 5,
    P0_6 = 6,
    P0_7 = 7,
    P1_0 = 8,
    P1_1 = 9,
    P1_2 = 10,
    P1_3 = 11,
    P1_4 = 12,
    P1_5 = 13,
    P1_6 = 14,
    P1_7 = 15,
    P2_0 = 16,
    P2_1 = 17,
    P2_2 = 18,
    P2_3 = 19,
    P2_4 = 20,
    P2_5 = 21,
    P2_6 = 22,
    P2_7 = 23,
    P3_0 = 24,
    P3_1 = 25,
    P3_2 = 26,
    P3_3 = 27,
    P3_4 = 28,
    P3_5 = 29,
    P3_6 = 30,
    P3_7 = 31,
    P4_0 = 32,
    P4_1 = 33,
    P4_2 = 34,
    P4_3 = 35,
    P4_4 = 36,
    P4_5 = 37,
    P4_6 = 38,
    P4_7 = 39,
    P5_0 = 40,
    P5_1 = 41,
    P5_2 = 42,
    P5_3 = 43,
    P5_4 = 44,
    P5_5 = 45,
    P5_6 = 46,
    P5_7 = 47,
    P6_0 = 48,
    P6_1 = 49,
    P6_2 = 50,
    P6_3 = 51,
    P6_4 = 52,
    P6_5 = 53,
    P6_6 = 54,
    P6_7 = 55,
    P7_0 = 56,
    P7_1 = 57,
    P7_2 = 58,
    P7_3 = 59,
    P7_4 = 60,
    P7_5 = 61,
    P7_6 = 62,
    P7_7 = 63,
    P8_0 = 64,
    P8_1 = 65,
    P8_2 = 66,
    P8_3 = 67,
    P8_4 = 68,
    P8_5 = 69,
    P8_6 = 70,
    P8_7 = 71,
    P9_0 = 72,
    P9_1 = 73,
    P9_2 = 74,
    P9_3 = 75,
    P9_4 = 76,
    P9_5 = 77,
    P9_6 = 78,
    P9_7 = 79,
}

impl Pin {
    /// Pin `P<port>_<pin>`, or `None` when out of range.
    pub const fn new(port: u8, pin: u8) -> Option<Self> {
        if pin < 8 && (port as usize) * 8 + (pin as usize) < TOTAL_PIN_NUM {
            Some(Pin(port * 8 + pin))
        } else {
            None
        }
    }

    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn port(self) -> u8 {
        self.0 / 8
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pinmux function ID.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Function(pub u8);

impl Function {
    /// Pin is not routed to any peripheral.
    pub const IDLE_MODE: Function = Function(0);
    pub const UART0_TX: Function = Function(1);
    pub const UART0_RX: Function = Function(2);
    pub const UART0_CTS: Function = Function(3);
    pub const UART0_RTS: Function = Function(4);
    pub const UART1_TX: Function = Function(5);
    pub const UART1_RX: Function = Function(6);
    pub const UART1_CTS: Function = Function(7);
    pub const UART1_RTS: Function = Function(8);
    pub const UART2_TX: Function = Function(9);
    pub const UART2_RX: Function = Function(10);
    pub const UART2_CTS: Function = Function(11);
    pub const UART2_RTS: Function = Function(12);
    pub const UART3_TX: Function = Function(13);
    pub const UART3_RX: Function = Function(14);
    pub const UART4_TX: Function = Function(15);
    pub const UART4_RX: Function = Function(16);
    pub const UART5_TX: Function = Function(17);
    pub const UART5_RX: Function = Function(18);
    pub const I2C0_CLK: Function = Function(19);
    pub const I2C0_DAT: Function = Function(20);
    pub const I2C1_CLK: Function = Function(21);
    pub const I2C1_DAT: Function = Function(22);
    pub const I2C2_CLK: Function = Function(23);
    pub const I2C2_DAT: Function = Function(24);
    pub const I2C3_CLK: Function = Function(25);
    pub const I2C3_DAT: Function = Function(26);
    pub const SPI0_CLK_MASTER: Function = Function(27);
    pub const SPI0_MO_MASTER: Function = Function(28);
    pub const SPI0_MI_MASTER: Function = Function(29);
    pub const SPI0_CSN_0_MASTER: Function = Function(30);
    pub const SPI0_CSN_1_MASTER: Function = Function(31);
    pub const SPI0_CSN_2_MASTER: Function = Function(32);
    pub const SPI0_CLK_SLAVE: Function = Function(33);
    pub const SPI0_SO_SLAVE: Function = Function(34);
    pub const SPI0_SI_SLAVE: Function = Function(35);
    pub const SPI0_CSN_0_SLAVE: Function = Function(36);
    pub const SPI1_CLK_MASTER: Function = Function(37);
    pub const SPI1_MO_MASTER: Function = Function(38);
    pub const SPI1_MI_MASTER: Function = Function(39);
    pub const SPI1_CSN_0_MASTER: Function = Function(40);
    pub const SPI1_CSN_1_MASTER: Function = Function(41);
    pub const SPI1_CSN_2_MASTER: Function = Function(42);
    pub const SPI2W_DATA: Function = Function(43);
    pub const SPI2W_CLK: Function = Function(44);
    pub const SPI2W_CS: Function = Function(45);
    pub const I2S0_MCLK: Function = Function(46);
    pub const I2S0_BCLK: Function = Function(47);
    pub const I2S0_LRC: Function = Function(48);
    pub const I2S0_DIN: Function = Function(49);
    pub const I2S0_DOUT: Function = Function(50);
    pub const I2S1_MCLK: Function = Function(51);
    pub const I2S1_BCLK: Function = Function(52);
    pub const I2S1_LRC: Function = Function(53);
    pub const I2S1_DIN: Function = Function(54);
    pub const I2S1_DOUT: Function = Function(55);
    pub const CAN_TX: Function = Function(56);
    pub const CAN_RX: Function = Function(57);
    pub const PDM_CLK: Function = Function(58);
    pub const PDM_DATA: Function = Function(59);
    pub const DMIC1_CLK: Function = Function(60);
    pub const DMIC1_DAT: Function = Function(61);
    pub const SPORT0_BCLK_CODEC: Function = Function(62);
    pub const SPORT0_LRC_CODEC: Function = Function(63);
    pub const SPORT0_DIN_CODEC: Function = Function(64);
    pub const SPORT0_DOUT_CODEC: Function = Function(65);
    pub const DWGPIO: Function = Function(66);
}

/// Pinmux_Reset / Pinmux_Config / Pinmux_Deinit.
pub struct Pinmux<R> {
    pinmux: R,
}

impl<R> Pinmux<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(pinmux: R) -> Self {
        Self { pinmux }
    }

    /// Route every pin to [`Function::IDLE_MODE`].
    pub fn reset(&self) {
        for word in self.pinmux.cfg.iter() {
            word.set(0);
        }
    }

    /// Route `pin` back to [`Function::IDLE_MODE`].
    pub fn deinit(&self, pin: Pin) {
        self.config(pin, Function::IDLE_MODE);
    }

    /// Route `func` to `pin`.
    pub fn config(&self, pin: Pin, func: Function) {
        let (word, shift) = Self::slot(pin);
        let reg = &self.pinmux.cfg[word];
        let v = (reg.get() & !(0xFF << shift)) | ((func.0 as u32) << shift);
        reg.set(v);
    }

    /// Function currently routed to `pin`.
    pub fn function(&self, pin: Pin) -> Function {
        let (word, shift) = Self::slot(pin);
        Function(((self.pinmux.cfg[word].get() >> shift) & 0xFF) as u8)
    }

    #[inline]
    fn slot(pin: Pin) -> (usize, u32) {
        (pin.index() / 4, ((pin.index() % 4) * 8) as u32)
    }

    pub fn free(self) -> R {
        self.pinmux
    }
}

/// Snapshot of the pinmux configuration words.
#[derive(Copy, Clone, Debug, Default)]
pub struct DlpsStore {
    cfg: [u32; CFG_WORDS],
}

impl DlpsStore {
    pub fn save(regs: &RegisterBlock) -> Self {
        let mut store = Self::default();
        for (slot, reg) in store.cfg.iter_mut().zip(regs.cfg.iter()) {
            *slot = reg.get();
        }
        store
    }

    pub fn restore(&self, regs: &RegisterBlock) {
        for (reg, &v) in regs.cfg.iter().zip(self.cfg.iter()) {
            reg.set(v);
        }
    }
}

/// Who drives the pad.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PadMode {
    /// Software controls output enable and level.
    Software,
    /// The pinmux-selected peripheral drives the pad.
    Pinmux,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PullMode {
    Down,
    Up,
    None,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PullStrength {
    Weak,
    Strong,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DrivingCurrent {
    Level0 = 0,
    Level2 = 1,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeupPolarity {
    High,
    Low,
}

/// Pad wakeup debounce clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DebounceFreq {
    Freq32kHz = 0,
    Freq16kHz = 1,
    Freq8kHz = 3,
    Freq4kHz = 7,
    Freq2kHz = 15,
    Freq1kHz = 31,
    Freq500Hz = 63,
}

/// Pad_Config arguments.
#[derive(Copy, Clone, Debug)]
pub struct PadConfig {
    pub mode: PadMode,
    pub power: bool,
    pub pull: PullMode,
    pub output_enable: bool,
    pub output_high: bool,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            mode: PadMode::Pinmux,
            power: true,
            pull: PullMode::None,
            output_enable: false,
            output_high: false,
        }
    }
}

/// Pad control.
pub struct Pad<R> {
    pad: R,
}

impl<R> Pad<R>
where
    R: Deref<Target = PadRegisterBlock>,
{
    pub fn new(pad: R) -> Self {
        Self { pad }
    }

    #[inline]
    fn reg(&self, pin: Pin) -> &ReadWrite<u32, PAD::Register> {
        &self.pad.pad[pin.index()]
    }

    /// Pad_Config: mode, power, pull and software output in one write.
    pub fn config(&self, pin: Pin, cfg: &PadConfig) {
        let pull = match cfg.pull {
            PullMode::None => PAD::PULL_EN::CLEAR,
            PullMode::Up => PAD::PULL_EN::SET + PAD::PULL_UP::SET,
            PullMode::Down => PAD::PULL_EN::SET + PAD::PULL_UP::CLEAR,
        };
        self.reg(pin).modify(
            PAD::PINMUX_MODE.val((cfg.mode == PadMode::Pinmux) as u32)
                + PAD::POWER.val(cfg.power as u32)
                + PAD::OUT_EN.val(cfg.output_enable as u32)
                + PAD::OUT_VAL.val(cfg.output_high as u32)
                + pull,
        );
    }

    pub fn set_driving_current(&self, pin: Pin, level: DrivingCurrent) {
        self.reg(pin).modify(PAD::DRIVING.val(level as u32));
    }

    pub fn set_control_mode(&self, pin: Pin, mode: PadMode) {
        self.reg(pin)
            .modify(PAD::PINMUX_MODE.val((mode == PadMode::Pinmux) as u32));
    }

    pub fn output_cmd(&self, pin: Pin, enable: bool) {
        self.reg(pin).modify(PAD::OUT_EN.val(enable as u32));
    }

    pub fn set_output_level(&self, pin: Pin, high: bool) {
        self.reg(pin).modify(PAD::OUT_VAL.val(high as u32));
    }

    pub fn pull_cmd(&self, pin: Pin, enable: bool) {
        self.reg(pin).modify(PAD::PULL_EN.val(enable as u32));
    }

    pub fn set_pull_mode(&self, pin: Pin, mode: PullMode) {
        match mode {
            PullMode::None => self.reg(pin).modify(PAD::PULL_EN::CLEAR),
            PullMode::Up => self.reg(pin).modify(PAD::PULL_EN::SET + PAD::PULL_UP::SET),
            PullMode::Down => self
                .reg(pin)
                .modify(PAD::PULL_EN::SET + PAD::PULL_UP::CLEAR),
        }
    }

    pub fn set_pull_strength(&self, pin: Pin, strength: PullStrength) {
        self.reg(pin)
            .modify(PAD::PULL_STRONG.val((strength == PullStrength::Strong) as u32));
    }

    pub fn power_cmd(&self, pin: Pin, on: bool) {
        self.reg(pin).modify(PAD::POWER.val(on as u32));
    }

    /// Arm `pin` as a DLPS wakeup source.
    pub fn wakeup_enable(&self, pin: Pin, polarity: WakeupPolarity, debounce: bool) {
        self.reg(pin).modify(
            PAD::WAKEUP_POL_LOW.val((polarity == WakeupPolarity::Low) as u32)
                + PAD::DEBOUNCE_EN.val(debounce as u32)
                + PAD::WAKEUP_EN::SET,
        );
    }

    pub fn wakeup_disable(&self, pin: Pin) {
        self.reg(pin)
            .modify(PAD::WAKEUP_EN::CLEAR + PAD::DEBOUNCE_EN::CLEAR);
    }

    /// Returns `true` when `pin` triggered a wakeup.
    pub fn wakeup_int_status(&self, pin: Pin) -> bool {
        self.reg(pin).is_set(PAD::WAKEUP_STS)
    }

    /// Clear the wakeup status of `pin` (write 1 to clear).
    pub fn clear_wakeup_int_pending(&self, pin: Pin) {
        self.reg(pin).modify(PAD::WAKEUP_STS::SET);
    }

    /// Pad_ClearAllWakeupINT.
    pub fn clear_all_wakeup_int(&self) {
        for reg in self.pad.pad.iter() {
            if reg.is_set(PAD::WAKEUP_STS) {
                reg.modify(PAD::WAKEUP_STS::SET);
            }
        }
    }

    pub fn set_wakeup_debounce_freq(&self, freq: DebounceFreq) {
        self.pad.debounce.modify(DEBOUNCE::FREQ.val(freq as u32));
    }

    /// Clear the latched wakeup debounce state of all pads.
    pub fn clear_wakeup_debounce(&self) {
        self.pad.debounce.modify(DEBOUNCE::CLEAR::SET);
    }

    pub fn free(self) -> R {
        self.pad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn config_packs_four_pins_per_word() {
        let regs = testutil::regs::<RegisterBlock>();
        let pinmux = Pinmux::new(regs);

        pinmux.config(P3_1, Function::UART2_TX);
        pinmux.config(P3_3, Function::UART2_RX);

        // P3_1 = 25 → word 6, byte 1; P3_3 = 27 → word 6, byte 3.
        assert_eq!(regs.cfg[6].get(), (9 << 8) | (10 << 24));
        assert_eq!(pinmux.function(P3_3), Function::UART2_RX);

        pinmux.deinit(P3_1);
        assert_eq!(regs.cfg[6].get(), 10 << 24);
    }

    #[test]
    fn reset_routes_everything_to_idle() {
        let regs = testutil::regs::<RegisterBlock>();
        let pinmux = Pinmux::new(regs);
        pinmux.config(P9_7, Function::CAN_RX);

        pinmux.reset();

        assert_eq!(pinmux.function(P9_7), Function::IDLE_MODE);
    }

    #[test]
    fn pin_numbering() {
        assert_eq!(P4_1.number(), 33);
        assert_eq!(Pin::new(4, 1), Some(P4_1));
        assert_eq!(Pin::new(10, 0), None);
        assert_eq!(Pin::new(0, 8), None);
    }

    #[test]
    fn dlps_store_round_trips_config_words() {
        let regs = testutil::regs::<RegisterBlock>();
        let pinmux = Pinmux::new(regs);
        pinmux.config(P0_0, Function::SPI0_CLK_MASTER);

        let store = DlpsStore::save(regs);
        pinmux.reset();
        store.restore(regs);

        assert_eq!(pinmux.function(P0_0), Function::SPI0_CLK_MASTER);
    }

    #[test]
    fn pad_config_pull_up_output_high() {
        let regs = testutil::regs::<PadRegisterBlock>();
        let pad = Pad::new(regs);

        pad.config(
            P2_4,
            &PadConfig {
                mode: PadMode::Software,
                pull: PullMode::Up,
                output_enable: true,
                output_high: true,
                ..Default::default()
            },
        );

        let r = &regs.pad[P2_4.number() as usize];
        assert!(r.is_set(PAD::POWER));
        assert!(r.is_set(PAD::PULL_EN));
        assert!(r.is_set(PAD::PULL_UP));
        assert!(r.is_set(PAD::OUT_EN));
        assert!(r.is_set(PAD::OUT_VAL));
        assert!(!r.is_set(PAD::PINMUX_MODE));

        pad.set_pull_mode(P2_4, PullMode::None);
        assert!(!r.is_set(PAD::PULL_EN));
    }

    #[test]
    fn wakeup_low_with_debounce() {
        let regs = testutil::regs::<PadRegisterBlock>();
        let pad = Pad::new(regs);

        pad.wakeup_enable(P2_5, WakeupPolarity::Low, true);
        let r = &regs.pad[P2_5.number() as usize];
        assert!(r.is_set(PAD::WAKEUP_EN));
        assert!(r.is_set(PAD::WAKEUP_POL_LOW));
        assert!(r.is_set(PAD::DEBOUNCE_EN));

        r.modify(PAD::WAKEUP_STS::SET);
        assert!(pad.wakeup_int_status(P2_5));

        pad.wakeup_disable(P2_5);
        assert!(!r.is_set(PAD::WAKEUP_EN));
    }

    #[test]
    fn debounce_freq_field() {
        let regs = testutil::regs::<PadRegisterBlock>();
        let pad = Pad::new(regs);

        pad.set_wakeup_debounce_freq(DebounceFreq::Freq1kHz);

        assert_eq!(regs.debounce.read(DEBOUNCE::FREQ), 31);
    }
}
