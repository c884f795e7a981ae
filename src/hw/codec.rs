// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Audio CODEC: analog front end, digital ADC/DAC paths and the EQ banks.
//!
//! The block exposes three windows: analog controls at 0x000, the digital audio controls at
//! 0x100 (starting with `AUDIO_CONTROL_0`) and five biquad EQ banks at 0x200.

use core::ops::Deref;

use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    register_bitfields, register_structs,
    registers::ReadWrite,
};

/// Largest EQ coefficient (signed 4.15 fixed point, -8..7.99).
pub const EQ_COEF_MAX: u32 = 0x7FFFF;
pub const EQ_BANKS: usize = 5;

register_bitfields! [u32,
    pub ANA_00 [
        LDO_EN OFFSET(0) NUMBITS(1) [],
        VREF_EN OFFSET(1) NUMBITS(1) [],
        MICBIAS_EN OFFSET(2) NUMBITS(1) []
    ],
    pub ANA_01 [
        MICBIAS_VSET OFFSET(0) NUMBITS(3) [],
        MICBST_GAIN OFFSET(4) NUMBITS(2) [],
        MICBST_MODE OFFSET(6) NUMBITS(1) [],
        MICBST_EN OFFSET(7) NUMBITS(1) []
    ],
    pub ANA_02 [
        DAC_POW OFFSET(0) NUMBITS(1) [],
        ADC_POW OFFSET(1) NUMBITS(1) []
    ],
    pub AUDIO_CONTROL_0 [
        AUDIO_IP_EN OFFSET(0) NUMBITS(1) []
    ],
    pub AUDIO_CONTROL_1 [
        SAMPLE_RATE0 OFFSET(0) NUMBITS(4) [],
        SAMPLE_RATE1 OFFSET(4) NUMBITS(4) [],
        AD_SRC OFFSET(8) NUMBITS(2) [],
        DA_SRC OFFSET(10) NUMBITS(2) [],
        DMIC_CLK OFFSET(12) NUMBITS(3) []
    ],
    pub CLOCK_CONTROL [
        DA_CLK_EN OFFSET(0) NUMBITS(1) [],
        AD_CH0_CLK_EN OFFSET(1) NUMBITS(1) [],
        AD_CH1_CLK_EN OFFSET(2) NUMBITS(1) [],
        DMIC_CLK_EN OFFSET(3) NUMBITS(1) [],
        AD_ANA_CLK_EN OFFSET(4) NUMBITS(1) []
    ],
    pub I2S_CONTROL [
        FORMAT OFFSET(0) NUMBITS(2) [],
        TX_LEN OFFSET(2) NUMBITS(2) [],
        RX_LEN OFFSET(4) NUMBITS(2) [],
        CH_LEN OFFSET(6) NUMBITS(2) [],
        CH_SEQ OFFSET(8) NUMBITS(2) [],
        SAME_LRC OFFSET(10) NUMBITS(1) []
    ],
    pub ADC_CH [
        AMIC OFFSET(0) NUMBITS(1) [],
        FALLING_LATCH OFFSET(1) NUMBITS(1) [],
        MUTE OFFSET(2) NUMBITS(1) [],
        ZDET OFFSET(4) NUMBITS(2) [],
        GAIN OFFSET(8) NUMBITS(7) []
    ],
    pub DAC_CONTROL [
        MUTE OFFSET(0) NUMBITS(1) [],
        DITHER OFFSET(1) NUMBITS(2) [],
        GAIN OFFSET(8) NUMBITS(8) []
    ]
];

register_structs! {
    pub Eq {
        (0x000 => pub ctrl: ReadWrite<u32>),
        (0x004 => pub h0: ReadWrite<u32>),
        (0x008 => pub b1: ReadWrite<u32>),
        (0x00C => pub b2: ReadWrite<u32>),
        (0x010 => pub a1: ReadWrite<u32>),
        (0x014 => pub a2: ReadWrite<u32>),
        (0x018 => _reserved0),
        (0x020 => @END),
    }
}

register_structs! {
    pub RegisterBlock {
        (0x000 => pub ana_00: ReadWrite<u32, ANA_00::Register>),
        (0x004 => pub ana_01: ReadWrite<u32, ANA_01::Register>),
        (0x008 => pub ana_02: ReadWrite<u32, ANA_02::Register>),
        (0x00C => _reserved0),
        (0x100 => pub audio_control_0: ReadWrite<u32, AUDIO_CONTROL_0::Register>),
        (0x104 => pub audio_control_1: ReadWrite<u32, AUDIO_CONTROL_1::Register>),
        (0x108 => pub clock_control: ReadWrite<u32, CLOCK_CONTROL::Register>),
        (0x10C => pub i2s_control: ReadWrite<u32, I2S_CONTROL::Register>),
        (0x110 => pub adc_ch: [ReadWrite<u32, ADC_CH::Register>; 2]),
        (0x118 => pub dac_control: ReadWrite<u32, DAC_CONTROL::Register>),
        (0x11C => _reserved1),
        (0x200 => pub eq: [Eq; 5]),
        (0x2A0 => @END),
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum I2sRxDataWidth {
    W16 = 0,
    W8 = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum I2sTxDataWidth {
    W16 = 0,
    W24 = 2,
    W8 = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelLen {
    L16 = 0,
    L32 = 1,
    L24 = 2,
    L8 = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum I2sFormat {
    I2s = 0,
    LeftJustified = 1,
    PcmA = 2,
    PcmB = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dither {
    Disable = 0,
    Lsb = 1,
    LsbPlus1 = 2,
    LsbPlus2 = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelSequence {
    LR = 0,
    RL = 1,
    LL = 2,
    RR = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleRate {
    Hz48000 = 0,
    Hz96000 = 1,
    Hz192000 = 2,
    Hz32000 = 3,
    Hz176400 = 4,
    Hz16000 = 5,
    Hz8000 = 7,
    Hz44100 = 8,
    Hz88200 = 9,
    Hz24000 = 10,
    Hz12000 = 11,
    Hz22050 = 12,
    Hz11025 = 13,
}

impl SampleRate {
    pub const fn hz(self) -> u32 {
        use SampleRate::*;
        match self {
            Hz48000 => 48_000,
            Hz96000 => 96_000,
            Hz192000 => 192_000,
            Hz32000 => 32_000,
            Hz176400 => 176_400,
            Hz16000 => 16_000,
            Hz8000 => 8_000,
            Hz44100 => 44_100,
            Hz88200 => 88_200,
            Hz24000 => 24_000,
            Hz12000 => 12_000,
            Hz22050 => 22_050,
            Hz11025 => 11_025,
        }
    }
}

/// Which sample-rate generator feeds a path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SampleRateSource {
    Src0 = 0,
    Src1 = 1,
    Src2 = 2,
    Src3Da = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DmicClock {
    Mhz5 = 0,
    Khz2500 = 1,
    Khz1250 = 2,
    Khz625 = 3,
    Hz312500 = 4,
}

/// MICBIAS output voltage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MicBias {
    V1_507 = 0,
    V1_62 = 1,
    V1_705 = 2,
    V1_8 = 3,
    V1_906 = 4,
    V2_025 = 5,
    V2_16 = 6,
    V2_314 = 7,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MicBoostGain {
    Db0 = 0,
    Db20 = 1,
    Db30 = 2,
    Db40 = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MicBoostMode {
    Single,
    Differential,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mute {
    Unmute,
    Mute,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MicType {
    Dmic,
    Amic,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LatchEdge {
    Rising,
    Falling,
}

/// Zero-detection timeout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ZeroDetTimeout {
    Samples1024x16 = 0,
    Samples1024x32 = 1,
    Samples1024x64 = 2,
    Samples64 = 3,
}

/// Per-microphone-channel settings.
#[derive(Copy, Clone, Debug)]
pub struct MicChannel {
    pub mute: Mute,
    pub mic_type: MicType,
    pub dmic_latch: LatchEdge,
    /// ADC digital volume.
    pub ad_gain: u8,
    pub zero_det_timeout: ZeroDetTimeout,
}

impl Default for MicChannel {
    fn default() -> Self {
        Self {
            mute: Mute::Unmute,
            mic_type: MicType::Amic,
            dmic_latch: LatchEdge::Rising,
            ad_gain: 0x2F,
            zero_det_timeout: ZeroDetTimeout::Samples1024x32,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Config {
    pub ad_sample_rate_src: SampleRateSource,
    pub da_sample_rate_src: SampleRateSource,
    pub sample_rate0: SampleRate,
    pub sample_rate1: SampleRate,
    pub dmic_clock: DmicClock,
    pub i2s_format: I2sFormat,
    pub i2s_tx_data_width: I2sTxDataWidth,
    pub i2s_rx_data_width: I2sRxDataWidth,
    pub i2s_channel_len: ChannelLen,
    pub i2s_ch_sequence: ChannelSequence,
    pub i2s_same_lrc: bool,
    pub mic_bias: MicBias,
    pub mic_bst_gain: MicBoostGain,
    pub mic_bst_mode: MicBoostMode,
    pub ch0: MicChannel,
    pub ch1: MicChannel,
    pub da_mute: Mute,
    pub da_gain: u8,
    pub da_dither: Dither,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ad_sample_rate_src: SampleRateSource::Src0,
            da_sample_rate_src: SampleRateSource::Src0,
            sample_rate0: SampleRate::Hz16000,
            sample_rate1: SampleRate::Hz16000,
            dmic_clock: DmicClock::Khz2500,
            i2s_format: I2sFormat::I2s,
            i2s_tx_data_width: I2sTxDataWidth::W16,
            i2s_rx_data_width: I2sRxDataWidth::W16,
            i2s_channel_len: ChannelLen::L32,
            i2s_ch_sequence: ChannelSequence::LR,
            i2s_same_lrc: false,
            mic_bias: MicBias::V1_8,
            mic_bst_gain: MicBoostGain::Db20,
            mic_bst_mode: MicBoostMode::Differential,
            ch0: MicChannel::default(),
            ch1: MicChannel::default(),
            da_mute: Mute::Unmute,
            da_gain: 0xAF,
            da_dither: Dither::Disable,
        }
    }
}

/// One EQ biquad. Coefficients are clamped to [`EQ_COEF_MAX`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EqConfig {
    pub enable: bool,
    pub h0: u32,
    pub b1: u32,
    pub b2: u32,
    pub a1: u32,
    pub a2: u32,
}

pub struct Codec<R> {
    codec: R,
}

impl<R> Codec<R>
where
    R: Deref<Target = RegisterBlock>,
{
    pub fn new(codec: R) -> Self {
        Self { codec }
    }

    /// Power down the analog front end and stop the digital paths.
    pub fn deinit(&self) {
        self.codec.clock_control.set(0);
        self.codec.audio_control_0.set(0);
        self.codec.ana_02.set(0);
        self.codec.ana_00.set(0);
    }

    /// Power the LDO, reference and converters in order.
    pub fn analog_circuit_init(&self) {
        self.codec.ana_00.modify(ANA_00::LDO_EN::SET);
        self.codec.ana_00.modify(ANA_00::VREF_EN::SET);
        self.codec
            .ana_02
            .write(ANA_02::DAC_POW::SET + ANA_02::ADC_POW::SET);
    }

    pub fn init(&self, cfg: &Config) {
        self.reset();

        self.codec.audio_control_1.write(
            AUDIO_CONTROL_1::SAMPLE_RATE0.val(cfg.sample_rate0 as u32)
                + AUDIO_CONTROL_1::SAMPLE_RATE1.val(cfg.sample_rate1 as u32)
                + AUDIO_CONTROL_1::AD_SRC.val(cfg.ad_sample_rate_src as u32)
                + AUDIO_CONTROL_1::DA_SRC.val(cfg.da_sample_rate_src as u32)
                + AUDIO_CONTROL_1::DMIC_CLK.val(cfg.dmic_clock as u32),
        );
        self.codec.i2s_control.write(
            I2S_CONTROL::FORMAT.val(cfg.i2s_format as u32)
                + I2S_CONTROL::TX_LEN.val(cfg.i2s_tx_data_width as u32)
                + I2S_CONTROL::RX_LEN.val(cfg.i2s_rx_data_width as u32)
                + I2S_CONTROL::CH_LEN.val(cfg.i2s_channel_len as u32)
                + I2S_CONTROL::CH_SEQ.val(cfg.i2s_ch_sequence as u32)
                + I2S_CONTROL::SAME_LRC.val(cfg.i2s_same_lrc as u32),
        );

        for (reg, ch) in self.codec.adc_ch.iter().zip([cfg.ch0, cfg.ch1]) {
            reg.write(
                ADC_CH::AMIC.val((ch.mic_type == MicType::Amic) as u32)
                    + ADC_CH::FALLING_LATCH.val((ch.dmic_latch == LatchEdge::Falling) as u32)
                    + ADC_CH::MUTE.val((ch.mute == Mute::Mute) as u32)
                    + ADC_CH::ZDET.val(ch.zero_det_timeout as u32)
                    + ADC_CH::GAIN.val(ch.ad_gain as u32),
            );
        }
        self.codec.dac_control.write(
            DAC_CONTROL::MUTE.val((cfg.da_mute == Mute::Mute) as u32)
                + DAC_CONTROL::DITHER.val(cfg.da_dither as u32)
                + DAC_CONTROL::GAIN.val(cfg.da_gain as u32),
        );

        self.codec.ana_01.write(
            ANA_01::MICBIAS_VSET.val(cfg.mic_bias as u32)
                + ANA_01::MICBST_GAIN.val(cfg.mic_bst_gain as u32)
                + ANA_01::MICBST_MODE.val((cfg.mic_bst_mode == MicBoostMode::Differential) as u32)
                + ANA_01::MICBST_EN::SET,
        );

        let dmic = cfg.ch0.mic_type == MicType::Dmic || cfg.ch1.mic_type == MicType::Dmic;
        let amic = cfg.ch0.mic_type == MicType::Amic || cfg.ch1.mic_type == MicType::Amic;
        self.codec.clock_control.write(
            CLOCK_CONTROL::DA_CLK_EN::SET
                + CLOCK_CONTROL::AD_CH0_CLK_EN::SET
                + CLOCK_CONTROL::AD_CH1_CLK_EN::SET
                + CLOCK_CONTROL::DMIC_CLK_EN.val(dmic as u32)
                + CLOCK_CONTROL::AD_ANA_CLK_EN.val(amic as u32),
        );
        debug!(
            "codec fs0 {} fs1 {}",
            cfg.sample_rate0.hz(),
            cfg.sample_rate1.hz()
        );
    }

    /// Program EQ bank `index` (0..5). Out-of-range banks are ignored.
    pub fn eq_init(&self, index: usize, cfg: &EqConfig) {
        let Some(eq) = self.codec.eq.get(index) else {
            warn!("codec eq bank {} out of range", index);
            return;
        };
        eq.ctrl.set(0);
        eq.h0.set(cfg.h0.min(EQ_COEF_MAX));
        eq.b1.set(cfg.b1.min(EQ_COEF_MAX));
        eq.b2.set(cfg.b2.min(EQ_COEF_MAX));
        eq.a1.set(cfg.a1.min(EQ_COEF_MAX));
        eq.a2.set(cfg.a2.min(EQ_COEF_MAX));
        eq.ctrl.set(cfg.enable as u32);
    }

    pub fn micbias_cmd(&self, enable: bool) {
        self.codec.ana_00.modify(ANA_00::MICBIAS_EN.val(enable as u32));
    }

    pub fn set_micbias(&self, voltage: MicBias) {
        self.codec
            .ana_01
            .modify(ANA_01::MICBIAS_VSET.val(voltage as u32));
    }

    /// Pulse `audio_ip_en` low.
    pub fn reset(&self) {
        self.codec
            .audio_control_0
            .modify(AUDIO_CONTROL_0::AUDIO_IP_EN::CLEAR);
        self.codec
            .audio_control_0
            .modify(AUDIO_CONTROL_0::AUDIO_IP_EN::SET);
    }

    pub fn free(self) -> R {
        self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn audio_control_0_sits_at_0x100() {
        let regs = testutil::regs::<RegisterBlock>();
        let base = regs as *const RegisterBlock as usize;
        assert_eq!(&regs.audio_control_0 as *const _ as usize - base, 0x100);
        assert_eq!(&regs.eq[1] as *const Eq as usize - base, 0x220);
    }

    #[test]
    fn init_enables_ip_and_programs_paths() {
        let regs = testutil::regs::<RegisterBlock>();
        let codec = Codec::new(regs);

        codec.init(&Config {
            sample_rate0: SampleRate::Hz48000,
            ch1: MicChannel { mic_type: MicType::Dmic, ..Default::default() },
            ..Default::default()
        });

        assert!(regs.audio_control_0.is_set(AUDIO_CONTROL_0::AUDIO_IP_EN));
        assert_eq!(regs.audio_control_1.read(AUDIO_CONTROL_1::SAMPLE_RATE0), 0);
        assert_eq!(regs.audio_control_1.read(AUDIO_CONTROL_1::SAMPLE_RATE1), 5);
        assert_eq!(regs.i2s_control.read(I2S_CONTROL::CH_LEN), 1);
        assert!(regs.adc_ch[0].is_set(ADC_CH::AMIC));
        assert!(!regs.adc_ch[1].is_set(ADC_CH::AMIC));
        assert_eq!(regs.dac_control.read(DAC_CONTROL::GAIN), 0xAF);
        assert!(regs.clock_control.is_set(CLOCK_CONTROL::DMIC_CLK_EN));
        assert!(regs.clock_control.is_set(CLOCK_CONTROL::AD_ANA_CLK_EN));
    }

    #[test]
    fn micbias_voltage_and_power() {
        let regs = testutil::regs::<RegisterBlock>();
        let codec = Codec::new(regs);

        codec.set_micbias(MicBias::V2_314);
        codec.micbias_cmd(true);

        assert_eq!(regs.ana_01.read(ANA_01::MICBIAS_VSET), 7);
        assert!(regs.ana_00.is_set(ANA_00::MICBIAS_EN));
        codec.micbias_cmd(false);
        assert!(!regs.ana_00.is_set(ANA_00::MICBIAS_EN));
    }

    #[test]
    fn eq_coefficients_are_clamped() {
        let regs = testutil::regs::<RegisterBlock>();
        let codec = Codec::new(regs);

        codec.eq_init(
            2,
            &EqConfig { enable: true, h0: 0xFF, b1: 0xFFFF_FFFF, ..Default::default() },
        );
        codec.eq_init(9, &EqConfig::default());

        assert_eq!(regs.eq[2].h0.get(), 0xFF);
        assert_eq!(regs.eq[2].b1.get(), EQ_COEF_MAX);
        assert_eq!(regs.eq[2].ctrl.get(), 1);
    }

    #[test]
    fn analog_init_powers_converters() {
        let regs = testutil::regs::<RegisterBlock>();
        let codec = Codec::new(regs);

        codec.analog_circuit_init();
        assert!(regs.ana_00.is_set(ANA_00::LDO_EN));
        assert!(regs.ana_00.is_set(ANA_00::VREF_EN));
        assert!(regs.ana_02.is_set(ANA_02::DAC_POW));

        codec.deinit();
        assert_eq!(regs.ana_00.get(), 0);
    }
}
