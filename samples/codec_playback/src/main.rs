//! Play a 1 kHz tone through the codec DAC.
//!
//! A 24-bit cosine table is pushed into the I2S0 TX FIFO by GDMA channel 0; the channel
//! interrupt rearms the same block, so the tone loops forever. I2S0 is mirrored on
//! BCLK P4_4, LRCK P4_5 and DOUT P4_6 for a scope.

#![no_main]
#![no_std]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use micromath::F32Ext;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        codec, gdma, i2s,
        nvic::NvicInit,
        pinmux::{Function, PadConfig, P2_0, P4_4, P4_5, P4_6},
        rcc::Periph,
        uart, Codec, Gdma, I2s, Nvic, Pad, Pinmux, Rcc, Uart,
    },
    interrupt, logger, peripherals, Interrupt, Peripherals,
};

const SAMPLE_RATE: u32 = 16_000;
const TONE_HZ: u32 = 1_000;
/// 200 whole periods, so the table loops without a click.
const TABLE_LEN: usize = 3200;
const CHANNEL: u8 = 0;

static TABLE_ADDR: AtomicU32 = AtomicU32::new(0);

fn fill_cos_table(table: &mut [u32]) {
    let step = 2.0 * core::f32::consts::PI * TONE_HZ as f32 / SAMPLE_RATE as f32;
    for (i, slot) in table.iter_mut().enumerate() {
        let v = (step * i as f32).cos() * 8_388_607.0;
        let s = (v as i32).clamp(-8_388_608, 8_388_607);
        // 24-bit sample, left aligned in the 32-bit slot.
        *slot = (s << 8) as u32;
    }
}

fn i2s0_tx_fifo() -> u32 {
    // SAFETY: only the field address is taken, nothing is read.
    unsafe { core::ptr::addr_of!((*peripherals::I2S0::PTR).tx_dr) as u32 }
}

#[entry]
fn main() -> ! {
    let p = Peripherals::take().unwrap();
    let pad = Pad::new(p.PAD);
    let pinmux = Pinmux::new(p.PINMUX);
    let rcc = Rcc::new(p.RCC);

    pad.config(P2_0, &PadConfig::default());
    pinmux.config(P2_0, Function::UART0_TX);
    rcc.periph_clock_cmd(Periph::Uart0, true);
    logger::init(Uart::new(p.UART0, &uart::Config::default()), log::LevelFilter::Info).ok();

    let table = cortex_m::singleton!(: [u32; TABLE_LEN] = [0; TABLE_LEN]).unwrap();
    fill_cos_table(table);
    TABLE_ADDR.store(table.as_ptr() as u32, Ordering::Release);
    log::info!("cos table: {} samples", TABLE_LEN);

    let pad_cfg = PadConfig {
        output_enable: true,
        ..Default::default()
    };
    for (pin, func) in [
        (P4_4, Function::I2S0_BCLK),
        (P4_5, Function::I2S0_LRC),
        (P4_6, Function::I2S0_DOUT),
    ] {
        pad.config(pin, &pad_cfg);
        pinmux.config(pin, func);
    }

    rcc.periph_clock_cmd(Periph::Codec, true);
    let codec = Codec::new(p.CODEC);
    codec.analog_circuit_init();
    codec.init(&codec::Config {
        da_mute: codec::Mute::Unmute,
        da_gain: 0xAF,
        da_dither: codec::Dither::Disable,
        i2s_format: codec::I2sFormat::I2s,
        i2s_channel_len: codec::ChannelLen::L32,
        i2s_tx_data_width: codec::I2sTxDataWidth::W24,
        i2s_ch_sequence: codec::ChannelSequence::LR,
        ..Default::default()
    });

    rcc.periph_clock_cmd(Periph::I2s0, true);
    let i2s = I2s::new(
        p.I2S0,
        &i2s::Config {
            tx_data_width: i2s::DataWidth::W24,
            rx_data_width: i2s::DataWidth::W24,
            tx_channel_width: i2s::DataWidth::W32,
            rx_channel_width: i2s::DataWidth::W32,
            tx_water_level: 1,
            rx_water_level: 1,
            ..Default::default()
        },
    );

    rcc.periph_clock_cmd(Periph::Gdma, true);
    let dma = Gdma::new(p.GDMA);
    dma.init(&gdma::Config {
        channel: CHANNEL,
        direction: gdma::Direction::MemoryToPeripheral,
        buffer_size: TABLE_LEN as u32,
        source_inc: gdma::AddressMode::Increment,
        destination_inc: gdma::AddressMode::Fixed,
        source_data_size: gdma::DataSize::Word,
        destination_data_size: gdma::DataSize::Word,
        source_msize: gdma::Msize::M4,
        destination_msize: gdma::Msize::M4,
        source_addr: table.as_ptr() as u32,
        destination_addr: i2s0_tx_fifo(),
        destination_handshake: gdma::handshake::I2S0_TX,
        channel_priority: 2,
        ..Default::default()
    });
    dma.interrupt_config(CHANNEL, gdma::int::TRANSFER, true);

    Nvic::new(p.NVIC).init(&NvicInit {
        channel: Interrupt::GDMA0_Channel0,
        priority: 3,
        enable: true,
    });
    // SAFETY: the handler only touches GDMA channel 0.
    unsafe { cortex_m::interrupt::enable() };

    i2s.cmd(i2s::mode::TX, true);
    dma.cmd(CHANNEL, true);
    log::info!("playback started");

    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn GDMA0_Channel0() {
    // SAFETY: main never touches the GDMA again after starting the channel.
    let dma = Gdma::new(unsafe { peripherals::GDMA::steal() });
    dma.set_source_address(CHANNEL, TABLE_ADDR.load(Ordering::Acquire));
    dma.set_destination_address(CHANNEL, i2s0_tx_fifo());
    dma.set_buffer_size(CHANNEL, TABLE_LEN as u32);
    dma.clear_interrupt(CHANNEL, gdma::int::TRANSFER);
    dma.cmd(CHANNEL, true);
}
