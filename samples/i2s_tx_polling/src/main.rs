//! Stream a counting pattern out of I2S0 as a 16 kHz, 16-bit stereo master.
//!
//! LRCK P3_2, BCLK P3_3, DOUT P4_0.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        i2s,
        pinmux::{Function, PadConfig, P2_0, P3_2, P3_3, P4_0},
        rcc::Periph,
        uart, I2s, Pad, Pinmux, Rcc, Uart,
    },
    logger, Peripherals,
};

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

    let pad_cfg = PadConfig {
        output_enable: true,
        ..Default::default()
    };
    for (pin, func) in [
        (P3_3, Function::I2S0_BCLK),
        (P3_2, Function::I2S0_LRC),
        (P4_0, Function::I2S0_DOUT),
    ] {
        pad.config(pin, &pad_cfg);
        pinmux.config(pin, func);
    }

    rcc.periph_clock_cmd(Periph::I2s0, true);
    let cfg = i2s::Config {
        tx_dma: false,
        rx_dma: false,
        ..Default::default()
    };
    let i2s = I2s::new(p.I2S0, &cfg);
    i2s.cmd(i2s::mode::TX, true);
    log::info!(
        "I2S0 tx, BCLK = {} Hz",
        i2s::bclk_hz(cfg.tx_bclk_mi, cfg.tx_bclk_ni)
    );

    // With 16-bit samples the lower half word goes out first.
    let mut word: u32 = 0x1234_8800;
    loop {
        if i2s.tx_fifo_free_len() > 0 {
            i2s.send_data(word);
            word = word.wrapping_add(1);
        }
    }
}
