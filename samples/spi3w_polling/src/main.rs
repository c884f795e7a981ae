//! Read the product ID of a 3-wire mouse sensor over SPI3W.
//!
//! CLK P2_2, DATA P2_3, CS P2_4.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        pinmux::{Function, PadConfig, PullMode, P2_0, P2_2, P2_3, P2_4},
        rcc::Periph,
        spi3w, uart, Pad, Pinmux, Rcc, Spi3w, Uart,
    },
    logger, Peripherals,
};

const REG_PRODUCT_ID1: u8 = 0x00;
const REG_PRODUCT_ID2: u8 = 0x01;

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
        pull: PullMode::None,
        output_enable: true,
        output_high: true,
        ..Default::default()
    };
    for (pin, func) in [
        (P2_2, Function::SPI2W_CLK),
        (P2_3, Function::SPI2W_DATA),
        (P2_4, Function::SPI2W_CS),
    ] {
        pad.config(pin, &pad_cfg);
        pinmux.config(pin, func);
    }

    rcc.periph_clock_cmd(Periph::Spi3w, true);
    let spi = Spi3w::new(
        p.SPI3W,
        &spi3w::Config {
            sys_clock: 20_000_000,
            speed: 800_000,
            mode: spi3w::Mode::ThreeWire,
            read_delay: 0x3,
            ..Default::default()
        },
    );

    // Resync pulse of 2 * 1 / (2 * 800 kHz) = 1.25 us.
    spi.set_resync_time(2);
    spi.resync_signal_cmd(true);
    while spi.flag_status(spi3w::flag::RESYNC_BUSY) {}
    spi.resync_signal_cmd(false);

    spi.cmd(true);

    // Sensor needs about 0.28 ms after resync.
    cortex_m::asm::delay(0x1FFF * 4);

    let id = (
        spi.read_byte(REG_PRODUCT_ID1),
        spi.read_byte(REG_PRODUCT_ID2),
    );
    match id {
        (Ok(hi), Ok(lo)) => {
            log::info!("id[0] = {:#x}, id[1] = {:#x}", hi, lo);
            if hi == 0x3E && lo == 0x01 {
                log::info!("SPI3W test pass!");
            } else {
                log::warn!("SPI3W test failed!");
            }
        }
        _ => log::error!("SPI3W read timed out"),
    }

    loop {
        cortex_m::asm::wfi();
    }
}
