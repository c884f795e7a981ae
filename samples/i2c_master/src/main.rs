//! Write a few bytes to a 24Cxx-style EEPROM at 0x50 on I2C0 and read them back.
//!
//! SCL P4_0, SDA P4_1, 100 kHz.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use embedded_hal::i2c::I2c as _;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        i2c,
        pinmux::{Function, PadConfig, PullMode, P2_0, P4_0, P4_1},
        rcc::Periph,
        uart, I2c, Pad, Pinmux, Rcc, Uart,
    },
    logger, Peripherals,
};

const EEPROM_ADDR: u8 = 0x50;
const MEM_ADDR: u8 = 0x00;

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
        pull: PullMode::Up,
        output_enable: true,
        output_high: true,
        ..Default::default()
    };
    pad.config(P4_0, &pad_cfg);
    pad.config(P4_1, &pad_cfg);
    pinmux.config(P4_0, Function::I2C0_CLK);
    pinmux.config(P4_1, Function::I2C0_DAT);

    rcc.periph_clock_cmd(Periph::I2c0, true);
    let mut bus = I2c::new(
        p.I2C0,
        &i2c::Config {
            clock_speed: 100_000,
            slave_address: EEPROM_ADDR as u16,
            ..Default::default()
        },
    );

    let payload: [u8; 8] = core::array::from_fn(|i| 0xA0 + i as u8);
    let mut frame = [0u8; 9];
    frame[0] = MEM_ADDR;
    frame[1..].copy_from_slice(&payload);

    if let Err(e) = bus.write(EEPROM_ADDR, &frame) {
        log::error!("write failed: {:?}", e);
    }

    // Wait out the EEPROM write cycle by polling for an ACK.
    while bus.write(EEPROM_ADDR, &[MEM_ADDR]).is_err() {}

    let mut back = [0u8; 8];
    match bus.write_read(EEPROM_ADDR, &[MEM_ADDR], &mut back) {
        Ok(()) if back == payload => log::info!("i2c read back ok: {:02x?}", back),
        Ok(()) => log::warn!("i2c mismatch: {:02x?}", back),
        Err(e) => log::error!("read failed: {:?}", e),
    }

    loop {
        cortex_m::asm::wfi();
    }
}
