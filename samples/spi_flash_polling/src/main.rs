//! Identify, erase, program and read back a GD25Q128E on SPI0.
//!
//! SCK P4_0, MOSI P4_1, MISO P4_2, CS0 P4_3. Logs go out on UART0 (P2_0 TX).

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    drivers::spi_flash::{ReadMode, SpiFlash},
    hw::{
        pinmux::{Function, PadConfig, PullMode, P2_0, P4_0, P4_1, P4_2, P4_3},
        rcc::Periph,
        spi, uart, Pad, Pinmux, Rcc, Spi, Uart,
    },
    logger, Peripherals,
};

const TEST_ADDR: u32 = 0x00_1000;

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
    for (pin, func) in [
        (P4_0, Function::SPI0_CLK_MASTER),
        (P4_1, Function::SPI0_MO_MASTER),
        (P4_2, Function::SPI0_MI_MASTER),
        (P4_3, Function::SPI0_CSN_0_MASTER),
    ] {
        pad.config(pin, &pad_cfg);
        pinmux.deinit(pin);
        pinmux.config(pin, func);
    }

    rcc.periph_clock_cmd(Periph::Spi0, true);
    let bus = Spi::new(
        p.SPI0,
        &spi::Config {
            direction: spi::Direction::FullDuplex,
            cpol: true,
            cpha: true,
            baud_rate_prescaler: 100,
            rx_threshold: 1,
            ..Default::default()
        },
    );
    let mut flash = SpiFlash::new(bus);

    log::info!("Start spi polling test!");

    match flash.jedec_id() {
        Ok(id) => log::info!(
            "jedec id = {:02x} {:02x} {:02x}",
            id.manufacturer,
            id.memory_type,
            id.capacity
        ),
        Err(e) => log::error!("jedec id failed: {:?}", e),
    }
    if let Ok(id) = flash.device_id() {
        log::info!("device id = {:02x}", id);
    }
    if let Ok((mf, dev)) = flash.manufacturer_device_id() {
        log::info!("manufacturer/device id = {:02x} {:02x}", mf, dev);
    }

    let mut write_data = [0u8; 100];
    for (i, b) in write_data.iter_mut().enumerate() {
        *b = (i + 10) as u8;
    }
    let mut read_data = [0u8; 105];

    if flash.sector_erase(TEST_ADDR).is_ok() {
        log::info!("spi_demo: sector erase done");
    }
    if flash.read(ReadMode::Fast, TEST_ADDR, &mut read_data).is_ok() {
        log::info!("after erase: {:02x?}", &read_data[..]);
    }

    if flash.write(TEST_ADDR, &write_data).is_err() {
        log::error!("page program failed");
    }
    if flash.read(ReadMode::Fast, TEST_ADDR, &mut read_data).is_ok() {
        log::info!("after write: {:02x?}", &read_data[..]);
        if read_data[..100] == write_data {
            log::info!("read back matches");
        }
    }

    loop {
        cortex_m::asm::wfi();
    }
}
