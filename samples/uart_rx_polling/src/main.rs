//! Echo every byte received on UART3 (P3_0 TX, P3_1 RX) back to the sender.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        pinmux::{Function, PadConfig, PullMode, P3_0, P3_1},
        rcc::Periph,
        uart, Pad, Pinmux, Rcc, Uart,
    },
    Peripherals,
};

#[entry]
fn main() -> ! {
    let p = Peripherals::take().unwrap();

    let pad = Pad::new(p.PAD);
    let pinmux = Pinmux::new(p.PINMUX);
    let pad_cfg = PadConfig {
        pull: PullMode::Up,
        output_high: true,
        ..Default::default()
    };
    pad.config(P3_0, &pad_cfg);
    pad.config(P3_1, &pad_cfg);
    pinmux.config(P3_0, Function::UART3_TX);
    pinmux.config(P3_1, Function::UART3_RX);

    Rcc::new(p.RCC).periph_clock_cmd(Periph::Uart3, true);
    let mut serial = Uart::new(p.UART3, &uart::Config::default().baud_rate(uart::BaudRate::B115200));

    serial.println("### Uart demo polling read uart data ###").ok();

    loop {
        if serial.flag_status(uart::flag::RX_DATA_AVA) {
            let b = serial.receive_byte();
            serial.send_byte(b);
        }
    }
}
