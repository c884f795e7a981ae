//! SPI1 master talking to SPI0 in slave mode on the same board.
//!
//! Wire P2_4..P2_7 (SPI1 SCK/MOSI/MISO/CS) to P3_0..P3_3 (slave SCK/SI/SO/CS). Each side
//! preloads `SEND_LENGTH` bytes and logs what it received from the RX-full interrupt.

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m_rt::entry;
use critical_section::Mutex;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        nvic::NvicInit,
        pinmux::{
            Function, PadConfig, PullMode, P2_0, P2_4, P2_5, P2_6, P2_7, P3_0, P3_1, P3_2, P3_3,
            P4_0, P4_1, P4_2, P4_3,
        },
        rcc::Periph,
        spi, uart, Nvic, Pad, Pinmux, Rcc, Spi, Uart,
    },
    interrupt, logger,
    peripherals::{SPI1, SPI_SLAVE},
    Interrupt, Peripherals,
};

const SEND_LENGTH: usize = 16;

static MASTER: Mutex<RefCell<Option<Spi<SPI1>>>> = Mutex::new(RefCell::new(None));
static SLAVE: Mutex<RefCell<Option<Spi<SPI_SLAVE>>>> = Mutex::new(RefCell::new(None));

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
    log::info!("spi slave demo");

    let pad_cfg = PadConfig {
        pull: PullMode::Up,
        output_enable: true,
        output_high: true,
        ..Default::default()
    };

    // The slave block shares P4_0..P4_3 with the SPI0 master pins.
    for pin in [P4_0, P4_1, P4_2, P4_3] {
        pinmux.deinit(pin);
    }
    for (pin, func) in [
        (P3_0, Function::SPI0_CLK_SLAVE),
        (P3_1, Function::SPI0_SI_SLAVE),
        (P3_2, Function::SPI0_SO_SLAVE),
        (P3_3, Function::SPI0_CSN_0_SLAVE),
        (P2_4, Function::SPI1_CLK_MASTER),
        (P2_5, Function::SPI1_MO_MASTER),
        (P2_6, Function::SPI1_MI_MASTER),
        (P2_7, Function::SPI1_CSN_0_MASTER),
    ] {
        pad.config(pin, &pad_cfg);
        pinmux.deinit(pin);
        pinmux.config(pin, func);
    }

    let cfg = spi::Config {
        baud_rate_prescaler: 100,
        rx_threshold: SEND_LENGTH as u8 - 1,
        ..Default::default()
    };
    let nvic = Nvic::new(p.NVIC);

    rcc.periph_clock_cmd(Periph::Spi0Slave, true);
    let slave = Spi::new(
        p.SPI_SLAVE,
        &spi::Config {
            mode: spi::Mode::Slave,
            ..cfg
        },
    );
    slave.interrupt_config(spi::int::RXF, true);
    let slave_tx: [u8; SEND_LENGTH] = core::array::from_fn(|i| 0x10 + i as u8);
    slave.send_buffer(&slave_tx);
    critical_section::with(|cs| SLAVE.borrow_ref_mut(cs).replace(slave));
    nvic.init(&NvicInit {
        channel: Interrupt::SPI_SLAVE,
        priority: 3,
        enable: true,
    });

    rcc.periph_clock_cmd(Periph::Spi1, true);
    let master = Spi::new(p.SPI1, &cfg);
    master.interrupt_config(spi::int::RXF, true);
    critical_section::with(|cs| MASTER.borrow_ref_mut(cs).replace(master));
    nvic.init(&NvicInit {
        channel: Interrupt::SPI1,
        priority: 3,
        enable: true,
    });

    // SAFETY: handlers only touch the statics above.
    unsafe { cortex_m::interrupt::enable() };

    let master_tx: [u8; SEND_LENGTH] = core::array::from_fn(|i| 0x01 + i as u8);
    critical_section::with(|cs| {
        if let Some(master) = MASTER.borrow_ref(cs).as_ref() {
            master.send_buffer(&master_tx);
        }
    });

    loop {
        cortex_m::asm::wfi();
    }
}

fn drain<R>(name: &str, spi: &Spi<R>)
where
    R: core::ops::Deref<Target = spi::RegisterBlock>,
{
    if !spi.interrupt_status(spi::int::RXF) {
        return;
    }
    spi.interrupt_config(spi::int::RXF, false);
    spi.clear_interrupt(spi::int::RXF);
    let len = spi.rx_fifo_len();
    log::info!("{} receives {} data:", name, len);
    for i in 0..len {
        log::info!("{}_rx_buf[{}] = {:#04x}", name, i, spi.receive_data() as u8);
    }
    spi.interrupt_config(spi::int::RXF, true);
}

#[interrupt]
fn SPI1() {
    critical_section::with(|cs| {
        if let Some(spi) = MASTER.borrow_ref(cs).as_ref() {
            drain("master", spi);
        }
    });
}

#[interrupt]
fn SPI_SLAVE() {
    critical_section::with(|cs| {
        if let Some(spi) = SLAVE.borrow_ref(cs).as_ref() {
            drain("slave", spi);
        }
    });
}
