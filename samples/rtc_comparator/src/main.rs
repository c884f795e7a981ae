//! RTC comparator interrupt.
//!
//! The counter runs at 10 Hz off the 32 kHz clock; comparator 1 fires every 10 ticks and the
//! handler pushes the compare value forward by the same amount.

#![no_main]
#![no_std]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        nvic::NvicInit,
        pinmux::{Function, PadConfig, P2_0},
        rcc::Periph,
        rtc::{self, Comp},
        uart, Nvic, Pad, Pinmux, Rcc, Rtc, Uart,
    },
    interrupt, logger, peripherals, Interrupt, Peripherals,
};

/// 32000 / (3199 + 1) = 10 Hz.
const PRESCALER: u16 = 3200 - 1;
const COMP: Comp = Comp::Comp1;
const COMP_INTERVAL: u32 = 10;

static HITS: AtomicU32 = AtomicU32::new(0);

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

    let rtc = Rtc::new(p.RTC);
    rtc.deinit();
    rtc.set_prescaler(PRESCALER);
    rtc.set_comp_value(COMP, COMP_INTERVAL);
    rtc.interrupt_config(rtc::int::comp(COMP as u8), true);

    Nvic::new(p.NVIC).init(&NvicInit {
        channel: Interrupt::RTC,
        priority: 3,
        enable: true,
    });

    rtc.nv_cmd(true);
    rtc.reset_counter();
    rtc.cmd(true);
    // SAFETY: the handler only steals the RTC block.
    unsafe { cortex_m::interrupt::enable() };

    let mut seen = 0;
    loop {
        let hits = HITS.load(Ordering::Acquire);
        if hits != seen {
            seen = hits;
            log::info!("comparator {:?} hit #{}, counter = {}", COMP, hits, rtc.counter());
        }
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn RTC() {
    // SAFETY: register accesses here are single read-modify-writes of the comparator state.
    let rtc = Rtc::new(unsafe { peripherals::RTC::steal() });
    if rtc.interrupt_status(rtc::int::comp(COMP as u8)) {
        rtc.set_comp_value(COMP, rtc.counter().wrapping_add(COMP_INTERVAL));
        rtc.clear_comp_interrupt(COMP);
        HITS.fetch_add(1, Ordering::AcqRel);
    }
}
