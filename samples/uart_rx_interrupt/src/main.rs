//! Receive on UART3 from the interrupt handler and echo whole chunks back from the main loop.
//!
//! The handler drains the RX FIFO on `RD_AVA`/RX timeout and flags the main loop once the
//! line has been idle for a while.

#![no_main]
#![no_std]

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m_rt::entry;
use critical_section::Mutex;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        nvic::NvicInit,
        pinmux::{Function, PadConfig, PullMode, P3_0, P3_1},
        rcc::Periph,
        uart::{self, InterruptId},
        Nvic, Pad, Pinmux, Rcc, Uart,
    },
    interrupt,
    peripherals::UART3,
    Interrupt, Peripherals,
};

const BUF_LEN: usize = 256;

struct RxBuf {
    data: [u8; BUF_LEN],
    len: usize,
}

static SERIAL: Mutex<RefCell<Option<Uart<UART3>>>> = Mutex::new(RefCell::new(None));
static RX: Mutex<RefCell<RxBuf>> = Mutex::new(RefCell::new(RxBuf { data: [0; BUF_LEN], len: 0 }));
static RX_READY: AtomicBool = AtomicBool::new(false);

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
    let cfg = uart::Config {
        rx_trigger: uart::RxTrigger::Byte14,
        idle_time: uart::IdleTime::Byte16,
        ..Default::default()
    };
    let mut serial = Uart::new(p.UART3, &cfg);
    serial.println("### Uart interrupt sample ###").ok();

    serial.interrupt_config(uart::int::RD_AVA | uart::int::RX_IDLE, true);
    serial.rx_idle_cmd(true);
    critical_section::with(|cs| SERIAL.borrow_ref_mut(cs).replace(serial));

    Nvic::new(p.NVIC).init(&NvicInit {
        channel: Interrupt::UART3,
        priority: 3,
        enable: true,
    });
    // SAFETY: all shared state is set up.
    unsafe { cortex_m::interrupt::enable() };

    let mut chunk = [0u8; BUF_LEN];
    loop {
        if !RX_READY.swap(false, Ordering::AcqRel) {
            cortex_m::asm::wfi();
            continue;
        }
        let n = critical_section::with(|cs| {
            let mut rx = RX.borrow_ref_mut(cs);
            let n = rx.len;
            chunk[..n].copy_from_slice(&rx.data[..n]);
            rx.len = 0;
            n
        });
        critical_section::with(|cs| {
            if let Some(serial) = SERIAL.borrow_ref_mut(cs).as_mut() {
                for &b in &chunk[..n] {
                    serial.write_byte(b).ok();
                }
            }
        });
    }
}

fn drain(serial: &Uart<UART3>, rx: &mut RxBuf) {
    let n = serial.rx_fifo_len() as usize;
    for _ in 0..n {
        let b = serial.receive_byte();
        if rx.len < BUF_LEN {
            rx.data[rx.len] = b;
            rx.len += 1;
        }
    }
}

#[interrupt]
fn UART3() {
    critical_section::with(|cs| {
        let serial = SERIAL.borrow_ref(cs);
        let Some(serial) = serial.as_ref() else {
            return;
        };
        let mut rx = RX.borrow_ref_mut(cs);

        if serial.flag_status(uart::flag::RX_IDLE) {
            serial.interrupt_config(uart::int::RX_IDLE, false);
            drain(serial, &mut rx);
            serial.rx_idle_cmd(false);
            serial.rx_idle_cmd(true);
            serial.interrupt_config(uart::int::RX_IDLE, true);
            RX_READY.store(true, Ordering::Release);
        }

        match serial.interrupt_id() {
            Some(InterruptId::RxLevelReached) | Some(InterruptId::RxDataTimeout) => {
                drain(serial, &mut rx);
            }
            Some(InterruptId::LineStatus) => {
                let _ = serial.line_status();
            }
            _ => {}
        }
    });
}
