// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! `log` backend printing over one of the UARTs.
//!
//! ```ignore
//! let uart = Uart::new(p.UART0, &uart::Config::default());
//! rtl87x2g_bsp::logger::init(uart, log::LevelFilter::Info).ok();
//! log::info!("hello");
//! ```
//!
//! Records are written as `LEVEL target: message\r\n` with the TX path blocking, from
//! inside a critical section.

use core::{cell::RefCell, fmt::Write, ops::Deref};

use critical_section::Mutex;

use crate::hw::{uart, Uart};
use crate::peripherals as p;

/// A UART register block the logger may keep for the rest of the program.
pub struct Port(&'static uart::RegisterBlock);

// SAFETY: the block is MMIO and only touched from inside the logger's critical section.
unsafe impl Send for Port {}

impl Deref for Port {
    type Target = uart::RegisterBlock;

    fn deref(&self) -> &uart::RegisterBlock {
        self.0
    }
}

macro_rules! port_from {
    ($($name:ident),*) => {
        $(
            impl From<p::$name> for Port {
                fn from(_: p::$name) -> Self {
                    // SAFETY: the handle is consumed, the address is fixed.
                    Port(unsafe { &*p::$name::ptr() })
                }
            }
        )*
    };
}

port_from!(UART0, UART1, UART2, UART3, UART4, UART5);

struct UartLogger {
    uart: Mutex<RefCell<Option<Uart<Port>>>>,
}

static LOGGER: UartLogger = UartLogger {
    uart: Mutex::new(RefCell::new(None)),
};

/// Install the logger on an initialized UART.
pub fn init<P>(uart: Uart<P>, level: log::LevelFilter) -> Result<(), log::SetLoggerError>
where
    P: Deref<Target = uart::RegisterBlock> + Into<Port>,
{
    let uart = Uart::wrap(uart.free().into());
    critical_section::with(|cs| {
        LOGGER.uart.borrow_ref_mut(cs).replace(uart);
    });
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Take the UART back, e.g. before entering DLPS with it powered off.
pub fn release() -> Option<Uart<Port>> {
    critical_section::with(|cs| LOGGER.uart.borrow_ref_mut(cs).take())
}

impl log::Log for UartLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        // Filtered by `log` already
        true
    }

    fn log(&self, record: &log::Record) {
        critical_section::with(|cs| {
            if let Some(uart) = self.uart.borrow_ref_mut(cs).as_mut() {
                let _ = write!(
                    uart,
                    "{} {}: {}\r\n",
                    record.level(),
                    record.target(),
                    record.args()
                );
            }
        });
    }

    fn flush(&self) {
        critical_section::with(|cs| {
            if let Some(uart) = self.uart.borrow_ref_mut(cs).as_mut() {
                let _ = uart.flush();
            }
        });
    }
}
