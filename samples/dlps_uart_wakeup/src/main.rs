//! Enter DLPS between bursts of UART3 traffic and wake up on the RX pad.
//!
//! The board glue below plays the power manager: it records the reset reason in the RTC
//! backup register and runs the sequencer's store and restore stages around `wfi`. Before
//! sleeping the RX pin P3_1 is handed to software control and armed as a low-level wakeup
//! source; on exit it goes back to the UART.

#![no_main]
#![no_std]

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};

use cortex_m_rt::entry;
use critical_section::Mutex;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        pinmux::{
            Function, PadConfig, PadMode, Pin, PullMode, WakeupPolarity, P2_0, P3_0, P3_1,
        },
        rcc::Periph,
        uart, Pad, Pinmux, Rcc, Rtc, Uart,
    },
    interrupt, logger, peripherals,
    power::{self, DlpsConfig, PowerMode, PowerPlatform, PowerStage, ResetReason},
    Peripherals,
};

const RX_PIN: Pin = P3_1;
/// Empty polls of the RX FIFO before going to sleep.
const IDLE_POLLS: u32 = 200_000;

struct Board {
    mode: AtomicU8,
    store: Mutex<Cell<Option<fn()>>>,
    restore: Mutex<Cell<Option<fn()>>>,
}

static BOARD: Board = Board {
    mode: AtomicU8::new(PowerMode::Active as u8),
    store: Mutex::new(Cell::new(None)),
    restore: Mutex::new(Cell::new(None)),
};

impl Board {
    fn sleep(&self) {
        let store = critical_section::with(|cs| self.store.borrow(cs).get());
        let restore = critical_section::with(|cs| self.restore.borrow(cs).get());

        self.mode.store(PowerMode::Dlps as u8, Ordering::Release);
        if let Some(cb) = store {
            cb();
        }
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        if let Some(cb) = restore {
            cb();
        }
        self.mode.store(PowerMode::Active as u8, Ordering::Release);
    }
}

impl PowerPlatform for Board {
    fn power_mode(&self) -> PowerMode {
        match self.mode.load(Ordering::Acquire) {
            1 => PowerMode::PowerDown,
            2 => PowerMode::Dlps,
            _ => PowerMode::Active,
        }
    }

    fn set_reset_reason(&self, reason: ResetReason) {
        // SAFETY: the backup register is not used anywhere else.
        let rtc = Rtc::new(unsafe { peripherals::RTC::steal() });
        rtc.write_backup_reg(reason as u32);
    }

    fn clear_wakeup_debounce(&self) {
        // SAFETY: debounce clear is a single write-one bit.
        let pad = Pad::new(unsafe { peripherals::PAD::steal() });
        pad.clear_wakeup_debounce();
    }

    fn register_stage(&self, stage: PowerStage, callback: fn()) {
        critical_section::with(|cs| match stage {
            PowerStage::Store => self.store.borrow(cs).set(Some(callback)),
            PowerStage::Restore => self.restore.borrow(cs).set(Some(callback)),
        });
    }
}

fn enter_cb() {
    // SAFETY: runs inside the store stage with interrupts masked.
    let pad = Pad::new(unsafe { peripherals::PAD::steal() });
    pad.set_control_mode(RX_PIN, PadMode::Software);
    pad.wakeup_enable(RX_PIN, WakeupPolarity::Low, false);
}

fn exit_cb() {
    // SAFETY: runs inside the restore stage with interrupts masked.
    let pad = Pad::new(unsafe { peripherals::PAD::steal() });
    pad.set_control_mode(RX_PIN, PadMode::Pinmux);
    pad.wakeup_disable(RX_PIN);
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

    let rtc = Rtc::new(p.RTC);
    log::info!("last reset reason: {}", rtc.read_backup_reg());

    let pad_cfg = PadConfig {
        pull: PullMode::Up,
        output_high: true,
        ..Default::default()
    };
    pad.config(P3_0, &pad_cfg);
    pad.config(RX_PIN, &pad_cfg);
    pinmux.config(P3_0, Function::UART3_TX);
    pinmux.config(RX_PIN, Function::UART3_RX);

    rcc.periph_clock_cmd(Periph::Uart3, true);
    let mut serial = Uart::new(p.UART3, &uart::Config::default());
    serial.println("### DLPS uart wakeup sample ###").ok();

    let mut config = DlpsConfig::default();
    config.uart[0] = true;
    config.uart[3] = true;
    power::register(&BOARD, config);
    if !(power::register_user_enter_cb(enter_cb) && power::register_user_exit_cb(exit_cb)) {
        log::error!("dlps callbacks not installed");
    }

    // SAFETY: the only handler is the wakeup pad clear below.
    unsafe { cortex_m::interrupt::enable() };

    let mut idle = 0;
    loop {
        if serial.flag_status(uart::flag::RX_DATA_AVA) {
            idle = 0;
            let b = serial.receive_byte();
            serial.write_byte(b).ok();
            continue;
        }
        idle += 1;
        if idle >= IDLE_POLLS {
            idle = 0;
            serial.flush().ok();
            log::info!("enter dlps");
            log::logger().flush();
            BOARD.sleep();
            log::info!("exit dlps");
        }
    }
}

#[interrupt]
fn System() {
    // SAFETY: only the wakeup status bit of the RX pad is touched.
    let pad = Pad::new(unsafe { peripherals::PAD::steal() });
    if pad.wakeup_int_status(RX_PIN) {
        pad.clear_wakeup_int_pending(RX_PIN);
    }
}
