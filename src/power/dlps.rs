// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! DLPS register context save/restore.
//!
//! Entering DLPS powers down the core and every peripheral outside the AON domain. The
//! sequencer snapshots the NVIC, the SoC vendor interrupt routing, the pinmux and each
//! peripheral selected in [`DlpsConfig`], then puts them back on wakeup.
//!
//! Order on enter:
//!
//! 1. clear pad wakeup interrupts and the wakeup debounce
//! 2. disable the `System` interrupt
//! 3. store ISER, ISPR, IPR and the vendor low priority routing
//! 4. store the pinmux, run the user enter callback, store peripherals
//! 5. record the reset reason (DLPS and power down only)
//!
//! Exit runs the mirror image and reports interrupts that fired while asleep. [`register`]
//! also hooks [`clock_check`] into the pre-sleep checks.

use core::cell::RefCell;

use critical_section::Mutex;
use tock_registers::interfaces::{Readable, Writeable};

use super::{CheckResult, PowerMode, PowerPlatform, PowerStage, ResetReason};
use crate::hw::{i2c, nvic, pinmux, spi, spi3w, uart, Nvic, Pad};
use crate::irq::{Interrupt, IRQ_COUNT, ROM_HANDLED_IRQS};
use crate::peripherals as p;

/// Number of 32-bit ISER/ISPR words covering [`IRQ_COUNT`].
pub const IRQ_WORDS: usize = IRQ_COUNT.div_ceil(32);

/// Priority the `System` interrupt is given back on wakeup.
pub const SYSTEM_IRQ_PRIORITY: u8 = 3;

/// Peripherals whose registers are kept across DLPS.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DlpsConfig {
    pub i2c: [bool; 4],
    pub spi0: bool,
    pub spi1: bool,
    pub spi_slave: bool,
    pub spi3w: bool,
    pub uart: [bool; 6],
}

impl DlpsConfig {
    pub const ALL: Self = Self {
        i2c: [true; 4],
        spi0: true,
        spi1: true,
        spi_slave: true,
        spi3w: true,
        uart: [true; 6],
    };

    fn spi(&self) -> [bool; 3] {
        [self.spi0, self.spi1, self.spi_slave]
    }
}

/// Register blocks touched by the sequencer.
pub struct Blocks<'a> {
    pub nvic: &'a nvic::RegisterBlock,
    pub vendor: &'a nvic::VendorRegisterBlock,
    pub pad: &'a pinmux::PadRegisterBlock,
    pub pinmux: &'a pinmux::RegisterBlock,
    pub i2c: [&'a i2c::RegisterBlock; 4],
    /// SPI0, SPI1, SPI slave.
    pub spi: [&'a spi::RegisterBlock; 3],
    pub spi3w: &'a spi3w::RegisterBlock,
    pub uart: [&'a uart::RegisterBlock; 6],
}

impl Blocks<'static> {
    /// The blocks at their SoC addresses.
    pub fn hardware() -> Self {
        // SAFETY: fixed MMIO addresses; the sequencer runs with interrupts off.
        unsafe {
            Self {
                nvic: &*p::NVIC::ptr(),
                vendor: &*p::SOC_VENDOR::ptr(),
                pad: &*p::PAD::ptr(),
                pinmux: &*p::PINMUX::ptr(),
                i2c: [
                    &*p::I2C0::ptr(),
                    &*p::I2C1::ptr(),
                    &*p::I2C2::ptr(),
                    &*p::I2C3::ptr(),
                ],
                spi: [&*p::SPI0::ptr(), &*p::SPI1::ptr(), &*p::SPI_SLAVE::ptr()],
                spi3w: &*p::SPI3W::ptr(),
                uart: [
                    &*p::UART0::ptr(),
                    &*p::UART1::ptr(),
                    &*p::UART2::ptr(),
                    &*p::UART3::ptr(),
                    &*p::UART4::ptr(),
                    &*p::UART5::ptr(),
                ],
            }
        }
    }
}

/// NVIC and vendor interrupt state.
#[derive(Copy, Clone, Debug)]
pub struct CpuStore {
    pub iser: [u32; IRQ_WORDS],
    pub ispr: [u32; IRQ_WORDS],
    /// Priorities of the lines not serviced by ROM.
    pub ipr: [u8; IRQ_COUNT - ROM_HANDLED_IRQS],
    pub low_pri_int_mode: u32,
    pub low_pri_int_en: u32,
}

impl Default for CpuStore {
    fn default() -> Self {
        Self {
            iser: [0; IRQ_WORDS],
            ispr: [0; IRQ_WORDS],
            ipr: [0; IRQ_COUNT - ROM_HANDLED_IRQS],
            low_pri_int_mode: 0,
            low_pri_int_en: 0,
        }
    }
}

impl CpuStore {
    pub fn save(nvic: &nvic::RegisterBlock, vendor: &nvic::VendorRegisterBlock) -> Self {
        let mut store = Self::default();
        for i in 0..IRQ_WORDS {
            store.iser[i] = nvic.iser[i].get();
            store.ispr[i] = nvic.ispr[i].get();
        }
        for (b, reg) in store.ipr.iter_mut().zip(&nvic.ipr[ROM_HANDLED_IRQS..IRQ_COUNT]) {
            *b = reg.get();
        }
        store.low_pri_int_mode = vendor.low_pri_int_mode.get();
        store.low_pri_int_en = vendor.low_pri_int_en.get();
        store
    }

    /// Pending state is left to hardware.
    pub fn restore(&self, nvic: &nvic::RegisterBlock, vendor: &nvic::VendorRegisterBlock) {
        vendor.low_pri_int_mode.set(self.low_pri_int_mode);
        vendor.low_pri_int_en.set(self.low_pri_int_en);
        for (reg, &b) in nvic.ipr[ROM_HANDLED_IRQS..IRQ_COUNT].iter().zip(self.ipr.iter()) {
            reg.set(b);
        }
        for i in 0..IRQ_WORDS {
            nvic.iser[i].set(self.iser[i]);
        }
    }

    /// Enabled lines that were already pending when the context was stored.
    pub fn missed(&self) -> [u32; IRQ_WORDS] {
        let mut out = [0; IRQ_WORDS];
        for (o, (e, p)) in out.iter_mut().zip(self.iser.iter().zip(self.ispr.iter())) {
            *o = e & p;
        }
        out
    }
}

/// Sequencer state: the stored contexts and the user callbacks.
pub struct Dlps {
    config: DlpsConfig,
    cpu: CpuStore,
    pinmux: Option<pinmux::DlpsStore>,
    i2c: [Option<i2c::DlpsStore>; 4],
    spi: [Option<spi::DlpsStore>; 3],
    spi3w: Option<spi3w::DlpsStore>,
    uart: [Option<uart::DlpsStore>; 6],
    user_enter: Option<fn()>,
    user_exit: Option<fn()>,
}

impl Dlps {
    pub const fn new(config: DlpsConfig) -> Self {
        Self {
            config,
            cpu: CpuStore {
                iser: [0; IRQ_WORDS],
                ispr: [0; IRQ_WORDS],
                ipr: [0; IRQ_COUNT - ROM_HANDLED_IRQS],
                low_pri_int_mode: 0,
                low_pri_int_en: 0,
            },
            pinmux: None,
            i2c: [None; 4],
            spi: [None; 3],
            spi3w: None,
            uart: [None; 6],
            user_enter: None,
            user_exit: None,
        }
    }

    pub fn config(&self) -> &DlpsConfig {
        &self.config
    }

    pub fn cpu(&self) -> &CpuStore {
        &self.cpu
    }

    pub fn set_user_enter_cb(&mut self, cb: fn()) {
        self.user_enter = Some(cb);
    }

    pub fn set_user_exit_cb(&mut self, cb: fn()) {
        self.user_exit = Some(cb);
    }

    /// Store stage.
    pub fn enter(&mut self, platform: &dyn PowerPlatform, blocks: &Blocks<'_>) {
        Pad::new(blocks.pad).clear_all_wakeup_int();
        platform.clear_wakeup_debounce();
        Nvic::new(blocks.nvic).disable(Interrupt::System);

        self.cpu = CpuStore::save(blocks.nvic, blocks.vendor);
        self.pinmux = Some(pinmux::DlpsStore::save(blocks.pinmux));

        if let Some(cb) = self.user_enter {
            cb();
        }

        for (i, regs) in blocks.i2c.iter().enumerate() {
            if self.config.i2c[i] {
                self.i2c[i] = Some(i2c::DlpsStore::save(regs));
            }
        }
        for (i, (regs, on)) in blocks.spi.iter().zip(self.config.spi()).enumerate() {
            if on {
                self.spi[i] = Some(spi::DlpsStore::save(regs));
            }
        }
        if self.config.spi3w {
            self.spi3w = Some(spi3w::DlpsStore::save(blocks.spi3w));
        }
        for (i, regs) in blocks.uart.iter().enumerate() {
            if self.config.uart[i] {
                self.uart[i] = Some(uart::DlpsStore::save(regs));
            }
        }

        match platform.power_mode() {
            PowerMode::PowerDown => platform.set_reset_reason(ResetReason::PowerDown),
            PowerMode::Dlps => platform.set_reset_reason(ResetReason::Dlps),
            PowerMode::Active => {}
        }
        trace!("dlps enter");
    }

    /// Restore stage.
    ///
    /// Returns the enabled lines that were pending on enter (`ISER & ISPR`). When any is set
    /// the raw ISPR words are logged.
    pub fn exit(&mut self, platform: &dyn PowerPlatform, blocks: &Blocks<'_>) -> [u32; IRQ_WORDS] {
        if platform.power_mode() == PowerMode::Dlps {
            platform.set_reset_reason(ResetReason::Hw);
        }

        if let Some(store) = &self.pinmux {
            store.restore(blocks.pinmux);
        }
        for (store, regs) in self.i2c.iter().zip(blocks.i2c.iter()) {
            if let Some(store) = store {
                store.restore(regs);
            }
        }
        for (store, regs) in self.spi.iter().zip(blocks.spi.iter()) {
            if let Some(store) = store {
                store.restore(regs);
            }
        }
        if let Some(store) = &self.spi3w {
            store.restore(blocks.spi3w);
        }
        for (store, regs) in self.uart.iter().zip(blocks.uart.iter()) {
            if let Some(store) = store {
                store.restore(regs);
            }
        }

        if let Some(cb) = self.user_exit {
            cb();
        }

        let nvic = Nvic::new(blocks.nvic);
        nvic.set_priority(Interrupt::System, SYSTEM_IRQ_PRIORITY);
        nvic.enable(Interrupt::System);
        self.cpu.restore(blocks.nvic, blocks.vendor);

        let missed = self.cpu.missed();
        if missed.iter().any(|&w| w != 0) {
            let ispr = &self.cpu.ispr;
            warn!("miss interrupt: pending {:#x} {:#x} {:#x}", ispr[0], ispr[1], ispr[2]);
        }
        trace!("dlps exit");
        missed
    }
}

struct Installed {
    platform: &'static (dyn PowerPlatform + Sync),
    dlps: Dlps,
}

static DLPS: Mutex<RefCell<Option<Installed>>> = Mutex::new(RefCell::new(None));

fn store_stage() {
    critical_section::with(|cs| {
        if let Some(inst) = DLPS.borrow_ref_mut(cs).as_mut() {
            inst.dlps.enter(inst.platform, &Blocks::hardware());
        }
    });
}

fn restore_stage() {
    critical_section::with(|cs| {
        if let Some(inst) = DLPS.borrow_ref_mut(cs).as_mut() {
            inst.dlps.exit(inst.platform, &Blocks::hardware());
        }
    });
}

/// Pre-sleep check forwarding to the installed platform's clock check.
///
/// Passes when [`register`] has not been called yet.
pub fn clock_check() -> CheckResult {
    let platform = critical_section::with(|cs| DLPS.borrow_ref(cs).as_ref().map(|i| i.platform));
    match platform {
        Some(platform) => platform.clock_check(),
        None => CheckResult::Pass,
    }
}

/// Install the sequencer and hook its stages into the power manager.
///
/// Calling it again replaces the configuration and drops any registered user callbacks.
pub fn register(platform: &'static (dyn PowerPlatform + Sync), config: DlpsConfig) {
    critical_section::with(|cs| {
        DLPS.borrow_ref_mut(cs).replace(Installed { platform, dlps: Dlps::new(config) });
    });
    platform.register_stage(PowerStage::Store, store_stage);
    platform.register_stage(PowerStage::Restore, restore_stage);
    platform.register_check(clock_check);
    debug!("dlps registered");
}

/// Run `cb` after the pinmux store, before the peripheral stores.
///
/// Returns `false` when [`register`] has not been called yet.
pub fn register_user_enter_cb(cb: fn()) -> bool {
    critical_section::with(|cs| match DLPS.borrow_ref_mut(cs).as_mut() {
        Some(inst) => {
            inst.dlps.set_user_enter_cb(cb);
            true
        }
        None => false,
    })
}

/// Run `cb` after the peripheral restores, before interrupts come back.
///
/// Returns `false` when [`register`] has not been called yet.
pub fn register_user_exit_cb(cb: fn()) -> bool {
    critical_section::with(|cs| match DLPS.borrow_ref_mut(cs).as_mut() {
        Some(inst) => {
            inst.dlps.set_user_exit_cb(cb);
            true
        }
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use core::cell::Cell;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    struct FakePlatform {
        mode: PowerMode,
        reason: Cell<Option<ResetReason>>,
        debounce_cleared: Cell<bool>,
        stages: Cell<u32>,
    }

    impl FakePlatform {
        fn new(mode: PowerMode) -> Self {
            Self {
                mode,
                reason: Cell::new(None),
                debounce_cleared: Cell::new(false),
                stages: Cell::new(0),
            }
        }
    }

    impl PowerPlatform for FakePlatform {
        fn power_mode(&self) -> PowerMode {
            self.mode
        }

        fn set_reset_reason(&self, reason: ResetReason) {
            self.reason.set(Some(reason));
        }

        fn clear_wakeup_debounce(&self) {
            self.debounce_cleared.set(true);
        }

        fn register_stage(&self, _stage: PowerStage, _callback: fn()) {
            self.stages.set(self.stages.get() + 1);
        }
    }

    fn blocks() -> Blocks<'static> {
        Blocks {
            nvic: testutil::regs(),
            vendor: testutil::regs(),
            pad: testutil::regs(),
            pinmux: testutil::regs(),
            i2c: [testutil::regs(), testutil::regs(), testutil::regs(), testutil::regs()],
            spi: [testutil::regs(), testutil::regs(), testutil::regs()],
            spi3w: testutil::regs(),
            uart: [
                testutil::regs(),
                testutil::regs(),
                testutil::regs(),
                testutil::regs(),
                testutil::regs(),
                testutil::regs(),
            ],
        }
    }

    #[test]
    fn enter_records_reset_reason_by_mode() {
        let b = blocks();

        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig::default());
        dlps.enter(&platform, &b);
        assert_eq!(platform.reason.get(), Some(ResetReason::Dlps));
        assert!(platform.debounce_cleared.get());

        let platform = FakePlatform::new(PowerMode::PowerDown);
        dlps.enter(&platform, &b);
        assert_eq!(platform.reason.get(), Some(ResetReason::PowerDown));
    }

    #[test]
    fn active_mode_leaves_reset_reason_alone() {
        let b = blocks();
        let platform = FakePlatform::new(PowerMode::Active);
        let mut dlps = Dlps::new(DlpsConfig::default());

        dlps.enter(&platform, &b);
        assert_eq!(platform.reason.get(), None);
        dlps.exit(&platform, &b);
        assert_eq!(platform.reason.get(), None);
    }

    #[test]
    fn cpu_context_survives_a_wipe() {
        let b = blocks();
        b.nvic.iser[0].set(0x0000_0F20);
        b.nvic.iser[2].set(0x8000_0000);
        b.nvic.ipr[4].set(0xE0);
        b.nvic.ipr[20].set(0x40);
        b.vendor.low_pri_int_mode.set(0x11);
        b.vendor.low_pri_int_en.set(0x22);

        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig::default());
        dlps.enter(&platform, &b);

        b.nvic.iser.iter().for_each(|r| r.set(0));
        b.nvic.ipr.iter().for_each(|r| r.set(0));
        b.vendor.low_pri_int_mode.set(0);
        b.vendor.low_pri_int_en.set(0);

        let missed = dlps.exit(&platform, &b);

        assert_eq!(missed, [0; IRQ_WORDS]);
        assert_eq!(platform.reason.get(), Some(ResetReason::Hw));
        assert_eq!(b.nvic.iser[0].get(), 0x0000_0F20);
        assert_eq!(b.nvic.iser[2].get(), 0x8000_0000);
        assert_eq!(b.nvic.ipr[20].get(), 0x40);
        // ROM-serviced lines keep whatever ROM programmed, only System gets priority 3.
        assert_eq!(b.nvic.ipr[4].get(), 0);
        assert_eq!(b.nvic.ipr[0].get(), SYSTEM_IRQ_PRIORITY << 5);
        assert_eq!(b.vendor.low_pri_int_mode.get(), 0x11);
        assert_eq!(b.vendor.low_pri_int_en.get(), 0x22);
    }

    #[test]
    fn pending_enabled_lines_are_reported() {
        let b = blocks();
        b.nvic.iser[1].set(1 << 3);
        b.nvic.ispr[1].set((1 << 3) | (1 << 4));

        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig::default());
        dlps.enter(&platform, &b);
        b.nvic.ispr[1].set(0);

        let missed = dlps.exit(&platform, &b);
        assert_eq!(missed, [0, 1 << 3, 0]);
        // The raw pending words stay available for the log line.
        assert_eq!(dlps.cpu().ispr, [0, (1 << 3) | (1 << 4), 0]);
        // ISPR is never written back.
        assert_eq!(b.nvic.ispr[1].get(), 0);
    }

    #[test]
    fn pending_but_disabled_lines_are_not_missed() {
        let b = blocks();
        b.nvic.iser[0].set(1 << 1);
        b.nvic.ispr[0].set(1 << 2);

        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig::default());
        dlps.enter(&platform, &b);

        assert_eq!(dlps.exit(&platform, &b), [0; IRQ_WORDS]);
        assert_eq!(dlps.cpu().ispr[0], 1 << 2);
    }

    #[test]
    fn only_selected_peripherals_are_restored() {
        let b = blocks();
        b.spi3w.cfgr.set(0x18);
        b.pinmux.cfg[3].set(0x1B1A_1918);

        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig { spi3w: true, ..Default::default() });
        dlps.enter(&platform, &b);

        b.spi3w.cfgr.set(0);
        b.pinmux.cfg[3].set(0);
        b.i2c[0].con.set(0x55);
        dlps.exit(&platform, &b);

        assert_eq!(b.spi3w.cfgr.get(), 0x18);
        assert_eq!(b.pinmux.cfg[3].get(), 0x1B1A_1918);
        assert_eq!(b.i2c[0].con.get(), 0x55);
    }

    static CALLS: AtomicU32 = AtomicU32::new(0);

    #[test]
    fn user_callbacks_run_once_per_stage() {
        let b = blocks();
        let platform = FakePlatform::new(PowerMode::Dlps);
        let mut dlps = Dlps::new(DlpsConfig::default());
        dlps.set_user_enter_cb(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });
        dlps.set_user_exit_cb(|| {
            CALLS.fetch_add(10, Ordering::SeqCst);
        });

        dlps.enter(&platform, &b);
        dlps.exit(&platform, &b);

        assert_eq!(CALLS.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn register_hooks_both_stages() {
        struct SyncPlatform;

        impl PowerPlatform for SyncPlatform {
            fn power_mode(&self) -> PowerMode {
                PowerMode::Active
            }
            fn set_reset_reason(&self, _reason: ResetReason) {}
            fn clear_wakeup_debounce(&self) {}
            fn register_stage(&self, _stage: PowerStage, _callback: fn()) {
                STAGES.fetch_add(1, Ordering::SeqCst);
            }
            fn clock_check(&self) -> CheckResult {
                CheckResult::Fail
            }
            fn register_check(&self, check: fn() -> CheckResult) {
                CHECK.store(check as usize, Ordering::SeqCst);
            }
        }

        static STAGES: AtomicU32 = AtomicU32::new(0);
        static CHECK: AtomicUsize = AtomicUsize::new(0);
        static PLATFORM: SyncPlatform = SyncPlatform;

        register(&PLATFORM, DlpsConfig::ALL);
        assert_eq!(STAGES.load(Ordering::SeqCst), 2);
        assert_eq!(CHECK.load(Ordering::SeqCst), (clock_check as fn() -> CheckResult) as usize);
        assert_eq!(clock_check(), CheckResult::Fail);
        assert!(register_user_enter_cb(|| {}));
        assert!(register_user_exit_cb(|| {}));
    }
}
