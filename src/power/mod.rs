// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Power management glue.
//!
//! The power manager itself lives in ROM. [`PowerPlatform`] is the seam through which the
//! [`dlps`] sequencer asks it for the current mode, records the reset reason and registers
//! the store/restore stage callbacks and the pre-sleep checks.

pub mod dlps;

pub use dlps::{clock_check, 
    register, register_user_enter_cb, register_user_exit_cb, Blocks, CpuStore, Dlps, DlpsConfig,
};

/// Low power mode selected by the power manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    PowerDown = 1,
    Dlps = 2,
    Active = 3,
}

/// Reason recorded for the next boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    Hw,
    PowerDown,
    Dlps,
}

/// Verdict of a pre-sleep check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CheckResult {
    /// Not now, run the whole check flow again.
    Pend = 0,
    /// Stay awake, the core only sleeps with `wfi`.
    Fail = 1,
    /// Go on with the next registered check.
    Pass = 2,
}

/// Point in the low power transition at which a stage callback runs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerStage {
    /// Before the core loses power.
    Store,
    /// After wakeup, before application code resumes.
    Restore,
}

/// Services provided by the ROM power manager.
pub trait PowerPlatform {
    fn power_mode(&self) -> PowerMode;

    fn set_reset_reason(&self, reason: ResetReason);

    /// Clear the latched pad wakeup debounce state.
    fn clear_wakeup_debounce(&self);

    fn register_stage(&self, stage: PowerStage, callback: fn());

    /// ROM verdict on whether the current clock tree allows DLPS.
    fn clock_check(&self) -> CheckResult {
        CheckResult::Pass
    }

    /// Add `check` to the list consulted before every DLPS entry.
    fn register_check(&self, _check: fn() -> CheckResult) {}
}
