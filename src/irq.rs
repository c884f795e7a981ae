// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Interrupt numbers and the device vector table.
//!
//! The first five lines (`System` .. `Zigbee`) are serviced by ROM code; the DLPS sequencer
//! leaves their priorities alone.

use cortex_m::interrupt::InterruptNumber;

/// External interrupt lines of the RTL87x2G.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum Interrupt {
    System = 0,
    WDG = 1,
    RXI300 = 2,
    RXI300_SEC = 3,
    Zigbee = 4,
    BTMAC = 5,
    TIMER_A0 = 6,
    TIMER_A1 = 7,
    RTC = 8,
    GPIOA = 9,
    GPIOB = 10,
    GDMA0_Channel0 = 11,
    GDMA0_Channel1 = 12,
    GDMA0_Channel2 = 13,
    GDMA0_Channel3 = 14,
    GDMA0_Channel4 = 15,
    GDMA0_Channel5 = 16,
    GDMA0_Channel6 = 17,
    GDMA0_Channel7 = 18,
    GDMA0_Channel8 = 19,
    UART0 = 20,
    UART1 = 21,
    UART2 = 22,
    UART3 = 23,
    UART4 = 24,
    UART5 = 25,
    SPI0 = 26,
    SPI1 = 27,
    SPI_SLAVE = 28,
    I2C0 = 29,
    I2C1 = 30,
    I2C2 = 31,
    I2C3 = 32,
    I2S0_TX = 33,
    I2S0_RX = 34,
    I2S1_TX = 35,
    I2S1_RX = 36,
    CAN = 37,
    SPI3W = 38,
    CODEC = 39,
    ADC = 40,
    IR = 41,
    KEYSCAN = 42,
    ENHTIMER0 = 43,
    PF_RTC = 44,
    LPC = 45,
}

/// Number of interrupt lines covered by the NVIC enable/pending banks.
pub const IRQ_COUNT: usize = 96;

/// Lines at the bottom of the table owned by ROM.
pub const ROM_HANDLED_IRQS: usize = 5;

// SAFETY: every variant is a valid line number below `IRQ_COUNT`.
unsafe impl InterruptNumber for Interrupt {
    #[inline(always)]
    fn number(self) -> u16 {
        self as u16
    }
}

impl Interrupt {
    /// GDMA channel interrupt for `channel` (0..=8).
    pub const fn gdma_channel(channel: u8) -> Option<Self> {
        use Interrupt::*;
        Some(match channel {
            0 => GDMA0_Channel0,
            1 => GDMA0_Channel1,
            2 => GDMA0_Channel2,
            3 => GDMA0_Channel3,
            4 => GDMA0_Channel4,
            5 => GDMA0_Channel5,
            6 => GDMA0_Channel6,
            7 => GDMA0_Channel7,
            8 => GDMA0_Channel8,
            _ => return None,
        })
    }
}

#[cfg(feature = "rt")]
mod vectors {
    extern "C" {
        fn System();
        fn WDG();
        fn RXI300();
        fn RXI300_SEC();
        fn Zigbee();
        fn BTMAC();
        fn TIMER_A0();
        fn TIMER_A1();
        fn RTC();
        fn GPIOA();
        fn GPIOB();
        fn GDMA0_Channel0();
        fn GDMA0_Channel1();
        fn GDMA0_Channel2();
        fn GDMA0_Channel3();
        fn GDMA0_Channel4();
        fn GDMA0_Channel5();
        fn GDMA0_Channel6();
        fn GDMA0_Channel7();
        fn GDMA0_Channel8();
        fn UART0();
        fn UART1();
        fn UART2();
        fn UART3();
        fn UART4();
        fn UART5();
        fn SPI0();
        fn SPI1();
        fn SPI_SLAVE();
        fn I2C0();
        fn I2C1();
        fn I2C2();
        fn I2C3();
        fn I2S0_TX();
        fn I2S0_RX();
        fn I2S1_TX();
        fn I2S1_RX();
        fn CAN();
        fn SPI3W();
        fn CODEC();
        fn ADC();
        fn IR();
        fn KEYSCAN();
        fn ENHTIMER0();
        fn PF_RTC();
        fn LPC();
    }

    #[doc(hidden)]
    pub union Vector {
        _handler: unsafe extern "C" fn(),
        _reserved: u32,
    }

    #[doc(hidden)]
    #[link_section = ".vector_table.interrupts"]
    #[no_mangle]
    pub static __INTERRUPTS: [Vector; 46] = [
        Vector { _handler: System },
        Vector { _handler: WDG },
        Vector { _handler: RXI300 },
        Vector { _handler: RXI300_SEC },
        Vector { _handler: Zigbee },
        Vector { _handler: BTMAC },
        Vector { _handler: TIMER_A0 },
        Vector { _handler: TIMER_A1 },
        Vector { _handler: RTC },
        Vector { _handler: GPIOA },
        Vector { _handler: GPIOB },
        Vector { _handler: GDMA0_Channel0 },
        Vector { _handler: GDMA0_Channel1 },
        Vector { _handler: GDMA0_Channel2 },
        Vector { _handler: GDMA0_Channel3 },
        Vector { _handler: GDMA0_Channel4 },
        Vector { _handler: GDMA0_Channel5 },
        Vector { _handler: GDMA0_Channel6 },
        Vector { _handler: GDMA0_Channel7 },
        Vector { _handler: GDMA0_Channel8 },
        Vector { _handler: UART0 },
        Vector { _handler: UART1 },
        Vector { _handler: UART2 },
        Vector { _handler: UART3 },
        Vector { _handler: UART4 },
        Vector { _handler: UART5 },
        Vector { _handler: SPI0 },
        Vector { _handler: SPI1 },
        Vector { _handler: SPI_SLAVE },
        Vector { _handler: I2C0 },
        Vector { _handler: I2C1 },
        Vector { _handler: I2C2 },
        Vector { _handler: I2C3 },
        Vector { _handler: I2S0_TX },
        Vector { _handler: I2S0_RX },
        Vector { _handler: I2S1_TX },
        Vector { _handler: I2S1_RX },
        Vector { _handler: CAN },
        Vector { _handler: SPI3W },
        Vector { _handler: CODEC },
        Vector { _handler: ADC },
        Vector { _handler: IR },
        Vector { _handler: KEYSCAN },
        Vector { _handler: ENHTIMER0 },
        Vector { _handler: PF_RTC },
        Vector { _handler: LPC },
    ];
}
