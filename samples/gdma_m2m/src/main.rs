//! Memory-to-memory copies on GDMA channel 0.
//!
//! First a single block finishing through the channel interrupt, then the same data split
//! over a three-item linked list and polled to completion.

#![no_main]
#![no_std]

use core::sync::atomic::{compiler_fence, AtomicBool, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        gdma::{self, Lli, MultiBlockMode},
        nvic::NvicInit,
        pinmux::{Function, PadConfig, P2_0},
        rcc::Periph,
        uart, Gdma, Nvic, Pad, Pinmux, Rcc, Uart,
    },
    interrupt, logger,
    peripherals::GDMA,
    Interrupt, Peripherals,
};

const CHANNEL: u8 = 0;
const LEN: usize = 200;
const BLOCKS: usize = 3;
const BLOCK_LEN: usize = 64;

static DONE: AtomicBool = AtomicBool::new(false);

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

    let src: [u8; LEN] = core::array::from_fn(|i| i as u8);
    let mut dst = [0u8; LEN];

    rcc.periph_clock_cmd(Periph::Gdma, true);
    let dma = Gdma::new(p.GDMA);
    dma.init(&gdma::Config {
        channel: CHANNEL,
        buffer_size: LEN as u32,
        source_addr: src.as_ptr() as u32,
        destination_addr: dst.as_mut_ptr() as u32,
        source_msize: gdma::Msize::M4,
        destination_msize: gdma::Msize::M4,
        ..Default::default()
    });
    dma.interrupt_config(CHANNEL, gdma::int::TRANSFER, true);

    Nvic::new(p.NVIC).init(&NvicInit {
        channel: Interrupt::GDMA0_Channel0,
        priority: 3,
        enable: true,
    });
    // SAFETY: the handler only clears the channel interrupt and sets `DONE`.
    unsafe { cortex_m::interrupt::enable() };

    dma.cmd(CHANNEL, true);
    while !DONE.load(Ordering::Acquire) {
        cortex_m::asm::wfi();
    }
    compiler_fence(Ordering::SeqCst);
    report("single block", &src, &dst);

    // Linked list: three blocks, the last one with LLP = 0 ends the chain.
    let mut dst = [0u8; BLOCKS * BLOCK_LEN];
    let lli_cfg = gdma::Config {
        channel: CHANNEL,
        buffer_size: BLOCK_LEN as u32,
        multi_block: Some(MultiBlockMode::Lli),
        ..Default::default()
    };
    let mut chain = [Lli::default(); BLOCKS];
    let chain_base = chain.as_ptr() as u32;
    for (i, item) in chain.iter_mut().enumerate() {
        let last = i + 1 == BLOCKS;
        item.sar = src[i * BLOCK_LEN..].as_ptr() as u32;
        item.dar = dst[i * BLOCK_LEN..].as_mut_ptr() as u32;
        item.llp = if last {
            0
        } else {
            chain_base + ((i + 1) * core::mem::size_of::<Lli>()) as u32
        };
        item.ctl_low = lli_cfg.ctl_low();
        item.ctl_high = BLOCK_LEN as u32;
    }

    dma.interrupt_config(CHANNEL, gdma::int::TRANSFER, false);
    dma.init(&gdma::Config {
        source_addr: chain[0].sar,
        destination_addr: chain[0].dar,
        multi_block_struct: chain_base,
        ..lli_cfg
    });
    dma.cmd(CHANNEL, true);
    while dma.channel_status(CHANNEL) {}
    compiler_fence(Ordering::SeqCst);
    report("linked list", &src[..dst.len()], &dst);

    loop {
        cortex_m::asm::wfi();
    }
}

fn report(what: &str, src: &[u8], dst: &[u8]) {
    match src.iter().zip(dst).position(|(a, b)| a != b) {
        None => log::info!("{}: {} bytes copied", what, dst.len()),
        Some(i) => log::error!("{}: mismatch at {}: {:#x} != {:#x}", what, i, src[i], dst[i]),
    }
}

#[interrupt]
fn GDMA0_Channel0() {
    // SAFETY: the handler only touches the interrupt registers of its own channel.
    let dma = Gdma::new(unsafe { GDMA::steal() });
    dma.clear_interrupt(CHANNEL, gdma::int::TRANSFER);
    DONE.store(true, Ordering::Release);
}
