//! CAN internal loopback at 500 kbit/s.
//!
//! One of each classic frame type is sent from message buffers 0..=3 and caught by a
//! match-all receive buffer on MB 15. Afterwards one more frame goes through the
//! `embedded_can` interface. No pins are needed.

#![no_main]
#![no_std]

use cortex_m_rt::entry;
use embedded_can::{nb::Can as _, Frame, StandardId};
use panic_halt as _;

use rtl87x2g_bsp::{
    hw::{
        can::{self, BusState, CanFrame, FrameType, RxFrame, TxFrame},
        pinmux::{Function, PadConfig, P2_0},
        rcc::Periph,
        uart, Can, Pad, Pinmux, Rcc, Uart,
    },
    logger, Peripherals,
};

const RX_MSG_BUF: u8 = 15;

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

    rcc.periph_clock_cmd(Periph::Can, true);
    let mut can = Can::new(
        p.CAN,
        &can::Config {
            auto_re_tx: false,
            test_mode: can::TestMode::IntLoopback,
            bit_timing: can::BitTiming::KBPS_500,
            ..Default::default()
        },
    );

    can.cmd(true);
    while can.bus_state() != BusState::On {}
    log::info!("CAN bus on");

    let rx = RxFrame {
        msg_buf_id: RX_MSG_BUF,
        rtr_mask: true,
        ide_mask: true,
        id_mask: ((can::STANDARD_ID_MAX as u32) << can::STANDARD_ID_POS) | can::EXTEND_ID_MAX,
        ..Default::default()
    };

    let data: [u8; 8] = core::array::from_fn(|i| i as u8);
    let frames = [
        (FrameType::StdData, 0x123, 0x0, &data[..]),
        (FrameType::ExtData, 0x123, 0x4567, &data[..]),
        (FrameType::StdRemote, 0x7FF, 0x0, &data[..0]),
        (FrameType::ExtRemote, 0x7FF, can::EXTEND_ID_MAX, &data[..0]),
    ];

    for (mb, (frame_type, std_id, ext_id, payload)) in frames.into_iter().enumerate() {
        let mb = mb as u8;
        if let Err(e) = can.set_msg_buf_rx_mode(&rx) {
            log::error!("rx buffer setup failed: {:?}", e);
            continue;
        }

        let tx = TxFrame {
            msg_buf_id: mb,
            auto_reply: false,
            frame_type,
            standard_frame_id: std_id,
            extend_frame_id: ext_id,
        };
        if let Err(e) = can.set_msg_buf_tx_mode(&tx, payload) {
            log::error!("tx MB {} failed: {:?}", mb, e);
            continue;
        }

        while !can.mb_tx_done(mb) {}
        can.clear_mb_tx_done(mb);
        log::info!("MB {} tx done", mb);

        while !can.mb_rx_done(RX_MSG_BUF) {}
        can.clear_mb_rx_done(RX_MSG_BUF);

        match can.msg_buf_info(RX_MSG_BUF) {
            Ok(info) => {
                let mut buf = [0u8; can::STANDARD_DATA_MAX_LEN];
                let len = (info.data_length as usize).min(buf.len());
                if can.ram_data(&mut buf[..len]).is_ok() {
                    log::info!(
                        "rx {:?} std {:#x} ext {:#x} len {} data {:02x?}",
                        info.frame_type(),
                        info.standard_frame_id,
                        info.extend_frame_id,
                        info.data_length,
                        &buf[..len]
                    );
                }
            }
            Err(e) => log::error!("read MB {} failed: {:?}", RX_MSG_BUF, e),
        }
    }

    // Same path through embedded-can.
    if let Err(e) = can.set_msg_buf_rx_mode(&rx) {
        log::error!("rx buffer setup failed: {:?}", e);
    }
    let frame = StandardId::new(0x321).and_then(|id| CanFrame::new(id, b"rtl87x2g"));
    if let Some(frame) = frame {
        match nb::block!(can.transmit(&frame)) {
            Ok(_) => match nb::block!(can.receive()) {
                Ok(echo) => log::info!("echo {:?} {:02x?}", echo.id(), echo.data()),
                Err(e) => log::error!("receive failed: {:?}", e),
            },
            Err(e) => log::error!("transmit failed: {:?}", e),
        }
    }

    log::info!("CAN loopback done");
    loop {
        cortex_m::asm::wfi();
    }
}
