use embassy_futures::select::{Either, select};

use super::{CONSOLE_LINK, CONSOLE_RX, CONSOLE_TX};
use crate::console::{self, ConsoleResponse, LineAssembler, LinkEvent};
use crate::hw::BoardDevice;

const BANNER: &str = "ISP reset controller ready. Type `help` for commands.\n";

/// Owns the attached device. Every line runs to completion before the next
/// frame is read; the hold delay blocks the whole thread-mode executor, so USB
/// traffic stalls for the duration of a reset pulse.
#[embassy_executor::task]
pub async fn run(device: BoardDevice) -> ! {
    let receiver = CONSOLE_RX.receiver();
    let sender = CONSOLE_TX.sender();
    let mut assembler = LineAssembler::new();
    let mut response = ConsoleResponse::new();

    loop {
        match select(CONSOLE_LINK.wait(), receiver.receive()).await {
            Either::First(event) => {
                assembler.on_link(event);
                if event == LinkEvent::Connected {
                    console::send_text(&sender, BANNER).await;
                    console::send_text(&sender, console::PROMPT).await;
                }
            }
            Either::Second(frame) => {
                for &byte in &frame {
                    let Some(line) = assembler.ingest(byte) else {
                        continue;
                    };
                    console::respond(&device, line, &mut response);
                    console::send_text(&sender, &response).await;
                }
            }
        }
    }
}
