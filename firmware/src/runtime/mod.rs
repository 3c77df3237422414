use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, OutputOpenDrain, Speed};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use reset_core::ResetDevice;
use static_cell::StaticCell;

use crate::console::{ConsoleChannel, ConsoleLink};
use crate::hw::{BOARD_PROPERTIES, BoardLines, ConsoleRegistrar};
use crate::usb;

mod console_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static CONSOLE_RX: ConsoleChannel = Channel::new();
pub(super) static CONSOLE_TX: ConsoleChannel = Channel::new();
pub(super) static CONSOLE_LINK: ConsoleLink = Signal::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA3,
        PA4,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    // Released and normal-boot levels until the device drives them.
    let mut lines = BoardLines::new(
        OutputOpenDrain::new(PA4, Level::High, Speed::Low),
        OutputOpenDrain::new(PA3, Level::High, Speed::Low),
    );
    let mut registrar = ConsoleRegistrar::default();

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    match ResetDevice::attach(&mut lines, &mut registrar, &BOARD_PROPERTIES[..], Delay) {
        Ok(device) => {
            defmt::info!("runtime: published {}", registrar.published());
            spawner
                .spawn(console_task::run(device))
                .expect("failed to spawn console task");
        }
        Err(error) => {
            defmt::error!("runtime: attach failed: {}", defmt::Display2Format(&error));
        }
    }

    core::future::pending::<()>().await;
}
