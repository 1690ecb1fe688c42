use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::{AnyPin, Input, Level, Pull};
use embassy_rp::Peri;
use embassy_time::Timer;

use crate::{Event, InputResources, Key, INPUT_EVENT_CHANNEL};

const DEBOUNCE_MS: u64 = 100;

#[embassy_executor::task]
pub async fn interface_task(spawner: Spawner, r: InputResources) {
    spawner.spawn(unwrap!(door_switch_task(r.door_switch.into())));
    spawner.spawn(unwrap!(key_task(r.start_button.into(), Key::Start)));
    spawner.spawn(unwrap!(key_task(r.stop_button.into(), Key::Stop)));
    spawner.spawn(unwrap!(key_task(r.up_button.into(), Key::Up)));
    spawner.spawn(unwrap!(key_task(r.down_button.into(), Key::Down)));
}

#[embassy_executor::task(pool_size = 4)]
async fn key_task(pin: Peri<'static, AnyPin>, key: Key) -> ! {
    let mut button = Input::new(pin, Pull::Up);
    loop {
        button.wait_for_falling_edge().await;
        debug!("Key {} pressed", Debug2Format(&key));
        INPUT_EVENT_CHANNEL.send(Event::Key(key)).await;
        Timer::after_millis(DEBOUNCE_MS).await;
    }
}

/// The switch closes to ground while the door is shut.
#[embassy_executor::task]
async fn door_switch_task(pin: Peri<'static, AnyPin>) -> ! {
    let mut switch = Input::new(pin, Pull::Up);
    let mut open = switch.get_level() == Level::High;
    INPUT_EVENT_CHANNEL.send(Event::DoorStateChanged(open)).await;
    loop {
        switch.wait_for_any_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;
        let now_open = switch.get_level() == Level::High;
        if now_open != open {
            open = now_open;
            info!("Door {}", if open { "opened" } else { "closed" });
            INPUT_EVENT_CHANNEL.send(Event::DoorStateChanged(open)).await;
        }
    }
}
