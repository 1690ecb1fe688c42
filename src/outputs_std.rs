use crate::log::*;
use crate::{LedState, OutputCommand, OUTPUT_COMMAND_CHANNEL};

use embassy_executor::Spawner;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, watch::Watch};
use embassy_time::Timer;

pub static LED_STATE: Watch<CriticalSectionRawMutex, LedState, 1> = Watch::new();

#[embassy_executor::task]
pub async fn output_task(spawner: Spawner) {
    let receiver = OUTPUT_COMMAND_CHANNEL.receiver();
    match start_button_light_task() {
        Ok(token) => spawner.spawn(token),
        Err(_) => error!("Failed to spawn start button light task"),
    }

    loop {
        match receiver.receive().await {
            OutputCommand::SetFanSpeed(speed) => info!("Fan speed {}%", (speed * 100.0) as u32),
            OutputCommand::SetStartButtonLight(state) => LED_STATE.sender().send(state),
            OutputCommand::Beep(length) => info!("Beep ({} ms)", length.as_millis()),
            OutputCommand::SilenceBuzzer => info!("Buzzer silenced"),
        }
    }
}

/// Logs the start button light transitions a real LED would show.
#[embassy_executor::task]
async fn start_button_light_task() {
    let Some(mut receiver) = LED_STATE.receiver() else {
        error!("No LED state receiver available");
        return;
    };

    let mut state = receiver.changed().await;
    loop {
        match state {
            LedState::LedOn => info!("Start light on"),
            LedState::LedOff => info!("Start light off"),
            LedState::Blink(on, off) => {
                info!("Start light blinking {}/{} ms", on, off);
                loop {
                    if let Some(next) = receiver.try_changed() {
                        state = next;
                        break;
                    }
                    trace!("Start light on");
                    Timer::after_millis(on.into()).await;
                    trace!("Start light off");
                    Timer::after_millis(off.into()).await;
                }
                continue;
            }
        }
        state = receiver.changed().await;
    }
}
