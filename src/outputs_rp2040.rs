use crate::{BeepLength, LedState, OutputCommand, OutputResources, OUTPUT_COMMAND_CHANNEL};
use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Level, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_sync::watch::Watch;
use embassy_time::Timer;

pub static LED_STATE: Watch<CriticalSectionRawMutex, LedState, 1> = Watch::new();
/// `None` silences a beep in progress.
static BUZZER: Signal<CriticalSectionRawMutex, Option<BeepLength>> = Signal::new();

#[embassy_executor::task]
pub async fn output_task(spawner: Spawner, r: OutputResources) {
    // Fan contactor has no speed control; any demand runs it.
    let mut fan = Output::new(r.fan, Level::Low);
    let buzzer = Output::new(r.buzzer, Level::Low);
    let start_button_light = Output::new(r.start_button_light, Level::Low);

    let receiver = OUTPUT_COMMAND_CHANNEL.receiver();
    spawner.spawn(unwrap!(start_button_light_task(start_button_light)));
    spawner.spawn(unwrap!(buzzer_task(buzzer)));

    loop {
        match receiver.receive().await {
            OutputCommand::SetFanSpeed(speed) => {
                fan.set_level(if speed > 0.0 { Level::High } else { Level::Low })
            }
            OutputCommand::SetStartButtonLight(state) => LED_STATE.sender().send(state),
            OutputCommand::Beep(length) => BUZZER.signal(Some(length)),
            OutputCommand::SilenceBuzzer => BUZZER.signal(None),
        }
    }
}

#[embassy_executor::task]
async fn buzzer_task(mut buzzer: Output<'static>) -> ! {
    let mut pending = BUZZER.wait().await;
    loop {
        let Some(length) = pending else {
            buzzer.set_low();
            pending = BUZZER.wait().await;
            continue;
        };

        buzzer.set_high();
        match select(Timer::after_millis(length.as_millis()), BUZZER.wait()).await {
            Either::First(()) => {
                buzzer.set_low();
                pending = BUZZER.wait().await;
            }
            // A newer beep or a silence request replaces this one.
            Either::Second(next) => pending = next,
        }
    }
}

#[embassy_executor::task]
async fn start_button_light_task(mut start_button_light: Output<'static>) -> ! {
    let mut receiver = unwrap!(LED_STATE.receiver());

    let mut state = receiver.changed().await;
    loop {
        match state {
            LedState::LedOn => start_button_light.set_level(Level::High),
            LedState::LedOff => start_button_light.set_level(Level::Low),
            LedState::Blink(on_duration, off_duration) => {
                loop {
                    if let Some(next) = receiver.try_changed() {
                        state = next;
                        break;
                    }
                    start_button_light.set_level(Level::High);
                    Timer::after_millis(on_duration.into()).await;
                    start_button_light.set_level(Level::Low);
                    Timer::after_millis(off_duration.into()).await;
                }
                continue;
            }
        }
        state = receiver.changed().await;
    }
}
