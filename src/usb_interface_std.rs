use crate::log::*;
use crate::status::CURRENT_STATE;
use embassy_time::Timer;

/// Print the published oven status as JSON once per second.
#[embassy_executor::task]
pub async fn usb_task() {
    let Some(mut receiver) = CURRENT_STATE.receiver() else {
        error!("No status receiver available");
        return;
    };

    info!("Starting status reporter");
    loop {
        let status = receiver.get().await;
        match status.to_json() {
            Ok(json) => info!("{}", json.as_str()),
            Err(_) => warn!("Status did not fit the JSON buffer"),
        }
        Timer::after_secs(1).await;
    }
}
