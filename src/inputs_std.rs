//! Host console: reads command lines from stdin in place of the keypad and
//! door switch.
//!
//! Besides the shared console verbs, `fault <1|2> <open|bus|clear>` injects
//! a thermocouple fault into the simulation.

use async_io::Async;
use embedded_io_adapters::futures_03::FromFutures;
use embedded_io_async::Read;
use heapless::Vec;

use crate::console::parse_event;
use crate::log::*;
use crate::temperature_sensor::{inject_fault, SimulatedFault};
use crate::INPUT_EVENT_CHANNEL;

const LINE_CAPACITY: usize = 128;

fn parse_fault(line: &str) -> Option<(usize, SimulatedFault)> {
    let mut words = line.split_whitespace();
    if words.next()? != "fault" {
        return None;
    }
    let channel = match words.next()? {
        "1" => 0,
        "2" => 1,
        _ => return None,
    };
    let fault = match words.next()? {
        "open" => SimulatedFault::OpenCircuit,
        "bus" => SimulatedFault::BusSilent,
        "clear" => SimulatedFault::None,
        _ => return None,
    };
    words.next().is_none().then_some((channel, fault))
}

async fn dispatch(line: &str) {
    if line.trim().is_empty() {
        return;
    }
    if let Some((channel, fault)) = parse_fault(line) {
        info!("Injecting {:?} on thermocouple {}", fault, channel + 1);
        inject_fault(channel, fault);
    } else if let Some(event) = parse_event(line) {
        debug!("Console event: {:?}", event);
        INPUT_EVENT_CHANNEL.send(event).await;
    } else {
        warn!("Unknown command: {}", line.trim());
    }
}

#[embassy_executor::task]
pub async fn interface_task() {
    let stdin = match Async::new(std::io::stdin()) {
        Ok(stdin) => stdin,
        Err(e) => {
            error!("Console unavailable: {}", e);
            return;
        }
    };
    let mut stdin = FromFutures::new(stdin);
    info!("Console ready");

    let mut line: Vec<u8, LINE_CAPACITY> = Vec::new();
    let mut overflowed = false;
    let mut buf = [0u8; 64];
    loop {
        let n = match stdin.read(&mut buf).await {
            Ok(0) => {
                info!("Console closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                error!("Console read failed: {:?}", e);
                return;
            }
        };

        for &byte in &buf[..n] {
            if byte == b'\n' {
                if overflowed {
                    warn!("Console line too long, dropped");
                } else if let Ok(text) = core::str::from_utf8(&line) {
                    dispatch(text).await;
                }
                line.clear();
                overflowed = false;
            } else if line.push(byte).is_err() {
                overflowed = true;
            }
        }
    }
}
