//! Line commands accepted on the host console and the USB serial port.
//!
//! A line is either a JSON encoded `Event`, or one of the short verbs:
//!
//! ```text
//! start | stop | up | down
//! preset <slot> | preset set <slot>
//! door open | door closed
//! load <profile name>
//! rate <hz>
//! fault <fan|io|display|network> <on|off>
//! ```

use heapless::String;
use serde_json_core::de::from_str;

use crate::fault_arbiter::CollaboratorFault;
use crate::{Event, Key};

pub fn parse_event(line: &str) -> Option<Event> {
    let line = line.trim();
    if line.starts_with('{') {
        return from_str::<Event>(line).ok().map(|(event, _)| event);
    }

    let (verb, argument) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match (verb, argument) {
        ("start", "") => Some(Event::Key(Key::Start)),
        ("stop", "") => Some(Event::Key(Key::Stop)),
        ("up", "") => Some(Event::Key(Key::Up)),
        ("down", "") => Some(Event::Key(Key::Down)),
        ("preset", argument) => match argument.strip_prefix("set ") {
            Some(slot) => slot.trim().parse().ok().map(Event::AssignPreset),
            None => argument.parse().ok().map(|slot| Event::Key(Key::Preset(slot))),
        },
        ("door", "open") => Some(Event::DoorStateChanged(true)),
        ("door", "closed" | "close") => Some(Event::DoorStateChanged(false)),
        ("load", name) if !name.is_empty() => String::try_from(name).ok().map(Event::LoadProfile),
        ("rate", hz) => hz.parse().ok().filter(|hz| *hz > 0).map(Event::SetControlRate),
        ("fault", argument) => parse_collaborator_fault(argument),
        _ => None,
    }
}

fn parse_collaborator_fault(argument: &str) -> Option<Event> {
    let (fault, state) = argument.split_once(char::is_whitespace)?;
    let fault = match fault {
        "fan" => CollaboratorFault::Fan,
        "io" => CollaboratorFault::IoBus,
        "display" => CollaboratorFault::Display,
        "network" => CollaboratorFault::Network,
        _ => return None,
    };
    let active = match state.trim() {
        "on" => true,
        "off" => false,
        _ => return None,
    };
    Some(Event::CollaboratorFault { fault, active })
}
