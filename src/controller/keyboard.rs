// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::track::Mode;

const PLAY: &str = "play";
const STOP: &str = "stop";
const PREVIEW: &str = "preview";
const LOOP: &str = "loop";
const CUE: &str = "cue";
const TAP: &str = "tap";
const FASTER: &str = "faster";
const SLOWER: &str = "slower";
const FILTER: &str = "filter";
const STATUS: &str = "status";
const QUIT: &str = "quit";

/// A controller that drives a track using the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    fn parse(input: &str) -> Option<Event> {
        let input = input.trim().to_lowercase();
        let mut chars = input.chars();
        if let (Some(key), None) = (chars.next(), chars.next()) {
            if key.is_ascii_digit() {
                return Some(Event::Cue(key));
            }
        }
        Some(match input.as_str() {
            PLAY => Event::Play,
            STOP => Event::Stop,
            PREVIEW => Event::Mode(Mode::Preview),
            LOOP => Event::Mode(Mode::Loop),
            CUE => Event::Mode(Mode::Cue),
            TAP | "" => Event::Tap,
            FASTER | "+" => Event::Faster,
            SLOWER | "-" => Event::Slower,
            FILTER => Event::ToggleFilter,
            STATUS => Event::Status,
            QUIT => Event::Quit,
            _ => return None,
        })
    }

    /// Reads one command. Returns false once the input is exhausted or quit.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {}, {}, 0-9, {}/enter, {}/+, {}/-, {}, {}, {}): ",
            PLAY, STOP, PREVIEW, LOOP, CUE, TAP, FASTER, SLOWER, FILTER, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match Driver::parse(&input) {
            Some(event) => {
                events_tx
                    .blocking_send(event)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                // Nothing reads commands after quit.
                Ok(event != Event::Quit)
            }
            None => {
                warn!(input = input.trim(), "Unrecognized input");
                Ok(true)
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use crate::controller::{keyboard::*, Event};
    use crate::track::Mode;

    use super::Driver;

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let input = format!("{}\n", event);
        let reader = BufReader::new(input.as_bytes());

        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Event::Play, get_event(PLAY)?.unwrap());
        assert_eq!(Event::Stop, get_event(STOP)?.unwrap());
        assert_eq!(Event::Mode(Mode::Preview), get_event(PREVIEW)?.unwrap());
        assert_eq!(Event::Mode(Mode::Loop), get_event(LOOP)?.unwrap());
        assert_eq!(Event::Mode(Mode::Cue), get_event("CUE")?.unwrap());
        assert_eq!(Event::Tap, get_event(TAP)?.unwrap());
        assert_eq!(Event::Tap, get_event("")?.unwrap());
        assert_eq!(Event::Faster, get_event("+")?.unwrap());
        assert_eq!(Event::Slower, get_event(SLOWER)?.unwrap());
        assert_eq!(Event::ToggleFilter, get_event(FILTER)?.unwrap());
        assert_eq!(Event::Status, get_event(STATUS)?.unwrap());
        assert_eq!(Event::Quit, get_event(QUIT)?.unwrap());
        assert_eq!(None, get_event("unrecognized")?);
        Ok(())
    }

    #[test]
    fn test_digits_are_cue_keys() -> Result<(), io::Error> {
        assert_eq!(Event::Cue('1'), get_event("1")?.unwrap());
        assert_eq!(Event::Cue('0'), get_event(" 0 ")?.unwrap());
        assert_eq!(None, get_event("12")?);
        Ok(())
    }

    #[test]
    fn test_quit_ends_input() -> Result<(), io::Error> {
        let (sender, _receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new("quit\nplay\n".as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(!Driver::monitor_io(&sender, reader, writer)?);
        Ok(())
    }

    #[test]
    fn test_end_of_input() -> Result<(), io::Error> {
        let (sender, _receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new("".as_bytes());
        let writer = BufWriter::new(Vec::new());
        assert!(!Driver::monitor_io(&sender, reader, writer)?);
        Ok(())
    }
}
