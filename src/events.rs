use std::borrow::Borrow;
use std::fmt;
use std::io::{self, Write};

use xcb::{x, Xid};
use log::{debug, warn};

/// Anything that can block until the next event arrives.
pub trait EventSource {
    type Event: Borrow<xcb::Event>;

    fn wait_for_event(&mut self) -> xcb::Result<Self::Event>;
}

impl EventSource for xcb::Connection {
    type Event = xcb::Event;

    fn wait_for_event(&mut self) -> xcb::Result<xcb::Event> {
        xcb::Connection::wait_for_event(self)
    }
}

/// What an incoming event means to us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    Expose,
    KeyPress { keycode: x::Keycode },
    CloseRequested,
    Ignored,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Expose => write!(f, "Expose event"),
            Notice::KeyPress { keycode } => write!(f, "Key pressed: keycode={}", keycode),
            Notice::CloseRequested => write!(f, "WM_DELETE_WINDOW received, exiting"),
            Notice::Ignored => Ok(()),
        }
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    CloseRequested,
    StreamEnded,
}

/// `delete_window` is only set when the close protocol was registered, so
/// without it no client message can end the loop.
pub fn classify(event: &xcb::Event, delete_window: Option<x::Atom>) -> Notice {
    match event {
        xcb::Event::X(x::Event::Expose(_)) => Notice::Expose,

        xcb::Event::X(x::Event::KeyPress(ev)) => Notice::KeyPress {
            keycode: ev.detail(),
        },

        xcb::Event::X(x::Event::ClientMessage(ev)) => {
            match delete_window {
                Some(atom) if first_word(&ev.data()) == atom.resource_id() => Notice::CloseRequested,
                _ => {
                    debug!("ignoring client message {:?} on {:?}", ev.r#type(), ev.window());
                    Notice::Ignored
                },
            }
        },

        e => {
            debug!("UNHANDLED: {:?}", e);
            Notice::Ignored
        },
    }
}

/// The first 32 bits of a client message payload, whatever its format,
/// read in host byte order.
pub fn first_word(data: &x::ClientMessageData) -> u32 {
    match data {
        x::ClientMessageData::Data8(d) => u32::from_ne_bytes([d[0], d[1], d[2], d[3]]),
        x::ClientMessageData::Data16(d) => {
            let [a, b] = d[0].to_ne_bytes();
            let [c, e] = d[1].to_ne_bytes();
            u32::from_ne_bytes([a, b, c, e])
        },
        x::ClientMessageData::Data32(d) => d[0],
    }
}

/// Block on `source` until a matching close request arrives or the stream
/// ends, writing one line to `out` per handled event.
pub fn run<S, W>(source: &mut S, delete_window: Option<x::Atom>, out: &mut W) -> io::Result<Exit>
where
    S: EventSource,
    W: Write,
{
    loop {
        let event = match source.wait_for_event() {
            Ok(event) => event,

            // X errors arrive in the event stream, nothing to act on
            Err(xcb::Error::Protocol(e)) => {
                warn!("protocol error: {:?}", e);
                continue;
            },

            Err(e) => {
                debug!("event stream ended: {}", e);
                return Ok(Exit::StreamEnded);
            },
        };

        let notice = classify(event.borrow(), delete_window);
        if notice != Notice::Ignored {
            writeln!(out, "{}", notice)?;
        }

        if notice == Notice::CloseRequested {
            return Ok(Exit::CloseRequested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use xcb::XidNew;

    const WINDOW: u32 = 0x0040_0001;
    const DELETE: u32 = 318;

    fn window() -> x::Window {
        x::Window::new(WINDOW)
    }

    fn atom(id: u32) -> x::Atom {
        x::Atom::new(id)
    }

    fn expose() -> xcb::Event {
        xcb::Event::X(x::Event::Expose(x::ExposeEvent::new(window(), 0, 0, 400, 200, 0)))
    }

    fn key_press(keycode: x::Keycode) -> xcb::Event {
        xcb::Event::X(x::Event::KeyPress(x::KeyPressEvent::new(
            keycode,
            x::CURRENT_TIME,
            x::Window::none(),
            window(),
            x::Window::none(),
            10,
            10,
            10,
            10,
            x::KeyButMask::empty(),
            true,
        )))
    }

    fn client_message(first_word: u32) -> xcb::Event {
        xcb::Event::X(x::Event::ClientMessage(x::ClientMessageEvent::new(
            window(),
            atom(317),
            x::ClientMessageData::Data32([first_word, x::CURRENT_TIME, 0, 0, 0]),
        )))
    }

    /// Counts drops so tests can see each delivered event released once.
    struct Tracked {
        event: xcb::Event,
        drops: Rc<Cell<usize>>,
    }

    impl Borrow<xcb::Event> for Tracked {
        fn borrow(&self) -> &xcb::Event {
            &self.event
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    struct Script {
        events: VecDeque<xcb::Event>,
        delivered: usize,
        drops: Rc<Cell<usize>>,
    }

    impl Script {
        fn new(events: Vec<xcb::Event>) -> Script {
            Script {
                events: events.into(),
                delivered: 0,
                drops: Rc::new(Cell::new(0)),
            }
        }
    }

    impl EventSource for Script {
        type Event = Tracked;

        fn wait_for_event(&mut self) -> xcb::Result<Tracked> {
            match self.events.pop_front() {
                Some(event) => {
                    self.delivered += 1;
                    Ok(Tracked {
                        event,
                        drops: self.drops.clone(),
                    })
                },
                None => Err(xcb::Error::Connection(xcb::ConnError::Connection)),
            }
        }
    }

    #[test]
    fn classify_expose_and_key_press() {
        assert_eq!(classify(&expose(), None), Notice::Expose);
        assert_eq!(classify(&key_press(38), None), Notice::KeyPress { keycode: 38 });
    }

    #[test]
    fn client_message_needs_registered_delete_atom() {
        assert_eq!(classify(&client_message(DELETE), None), Notice::Ignored);
        assert_eq!(classify(&client_message(DELETE), Some(atom(DELETE))), Notice::CloseRequested);
        assert_eq!(classify(&client_message(DELETE + 1), Some(atom(DELETE))), Notice::Ignored);
    }

    #[test]
    fn close_matches_any_payload_format() {
        let bytes = DELETE.to_ne_bytes();
        let mut data8 = [0u8; 20];
        data8[..4].copy_from_slice(&bytes);
        let mut data16 = [0u16; 10];
        data16[0] = u16::from_ne_bytes([bytes[0], bytes[1]]);
        data16[1] = u16::from_ne_bytes([bytes[2], bytes[3]]);

        for data in [x::ClientMessageData::Data8(data8), x::ClientMessageData::Data16(data16)] {
            assert_eq!(first_word(&data), DELETE);

            let ev = xcb::Event::X(x::Event::ClientMessage(
                x::ClientMessageEvent::new(window(), atom(317), data),
            ));
            assert_eq!(classify(&ev, Some(atom(DELETE))), Notice::CloseRequested);
        }

        let other = x::ClientMessageData::Data8([0xff; 20]);
        assert_ne!(first_word(&other), DELETE);
    }

    #[test]
    fn other_events_are_ignored() {
        let ev = xcb::Event::X(x::Event::MapNotify(x::MapNotifyEvent::new(window(), window(), false)));
        assert_eq!(classify(&ev, Some(atom(DELETE))), Notice::Ignored);
    }

    #[test]
    fn scripted_session_releases_every_event() {
        let mut script = Script::new(vec![
            expose(),
            key_press(24),
            client_message(DELETE + 7),
            client_message(DELETE),
            // never reached
            expose(),
        ]);
        let mut out = Vec::new();

        let exit = run(&mut script, Some(atom(DELETE)), &mut out).unwrap();

        assert_eq!(exit, Exit::CloseRequested);
        assert_eq!(script.delivered, 4);
        assert_eq!(script.drops.get(), 4);
        assert_eq!(script.events.len(), 1);

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().collect::<Vec<_>>(), vec![
            "Expose event",
            "Key pressed: keycode=24",
            "WM_DELETE_WINDOW received, exiting",
        ]);
    }

    #[test]
    fn stream_end_without_close_protocol() {
        let mut script = Script::new(vec![
            key_press(9),
            client_message(DELETE),
        ]);
        let mut out = Vec::new();

        let exit = run(&mut script, None, &mut out).unwrap();

        assert_eq!(exit, Exit::StreamEnded);
        assert_eq!(script.delivered, 2);
        assert_eq!(script.drops.get(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "Key pressed: keycode=9\n");
    }
}
