use xcb::{x, Connection, Xid};
use log::{debug, warn};
use std::io;

use crate::atoms::{self, Interned};
use crate::events::{self, Exit};

pub const WIDTH: u16 = 400;
pub const HEIGHT: u16 = 200;
pub const BORDER_WIDTH: u16 = 0;

pub const TITLE: &str = "XCB Demo — Press Keys";

pub struct Client {
    pub conn: Connection,
    pub screen: x::ScreenBuf,

    pub window: x::Window,

    // only set once WM_PROTOCOLS carries it
    delete_window: Option<x::Atom>,
}

impl Client {
    pub fn connect() -> xcb::Result<Client> {
        // connect to server
        let (conn, _) = xcb::Connection::connect(None)?;

        // first screen only, whatever the display string asked for
        let screen = conn.get_setup().roots().next()
            .ok_or(xcb::ConnError::ClosedInvalidScreen)?
            .to_owned();

        debug!("screen {}x{}, root {:?}",
            screen.width_in_pixels(), screen.height_in_pixels(), screen.root());

        let window = conn.generate_id();

        Ok(Client {
            conn,
            screen,
            window,
            delete_window: None,
        })
    }

    /// Create the window, announce it to the window manager, show it.
    pub fn setup(&mut self) -> xcb::Result<()> {
        self.create_window();
        self.set_title();
        self.register_delete_window();
        self.map()?;
        self.send_configure_notify()
    }

    fn create_window(&self) {
        debug!("creating {:?} {}x{} on {:?}", self.window, WIDTH, HEIGHT, self.screen.root());

        let values = window_values(self.screen.black_pixel());
        self.conn.send_request(&create_window_request(
            self.screen.root(),
            self.screen.root_visual(),
            self.window,
            &values,
        ));
    }

    fn set_title(&self) {
        let (net_wm_name, utf8_string) =
            atoms::intern_pair(&self.conn, b"_NET_WM_NAME", b"UTF8_STRING");

        print_interned("net_name", net_wm_name);
        print_interned("UTF8_STRING", utf8_string);

        match atoms::both((net_wm_name, utf8_string)) {
            Some((property, r#type)) => {
                self.conn.send_request(&title_request(self.window, property, r#type));
            },
            None => warn!("window will be untitled"),
        }
    }

    fn register_delete_window(&mut self) {
        let pair = atoms::intern_pair(&self.conn, b"WM_PROTOCOLS", b"WM_DELETE_WINDOW");

        match atoms::both(pair) {
            Some((wm_protocols, wm_delete_window)) => {
                self.conn.send_request(&protocols_request(self.window, wm_protocols, &wm_delete_window));
                self.delete_window = Some(wm_delete_window);
            },
            None => warn!("close protocol not registered, WM_DELETE_WINDOW won't be seen"),
        }
    }

    fn map(&self) -> xcb::Result<()> {
        // be visible!
        self.conn.send_request(&x::MapWindow {
            window: self.window,
        });
        self.conn.flush()?;

        println!("Window created. Press keys…");
        Ok(())
    }

    // The window manager sends its own ConfigureNotify; this one is only
    // to show a client can inject events.
    fn send_configure_notify(&self) -> xcb::Result<()> {
        let event = configure_notify_for(self.window);

        self.conn.send_request(&x::SendEvent {
            propagate: false,
            destination: x::SendEventDest::Window(self.window),
            event_mask: x::EventMask::STRUCTURE_NOTIFY,
            event: &event,
        });
        self.conn.flush()?;

        Ok(())
    }

    /// Print events until the window manager asks us to close. Dropping
    /// the client afterwards disconnects.
    pub fn run(mut self) -> io::Result<Exit> {
        let exit = events::run(&mut self.conn, self.delete_window, &mut io::stdout().lock())?;
        debug!("leaving event loop: {:?}", exit);
        Ok(exit)
    }
}

fn print_interned(label: &str, interned: Option<Interned>) {
    println!("{}", interned_line(label, interned));
}

pub fn interned_line(label: &str, interned: Option<Interned>) -> String {
    match interned {
        Some(i) => format!("{}: cookie: {}, value: {}", label, i.sequence, i.atom.resource_id()),
        None => format!("{}: unresolved", label),
    }
}

// CW values, in mask bit order
pub fn window_values(black_pixel: u32) -> [x::Cw; 2] {
    [
        x::Cw::BackPixel(black_pixel),
        x::Cw::EventMask(x::EventMask::EXPOSURE | x::EventMask::KEY_PRESS),
    ]
}

pub fn create_window_request<'a>(
    parent: x::Window,
    visual: x::Visualid,
    window: x::Window,
    value_list: &'a [x::Cw],
) -> x::CreateWindow<'a> {
    x::CreateWindow {
        depth: x::COPY_FROM_PARENT as u8,
        wid: window,
        parent,
        x: 0,
        y: 0,
        width: WIDTH,
        height: HEIGHT,
        border_width: BORDER_WIDTH,
        class: x::WindowClass::InputOutput,
        visual,
        value_list,
    }
}

pub fn title_request(window: x::Window, net_wm_name: x::Atom, utf8_string: x::Atom)
    -> x::ChangeProperty<'static, u8>
{
    x::ChangeProperty {
        mode: x::PropMode::Replace,
        window,
        property: net_wm_name,
        r#type: utf8_string,
        data: TITLE.as_bytes(),
    }
}

pub fn protocols_request(window: x::Window, wm_protocols: x::Atom, wm_delete_window: &x::Atom)
    -> x::ChangeProperty<'_, x::Atom>
{
    x::ChangeProperty {
        mode: x::PropMode::Replace,
        window,
        property: wm_protocols,
        r#type: x::ATOM_ATOM,
        data: std::slice::from_ref(wm_delete_window),
    }
}

pub fn configure_notify_for(window: x::Window) -> x::ConfigureNotifyEvent {
    x::ConfigureNotifyEvent::new(
        window,
        window,
        x::Window::none(),
        0,
        0,
        WIDTH,
        HEIGHT,
        BORDER_WIDTH,
        false,
    )
}
