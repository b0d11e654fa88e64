use xcb::{x, Connection, Cookie};
use log::{debug, warn};

/// An atom resolved by the server, along with the sequence number of the
/// request that asked for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interned {
    pub atom: x::Atom,
    pub sequence: u64,
}

/// Intern two atoms. Both requests go out before either reply is awaited.
///
/// A failed reply leaves that half of the pair as `None`; the caller
/// decides what to skip.
pub fn intern_pair(conn: &Connection, first: &[u8], second: &[u8])
    -> (Option<Interned>, Option<Interned>)
{
    let first_cookie = conn.send_request(&x::InternAtom {
        only_if_exists: false,
        name: first,
    });
    let second_cookie = conn.send_request(&x::InternAtom {
        only_if_exists: false,
        name: second,
    });

    (
        wait_interned(conn, first_cookie, first),
        wait_interned(conn, second_cookie, second),
    )
}

fn wait_interned(conn: &Connection, cookie: x::InternAtomCookie, name: &[u8]) -> Option<Interned> {
    let sequence = cookie.sequence();
    let name = String::from_utf8_lossy(name);

    match conn.wait_for_reply(cookie) {
        Ok(reply) => {
            debug!("interned {} as {:?} (seq {})", name, reply.atom(), sequence);
            Some(Interned {
                atom: reply.atom(),
                sequence,
            })
        },
        Err(e) => {
            warn!("couldn't intern {}: {}", name, e);
            None
        },
    }
}

/// Both halves of a pair, or nothing.
pub fn both(pair: (Option<Interned>, Option<Interned>)) -> Option<(x::Atom, x::Atom)> {
    match pair {
        (Some(a), Some(b)) => Some((a.atom, b.atom)),
        _ => None,
    }
}
