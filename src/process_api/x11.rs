use std::collections::HashSet;

use anyhow::{anyhow, Result};
use tracing::{instrument, warn};
use xcb::{
    x::{Atom, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection, Xid,
};

use super::{DesktopProbe, ProcessId};

fn intern(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_windows(conn: &Connection, root: Window, property: Atom, max: u32) -> Result<Vec<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: max,
    }))?;
    Ok(result.value::<Window>().to_vec())
}

/// Reads focus and the managed window list through EWMH properties of the root window.
pub struct X11Probe {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    client_list_atom: Atom,
    pid_atom: Atom,
}

impl X11Probe {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern(&connection, b"_NET_ACTIVE_WINDOW")?;
        let client_list_atom = intern(&connection, b"_NET_CLIENT_LIST")?;
        let pid_atom = intern(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            client_list_atom,
            pid_atom,
        })
    }

    fn root(&self) -> Result<Window> {
        // Currently the application only supports 1 x11 screen.
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} is missing", self.preferred_screen))
    }
}

impl DesktopProbe for X11Probe {
    #[instrument(skip(self))]
    fn foreground_process(&mut self) -> Result<Option<ProcessId>> {
        let root = self.root()?;
        let Some(active) = get_windows(&self.connection, root, self.active_window_atom, 1)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        if active == Window::none() {
            return Ok(None);
        }
        get_pid(&self.connection, active, self.pid_atom)
    }

    #[instrument(skip(self))]
    fn windowed_processes(&mut self) -> Result<Option<HashSet<ProcessId>>> {
        let root = self.root()?;
        let windows = get_windows(&self.connection, root, self.client_list_atom, 4096)?;
        let mut pids = HashSet::with_capacity(windows.len());
        for window in windows {
            match get_pid(&self.connection, window, self.pid_atom) {
                Ok(Some(pid)) => {
                    pids.insert(pid);
                }
                Ok(None) => {}
                // Windows can be destroyed between the two requests.
                Err(e) => warn!("Failed to read pid of {window:?} {e:?}"),
            }
        }
        Ok(Some(pids))
    }
}
