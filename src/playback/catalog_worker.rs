//! Background catalog-refresh worker (spec §4.6 "Catalog lifecycle"; spec
//! §5 "optional background backend idle-poll listener for catalog-change
//! events; this worker holds a separate connection").
//!
//! Blocks in MPD's `idle player database mixer` on its own socket, distinct
//! from `PlaybackController`'s, and reloads the catalog whenever the
//! backend reports a `database` change.

use super::mpd_client::{run_tolerant, MpdConnection};
use super::parse_listallinfo;
use crate::music::Catalog;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Spawns the idle-poll thread. The thread checks `shutdown` between idle
/// round-trips and after each one, so it exits promptly once shutdown is
/// requested rather than blocking forever in `idle`.
pub fn spawn(address: String, deadline: Duration, catalog: Arc<Catalog>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || run(&address, deadline, &catalog, &shutdown))
}

fn run(address: &str, deadline: Duration, catalog: &Catalog, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match MpdConnection::connect(address, deadline) {
            Ok(mut conn) => poll_until_disconnected_or_shutdown(&mut conn, catalog, shutdown),
            Err(e) => warn!("catalog idle-poll could not connect: {e}"),
        }
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(RECONNECT_BACKOFF);
    }
}

fn poll_until_disconnected_or_shutdown(conn: &mut MpdConnection, catalog: &Catalog, shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match run_tolerant(conn, "idle player database mixer") {
            Ok(lines) => {
                if lines.iter().any(|l| l == "changed: database") {
                    refresh(conn, catalog);
                }
            }
            Err(e) => {
                warn!("catalog idle-poll connection error: {e}; reconnecting");
                return;
            }
        }
    }
}

fn refresh(conn: &mut MpdConnection, catalog: &Catalog) {
    match run_tolerant(conn, "listallinfo") {
        Ok(lines) => {
            let entries = parse_listallinfo(&lines);
            debug!("catalog refreshed on backend database-change event: {} entries", entries.len());
            catalog.refresh(entries);
        }
        Err(e) => warn!("catalog refresh after database-change event failed: {e}"),
    }
}
