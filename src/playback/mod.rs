//! PlaybackController (spec §4.7): a supervised connection to the
//! MPD-compatible PlaybackBackend, plus the sleep-timer worker.

mod catalog_worker;
mod mpd_client;
pub mod sleep_timer;

use crate::error::ErrorKind;
use crate::types::{CatalogEntry, PlaybackState, PlaybackStatus};
use log::{debug, warn};
use mpd_client::{run_tolerant, MpdConnection, MpdError};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use catalog_worker::spawn as spawn_catalog_refresh_worker;
pub use sleep_timer::{SleepTimer, StopTarget, VolumeSink};

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("backend I/O error: {0}")]
    Io(String),
    #[error("backend rejected command: {0}")]
    Rejected(String),
    #[error("not connected to backend")]
    NotConnected,
}

impl PlaybackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::Io(_) => ErrorKind::TransientHardware,
            PlaybackError::Rejected(_) => ErrorKind::BackendRejected,
            PlaybackError::NotConnected => ErrorKind::TransientHardware,
        }
    }
}

impl From<MpdError> for PlaybackError {
    fn from(e: MpdError) -> Self {
        match e {
            MpdError::Io(io) => PlaybackError::Io(io.to_string()),
            MpdError::Rejected(reason) => PlaybackError::Rejected(reason),
        }
    }
}

/// Connection supervision bookkeeping (spec §4.7), modeled on the teacher's
/// `AudioClient` reconnect tracking: when the backend last answered a
/// command successfully, and how many commands have failed in a row since.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionHealth {
    pub last_success: Option<Instant>,
    pub consecutive_failures: u32,
}

/// The protocol surface spec §6 requires, independent of transport — a
/// trait so tests can substitute a stub backend.
pub trait PlaybackBackend: Send {
    fn setvol(&mut self, level: u8) -> Result<(), PlaybackError>;
    fn clear(&mut self) -> Result<(), PlaybackError>;
    fn add(&mut self, uri: &str) -> Result<(), PlaybackError>;
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn stop(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self) -> Result<(), PlaybackError>;
    fn resume(&mut self) -> Result<(), PlaybackError>;
    fn next(&mut self) -> Result<(), PlaybackError>;
    fn previous(&mut self) -> Result<(), PlaybackError>;
    fn status(&mut self) -> Result<PlaybackState, PlaybackError>;
    fn repeat(&mut self, on: bool) -> Result<(), PlaybackError>;
    fn single(&mut self, on: bool) -> Result<(), PlaybackError>;
    fn random(&mut self, on: bool) -> Result<(), PlaybackError>;
    fn playlist_add(&mut self, playlist: &str, uri: &str) -> Result<(), PlaybackError>;
    fn load_playlist(&mut self, playlist: &str) -> Result<(), PlaybackError>;

    /// Full catalog listing (spec §4.6 "Catalog lifecycle": "loaded at
    /// startup; refreshed on explicit PlaybackBackend database-change
    /// events").
    fn list_all(&mut self) -> Result<Vec<CatalogEntry>, PlaybackError>;

    /// Connection health for deployments that care to surface it. Backends
    /// with no notion of a persistent connection can leave this at its
    /// default.
    fn health(&self) -> ConnectionHealth {
        ConnectionHealth::default()
    }
}

/// MPD-line-protocol implementation, one persistent socket with
/// reconnect-once-on-I/O-error supervision (spec §4.7 "Connection
/// supervision").
pub struct MpdBackend {
    address: String,
    deadline: Duration,
    connection: Option<MpdConnection>,
    health: ConnectionHealth,
}

impl MpdBackend {
    pub fn new(address: impl Into<String>, deadline: Duration) -> Self {
        Self {
            address: address.into(),
            deadline,
            connection: None,
            health: ConnectionHealth::default(),
        }
    }

    fn ensure_connected(&mut self) -> Result<(), PlaybackError> {
        if self.connection.is_none() {
            let conn = MpdConnection::connect(&self.address, self.deadline)?;
            self.connection = Some(conn);
        }
        Ok(())
    }

    /// Run one command. On I/O error, drop the socket and retry once after
    /// a single reconnect (spec §4.7 "discarded and one reconnection
    /// attempt is made, then the command is retried once").
    fn run(&mut self, line: &str) -> Result<Vec<String>, PlaybackError> {
        let result = self.run_inner(line);
        match &result {
            Ok(_) => {
                self.health.last_success = Some(Instant::now());
                self.health.consecutive_failures = 0;
            }
            Err(_) => {
                self.health.consecutive_failures += 1;
            }
        }
        result
    }

    fn run_inner(&mut self, line: &str) -> Result<Vec<String>, PlaybackError> {
        self.ensure_connected()?;
        let conn = self.connection.as_mut().expect("just connected");
        match run_tolerant(conn, line) {
            Ok(lines) => Ok(lines),
            Err(MpdError::Io(e)) => {
                warn!("backend I/O error on `{line}`: {e}; reconnecting once");
                self.connection = None;
                self.ensure_connected()?;
                let conn = self.connection.as_mut().expect("just reconnected");
                Ok(run_tolerant(conn, line)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl PlaybackBackend for MpdBackend {
    fn setvol(&mut self, level: u8) -> Result<(), PlaybackError> {
        self.run(&format!("setvol {level}")).map(|_| ())
    }

    fn clear(&mut self) -> Result<(), PlaybackError> {
        self.run("clear").map(|_| ())
    }

    fn add(&mut self, uri: &str) -> Result<(), PlaybackError> {
        self.run(&format!("add \"{uri}\"")).map(|_| ())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.run("play").map(|_| ())
    }

    fn stop(&mut self) -> Result<(), PlaybackError> {
        self.run("stop").map(|_| ())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.run("pause 1").map(|_| ())
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        self.run("pause 0").map(|_| ())
    }

    fn next(&mut self) -> Result<(), PlaybackError> {
        self.run("next").map(|_| ())
    }

    fn previous(&mut self) -> Result<(), PlaybackError> {
        self.run("previous").map(|_| ())
    }

    fn status(&mut self) -> Result<PlaybackState, PlaybackError> {
        let status_lines = self.run("status")?;
        let song_lines = self.run("currentsong")?;
        Ok(parse_playback_state(&status_lines, &song_lines))
    }

    fn repeat(&mut self, on: bool) -> Result<(), PlaybackError> {
        self.run(&format!("repeat {}", on as u8)).map(|_| ())
    }

    fn single(&mut self, on: bool) -> Result<(), PlaybackError> {
        self.run(&format!("single {}", on as u8)).map(|_| ())
    }

    fn random(&mut self, on: bool) -> Result<(), PlaybackError> {
        self.run(&format!("random {}", on as u8)).map(|_| ())
    }

    fn playlist_add(&mut self, playlist: &str, uri: &str) -> Result<(), PlaybackError> {
        self.run(&format!("playlistadd \"{playlist}\" \"{uri}\""))
            .map(|_| ())
    }

    fn load_playlist(&mut self, playlist: &str) -> Result<(), PlaybackError> {
        self.run(&format!("load \"{playlist}\"")).map(|_| ())
    }

    fn list_all(&mut self) -> Result<Vec<CatalogEntry>, PlaybackError> {
        let lines = self.run("listallinfo")?;
        Ok(parse_listallinfo(&lines))
    }

    fn health(&self) -> ConnectionHealth {
        self.health
    }
}

fn field(lines: &[String], key: &str) -> Option<String> {
    lines.iter().find_map(|line| {
        line.split_once(": ")
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
}

fn parse_playback_state(status_lines: &[String], song_lines: &[String]) -> PlaybackState {
    let status = match field(status_lines, "state").as_deref() {
        Some("play") => PlaybackStatus::Playing,
        Some("pause") => PlaybackStatus::Paused,
        _ => PlaybackStatus::Idle,
    };
    let position_seconds = field(status_lines, "elapsed")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let queue_length = field(status_lines, "playlistlength")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let current = field(song_lines, "Title").map(|title| CatalogEntry {
        key: field(song_lines, "file").unwrap_or_default(),
        title,
        artist: field(song_lines, "Artist"),
        tags: Vec::new(),
        phonetic_keys: Vec::new(),
    });

    PlaybackState {
        status,
        current,
        position_seconds,
        queue_length,
    }
}

/// Parses `listallinfo`'s response into catalog entries. Each track starts
/// a new block at its `file:` line; `Title:`/`Artist:`/`Genre:` lines that
/// follow attach to that block until the next `file:` line.
fn parse_listallinfo(lines: &[String]) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<CatalogEntry> = None;

    for line in lines {
        if let Some(file) = line.strip_prefix("file: ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(CatalogEntry {
                key: file.to_string(),
                title: file.to_string(),
                artist: None,
                tags: Vec::new(),
                phonetic_keys: Vec::new(),
            });
        } else if let Some(title) = line.strip_prefix("Title: ") {
            if let Some(entry) = current.as_mut() {
                entry.title = title.to_string();
            }
        } else if let Some(artist) = line.strip_prefix("Artist: ") {
            if let Some(entry) = current.as_mut() {
                entry.artist = Some(artist.to_string());
            }
        } else if let Some(genre) = line.strip_prefix("Genre: ") {
            if let Some(entry) = current.as_mut() {
                entry.tags.push(genre.to_string());
            }
        }
    }
    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    entries
}

/// Translates high-level commands into backend protocol calls, behind one
/// mutex held for the duration of each command (spec §4.7).
pub struct PlaybackController {
    backend: Mutex<Box<dyn PlaybackBackend>>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn PlaybackBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    pub fn play(&self, catalog_key: &str) -> Result<(), PlaybackError> {
        let mut backend = self.backend.lock().unwrap();
        backend.clear()?;
        backend.add(catalog_key)?;
        backend.play()?;
        debug!("playback started for {catalog_key}");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().stop()
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().pause()
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().resume()
    }

    pub fn next(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().next()
    }

    pub fn previous(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().previous()
    }

    pub fn status(&self) -> Result<PlaybackState, PlaybackError> {
        self.backend.lock().unwrap().status()
    }

    pub fn set_repeat(&self, on: bool) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().repeat(on)
    }

    pub fn set_shuffle(&self, on: bool) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().random(on)
    }

    pub fn add_favourite(&self, playlist: &str, catalog_key: &str) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().playlist_add(playlist, catalog_key)
    }

    pub fn load_playlist(&self, playlist: &str) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().load_playlist(playlist)
    }

    /// Pin the backend's own volume at maximum. Called once at startup
    /// (spec §4.2 "internal volume pinned at maximum").
    pub fn pin_backend_volume(&self) -> Result<(), PlaybackError> {
        self.backend.lock().unwrap().setvol(100)
    }

    pub fn health(&self) -> ConnectionHealth {
        self.backend.lock().unwrap().health()
    }

    pub fn list_all(&self) -> Result<Vec<CatalogEntry>, PlaybackError> {
        self.backend.lock().unwrap().list_all()
    }

    /// Load the catalog from the backend and publish it, logging (not
    /// failing startup) if the backend is unreachable (spec §4.6 "Catalog
    /// lifecycle": "loaded at startup").
    pub fn load_catalog_into(&self, catalog: &crate::music::Catalog) {
        match self.list_all() {
            Ok(entries) => {
                debug!("catalog loaded from backend: {} entries", entries.len());
                catalog.refresh(entries);
            }
            Err(e) => warn!("could not load catalog from backend at startup: {e}"),
        }
    }
}

impl StopTarget for PlaybackController {
    fn stop(&self) {
        if let Err(e) = self.stop() {
            warn!("sleep timer could not stop playback: {e}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubBackend;
    use super::*;
    use crate::types::PlaybackStatus;

    #[test]
    fn play_clears_adds_and_starts() {
        let controller = PlaybackController::new(Box::new(StubBackend::default()));
        controller.play("song.mp3").unwrap();
        let state = controller.status().unwrap();
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.current.unwrap().key, "song.mp3");
    }

    #[test]
    fn stop_clears_status() {
        let controller = PlaybackController::new(Box::new(StubBackend::default()));
        controller.play("song.mp3").unwrap();
        controller.stop().unwrap();
        let state = controller.status().unwrap();
        assert_eq!(state.status, PlaybackStatus::Idle);
    }

    #[test]
    fn favourite_add_is_recorded() {
        let backend = StubBackend::default();
        let controller = PlaybackController::new(Box::new(backend));
        controller.add_favourite("favourites.m3u", "song.mp3").unwrap();
    }

    #[test]
    fn default_backend_health_is_empty() {
        let controller = PlaybackController::new(Box::new(StubBackend::default()));
        let health = controller.health();
        assert!(health.last_success.is_none());
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn field_parses_mpd_style_status_block() {
        let lines = vec!["state: play".to_string(), "elapsed: 12.5".to_string()];
        assert_eq!(field(&lines, "state").as_deref(), Some("play"));
        assert_eq!(field(&lines, "elapsed").as_deref(), Some("12.5"));
        assert_eq!(field(&lines, "missing"), None);
    }

    #[test]
    fn parse_listallinfo_groups_fields_per_track() {
        let lines = vec![
            "file: songs/louane-jour2.mp3".to_string(),
            "Title: Jour 2".to_string(),
            "Artist: Louane".to_string(),
            "Genre: Pop".to_string(),
            "file: songs/abba-gimme.mp3".to_string(),
            "Title: Gimme! Gimme! Gimme!".to_string(),
            "Artist: ABBA".to_string(),
        ];
        let entries = parse_listallinfo(&lines);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "songs/louane-jour2.mp3");
        assert_eq!(entries[0].title, "Jour 2");
        assert_eq!(entries[0].artist.as_deref(), Some("Louane"));
        assert_eq!(entries[0].tags, vec!["Pop".to_string()]);
        assert_eq!(entries[1].key, "songs/abba-gimme.mp3");
        assert_eq!(entries[1].artist.as_deref(), Some("ABBA"));
    }

    #[test]
    fn load_catalog_into_publishes_backend_entries() {
        use crate::music::Catalog;

        struct ListingBackend(StubBackend);
        impl PlaybackBackend for ListingBackend {
            fn setvol(&mut self, l: u8) -> Result<(), PlaybackError> {
                self.0.setvol(l)
            }
            fn clear(&mut self) -> Result<(), PlaybackError> {
                self.0.clear()
            }
            fn add(&mut self, uri: &str) -> Result<(), PlaybackError> {
                self.0.add(uri)
            }
            fn play(&mut self) -> Result<(), PlaybackError> {
                self.0.play()
            }
            fn stop(&mut self) -> Result<(), PlaybackError> {
                self.0.stop()
            }
            fn pause(&mut self) -> Result<(), PlaybackError> {
                self.0.pause()
            }
            fn resume(&mut self) -> Result<(), PlaybackError> {
                self.0.resume()
            }
            fn next(&mut self) -> Result<(), PlaybackError> {
                self.0.next()
            }
            fn previous(&mut self) -> Result<(), PlaybackError> {
                self.0.previous()
            }
            fn status(&mut self) -> Result<PlaybackState, PlaybackError> {
                self.0.status()
            }
            fn repeat(&mut self, on: bool) -> Result<(), PlaybackError> {
                self.0.repeat(on)
            }
            fn single(&mut self, on: bool) -> Result<(), PlaybackError> {
                self.0.single(on)
            }
            fn random(&mut self, on: bool) -> Result<(), PlaybackError> {
                self.0.random(on)
            }
            fn playlist_add(&mut self, playlist: &str, uri: &str) -> Result<(), PlaybackError> {
                self.0.playlist_add(playlist, uri)
            }
            fn load_playlist(&mut self, playlist: &str) -> Result<(), PlaybackError> {
                self.0.load_playlist(playlist)
            }
            fn list_all(&mut self) -> Result<Vec<CatalogEntry>, PlaybackError> {
                Ok(vec![CatalogEntry {
                    key: "songs/louane-jour2.mp3".to_string(),
                    title: "Jour 2".to_string(),
                    artist: Some("Louane".to_string()),
                    tags: Vec::new(),
                    phonetic_keys: Vec::new(),
                }])
            }
        }

        let controller = PlaybackController::new(Box::new(ListingBackend(StubBackend::default())));
        let catalog = Catalog::new(Vec::new());
        controller.load_catalog_into(&catalog);
        assert_eq!(catalog.snapshot().len(), 1);
        assert_eq!(catalog.snapshot()[0].key, "songs/louane-jour2.mp3");
    }
}
