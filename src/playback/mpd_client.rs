//! Text-line client for the MPD-compatible PlaybackBackend (spec §6).
//!
//! Grounded on the connect/reconnect-once shape of `AudioClient` in the
//! grounding crate's audio protocol, adapted from a length-prefixed binary
//! framing to MPD's newline-terminated command/response lines.

use log::{debug, warn};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend rejected command: {0}")]
    Rejected(String),
}

impl MpdError {
    fn is_already_connected(&self) -> bool {
        matches!(self, MpdError::Rejected(msg) if msg.to_lowercase().contains("already connected"))
    }
}

/// One open socket to the backend, with the `OK MPD <version>` banner
/// consumed at connect time.
pub struct MpdConnection {
    address: String,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl MpdConnection {
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, MpdError> {
        debug!("connecting to playback backend at {address}");
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);

        let mut banner = String::new();
        reader.read_line(&mut banner)?;
        debug!("backend banner: {}", banner.trim_end());

        Ok(Self {
            address: address.to_string(),
            reader,
            writer,
        })
    }

    /// Send one command line and collect its response lines until `OK` or
    /// `ACK ...`. An `ACK` response becomes `MpdError::Rejected`.
    pub fn command(&mut self, line: &str) -> Result<Vec<String>, MpdError> {
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;

        let mut lines = Vec::new();
        loop {
            let mut raw = String::new();
            let read = self.reader.read_line(&mut raw)?;
            if read == 0 {
                return Err(MpdError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "backend closed connection",
                )));
            }
            let trimmed = raw.trim_end_matches(['\r', '\n']);
            if trimmed == "OK" {
                return Ok(lines);
            }
            if let Some(reason) = trimmed.strip_prefix("ACK ") {
                return Err(MpdError::Rejected(reason.to_string()));
            }
            lines.push(trimmed.to_string());
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Runs `command`, treating a protocol-level "already connected" ACK as a
/// success (spec §6 "Errors of the form 'already connected'... treated as
/// success").
pub fn run_tolerant(conn: &mut MpdConnection, line: &str) -> Result<Vec<String>, MpdError> {
    match conn.command(line) {
        Ok(lines) => Ok(lines),
        Err(e) if e.is_already_connected() => {
            warn!("backend reported already-connected for `{line}`, treating as success");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
