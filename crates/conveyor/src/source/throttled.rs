use std::{
    fs::File,
    io::{self, BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use conveyor_timing::Nanos;
use conveyor_wire::{read_record, record_len};
use tracing::debug;

use crate::source::{Item, POR_NONE, Source, wire_to_io};

/// Record delimiting for [`ThrottledFileSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// `[u32 BE length][payload]` records.
    Framed,
    /// Newline-delimited ASCII; the newline stays part of the record.
    Lines,
}

/// File source with a byte-rate throttle.
///
/// When the observed rate since the start of the current window exceeds
/// `limit_rate` (bytes/s), `next` yields without advancing the position,
/// letting the round-robin rotation visit other streams. The window
/// re-bases after `limit_rate * 60` bytes so the elapsed term stays small
/// enough for the float arithmetic.
pub struct ThrottledFileSource {
    file: BufReader<File>,
    name: Vec<u8>,
    key: Vec<u8>,
    mode: ReadMode,
    limit_rate: f64,
    pos: u64,
    bytes_read: u64,
    window_start: Option<Nanos>,
    last_acked: Option<u64>,
}

impl ThrottledFileSource {
    pub fn open(path: impl AsRef<Path>, mode: ReadMode, limit_rate: f64) -> io::Result<Self> {
        let file = BufReader::new(File::open(&path)?);
        let name = path.as_ref().to_string_lossy().into_owned().into_bytes();
        Ok(Self {
            file,
            key: name.clone(),
            name,
            mode,
            limit_rate,
            pos: 0,
            bytes_read: 0,
            window_start: None,
            last_acked: None,
        })
    }

    /// Overrides the stream name (and key), which default to the file path.
    pub fn with_stream_name(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.name = name.into();
        self.key = self.name.clone();
        self
    }

    /// Position the engine acknowledged most recently, if any.
    pub fn last_acked(&self) -> Option<u64> {
        self.last_acked
    }

    /// (record bytes, on-disk length consumed), or `None` at end of data.
    fn read_one(&mut self) -> io::Result<Option<(Vec<u8>, u64)>> {
        match self.mode {
            ReadMode::Framed => match read_record(&mut self.file).map_err(wire_to_io)? {
                Some(payload) => {
                    let consumed = record_len(&payload);
                    Ok(Some((payload, consumed)))
                }
                None => Ok(None),
            },
            ReadMode::Lines => {
                let mut line = Vec::new();
                let n = self.file.read_until(b'\n', &mut line)?;
                if n == 0 {
                    return Ok(None);
                }
                Ok(Some((line, n as u64)))
            }
        }
    }
}

impl Source for ThrottledFileSource {
    fn name(&self) -> &[u8] {
        &self.name
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn point_of_ref(&self) -> u64 {
        self.pos
    }

    fn reset(&mut self, por: u64) -> io::Result<()> {
        let target = if por == POR_NONE { 0 } else { por };
        self.file.seek(SeekFrom::Start(target))?;
        self.pos = target;
        debug!(
            name = %String::from_utf8_lossy(&self.name),
            to = target,
            "reset throttled source"
        );
        Ok(())
    }

    fn next(&mut self) -> io::Result<Item> {
        let now = Nanos::now();
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.saturating_sub(start).as_secs().max(1e-6);
        let rate = self.bytes_read as f64 / elapsed;
        if rate > self.limit_rate {
            return Ok(Item::Yield { por: self.pos });
        }

        let Some((payload, consumed)) = self.read_one()? else {
            return Ok(Item::End);
        };

        if self.bytes_read > (self.limit_rate * 60.0) as u64 {
            self.bytes_read = 0;
            self.window_start = Some(now.saturating_sub(Nanos::from_millis(1)));
        }
        self.bytes_read += payload.len() as u64;
        self.pos += consumed;
        Ok(Item::Record { por: self.pos, payload })
    }

    fn acked(&mut self, por: u64) {
        self.last_acked = Some(por);
    }

    fn close(&mut self) {
        debug!(name = %String::from_utf8_lossy(&self.name), pos = self.pos, "source closed");
    }
}
