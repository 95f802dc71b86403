use std::{
    fs::File,
    io::{self, Seek, SeekFrom},
    path::Path,
};

use conveyor_wire::{read_record, record_len};
use tracing::debug;

use crate::source::{Item, POR_NONE, Source, wire_to_io};

/// Reads a framed record file: `[u32 BE length][payload]` concatenated.
/// The position is the byte offset at which the next header begins.
pub struct FramedFileSource {
    file: File,
    name: Vec<u8>,
    key: Vec<u8>,
    pos: u64,
}

impl FramedFileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(&path)?;
        let name = path.as_ref().to_string_lossy().into_owned().into_bytes();
        Ok(Self { file, key: name.clone(), name, pos: 0 })
    }

    /// Overrides the stream name (and key), which default to the file path.
    pub fn with_stream_name(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.name = name.into();
        self.key = self.name.clone();
        self
    }
}

impl Source for FramedFileSource {
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
        if por == POR_NONE {
            self.file.seek(SeekFrom::Start(0))?;
            self.pos = 0;
            debug!(name = %String::from_utf8_lossy(&self.name), "reset to file beginning");
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(por))?;
        self.pos = por;
        // The engine's position refers to its last processed record; step
        // over one record so the next read starts past it.
        if let Some(payload) = read_record(&mut self.file).map_err(wire_to_io)? {
            self.pos += record_len(&payload);
        }
        debug!(
            name = %String::from_utf8_lossy(&self.name),
            from = por,
            to = self.pos,
            "reset framed source"
        );
        Ok(())
    }

    fn next(&mut self) -> io::Result<Item> {
        match read_record(&mut self.file).map_err(wire_to_io)? {
            Some(payload) => {
                self.pos += record_len(&payload);
                Ok(Item::Record { por: self.pos, payload })
            }
            None => Ok(Item::End),
        }
    }

    fn close(&mut self) {
        debug!(name = %String::from_utf8_lossy(&self.name), pos = self.pos, "source closed");
    }
}
