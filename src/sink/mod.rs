// src/sink/mod.rs

use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::extract::ColumnHeader;

/// Destination for the header and rows produced by the extractor.
///
/// Rows arrive with every field already CSV-escaped.
pub trait Sink {
    /// Commit the header row. Called exactly once per document.
    fn open(&mut self, headers: &[ColumnHeader]) -> io::Result<()>;

    fn append_row(&mut self, row: &[String]) -> io::Result<()>;

    /// Flush and release the underlying resource.
    fn finish(&mut self) -> io::Result<()>;

    /// Best-effort release after a failure. Must not panic or report errors.
    fn abort(&mut self);
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn open(&mut self, headers: &[ColumnHeader]) -> io::Result<()> {
        (**self).open(headers)
    }

    fn append_row(&mut self, row: &[String]) -> io::Result<()> {
        (**self).append_row(row)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

/// Writes one CSV file: header line on `open`, one CRLF-terminated line per row.
pub struct CsvFileSink {
    path: PathBuf,
    writer: Option<Writer<File>>,
    rows_written: u64,
}

impl CsvFileSink {
    /// The file is created lazily, when the header is committed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            rows_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn writer(&mut self) -> io::Result<&mut Writer<File>> {
        self.writer.as_mut().ok_or_else(|| {
            io::Error::other(format!("{} is not open", self.path.display()))
        })
    }
}

impl Sink for CsvFileSink {
    fn open(&mut self, headers: &[ColumnHeader]) -> io::Result<()> {
        if self.writer.is_some() {
            return Err(io::Error::other(format!(
                "{} already has a header",
                self.path.display()
            )));
        }

        let file = File::create(&self.path).map_err(|e| {
            io::Error::new(e.kind(), format!("creating {}: {}", self.path.display(), e))
        })?;
        // fields are escaped upstream; the writer must not quote them again
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Never)
            .terminator(Terminator::CRLF)
            .from_writer(file);
        writer.write_record(headers.iter().map(|h| h.name.as_str()))?;

        debug!(path = %self.path.display(), columns = headers.len(), "csv header written");
        self.writer = Some(writer);
        Ok(())
    }

    fn append_row(&mut self, row: &[String]) -> io::Result<()> {
        self.writer()?.write_record(row)?;
        self.rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let mut writer = self.writer.take().ok_or_else(|| {
            io::Error::other(format!("{} was never opened", self.path.display()))
        })?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "flush during abort failed");
            }
        }
    }
}
