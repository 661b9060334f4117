// src/extract/extractor.rs

use chrono::Local;
use tracing::{debug, info, warn};

use super::{
    error::{ExtractError, SinkOp},
    event::{Element, Event},
    sanitize::{escape_cell, sanitize_header},
    types::{map_webquery_type, BigQueryType, ColumnHeader, PARTITION_COLUMN},
};
use crate::sink::Sink;

/// Format of the per-document processing timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where the extractor is within the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    AwaitingColumns,
    CollectingHeaderTypes,
    CollectingHeaderNames,
    AwaitingBody,
    InRow,
    Done,
    Aborted,
}

impl State {
    fn header_committed(&self) -> bool {
        !matches!(
            self,
            State::AwaitingColumns | State::CollectingHeaderTypes | State::CollectingHeaderNames
        )
    }
}

/// Result of a completed extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractSummary {
    pub headers: Vec<ColumnHeader>,
    pub rows: u64,
    pub processing_timestamp: String,
}

/// Streaming table → CSV state machine.
///
/// Fed one [`Event`] at a time through [`TableExtractor::handle`]. Column
/// types come from `<col>`, names from `<th>`, and each body `<tr>` becomes
/// one row handed to the [`Sink`], with the processing timestamp appended.
pub struct TableExtractor<S: Sink> {
    sink: S,
    state: State,
    processing_timestamp: String,
    pending_types: Vec<BigQueryType>,
    pending_names: Vec<String>,
    headers: Vec<ColumnHeader>,
    text: Option<String>,
    row: Option<Vec<String>>,
    body_started: bool,
    rows: u64,
}

impl<S: Sink> TableExtractor<S> {
    /// Captures the processing timestamp shared by every row of this document.
    pub fn new(sink: S) -> Self {
        let ts = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::with_timestamp(sink, ts)
    }

    pub fn with_timestamp(sink: S, processing_timestamp: impl Into<String>) -> Self {
        Self {
            sink,
            state: State::AwaitingColumns,
            processing_timestamp: processing_timestamp.into(),
            pending_types: Vec::new(),
            pending_names: Vec::new(),
            headers: Vec::new(),
            text: None,
            row: None,
            body_started: false,
            rows: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn processing_timestamp(&self) -> &str {
        &self.processing_timestamp
    }

    /// Committed header; empty until the header section has been consumed.
    pub fn headers(&self) -> &[ColumnHeader] {
        &self.headers
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Advance the machine by one event.
    ///
    /// Any error aborts the sink and leaves the extractor in [`State::Aborted`];
    /// later events are rejected.
    pub fn handle(&mut self, event: Event<'_>) -> Result<(), ExtractError> {
        match self.state {
            State::Done => {
                return Err(ExtractError::structural("event after end of document"))
            }
            State::Aborted => return Err(ExtractError::structural("extractor was aborted")),
            _ => {}
        }

        let res = match event {
            Event::Open { element, class } => self.on_open(element, class),
            Event::Close(element) => self.on_close(element),
            Event::Text(text) => {
                if let Some(acc) = self.text.as_mut() {
                    acc.push_str(text);
                }
                Ok(())
            }
            Event::EndOfDocument => self.on_end(),
        };

        res.map_err(|e| self.fail(e))
    }

    /// Abort from outside the event flow, e.g. when the byte stream fails.
    /// Returns `err` so callers can propagate it unchanged.
    pub fn abort(&mut self, err: ExtractError) -> ExtractError {
        if self.state == State::Aborted {
            return err;
        }
        self.fail(err)
    }

    fn fail(&mut self, err: ExtractError) -> ExtractError {
        warn!(state = ?self.state, rows = self.rows, error = %err, "aborting extraction");
        self.state = State::Aborted;
        self.text = None;
        self.row = None;
        self.sink.abort();
        err
    }

    fn on_open(&mut self, element: Element, class: Option<&str>) -> Result<(), ExtractError> {
        match element {
            Element::Col if !self.body_started && !self.state.header_committed() => {
                self.pending_types.push(map_webquery_type(class));
                self.state = State::CollectingHeaderTypes;
            }
            Element::Th | Element::Td => {
                self.text = Some(String::new());
                if element == Element::Th && !self.state.header_committed() {
                    self.state = State::CollectingHeaderNames;
                }
            }
            Element::TBody => {
                if !self.state.header_committed() {
                    warn!("body started before the header section closed");
                    self.commit_header()?;
                }
                self.body_started = true;
            }
            Element::Tr if self.body_started => {
                if self.row.is_some() {
                    return Err(ExtractError::structural("row opened inside another row"));
                }
                self.row = Some(Vec::with_capacity(self.headers.len()));
                self.state = State::InRow;
            }
            _ => {}
        }
        Ok(())
    }

    fn on_close(&mut self, element: Element) -> Result<(), ExtractError> {
        match element {
            // the partition column's TIMESTAMP type is attached at commit
            Element::ColGroup if !self.state.header_committed() => {
                self.state = State::CollectingHeaderNames;
            }
            Element::Th if self.row.is_none() => {
                let text = self.take_text(element)?;
                if self.state.header_committed() {
                    warn!(text = %text, "header cell after header was committed, ignored");
                } else {
                    self.pending_names.push(sanitize_header(&text));
                }
            }
            // a <th> inside a body row is a row-header cell and carries data
            Element::Th | Element::Td => {
                let text = self.take_text(element)?;
                let row = self.row.as_mut().ok_or_else(|| {
                    ExtractError::structural("data cell outside of a body row")
                })?;
                row.push(escape_cell(&text));
            }
            Element::THead => {
                if self.state.header_committed() {
                    return Err(ExtractError::structural("second header section"));
                }
                self.commit_header()?;
            }
            Element::Tr if self.body_started => self.emit_row()?,
            _ => {}
        }
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), ExtractError> {
        if self.row.is_some() {
            return Err(ExtractError::structural("document ended inside a row"));
        }
        if !self.state.header_committed() {
            warn!("document ended without a header section");
            self.commit_header()?;
        }
        self.sink.finish().map_err(ExtractError::sink(SinkOp::Finish))?;
        self.state = State::Done;

        debug!(headers = ?self.headers, "extracted header metadata");
        info!(rows = self.rows, columns = self.headers.len(), "parsed rows");
        Ok(())
    }

    fn take_text(&mut self, element: Element) -> Result<String, ExtractError> {
        self.text.take().ok_or_else(|| {
            ExtractError::structural(format!("</{}> without a matching open cell", element.as_str()))
        })
    }

    fn commit_header(&mut self) -> Result<(), ExtractError> {
        let names = std::mem::take(&mut self.pending_names);
        let types = std::mem::take(&mut self.pending_types);
        if types.len() != names.len() {
            warn!(
                types = types.len(),
                names = names.len(),
                "column type count differs from header count"
            );
        }

        // names without a <col> fall back to the default type
        let mut headers: Vec<ColumnHeader> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let ty = types.get(i).copied().unwrap_or(BigQueryType::DEFAULT);
                ColumnHeader::new(name, ty)
            })
            .collect();
        headers.push(ColumnHeader::new(PARTITION_COLUMN, BigQueryType::Timestamp));
        self.headers = headers;

        self.sink
            .open(&self.headers)
            .map_err(ExtractError::sink(SinkOp::Open))?;
        self.state = State::AwaitingBody;
        Ok(())
    }

    fn emit_row(&mut self) -> Result<(), ExtractError> {
        let Some(mut row) = self.row.take() else {
            // stray </tr>
            return Ok(());
        };

        let width = self.headers.len();
        let cells = row.len();
        if cells + 1 > width {
            return Err(ExtractError::structural(format!(
                "row {} has {} cells but the header declares {} columns",
                self.rows + 1,
                cells,
                width.saturating_sub(1)
            )));
        }
        if cells + 1 < width {
            debug!(row = self.rows + 1, cells, "padding short row");
            row.resize(width - 1, String::new());
        }
        row.push(self.processing_timestamp.clone());

        self.sink
            .append_row(&row)
            .map_err(ExtractError::sink(SinkOp::Append))?;
        self.rows += 1;
        self.state = State::AwaitingBody;
        Ok(())
    }

    /// Headers, row count and timestamp once the document has finished.
    pub fn summary(&self) -> ExtractSummary {
        ExtractSummary {
            headers: self.headers.clone(),
            rows: self.rows,
            processing_timestamp: self.processing_timestamp.clone(),
        }
    }
}
