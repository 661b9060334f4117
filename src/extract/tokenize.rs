// src/extract/tokenize.rs

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    states::RawKind, BufferQueue, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};
use std::io::{ErrorKind, Read};
use tracing::trace;

use super::{
    error::ExtractError,
    event::{Element, Event},
    extractor::{ExtractSummary, TableExtractor},
};
use crate::sink::Sink;

const READ_BUF: usize = 16 * 1024;

/// Elements whose content is text, not markup. The bare tokenizer only
/// switches modes when told to.
fn raw_text_kind(tag: &str) -> Option<RawKind> {
    match tag {
        "script" => Some(RawKind::ScriptData),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

/// Turns html5ever tokens into [`Event`]s, supplying the end tags HTML
/// allows authors to omit (`</td>`, `</tr>`, `</colgroup>`, `</thead>`).
struct EventPump<S: Sink> {
    extractor: TableExtractor<S>,
    error: Option<ExtractError>,
    in_colgroup: bool,
    in_thead: bool,
    in_row: bool,
    open_cell: Option<Element>,
    // inside <script>, <style> and friends; their text never reaches a cell
    in_raw_text: bool,
}

impl<S: Sink> EventPump<S> {
    fn emit(&mut self, event: Event<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.extractor.handle(event) {
            self.error = Some(e);
        }
    }

    fn close_cell(&mut self) {
        if let Some(cell) = self.open_cell.take() {
            self.emit(Event::Close(cell));
        }
    }

    fn close_row(&mut self) {
        self.close_cell();
        if self.in_row {
            self.in_row = false;
            self.emit(Event::Close(Element::Tr));
        }
    }

    fn close_colgroup(&mut self) {
        if self.in_colgroup {
            self.in_colgroup = false;
            self.emit(Event::Close(Element::ColGroup));
        }
    }

    fn close_thead(&mut self) {
        self.close_row();
        if self.in_thead {
            self.in_thead = false;
            self.emit(Event::Close(Element::THead));
        }
    }

    fn start_tag(&mut self, element: Element, class: Option<&str>) {
        match element {
            Element::Col => {}
            Element::ColGroup | Element::THead | Element::TBody => {
                self.close_colgroup();
                if element == Element::TBody {
                    self.close_thead();
                } else {
                    self.close_row();
                }
            }
            Element::Tr => {
                self.close_colgroup();
                self.close_row();
            }
            Element::Th | Element::Td => {
                self.close_colgroup();
                self.close_cell();
            }
            Element::Other => return,
        }

        match element {
            Element::ColGroup => self.in_colgroup = true,
            Element::THead => self.in_thead = true,
            Element::Tr => self.in_row = true,
            Element::Th | Element::Td => self.open_cell = Some(element),
            _ => {}
        }
        self.emit(Event::Open { element, class });
    }

    fn end_tag(&mut self, element: Element, name: &str) {
        match element {
            Element::Th | Element::Td if self.open_cell.is_some() => self.close_cell(),
            Element::Tr if self.in_row => self.close_row(),
            Element::ColGroup if self.in_colgroup => self.close_colgroup(),
            Element::THead if self.in_thead => self.close_thead(),
            Element::TBody => {
                self.close_row();
                self.emit(Event::Close(Element::TBody));
            }
            // the table itself closing ends any open row
            Element::Other if name.eq_ignore_ascii_case("table") => {
                self.close_colgroup();
                self.close_row();
            }
            _ => trace!(tag = name, "ignoring unmatched end tag"),
        }
    }

    fn end_of_document(&mut self) {
        self.close_colgroup();
        self.close_thead();
        self.close_row();
        self.emit(Event::EndOfDocument);
    }
}

impl<S: Sink> TokenSink for EventPump<S> {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.error.is_some() {
            return TokenSinkResult::Continue;
        }
        match token {
            Token::TagToken(tag) => {
                let element = Element::from_tag(&tag.name);
                match tag.kind {
                    TagKind::StartTag => {
                        let class = tag
                            .attrs
                            .iter()
                            .find(|a| &*a.name.local == "class")
                            .map(|a| &*a.value);
                        self.start_tag(element, class);
                        // <td/> in HTML is not self-closing, but honour it for XHTML-ish input
                        if tag.self_closing && element.is_cell() {
                            self.close_cell();
                        }
                        if !tag.self_closing {
                            if let Some(kind) = raw_text_kind(&tag.name) {
                                self.in_raw_text = true;
                                return TokenSinkResult::RawData(kind);
                            }
                        }
                    }
                    TagKind::EndTag if self.in_raw_text => {
                        self.in_raw_text = raw_text_kind(&tag.name).is_none();
                    }
                    TagKind::EndTag => self.end_tag(element, &tag.name),
                }
            }
            Token::CharacterTokens(text) if !self.in_raw_text => self.emit(Event::Text(&text)),
            Token::ParseError(msg) => trace!(%msg, "html parse error"),
            // the terminal event is sent from `HtmlTableStream::finish`
            Token::EOFToken => {}
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Push-based HTML → table extraction.
///
/// Feed raw bytes in arbitrary chunks (they may split UTF-8 sequences), then
/// call [`finish`](Self::finish). Nothing beyond the current chunk is buffered.
pub struct HtmlTableStream<S: Sink> {
    tokenizer: Tokenizer<EventPump<S>>,
    queue: BufferQueue,
    carry: Vec<u8>,
}

impl<S: Sink> HtmlTableStream<S> {
    pub fn new(extractor: TableExtractor<S>) -> Self {
        let pump = EventPump {
            extractor,
            error: None,
            in_colgroup: false,
            in_thead: false,
            in_row: false,
            open_cell: None,
            in_raw_text: false,
        };
        Self {
            tokenizer: Tokenizer::new(pump, TokenizerOpts::default()),
            queue: BufferQueue::new(),
            carry: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ExtractError> {
        self.carry.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            // incomplete sequence at the end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.carry.len(),
        };
        let rest = self.carry.split_off(complete);
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry = rest;
        self.push_text(text)
    }

    fn push_text(&mut self, text: String) -> Result<(), ExtractError> {
        if !text.is_empty() {
            self.queue.push_back(StrTendril::from(text));
            let _ = self.tokenizer.feed(&mut self.queue);
        }
        match self.tokenizer.sink.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flush the tokenizer, close anything still open and finish the sink.
    pub fn finish(mut self) -> Result<ExtractSummary, ExtractError> {
        let tail = String::from_utf8_lossy(&std::mem::take(&mut self.carry)).into_owned();
        self.push_text(tail)?;
        self.tokenizer.end();

        let pump = &mut self.tokenizer.sink;
        if let Some(e) = pump.error.take() {
            return Err(e);
        }
        pump.end_of_document();
        match pump.error.take() {
            Some(e) => Err(e),
            None => Ok(pump.extractor.summary()),
        }
    }

    /// Abort the underlying extractor after an input failure.
    pub fn abort(mut self, err: ExtractError) -> ExtractError {
        self.tokenizer.sink.extractor.abort(err)
    }
}

/// Pull an entire HTML document from `reader` through `extractor`.
pub fn extract_html<R: Read, S: Sink>(
    mut reader: R,
    extractor: TableExtractor<S>,
) -> Result<ExtractSummary, ExtractError> {
    let mut stream = HtmlTableStream::new(extractor);
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(stream.abort(ExtractError::Read(e))),
        };
        stream.feed(&buf[..n])?;
    }
    stream.finish()
}
