// src/extract/mod.rs

pub mod error;
pub mod event;
pub mod extractor;
pub mod sanitize;
pub mod tokenize;
pub mod types;

pub use error::{ExtractError, SinkOp};
pub use event::{Element, Event};
pub use extractor::{ExtractSummary, State, TableExtractor, TIMESTAMP_FORMAT};
pub use sanitize::{escape_cell, sanitize_header};
pub use tokenize::{extract_html, HtmlTableStream};
pub use types::{map_webquery_type, BigQueryType, ColumnHeader, PARTITION_COLUMN};
