// src/extract/error.rs

use std::{fmt, io};
use thiserror::Error;

/// Which sink call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkOp {
    Open,
    Append,
    Finish,
}

impl fmt::Display for SinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SinkOp::Open => "open",
            SinkOp::Append => "append row",
            SinkOp::Finish => "finish",
        })
    }
}

/// Failure of a single document extraction. Always fatal for that document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The event sequence does not describe a table we can emit.
    #[error("malformed table structure: {0}")]
    Structural(String),

    #[error("sink {op} failed")]
    Sink {
        op: SinkOp,
        #[source]
        source: io::Error,
    },

    /// The input byte stream could not be read.
    #[error("reading document failed")]
    Read(#[source] io::Error),
}

impl ExtractError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        ExtractError::Structural(msg.into())
    }

    pub(crate) fn sink(op: SinkOp) -> impl FnOnce(io::Error) -> Self {
        move |source| ExtractError::Sink { op, source }
    }
}
