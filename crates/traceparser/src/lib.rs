//! Decoder for reqlog's binary log-message trace records.
//!
//! A record is a compact, append-only serialization of one log event,
//! attached to a request's distributed trace by `reqlog-core`:
//!
//! | Field       | Encoding                                    |
//! |-------------|---------------------------------------------|
//! | Span ID     | 8 raw bytes                                 |
//! | Event seq   | unsigned varint (per-request counter)       |
//! | Level       | 1 byte                                      |
//! | Message     | varint length + UTF-8 bytes                 |
//! | Field count | unsigned varint                             |
//! | Fields      | `[tag:1][key:string][payload]`, repeated    |
//! | Call stack  | varint frame count + one string per frame   |
//!
//! Field payloads are type-tagged; see [`tags`] for the tag table and
//! [`FieldData`] for the payload shapes. This crate shares no code with
//! the encoder, so it doubles as an independent check of the wire format.
//!
//! # Usage
//!
//! ```no_run
//! use reqlog_traceparser::parse_log_record;
//!
//! let data: &[u8] = &[/* record bytes */];
//! match parse_log_record(data) {
//!     Ok(record) => println!("{} {:?}", record.message, record.fields),
//!     Err(e) => eprintln!("parse error: {e}"),
//! }
//! ```

mod reader;
mod record;

pub use reader::{ParseError, Reader};
pub use record::{Field, FieldData, Level, LogRecord, parse_log_record, tags};
