//! Score assembler: turns textual score sources into the binary format the
//! score store loads. Two passes over a token stream — the first sizes the
//! output and collects labels, the second emits bytes.

#[macro_use]
extern crate log;

pub mod builder;
pub mod lexer;
pub mod token;
