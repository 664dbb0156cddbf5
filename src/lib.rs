//! # Binpeek
//!
//! A library for decoding compiled binary artifacts (JVM class files,
//! Android dex files and Lua 5.3 bytecode chunks) into a tree of named,
//! described components with their exact byte ranges.
//!
//! # Examples
//!
//! ```no_run
//!  use binpeek::{decode, Format};
//!
//!  let bytes = std::fs::read("Hello.class").unwrap();
//!  let root = decode(Format::Class, &bytes).unwrap();
//!  println!("{}", root);
//! ```
//!
#[macro_use]
mod error;

pub mod access;
pub mod classfile;
pub mod component;
pub mod descriptor;
pub mod dex;
pub mod luac;
pub mod options;

mod leb;
mod reader;
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

pub use crate::component::Component;
pub use crate::error::{DecodeError, ErrorKind};
pub use crate::options::DecodeOptions;

use crate::error::Context;

/// The artifact formats a buffer can be decoded as. Chosen by the caller,
/// never sniffed from the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Class,
    Dex,
    Luac,
}

impl Format {
    fn label(self) -> &'static str {
        match self {
            Format::Class => "class file",
            Format::Dex => "dex file",
            Format::Luac => "luac chunk",
        }
    }
}

/// Decodes `bytes` as `format` with default options.
pub fn decode(format: Format, bytes: &[u8]) -> Result<Component, DecodeError> {
    decode_with(format, bytes, &DecodeOptions::default())
}

/// Decodes `bytes` as `format`. Any failure aborts the whole unit; errors
/// carry the chain of components being read when they happened.
pub fn decode_with(format: Format, bytes: &[u8], options: &DecodeOptions) -> Result<Component, DecodeError> {
    let result = match format {
        Format::Class => classfile::decode(bytes, options),
        Format::Dex => dex::decode(bytes, options),
        Format::Luac => luac::decode(bytes, options),
    };
    result.context(|| format.label())
}
