//! Parser for the debug information and calibration memory of compiled
//! binaries.
//!
//! The entry point is [`File::parse`], which maps a binary, splits its
//! debug-information section into compile units, builds a raw entry tree per
//! unit, and resolves the entries into a typed variable tree. Calibration
//! values live in a separate [`MemoryImage`] loaded from an Intel-HEX or raw
//! binary file and addressed with the `address`/`size_chain` fields carried
//! by the variable tree.

#[macro_use]
extern crate log;

mod abbrev;
mod entry;
mod file;
mod form;
mod memory;
mod reader;
mod resolve;
mod unit;
mod walker;

pub use crate::abbrev::*;
pub use crate::entry::*;
pub use crate::file::*;
pub use crate::form::*;
pub use crate::memory::*;
pub use crate::reader::*;
pub use crate::resolve::*;
pub use crate::unit::*;
pub use crate::walker::*;

use std::borrow::{Borrow, Cow};
use std::error;
use std::fmt;
use std::io;
use std::result;

#[derive(Debug)]
pub struct Error(pub Cow<'static, str>);

impl error::Error for Error {
    fn description(&self) -> &str {
        self.0.borrow()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Error {
        Error(Cow::Borrowed(s))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error(Cow::Owned(s))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error(Cow::Owned(format!("IO error: {}", e)))
    }
}

pub type Result<T> = result::Result<T, Error>;

mod address {
    /// A symbol address.
    ///
    /// Address `0` doubles as "unknown": the location expressions this parser
    /// understands never place calibration data at address zero, and an
    /// unresolved variable keeps the default.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Address(u64);

    impl Address {
        #[inline]
        pub fn new(address: u64) -> Address {
            Address(address)
        }

        #[inline]
        pub fn none() -> Address {
            Address(0)
        }

        #[inline]
        pub fn is_none(self) -> bool {
            self == Self::none()
        }

        #[inline]
        pub fn is_some(self) -> bool {
            self != Self::none()
        }

        #[inline]
        pub fn get(self) -> Option<u64> {
            if self.is_none() {
                None
            } else {
                Some(self.0)
            }
        }

        #[inline]
        pub fn value(self) -> u64 {
            self.0
        }
    }

    impl Default for Address {
        #[inline]
        fn default() -> Self {
            Address::none()
        }
    }
}

pub use crate::address::Address;
