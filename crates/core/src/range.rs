//! HTTP byte range parsing.
//!
//! Only a single range of the forms `bytes=start-end` and `bytes=start-` is
//! supported. Suffix ranges (`bytes=-N`) and multi-range requests are
//! treated as unsatisfiable.

use crate::error::{Error, Result};

/// An inclusive byte range within a blob of known size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parse a `Range` header value against a blob of `size` bytes.
    pub fn parse(header: &str, size: u64) -> Result<Self> {
        let unsatisfiable = || Error::RangeNotSatisfiable { size };

        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(unsatisfiable)?;
        let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;

        let start: u64 = start.trim().parse().map_err(|_| unsatisfiable())?;
        let end: u64 = match end.trim() {
            "" => size.checked_sub(1).ok_or_else(unsatisfiable)?,
            explicit => explicit.parse().map_err(|_| unsatisfiable())?,
        };

        if start > end || end >= size {
            return Err(unsatisfiable());
        }
        Ok(Self { start, end })
    }

    /// Number of bytes covered by the range, never zero once parsed.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header of a 206 response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Value for the `Content-Range` header of a 416 response.
pub fn unsatisfiable_content_range(size: u64) -> String {
    format!("bytes */{size}")
}
