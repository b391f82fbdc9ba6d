// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! UTF-8 encoded text.

use core::{convert, ops, str};

use crate::private::layout::{PointerBuilder, PointerReader};
use crate::Result;

#[derive(Copy, Clone)]
pub struct Owned(());

impl<'a> crate::traits::Owned<'a> for Owned {
    type Reader = Reader<'a>;
    type Builder = Builder<'a>;
}

pub type Reader<'a> = &'a str;

/// Validates `v` as UTF-8. `v` excludes the NUL terminator.
pub fn new_reader(v: &[u8]) -> Result<Reader<'_>> {
    Ok(str::from_utf8(v)?)
}

impl<'a> crate::traits::FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        reader.get_text()
    }
}

impl<'a> crate::traits::SetPointerBuilder for Reader<'a> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Reader<'a>) -> Result<()> {
        pointer.set_text(value);
        Ok(())
    }
}

/// Text being written in place. The NUL terminator that follows the bytes is not part of the
/// builder.
pub struct Builder<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> Builder<'a> {
    /// Wraps freshly allocated (zeroed) space.
    pub fn new(bytes: &mut [u8]) -> Builder<'_> {
        Builder { bytes, pos: 0 }
    }

    /// Wraps existing text, which must be valid UTF-8.
    pub fn with_contents(bytes: &mut [u8]) -> Result<Builder<'_>> {
        str::from_utf8(bytes)?;
        let pos = bytes.len();
        Ok(Builder { bytes, pos })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn push_ascii(&mut self, ascii: u8) {
        assert!(ascii < 128);
        self.bytes[self.pos] = ascii;
        self.pos += 1;
    }

    pub fn push_str(&mut self, string: &str) {
        let bytes = string.as_bytes();
        self.bytes[self.pos..(self.pos + bytes.len())].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub fn clear(&mut self) {
        self.bytes[..self.pos].fill(0);
        self.pos = 0;
    }
}

impl<'a> ops::Deref for Builder<'a> {
    type Target = str;
    fn deref(&self) -> &str {
        str::from_utf8(self.bytes)
            .expect("text::Builder contents are checked for utf8-validity upon construction")
    }
}

impl<'a> convert::AsRef<str> for Builder<'a> {
    fn as_ref(&self) -> &str {
        self
    }
}

impl<'a> crate::traits::FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Builder<'a> {
        builder.init_text(size)
    }
    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        builder.get_text()
    }
}
