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

//! Field descriptors: where a named field of a struct lives, checked against the struct's
//! [`StructSize`].
//!
//! Descriptors are built with `const fn`s, so a generated constant that does not fit its
//! struct's layout is rejected at compile time:
//!
//! ```compile_fail
//! use capnp_layout::{field, StructSize};
//! const SIZE: StructSize = StructSize::new(2, 1);
//! const BAD: field::Bool = field::Bool::new(SIZE, 2, 0);
//! # let _ = BAD;
//! ```

use core::marker::PhantomData;

use crate::private::layout::{PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize};
use crate::private::primitive::Primitive;
use crate::traits::{FromU16, ToU16};
use crate::NotInSchema;

/// A boolean stored in a single bit of the data section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bool {
    byte_offset: u16,
    bit: u8,
}

impl Bool {
    pub const fn new(size: StructSize, byte_offset: u16, bit: u8) -> Self {
        assert!(bit < 8, "bit index must be in 0..8");
        assert!(
            byte_offset < size.data_bytes,
            "boolean field lies outside the data section"
        );
        Bool { byte_offset, bit }
    }

    pub const fn byte_offset(&self) -> u16 {
        self.byte_offset
    }

    pub const fn bit(&self) -> u8 {
        self.bit
    }

    #[inline]
    pub fn get(self, reader: &StructReader) -> bool {
        reader.get_bool(self.byte_offset as usize, self.bit)
    }

    #[inline]
    pub fn set(self, builder: &mut StructBuilder, value: bool) {
        builder.set_bool(self.byte_offset as usize, self.bit, value)
    }
}

/// A fixed-width little-endian number in the data section. The offset must be a multiple of
/// the width.
#[derive(Debug)]
pub struct Data<T> {
    byte_offset: u16,
    marker: PhantomData<T>,
}

impl<T> Clone for Data<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Data<T> {}

impl<T: Primitive> Data<T> {
    pub const fn new(size: StructSize, byte_offset: u16) -> Self {
        let width = T::WIDTH as u16;
        assert!(
            byte_offset % width == 0,
            "data field offset is not a multiple of its width"
        );
        assert!(
            byte_offset as u32 + width as u32 <= size.data_bytes as u32,
            "data field lies outside the data section"
        );
        Data {
            byte_offset,
            marker: PhantomData,
        }
    }

    pub const fn byte_offset(&self) -> u16 {
        self.byte_offset
    }

    #[inline]
    fn element_offset(self) -> usize {
        self.byte_offset as usize / T::WIDTH
    }

    #[inline]
    pub fn get(self, reader: &StructReader) -> T {
        reader.get_data_field::<T>(self.element_offset())
    }

    #[inline]
    pub fn set(self, builder: &mut StructBuilder, value: T) {
        builder.set_data_field::<T>(self.element_offset(), value)
    }
}

/// A one-of-N value stored as a `u16` discriminant.
#[derive(Debug)]
pub struct Enum<T> {
    raw: Data<u16>,
    marker: PhantomData<T>,
}

impl<T> Clone for Enum<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Enum<T> {}

impl<T: FromU16 + ToU16> Enum<T> {
    pub const fn new(size: StructSize, byte_offset: u16) -> Self {
        Enum {
            raw: Data::new(size, byte_offset),
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn get(self, reader: &StructReader) -> Result<T, NotInSchema> {
        T::from_u16(self.raw.get(reader))
    }

    #[inline]
    pub fn set(self, builder: &mut StructBuilder, value: T) {
        self.raw.set(builder, value.to_u16())
    }
}

/// A slot in the pointer section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pointer {
    index: u16,
}

impl Pointer {
    pub const fn new(size: StructSize, index: u16) -> Self {
        assert!(
            index < size.pointers,
            "pointer field lies outside the pointer section"
        );
        Pointer { index }
    }

    pub const fn index(&self) -> u16 {
        self.index
    }

    #[inline]
    pub fn get<'a>(self, reader: &StructReader<'a>) -> PointerReader<'a> {
        reader.get_pointer_field(self.index as usize)
    }

    #[inline]
    pub fn builder<'a>(self, builder: StructBuilder<'a>) -> PointerBuilder<'a> {
        builder.get_pointer_field(self.index as usize)
    }
}
