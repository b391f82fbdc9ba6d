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

//! Glue between generated accessors and the layout layer.

use core::marker::PhantomData;

use crate::private::layout::{
    PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize,
};
use crate::{NotInSchema, Result};

pub trait FromStructReader<'a> {
    fn new(reader: StructReader<'a>) -> Self;
}

pub trait HasStructSize {
    const STRUCT_SIZE: StructSize;
}

pub trait FromStructBuilder<'a> {
    fn new(struct_builder: StructBuilder<'a>) -> Self;
}

pub trait FromPointerReader<'a>: Sized {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Self>;
}

/// Associated types hackery that allows us to reason about Cap'n Proto types
/// without needing to give them a lifetime `'a`.
///
/// If `Foo` is a Cap'n Proto struct, then `foo::Reader<'a>` is to `foo::Owned` as `&'a Bar`
/// is to `Bar`, and `foo::Builder<'a>` is to `foo::Owned` as `&'a mut Bar` is to `Bar`.
pub trait Owned<'a> {
    type Reader: FromPointerReader<'a> + SetPointerBuilder;
    type Builder: FromPointerBuilder<'a>;
}

pub trait OwnedStruct<'a> {
    type Reader: FromStructReader<'a> + SetPointerBuilder;
    type Builder: FromStructBuilder<'a> + HasStructSize;
}

pub trait FromPointerBuilder<'a>: Sized {
    /// Allocates a fresh value in the pointer slot. `length` is the element count for lists and
    /// the byte count for text and data; structs ignore it.
    fn init_pointer(builder: PointerBuilder<'a>, length: u32) -> Self;
    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Self>;
}

/// Values that can be deep-copied into a pointer slot.
pub trait SetPointerBuilder {
    fn set_pointer_builder(builder: PointerBuilder<'_>, from: Self) -> Result<()>;
}

pub trait ToU16 {
    fn to_u16(self) -> u16;
}

pub trait FromU16: Sized {
    fn from_u16(value: u16) -> ::core::result::Result<Self, NotInSchema>;
}

impl ToU16 for u16 {
    fn to_u16(self) -> u16 {
        self
    }
}

impl FromU16 for u16 {
    fn from_u16(value: u16) -> ::core::result::Result<Self, NotInSchema> {
        Ok(value)
    }
}

pub trait IndexMove<I, T> {
    fn index_move(&self, index: I) -> T;
}

pub struct ListIter<T, U> {
    marker: PhantomData<U>,
    list: T,
    index: u32,
    size: u32,
}

impl<T, U> ListIter<T, U> {
    pub fn new(list: T, size: u32) -> Self {
        Self {
            list,
            index: 0,
            size,
            marker: PhantomData,
        }
    }
}

impl<U, T: IndexMove<u32, U>> ::core::iter::Iterator for ListIter<T, U> {
    type Item = U;
    fn next(&mut self) -> Option<U> {
        if self.index < self.size {
            let result = self.list.index_move(self.index);
            self.index += 1;
            Some(result)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.size - self.index) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, p: usize) -> Option<U> {
        let target = self.index as usize + p;
        if target < self.size as usize {
            self.index = target as u32 + 1;
            Some(self.list.index_move(target as u32))
        } else {
            self.index = self.size;
            None
        }
    }
}

impl<U, T: IndexMove<u32, U>> ::core::iter::ExactSizeIterator for ListIter<T, U> {}

impl<U, T: IndexMove<u32, U>> ::core::iter::DoubleEndedIterator for ListIter<T, U> {
    fn next_back(&mut self) -> Option<U> {
        if self.size > self.index {
            self.size -= 1;
            Some(self.list.index_move(self.size))
        } else {
            None
        }
    }
}
