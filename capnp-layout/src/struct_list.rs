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

//! List of structs.

use core::marker::PhantomData;

use crate::private::layout::{
    InlineComposite, ListBuilder, ListReader, PointerBuilder, PointerReader,
};
use crate::traits::{
    FromPointerBuilder, FromPointerReader, FromStructBuilder, FromStructReader, HasStructSize,
    IndexMove, ListIter, OwnedStruct, SetPointerBuilder,
};
use crate::Result;

#[derive(Copy, Clone)]
pub struct Owned<T>
where
    T: for<'a> OwnedStruct<'a>,
{
    marker: PhantomData<T>,
}

impl<'a, T> crate::traits::Owned<'a> for Owned<T>
where
    T: for<'b> OwnedStruct<'b>,
{
    type Reader = Reader<'a, T>;
    type Builder = Builder<'a, T>;
}

pub struct Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    marker: PhantomData<T>,
    reader: ListReader<'a>,
}

impl<'a, T> Clone for Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Copy for Reader<'a, T> where T: for<'b> OwnedStruct<'b> {}

impl<'a, T> Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    pub fn new(reader: ListReader<'a>) -> Self {
        Reader {
            reader,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    pub fn iter(self) -> ListIter<Reader<'a, T>, <T as OwnedStruct<'a>>::Reader> {
        ListIter::new(self, self.len())
    }

    pub fn get(self, index: u32) -> <T as OwnedStruct<'a>>::Reader {
        assert!(index < self.len());
        FromStructReader::new(self.reader.get_struct_element(index))
    }

    pub fn try_get(self, index: u32) -> Option<<T as OwnedStruct<'a>>::Reader> {
        if index < self.len() {
            Some(FromStructReader::new(self.reader.get_struct_element(index)))
        } else {
            None
        }
    }
}

impl<'a, T> FromPointerReader<'a> for Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a, T>> {
        Ok(Reader {
            reader: reader.get_list(InlineComposite)?,
            marker: PhantomData,
        })
    }
}

impl<'a, T> IndexMove<u32, <T as OwnedStruct<'a>>::Reader> for Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    fn index_move(&self, index: u32) -> <T as OwnedStruct<'a>>::Reader {
        self.get(index)
    }
}

impl<'a, T> SetPointerBuilder for Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Reader<'a, T>) -> Result<()> {
        pointer.set_list(&value.reader)
    }
}

pub struct Builder<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    marker: PhantomData<T>,
    builder: ListBuilder<'a>,
}

impl<'a, T> Builder<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Builder {
            builder,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    pub fn reborrow(&mut self) -> Builder<'_, T> {
        Builder {
            builder: self.builder.reborrow(),
            marker: PhantomData,
        }
    }

    pub fn as_reader(&self) -> Reader<'_, T> {
        Reader {
            marker: PhantomData,
            reader: self.builder.as_reader(),
        }
    }

    pub fn into_reader(self) -> Reader<'a, T> {
        Reader {
            marker: PhantomData,
            reader: self.builder.into_reader(),
        }
    }

    pub fn get(self, index: u32) -> <T as OwnedStruct<'a>>::Builder {
        assert!(index < self.len());
        FromStructBuilder::new(self.builder.get_struct_element(index))
    }
}

impl<'a, T> FromPointerBuilder<'a> for Builder<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Builder<'a, T> {
        Builder {
            marker: PhantomData,
            builder: builder.init_struct_list(
                size,
                <<T as OwnedStruct<'a>>::Builder as HasStructSize>::STRUCT_SIZE,
            ),
        }
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a, T>> {
        Ok(Builder {
            marker: PhantomData,
            builder: builder.get_struct_list(
                <<T as OwnedStruct<'a>>::Builder as HasStructSize>::STRUCT_SIZE,
            )?,
        })
    }
}

impl<'a, T> ::core::iter::IntoIterator for Reader<'a, T>
where
    T: for<'b> OwnedStruct<'b>,
{
    type Item = <T as OwnedStruct<'a>>::Reader;
    type IntoIter = ListIter<Reader<'a, T>, Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
