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

//! An annotation declaration: the type of its value and the kinds of declarations it may be
//! attached to.
//!
//! Data section (2 bytes), one `targets_*` flag per bit:
//!
//! | byte | bit 0       | bit 1  | bit 2 | bit 3      | bit 4  | bit 5 | bit 6 |
//! |------|-------------|--------|-------|------------|--------|-------|-------|
//! | 0    | file        | const  | enum  | enumerant  | struct | field | union |
//! | 1    | interface   | method | param | annotation |        |       |       |
//!
//! Pointer section (1 slot): `type`.

use crate::field;
use crate::private::layout::{self, StructSize};
use crate::{any_pointer, MessageSize, Result};

pub const STRUCT_SIZE: StructSize = StructSize::new(2, 1);

const TARGETS_FILE: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 0);
const TARGETS_CONST: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 1);
const TARGETS_ENUM: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 2);
const TARGETS_ENUMERANT: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 3);
const TARGETS_STRUCT: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 4);
const TARGETS_FIELD: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 5);
const TARGETS_UNION: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 6);
const TARGETS_INTERFACE: field::Bool = field::Bool::new(STRUCT_SIZE, 1, 0);
const TARGETS_METHOD: field::Bool = field::Bool::new(STRUCT_SIZE, 1, 1);
const TARGETS_PARAM: field::Bool = field::Bool::new(STRUCT_SIZE, 1, 2);
const TARGETS_ANNOTATION: field::Bool = field::Bool::new(STRUCT_SIZE, 1, 3);

const TYPE: field::Pointer = field::Pointer::new(STRUCT_SIZE, 0);

#[derive(Copy, Clone)]
pub struct Owned(());
impl<'a> crate::traits::Owned<'a> for Owned {
    type Reader = Reader<'a>;
    type Builder = Builder<'a>;
}
impl<'a> crate::traits::OwnedStruct<'a> for Owned {
    type Reader = Reader<'a>;
    type Builder = Builder<'a>;
}

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: layout::StructReader<'a>,
}

impl<'a> crate::traits::FromStructReader<'a> for Reader<'a> {
    fn new(reader: layout::StructReader<'a>) -> Self {
        Self { reader }
    }
}

impl<'a> crate::traits::FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &layout::PointerReader<'a>) -> Result<Self> {
        Ok(Self {
            reader: reader.get_struct()?,
        })
    }
}

impl<'a> crate::traits::SetPointerBuilder for Reader<'a> {
    fn set_pointer_builder(mut pointer: layout::PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_struct(&value.reader)
    }
}

impl<'a> Reader<'a> {
    pub fn reborrow(&self) -> Reader<'_> {
        Self { ..*self }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        self.reader.total_size()
    }

    #[inline]
    pub fn get_type(self) -> any_pointer::Reader<'a> {
        any_pointer::Reader::new(TYPE.get(&self.reader))
    }
    #[inline]
    pub fn has_type(&self) -> bool {
        !TYPE.get(&self.reader).is_null()
    }
    #[inline]
    pub fn get_targets_file(self) -> bool {
        TARGETS_FILE.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_const(self) -> bool {
        TARGETS_CONST.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_enum(self) -> bool {
        TARGETS_ENUM.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_enumerant(self) -> bool {
        TARGETS_ENUMERANT.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_struct(self) -> bool {
        TARGETS_STRUCT.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_field(self) -> bool {
        TARGETS_FIELD.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_union(self) -> bool {
        TARGETS_UNION.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_interface(self) -> bool {
        TARGETS_INTERFACE.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_method(self) -> bool {
        TARGETS_METHOD.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_param(self) -> bool {
        TARGETS_PARAM.get(&self.reader)
    }
    #[inline]
    pub fn get_targets_annotation(self) -> bool {
        TARGETS_ANNOTATION.get(&self.reader)
    }
}

pub struct Builder<'a> {
    builder: layout::StructBuilder<'a>,
}

impl<'a> crate::traits::HasStructSize for Builder<'a> {
    const STRUCT_SIZE: StructSize = STRUCT_SIZE;
}

impl<'a> crate::traits::FromStructBuilder<'a> for Builder<'a> {
    fn new(builder: layout::StructBuilder<'a>) -> Self {
        Self { builder }
    }
}

impl<'a> crate::traits::FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: layout::PointerBuilder<'a>, _size: u32) -> Self {
        Self {
            builder: builder.init_struct(STRUCT_SIZE),
        }
    }
    fn get_from_pointer(builder: layout::PointerBuilder<'a>) -> Result<Self> {
        Ok(Self {
            builder: builder.get_struct(STRUCT_SIZE)?,
        })
    }
}

impl<'a> Builder<'a> {
    pub fn into_reader(self) -> Reader<'a> {
        Reader {
            reader: self.builder.into_reader(),
        }
    }
    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
        }
    }
    pub fn reborrow_as_reader(&self) -> Reader<'_> {
        Reader {
            reader: self.builder.as_reader(),
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        self.builder.as_reader().total_size()
    }

    #[inline]
    pub fn get_type(self) -> any_pointer::Builder<'a> {
        any_pointer::Builder::new(TYPE.builder(self.builder))
    }
    #[inline]
    pub fn init_type(self) -> any_pointer::Builder<'a> {
        let mut result = any_pointer::Builder::new(TYPE.builder(self.builder));
        result.clear();
        result
    }
    #[inline]
    pub fn has_type(&self) -> bool {
        !TYPE.get(&self.builder.as_reader()).is_null()
    }

    #[inline]
    pub fn get_targets_file(&self) -> bool {
        TARGETS_FILE.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_file(&mut self, value: bool) {
        TARGETS_FILE.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_const(&self) -> bool {
        TARGETS_CONST.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_const(&mut self, value: bool) {
        TARGETS_CONST.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_enum(&self) -> bool {
        TARGETS_ENUM.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_enum(&mut self, value: bool) {
        TARGETS_ENUM.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_enumerant(&self) -> bool {
        TARGETS_ENUMERANT.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_enumerant(&mut self, value: bool) {
        TARGETS_ENUMERANT.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_struct(&self) -> bool {
        TARGETS_STRUCT.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_struct(&mut self, value: bool) {
        TARGETS_STRUCT.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_field(&self) -> bool {
        TARGETS_FIELD.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_field(&mut self, value: bool) {
        TARGETS_FIELD.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_union(&self) -> bool {
        TARGETS_UNION.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_union(&mut self, value: bool) {
        TARGETS_UNION.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_interface(&self) -> bool {
        TARGETS_INTERFACE.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_interface(&mut self, value: bool) {
        TARGETS_INTERFACE.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_method(&self) -> bool {
        TARGETS_METHOD.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_method(&mut self, value: bool) {
        TARGETS_METHOD.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_param(&self) -> bool {
        TARGETS_PARAM.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_param(&mut self, value: bool) {
        TARGETS_PARAM.set(&mut self.builder, value);
    }
    #[inline]
    pub fn get_targets_annotation(&self) -> bool {
        TARGETS_ANNOTATION.get(&self.builder.as_reader())
    }
    #[inline]
    pub fn set_targets_annotation(&mut self, value: bool) {
        TARGETS_ANNOTATION.set(&mut self.builder, value);
    }
}
