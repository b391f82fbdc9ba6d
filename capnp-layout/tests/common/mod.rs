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

//! Hand-written accessors in the shape the code generator emits, used by the integration tests.
//!
//! `test_all_types` and `test_old_version` are two versions of the same struct: the old one
//! has a smaller data and pointer section, and its fields sit at the same offsets.

#![allow(dead_code)]

use capnp_layout::traits::{FromU16, ToU16};
use capnp_layout::NotInSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl FromU16 for Color {
    fn from_u16(value: u16) -> Result<Self, NotInSchema> {
        match value {
            0 => Ok(Color::Red),
            1 => Ok(Color::Green),
            2 => Ok(Color::Blue),
            n => Err(NotInSchema(n)),
        }
    }
}

impl ToU16 for Color {
    fn to_u16(self) -> u16 {
        self as u16
    }
}

pub mod test_all_types {
    use capnp_layout::field;
    use capnp_layout::private::layout::{self, StructSize};
    use capnp_layout::traits::{FromPointerBuilder, FromPointerReader};
    use capnp_layout::{data, primitive_list, struct_list, text, MessageSize, NotInSchema, Result};

    use super::Color;

    pub const STRUCT_SIZE: StructSize = StructSize::new(32, 5);

    const BOOL_FIELD: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 0);
    const INT8_FIELD: field::Data<i8> = field::Data::new(STRUCT_SIZE, 1);
    const UINT16_FIELD: field::Data<u16> = field::Data::new(STRUCT_SIZE, 2);
    const INT32_FIELD: field::Data<i32> = field::Data::new(STRUCT_SIZE, 4);
    const UINT64_FIELD: field::Data<u64> = field::Data::new(STRUCT_SIZE, 8);
    const FLOAT32_FIELD: field::Data<f32> = field::Data::new(STRUCT_SIZE, 16);
    const ENUM_FIELD: field::Enum<Color> = field::Enum::new(STRUCT_SIZE, 20);
    const INT16_FIELD: field::Data<i16> = field::Data::new(STRUCT_SIZE, 22);
    const FLOAT64_FIELD: field::Data<f64> = field::Data::new(STRUCT_SIZE, 24);

    const TEXT_FIELD: field::Pointer = field::Pointer::new(STRUCT_SIZE, 0);
    const DATA_FIELD: field::Pointer = field::Pointer::new(STRUCT_SIZE, 1);
    const INT32_LIST: field::Pointer = field::Pointer::new(STRUCT_SIZE, 2);
    const STRUCT_FIELD: field::Pointer = field::Pointer::new(STRUCT_SIZE, 3);
    const STRUCT_LIST: field::Pointer = field::Pointer::new(STRUCT_SIZE, 4);

    #[derive(Copy, Clone)]
    pub struct Owned(());
    impl<'a> capnp_layout::traits::Owned<'a> for Owned {
        type Reader = Reader<'a>;
        type Builder = Builder<'a>;
    }
    impl<'a> capnp_layout::traits::OwnedStruct<'a> for Owned {
        type Reader = Reader<'a>;
        type Builder = Builder<'a>;
    }

    #[derive(Clone, Copy)]
    pub struct Reader<'a> {
        reader: layout::StructReader<'a>,
    }

    impl<'a> capnp_layout::traits::FromStructReader<'a> for Reader<'a> {
        fn new(reader: layout::StructReader<'a>) -> Self {
            Self { reader }
        }
    }

    impl<'a> capnp_layout::traits::FromPointerReader<'a> for Reader<'a> {
        fn get_from_pointer(reader: &layout::PointerReader<'a>) -> Result<Self> {
            Ok(Self {
                reader: reader.get_struct()?,
            })
        }
    }

    impl<'a> capnp_layout::traits::SetPointerBuilder for Reader<'a> {
        fn set_pointer_builder(
            mut pointer: layout::PointerBuilder<'_>,
            value: Self,
        ) -> Result<()> {
            pointer.set_struct(&value.reader)
        }
    }

    impl<'a> Reader<'a> {
        pub fn total_size(&self) -> Result<MessageSize> {
            self.reader.total_size()
        }

        pub fn raw(self) -> layout::StructReader<'a> {
            self.reader
        }

        #[inline]
        pub fn get_bool_field(self) -> bool {
            BOOL_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_int8_field(self) -> i8 {
            INT8_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_uint16_field(self) -> u16 {
            UINT16_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_int32_field(self) -> i32 {
            INT32_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_uint64_field(self) -> u64 {
            UINT64_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_float32_field(self) -> f32 {
            FLOAT32_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_enum_field(self) -> ::core::result::Result<Color, NotInSchema> {
            ENUM_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_int16_field(self) -> i16 {
            INT16_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_float64_field(self) -> f64 {
            FLOAT64_FIELD.get(&self.reader)
        }
        #[inline]
        pub fn get_text_field(self) -> Result<text::Reader<'a>> {
            FromPointerReader::get_from_pointer(&TEXT_FIELD.get(&self.reader))
        }
        pub fn has_text_field(&self) -> bool {
            !TEXT_FIELD.get(&self.reader).is_null()
        }
        #[inline]
        pub fn get_data_field(self) -> Result<data::Reader<'a>> {
            FromPointerReader::get_from_pointer(&DATA_FIELD.get(&self.reader))
        }
        #[inline]
        pub fn get_int32_list(self) -> Result<primitive_list::Reader<'a, i32>> {
            FromPointerReader::get_from_pointer(&INT32_LIST.get(&self.reader))
        }
        #[inline]
        pub fn get_struct_field(self) -> Result<Reader<'a>> {
            FromPointerReader::get_from_pointer(&STRUCT_FIELD.get(&self.reader))
        }
        pub fn has_struct_field(&self) -> bool {
            !STRUCT_FIELD.get(&self.reader).is_null()
        }
        #[inline]
        pub fn get_struct_list(self) -> Result<struct_list::Reader<'a, Owned>> {
            FromPointerReader::get_from_pointer(&STRUCT_LIST.get(&self.reader))
        }
    }

    pub struct Builder<'a> {
        builder: layout::StructBuilder<'a>,
    }

    impl<'a> capnp_layout::traits::HasStructSize for Builder<'a> {
        const STRUCT_SIZE: StructSize = STRUCT_SIZE;
    }

    impl<'a> capnp_layout::traits::FromStructBuilder<'a> for Builder<'a> {
        fn new(builder: layout::StructBuilder<'a>) -> Self {
            Self { builder }
        }
    }

    impl<'a> capnp_layout::traits::FromPointerBuilder<'a> for Builder<'a> {
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
        pub fn raw(&mut self) -> &mut layout::StructBuilder<'a> {
            &mut self.builder
        }

        #[inline]
        pub fn get_bool_field(&self) -> bool {
            BOOL_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_bool_field(&mut self, value: bool) {
            BOOL_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_int8_field(&self) -> i8 {
            INT8_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_int8_field(&mut self, value: i8) {
            INT8_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_uint16_field(&self) -> u16 {
            UINT16_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_uint16_field(&mut self, value: u16) {
            UINT16_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_int32_field(&self) -> i32 {
            INT32_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_int32_field(&mut self, value: i32) {
            INT32_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_uint64_field(&self) -> u64 {
            UINT64_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_uint64_field(&mut self, value: u64) {
            UINT64_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_float32_field(&self) -> f32 {
            FLOAT32_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_float32_field(&mut self, value: f32) {
            FLOAT32_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_enum_field(&self) -> ::core::result::Result<Color, NotInSchema> {
            ENUM_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_enum_field(&mut self, value: Color) {
            ENUM_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_int16_field(&self) -> i16 {
            INT16_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_int16_field(&mut self, value: i16) {
            INT16_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn get_float64_field(&self) -> f64 {
            FLOAT64_FIELD.get(&self.builder.as_reader())
        }
        #[inline]
        pub fn set_float64_field(&mut self, value: f64) {
            FLOAT64_FIELD.set(&mut self.builder, value);
        }
        #[inline]
        pub fn set_text_field(&mut self, value: &str) {
            TEXT_FIELD.builder(self.builder.reborrow()).set_text(value);
        }
        #[inline]
        pub fn init_text_field(self, size: u32) -> text::Builder<'a> {
            FromPointerBuilder::init_pointer(TEXT_FIELD.builder(self.builder), size)
        }
        #[inline]
        pub fn get_text_field(self) -> Result<text::Builder<'a>> {
            FromPointerBuilder::get_from_pointer(TEXT_FIELD.builder(self.builder))
        }
        pub fn has_text_field(&self) -> bool {
            !TEXT_FIELD.get(&self.builder.as_reader()).is_null()
        }
        #[inline]
        pub fn set_data_field(&mut self, value: &[u8]) {
            DATA_FIELD.builder(self.builder.reborrow()).set_data(value);
        }
        #[inline]
        pub fn init_data_field(self, size: u32) -> data::Builder<'a> {
            FromPointerBuilder::init_pointer(DATA_FIELD.builder(self.builder), size)
        }
        #[inline]
        pub fn init_int32_list(self, size: u32) -> primitive_list::Builder<'a, i32> {
            FromPointerBuilder::init_pointer(INT32_LIST.builder(self.builder), size)
        }
        #[inline]
        pub fn set_int32_list(&mut self, value: primitive_list::Reader<'_, i32>) -> Result<()> {
            capnp_layout::traits::SetPointerBuilder::set_pointer_builder(
                INT32_LIST.builder(self.builder.reborrow()),
                value,
            )
        }
        #[inline]
        pub fn get_int32_list(self) -> Result<primitive_list::Builder<'a, i32>> {
            FromPointerBuilder::get_from_pointer(INT32_LIST.builder(self.builder))
        }
        #[inline]
        pub fn init_struct_field(self) -> Builder<'a> {
            FromPointerBuilder::init_pointer(STRUCT_FIELD.builder(self.builder), 0)
        }
        #[inline]
        pub fn get_struct_field(self) -> Result<Builder<'a>> {
            FromPointerBuilder::get_from_pointer(STRUCT_FIELD.builder(self.builder))
        }
        #[inline]
        pub fn set_struct_field(&mut self, value: Reader<'_>) -> Result<()> {
            capnp_layout::traits::SetPointerBuilder::set_pointer_builder(
                STRUCT_FIELD.builder(self.builder.reborrow()),
                value,
            )
        }
        pub fn has_struct_field(&self) -> bool {
            !STRUCT_FIELD.get(&self.builder.as_reader()).is_null()
        }
        pub fn clear_struct_field(&mut self) {
            STRUCT_FIELD.builder(self.builder.reborrow()).clear();
        }
        #[inline]
        pub fn init_struct_list(self, size: u32) -> struct_list::Builder<'a, Owned> {
            FromPointerBuilder::init_pointer(STRUCT_LIST.builder(self.builder), size)
        }
        #[inline]
        pub fn get_struct_list(self) -> Result<struct_list::Builder<'a, Owned>> {
            FromPointerBuilder::get_from_pointer(STRUCT_LIST.builder(self.builder))
        }
    }
}

/// An older version of `test_all_types`: the first 8 data bytes and the first pointer.
pub mod test_old_version {
    use capnp_layout::field;
    use capnp_layout::private::layout::{self, StructSize};
    use capnp_layout::traits::{FromPointerBuilder, FromPointerReader};
    use capnp_layout::{text, Result};

    pub const STRUCT_SIZE: StructSize = StructSize::new(8, 1);

    const BOOL_FIELD: field::Bool = field::Bool::new(STRUCT_SIZE, 0, 0);
    const UINT16_FIELD: field::Data<u16> = field::Data::new(STRUCT_SIZE, 2);
    const INT32_FIELD: field::Data<i32> = field::Data::new(STRUCT_SIZE, 4);
    const TEXT_FIELD: field::Pointer = field::Pointer::new(STRUCT_SIZE, 0);

    #[derive(Copy, Clone)]
    pub struct Owned(());
    impl<'a> capnp_layout::traits::Owned<'a> for Owned {
        type Reader = Reader<'a>;
        type Builder = Builder<'a>;
    }
    impl<'a> capnp_layout::traits::OwnedStruct<'a> for Owned {
        type Reader = Reader<'a>;
        type Builder = Builder<'a>;
    }

    #[derive(Clone, Copy)]
    pub struct Reader<'a> {
        reader: layout::StructReader<'a>,
    }

    impl<'a> capnp_layout::traits::FromStructReader<'a> for Reader<'a> {
        fn new(reader: layout::StructReader<'a>) -> Self {
            Self { reader }
        }
    }

    impl<'a> capnp_layout::traits::FromPointerReader<'a> for Reader<'a> {
        fn get_from_pointer(reader: &layout::PointerReader<'a>) -> Result<Self> {
            Ok(Self {
                reader: reader.get_struct()?,
            })
        }
    }

    impl<'a> capnp_layout::traits::SetPointerBuilder for Reader<'a> {
        fn set_pointer_builder(
            mut pointer: layout::PointerBuilder<'_>,
            value: Self,
        ) -> Result<()> {
            pointer.set_struct(&value.reader)
        }
    }

    impl<'a> Reader<'a> {
        pub fn get_bool_field(self) -> bool {
            BOOL_FIELD.get(&self.reader)
        }
        pub fn get_uint16_field(self) -> u16 {
            UINT16_FIELD.get(&self.reader)
        }
        pub fn get_int32_field(self) -> i32 {
            INT32_FIELD.get(&self.reader)
        }
        pub fn get_text_field(self) -> Result<text::Reader<'a>> {
            FromPointerReader::get_from_pointer(&TEXT_FIELD.get(&self.reader))
        }
    }

    pub struct Builder<'a> {
        builder: layout::StructBuilder<'a>,
    }

    impl<'a> capnp_layout::traits::HasStructSize for Builder<'a> {
        const STRUCT_SIZE: StructSize = STRUCT_SIZE;
    }

    impl<'a> capnp_layout::traits::FromStructBuilder<'a> for Builder<'a> {
        fn new(builder: layout::StructBuilder<'a>) -> Self {
            Self { builder }
        }
    }

    impl<'a> capnp_layout::traits::FromPointerBuilder<'a> for Builder<'a> {
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
        pub fn set_bool_field(&mut self, value: bool) {
            BOOL_FIELD.set(&mut self.builder, value);
        }
        pub fn set_uint16_field(&mut self, value: u16) {
            UINT16_FIELD.set(&mut self.builder, value);
        }
        pub fn set_int32_field(&mut self, value: i32) {
            INT32_FIELD.set(&mut self.builder, value);
        }
        pub fn set_text_field(&mut self, value: &str) {
            TEXT_FIELD.builder(self.builder.reborrow()).set_text(value);
        }
        pub fn get_text_field(self) -> Result<text::Builder<'a>> {
            FromPointerBuilder::get_from_pointer(TEXT_FIELD.builder(self.builder))
        }
    }
}

/// Fills every field of `builder` with recognizable values.
pub fn init_test_message(mut builder: test_all_types::Builder<'_>) {
    builder.set_bool_field(true);
    builder.set_int8_field(-123);
    builder.set_uint16_field(45678);
    builder.set_int32_field(-8_765_432);
    builder.set_uint64_field(12_345_678_901_234_567_890);
    builder.set_float32_field(1234.5);
    builder.set_enum_field(Color::Blue);
    builder.set_int16_field(-12345);
    builder.set_float64_field(-1.25e-123);
    builder.set_text_field("foo");
    builder.set_data_field(b"bar");
    {
        let mut list = builder.reborrow().init_int32_list(3);
        list.set(0, 12_345_678);
        list.set(1, -98_765);
        list.set(2, i32::MIN);
    }
    {
        let mut sub = builder.reborrow().init_struct_field();
        sub.set_uint16_field(7);
        sub.set_text_field("nested");
    }
    {
        let mut list = builder.reborrow().init_struct_list(2);
        list.reborrow().get(0).set_text_field("x");
        list.reborrow().get(1).set_int32_field(99);
    }
}

/// Checks the values written by [`init_test_message`].
pub fn check_test_message(reader: test_all_types::Reader<'_>) {
    assert!(reader.get_bool_field());
    assert_eq!(reader.get_int8_field(), -123);
    assert_eq!(reader.get_uint16_field(), 45678);
    assert_eq!(reader.get_int32_field(), -8_765_432);
    assert_eq!(reader.get_uint64_field(), 12_345_678_901_234_567_890);
    assert_eq!(reader.get_float32_field(), 1234.5);
    assert_eq!(reader.get_enum_field(), Ok(Color::Blue));
    assert_eq!(reader.get_int16_field(), -12345);
    assert_eq!(reader.get_float64_field(), -1.25e-123);
    assert_eq!(reader.get_text_field().unwrap(), "foo");
    assert_eq!(reader.get_data_field().unwrap(), b"bar");
    let list = reader.get_int32_list().unwrap();
    assert_eq!(
        list.iter().collect::<Vec<_>>(),
        vec![12_345_678, -98_765, i32::MIN]
    );
    let sub = reader.get_struct_field().unwrap();
    assert_eq!(sub.get_uint16_field(), 7);
    assert_eq!(sub.get_text_field().unwrap(), "nested");
    assert!(!sub.has_struct_field());
    let structs = reader.get_struct_list().unwrap();
    assert_eq!(structs.len(), 2);
    assert_eq!(structs.get(0).get_text_field().unwrap(), "x");
    assert_eq!(structs.get(1).get_int32_field(), 99);
}
