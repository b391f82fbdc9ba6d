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

//! Accesses past the edges of a struct's sections are defects and must fail loudly on the
//! builder side. Readers of wire structs smaller than the schema see zero/null instead.

mod common;

use capnp_layout::message;
use capnp_layout::StructSize;

use common::test_all_types;

#[test]
fn last_byte_and_bit_are_writable() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    let raw = root.raw();
    raw.set_integer(31, 1, 0xff);
    raw.set_bool(31, 7, false);
    assert_eq!(raw.get_integer(31, 1), 0x7f);
    raw.set_integer(24, 8, u64::MAX);
    raw.reborrow().get_pointer_field(4).set_text("last");
}

#[test]
#[should_panic(expected = "outside the 256-bit data section")]
fn byte_past_the_data_section() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().set_integer(32, 1, 0);
}

#[test]
#[should_panic(expected = "outside the 256-bit data section")]
fn wide_write_overlapping_the_end() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().set_integer(30, 4, 0);
}

#[test]
#[should_panic(expected = "outside the 256-bit data section")]
fn bit_past_the_data_section() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().set_bool(32, 0, true);
}

#[test]
#[should_panic(expected = "bit index 8 is out of range")]
fn bit_index_eight() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().set_bool(0, 8, true);
}

#[test]
#[should_panic(expected = "pointer slot 5 is outside the 5-slot pointer section")]
fn pointer_slot_past_the_end() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().reborrow().get_pointer_field(5);
}

#[test]
#[should_panic(expected = "does not fit in 2 bytes")]
fn integer_too_wide_for_its_field() {
    let mut message = message::Builder::new_default();
    let mut root: test_all_types::Builder = message.init_root();
    root.raw().set_integer(2, 2, 0x1_0000);
}

#[test]
#[should_panic(expected = "unsupported integer width")]
fn unsupported_width() {
    let message = message::Builder::new_default();
    let root: test_all_types::Reader = message.get_root_as_reader().unwrap();
    root.raw().get_integer(0, 3);
}

#[test]
fn reader_past_the_wire_sections_sees_defaults() {
    let mut message = message::Builder::new_default();
    {
        let mut root = message
            .init_root::<common::test_old_version::Builder>();
        root.set_int32_field(-1);
    }
    let root: test_all_types::Reader = message.get_root_as_reader().unwrap();
    let raw = root.raw();
    assert_eq!(raw.get_data_section_size(), 64);
    assert_eq!(raw.get_pointer_section_size(), 1);
    assert_eq!(root.get_int32_field(), -1);
    assert_eq!(raw.get_integer(8, 8), 0);
    assert!(!raw.get_bool(31, 7));
    assert!(raw.get_pointer_field(4).is_null());
    assert_eq!(root.get_float64_field(), 0.0);
}

#[test]
fn data_section_is_rounded_up_to_words() {
    assert_eq!(StructSize::new(2, 1).data_words(), 1);
    assert_eq!(StructSize::new(9, 0).data_words(), 2);
    assert_eq!(StructSize::new(32, 5).total(), 9);
    assert_eq!(test_all_types::STRUCT_SIZE.total(), 9);
}

#[test]
fn reader_far_past_the_data_section_sees_defaults() {
    let mut message = message::Builder::new_default();
    {
        let mut root: test_all_types::Builder = message.init_root();
        root.raw().set_integer(0, 8, u64::MAX);
    }
    let root: test_all_types::Reader = message.get_root_as_reader().unwrap();
    let raw = root.raw();

    // Offsets whose low 32 bits land inside the 256-bit section.
    #[cfg(target_pointer_width = "64")]
    {
        assert!(!raw.get_bool_field((1usize << 32) + 3));
        assert_eq!(raw.get_data_field::<u8>((1usize << 32) + 1), 0);
    }
    assert!(!raw.get_bool_field(usize::MAX));
    assert!(!raw.get_bool(usize::MAX, 7));
    assert_eq!(raw.get_data_field::<u64>(usize::MAX), 0);
    assert_eq!(raw.get_integer(usize::MAX, 8), 0);
    assert_eq!(raw.get_integer(30, 4), 0);

    assert!(raw.get_bool_field(3));
    assert_eq!(raw.get_data_field::<u8>(1), 0xff);
}
