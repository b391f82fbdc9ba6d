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

use crate::message::{AllocationStrategy, HeapAllocator, ReaderOptions};
use crate::private::arena::{BuilderArena, BuilderArenaImpl, ReaderArena, ReaderArenaImpl};
use crate::private::layout::{
    ElementSize, PointerBuilder, PointerReader, PointerType, PrimitiveElement, StructSize,
    WirePointer, WirePointerKind,
};
use crate::{word, ErrorKind, Word};

fn arena<'a>(segments: &'a [&'a [u8]], options: ReaderOptions) -> ReaderArenaImpl<&'a [&'a [u8]]> {
    ReaderArenaImpl::new(segments, options)
}

fn root(arena: &dyn ReaderArena) -> PointerReader<'_> {
    PointerReader::get_root(arena, 0, 0, arena.nesting_limit()).unwrap()
}

#[test]
fn simple_raw_data_struct() {
    let data: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef),
    ];
    let segments = [Word::words_to_bytes(data)];
    let arena = arena(&segments, ReaderOptions::new());

    let reader = root(&arena).get_struct().unwrap();

    assert_eq!(0xefcdab8967452301u64, reader.get_data_field::<u64>(0));
    assert_eq!(0, reader.get_data_field::<u64>(1)); // past end of struct --> default value

    assert_eq!(0x67452301u32, reader.get_data_field::<u32>(0));
    assert_eq!(0xefcdab89u32, reader.get_data_field::<u32>(1));
    assert_eq!(0, reader.get_data_field::<u32>(2)); // past end of struct --> default value

    assert_eq!(0x2301u16, reader.get_data_field::<u16>(0));
    assert_eq!(0x6745u16, reader.get_data_field::<u16>(1));
    assert_eq!(0xab89u16, reader.get_data_field::<u16>(2));
    assert_eq!(0xefcdu16, reader.get_data_field::<u16>(3));
    assert_eq!(0u16, reader.get_data_field::<u16>(4)); // past end of struct --> default value

    assert_eq!(0x4523, reader.get_integer(1, 2));
    assert_eq!(0xcd, reader.get_integer(6, 1));
    assert_eq!(0, reader.get_integer(6, 4));

    // Bits.
    assert!(reader.get_bool_field(0));
    assert!(!reader.get_bool_field(1));
    assert!(!reader.get_bool_field(7));

    assert!(reader.get_bool_field(8));
    assert!(reader.get_bool_field(9));
    assert!(!reader.get_bool_field(10));
    assert!(reader.get_bool_field(13));
    assert!(reader.get_bool(1, 5));
    assert!(!reader.get_bool(1, 6));

    assert!(reader.get_bool_field(63));
    assert!(!reader.get_bool_field(64)); // past end of struct --> default value
    assert!(!reader.get_bool(8, 0));
}

#[test]
#[should_panic(expected = "bit index")]
fn bit_index_out_of_range() {
    let reader = crate::private::layout::StructReader::new_default();
    reader.get_bool(0, 8);
}

#[test]
fn bool_list() {
    use crate::traits::FromPointerReader;

    // [true, false, true, false,
    //  true, true, true, false,
    //  false, true]

    let data: &[Word] = &[
        word(0x01, 0x00, 0x00, 0x00, 0x51, 0x00, 0x00, 0x00),
        word(0x75, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    let segments = [Word::words_to_bytes(data)];
    let arena = arena(&segments, ReaderOptions::new());
    let pointer_reader = root(&arena);

    let reader = pointer_reader.get_list(ElementSize::Bit).unwrap();

    assert_eq!(reader.len(), 10);
    let expected = [true, false, true, false, true, true, true, false, false, true];
    for (i, value) in expected.iter().enumerate() {
        assert_eq!(bool::get(&reader, i as u32), *value);
    }

    let reader = crate::primitive_list::Reader::<bool>::get_from_pointer(&pointer_reader).unwrap();
    assert_eq!(reader.iter().collect::<Vec<_>>(), expected);

    // A bit list cannot stand in for a list of bytes.
    let err = pointer_reader.get_list(ElementSize::Byte).err().unwrap();
    assert_eq!(err.kind, ErrorKind::FoundBitListWhereStructListWasExpected);
}

#[test]
fn out_of_bounds_struct() {
    // Claims two data words but the segment ends after one.
    let data: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
        word(0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    let segments = [Word::words_to_bytes(data)];
    let arena = arena(&segments, ReaderOptions::new());
    let err = root(&arena).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::MessageContainsOutOfBoundsPointer);
}

#[test]
fn single_far_pointer() {
    let seg0: &[Word] = &[word(0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00)];
    let seg1: &[Word] = &[
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
        word(0x2a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    let segments = [Word::words_to_bytes(seg0), Word::words_to_bytes(seg1)];
    let arena = arena(&segments, ReaderOptions::new());

    let pointer = root(&arena);
    assert_eq!(pointer.get_pointer_type().unwrap(), PointerType::Struct);
    let reader = pointer.get_struct().unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 42);
    assert_eq!(pointer.total_size().unwrap().word_count, 1);
}

#[test]
fn double_far_pointer() {
    let seg0: &[Word] = &[word(0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00)];
    let seg1: &[Word] = &[
        word(0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00),
        word(0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00),
    ];
    let seg2: &[Word] = &[word(0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00)];
    let segments = [
        Word::words_to_bytes(seg0),
        Word::words_to_bytes(seg1),
        Word::words_to_bytes(seg2),
    ];
    let arena = arena(&segments, ReaderOptions::new());

    let reader = root(&arena).get_struct().unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 7);
}

#[test]
fn far_pointer_to_missing_segment() {
    let seg0: &[Word] = &[word(0x02, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00)];
    let segments = [Word::words_to_bytes(seg0)];
    let arena = arena(&segments, ReaderOptions::new());
    let err = root(&arena).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidSegmentId(5));
}

// A struct whose only pointer points back at itself.
const CYCLE: [Word; 2] = [
    word(0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00),
    word(0xfc, 0xff, 0xff, 0xff, 0x00, 0x00, 0x01, 0x00),
];

#[test]
fn nesting_limit() {
    let segments = [Word::words_to_bytes(&CYCLE)];
    let arena = arena(&segments, ReaderOptions::new());
    let mut reader = root(&arena).get_struct().unwrap();
    for _ in 0..100 {
        match reader.get_pointer_field(0).get_struct() {
            Ok(next) => reader = next,
            Err(e) => {
                assert_eq!(e.kind, ErrorKind::MessageIsTooDeeplyNested);
                return;
            }
        }
    }
    panic!("cycle was followed past the nesting limit");
}

#[test]
fn traversal_limit() {
    let segments = [Word::words_to_bytes(&CYCLE)];
    let mut options = ReaderOptions::new();
    options.traversal_limit_in_words(10).nesting_limit(1000);
    let arena = arena(&segments, options);
    let mut reader = root(&arena).get_struct().unwrap();
    for _ in 0..100 {
        match reader.get_pointer_field(0).get_struct() {
            Ok(next) => reader = next,
            Err(e) => {
                assert_eq!(e.kind, ErrorKind::ReadLimitExceeded);
                return;
            }
        }
    }
    panic!("cycle was followed past the traversal limit");
}

#[test]
fn text_must_be_nul_terminated() {
    let good: &[Word] = &[
        word(0x01, 0x00, 0x00, 0x00, 0x22, 0x00, 0x00, 0x00),
        word(b'a', b'b', b'c', 0x00, 0x00, 0x00, 0x00, 0x00),
    ];
    let bad: &[Word] = &[
        word(0x01, 0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00),
        word(b'a', b'b', b'c', 0x00, 0x00, 0x00, 0x00, 0x00),
    ];

    let segments = [Word::words_to_bytes(good)];
    let arena_good = arena(&segments, ReaderOptions::new());
    assert_eq!(root(&arena_good).get_text().unwrap(), "abc");
    assert_eq!(root(&arena_good).get_data().unwrap(), b"abc\0");

    let segments = [Word::words_to_bytes(bad)];
    let arena_bad = arena(&segments, ReaderOptions::new());
    let err = root(&arena_bad).get_text().err().unwrap();
    assert_eq!(err.kind, ErrorKind::MessageContainsTextThatIsNotNULTerminated);
}

#[test]
fn capability_pointer() {
    let data: &[Word] = &[word(0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00)];
    let segments = [Word::words_to_bytes(data)];
    let arena = arena(&segments, ReaderOptions::new());
    let pointer = root(&arena);
    assert_eq!(pointer.get_pointer_type().unwrap(), PointerType::Capability);
    assert_eq!(pointer.total_size().unwrap().cap_count, 1);
    let err = pointer.get_struct().err().unwrap();
    assert_eq!(
        err.kind,
        ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected
    );
}

#[test]
fn builder_emits_far_pointer_when_segment_is_full() {
    let mut arena = BuilderArenaImpl::new(
        HeapAllocator::new()
            .first_segment_words(1)
            .allocation_strategy(AllocationStrategy::FixedSize),
    );
    arena.allocate_segment(1).unwrap();
    assert_eq!(arena.allocate(0, 1), Some(0));
    {
        let mut builder = PointerBuilder::get_root(&mut arena, 0, 0).init_struct(StructSize::new(8, 0));
        builder.set_data_field::<u64>(0, 0xdead_beef);
    }
    assert_eq!(arena.len(), 2);
    let seg0 = arena.get_segment(0).unwrap();
    assert_eq!(seg0[0] & 3, 2); // far
    assert_eq!(&seg0[4..8], &[1, 0, 0, 0]);

    let reader = PointerReader::get_root(&arena, 0, 0, 64)
        .unwrap()
        .get_struct()
        .unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 0xdead_beef);
}

#[test]
fn upgrade_smaller_struct() {
    let mut arena = BuilderArenaImpl::new(HeapAllocator::new());
    arena.allocate_segment(1).unwrap();
    arena.allocate(0, 1).unwrap();
    {
        let mut builder = PointerBuilder::get_root(&mut arena, 0, 0).init_struct(StructSize::new(8, 0));
        builder.set_data_field::<u64>(0, 42);
    }
    {
        let mut builder = PointerBuilder::get_root(&mut arena, 0, 0)
            .get_struct(StructSize::new(16, 1))
            .unwrap();
        assert_eq!(builder.get_data_section_size(), 128);
        assert_eq!(builder.get_pointer_section_size(), 1);
        assert_eq!(builder.get_data_field::<u64>(0), 42);
        assert_eq!(builder.get_data_field::<u64>(1), 0);
        builder.get_pointer_field_mut(0).set_text("hi");
    }

    // The old copy was zeroed.
    let seg0 = arena.get_segment(0).unwrap();
    assert_eq!(&seg0[8..16], &[0; 8]);

    let reader = PointerReader::get_root(&arena, 0, 0, 64)
        .unwrap()
        .get_struct()
        .unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 42);
    assert_eq!(reader.get_pointer_field(0).get_text().unwrap(), "hi");

    // Asking for a smaller size than what is there keeps the existing struct.
    let builder = PointerBuilder::get_root(&mut arena, 0, 0)
        .get_struct(StructSize::new(8, 0))
        .unwrap();
    assert_eq!(builder.get_data_section_size(), 128);
}

#[test]
fn struct_list_upgrade() {
    let mut arena = BuilderArenaImpl::new(HeapAllocator::new());
    arena.allocate_segment(1).unwrap();
    arena.allocate(0, 1).unwrap();
    {
        let mut list = PointerBuilder::get_root(&mut arena, 0, 0)
            .init_struct_list(3, StructSize::new(8, 0));
        for i in 0..3 {
            list.reborrow()
                .get_struct_element(i)
                .set_data_field::<u32>(0, 100 + i);
        }
    }
    {
        let mut list = PointerBuilder::get_root(&mut arena, 0, 0)
            .get_struct_list(StructSize::new(8, 1))
            .unwrap();
        assert_eq!(list.len(), 3);
        let mut element = list.reborrow().get_struct_element(2);
        assert_eq!(element.get_data_field::<u32>(0), 102);
        element.get_pointer_field_mut(0).set_data(&[1, 2, 3]);
    }
    let reader = PointerReader::get_root(&arena, 0, 0, 64)
        .unwrap()
        .get_list(ElementSize::InlineComposite)
        .unwrap();
    assert_eq!(reader.get_struct_element(0).get_data_field::<u32>(0), 100);
    assert_eq!(
        reader.get_struct_element(2).get_pointer_field(0).get_data().unwrap(),
        &[1, 2, 3]
    );
    assert!(reader.get_struct_element(1).get_pointer_field(0).is_null());
}

#[test]
fn wire_pointer_words() {
    // A struct at word 1, referenced from word 3: offset -3, two data words, one pointer.
    let mut pointer = WirePointer::default();
    pointer.set_kind_and_target(WirePointerKind::Struct, 3, 1);
    pointer.set_struct_size_from_pieces(2, 1);
    let mut bytes = [0u8; 8];
    pointer.write(&mut bytes);
    assert_eq!(bytes, [0xf4, 0xff, 0xff, 0xff, 2, 0, 1, 0]);

    let decoded = WirePointer::read(&bytes);
    assert_eq!(decoded, pointer);
    assert_eq!(decoded.kind(), WirePointerKind::Struct);
    assert_eq!(decoded.target(3), 1);
    assert_eq!(decoded.struct_word_size(), 3);

    let list = WirePointer::read(&[0x01, 0, 0, 0, 0x2b, 0, 0, 0]);
    assert_eq!(list.kind(), WirePointerKind::List);
    assert_eq!(list.target(0), 1);
    assert_eq!(list.list_element_size(), ElementSize::TwoBytes);
    assert_eq!(list.list_element_count(), 5);

    let far = WirePointer::read(&[0x2e, 0, 0, 0, 7, 0, 0, 0]);
    assert_eq!(far.kind(), WirePointerKind::Far);
    assert!(far.is_double_far());
    assert_eq!(far.far_position_in_segment(), 5);
    assert_eq!(far.far_segment_id(), 7);

    let mut bytes = [0xffu8; 8];
    WirePointer::default().write(&mut bytes);
    assert_eq!(bytes, [0; 8]);
}
