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

//! Wire-level struct, list and pointer views.
//!
//! Every position in this module is an index into a segment: data sections and list
//! elements are addressed by byte offset, pointers by word offset. Nothing here holds a
//! raw pointer into segment memory; readers borrow segment slices and builders borrow the
//! arena mutably.

use crate::private::arena::{BuilderArena, NullArena, ReaderArena, SegmentId};
use crate::private::primitive::{self, Primitive};
use crate::private::units::*;
use crate::{data, text, Error, ErrorKind, MessageSize, Result};

pub use self::ElementSize::{
    Bit, Byte, EightBytes, FourBytes, InlineComposite, Pointer, TwoBytes, Void,
};

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    fn from(val: u8) -> Self {
        match val & 7 {
            0 => Self::Void,
            1 => Self::Bit,
            2 => Self::Byte,
            3 => Self::TwoBytes,
            4 => Self::FourBytes,
            5 => Self::EightBytes,
            6 => Self::Pointer,
            _ => Self::InlineComposite,
        }
    }
}

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        Void => 0,
        Bit => 1,
        Byte => 8,
        TwoBytes => 16,
        FourBytes => 32,
        EightBytes => 64,
        Pointer => 0,
        InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> WirePointerCount32 {
    match size {
        Pointer => 1,
        _ => 0,
    }
}

/// Layout of one struct type: the size of its data section and the number of pointer slots.
///
/// `data_bytes` is the declared size that field offsets are checked against. On the wire the
/// data section always occupies whole words, see [`StructSize::data_words`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructSize {
    pub data_bytes: u16,
    pub pointers: WirePointerCount16,
}

impl StructSize {
    pub const fn new(data_bytes: u16, pointers: WirePointerCount16) -> Self {
        Self {
            data_bytes,
            pointers,
        }
    }

    /// Size of the data section on the wire, rounded up to whole words.
    pub const fn data_words(&self) -> WordCount16 {
        ((self.data_bytes as u32 + 7) / BYTES_PER_WORD as u32) as WordCount16
    }

    pub const fn total(&self) -> WordCount32 {
        self.data_words() as WordCount32 + self.pointers as WordCount32 * WORDS_PER_POINTER as WordCount32
    }
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointerType {
    Null,
    Struct,
    List,
    Capability,
}

impl WirePointerKind {
    fn from(val: u8) -> Self {
        match val & 3 {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            _ => Self::Other,
        }
    }
}

/// One decoded pointer word.
///
/// The lower 32 bits hold the kind and a signed offset (or far-pointer position); the upper 32
/// bits hold the struct size, list size, far segment id or capability index.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct WirePointer {
    offset_and_kind: u32,
    upper32bits: u32,
}

impl WirePointer {
    /// Decodes the pointer stored in the first eight bytes of `bytes`.
    #[inline]
    pub fn read(bytes: &[u8]) -> Self {
        Self {
            offset_and_kind: <u32 as Primitive>::get(&bytes[0..4]),
            upper32bits: <u32 as Primitive>::get(&bytes[4..8]),
        }
    }

    #[inline]
    pub fn write(&self, bytes: &mut [u8]) {
        <u32 as Primitive>::set(&mut bytes[0..4], self.offset_and_kind);
        <u32 as Primitive>::set(&mut bytes[4..8], self.upper32bits);
    }

    #[inline]
    pub fn kind(&self) -> WirePointerKind {
        WirePointerKind::from(self.offset_and_kind as u8)
    }

    #[inline]
    pub fn is_positional(&self) -> bool {
        (self.offset_and_kind & 2) == 0 // match Struct and List but not Far and Other.
    }

    #[inline]
    pub fn is_capability(&self) -> bool {
        self.offset_and_kind == WirePointerKind::Other as u32
    }

    /// Word index of the target, given the word index `location` of this pointer.
    #[inline]
    pub fn target(&self, location: u32) -> i64 {
        i64::from(location) + 1 + i64::from((self.offset_and_kind as i32) >> 2)
    }

    #[inline]
    pub fn set_kind_and_target(&mut self, kind: WirePointerKind, location: u32, target: u32) {
        let offset = i64::from(target) - i64::from(location) - 1;
        self.offset_and_kind = ((offset as i32) << 2) as u32 | (kind as u32);
    }

    #[inline]
    pub fn set_kind_with_zero_offset(&mut self, kind: WirePointerKind) {
        self.offset_and_kind = kind as u32;
    }

    #[inline]
    pub fn set_kind_and_target_for_empty_struct(&mut self) {
        //# This pointer points at an empty struct. Assuming the
        //# WirePointer itself is in-bounds, we can set the target to
        //# point either at the WirePointer itself or immediately after
        //# it. The latter would cause the WirePointer to be "null"
        //# (since for an empty struct the upper 32 bits are going to
        //# be zero). So we set an offset of -1, as if the struct were
        //# allocated immediately before this pointer, to distinguish
        //# it from null.
        self.offset_and_kind = 0xfffffffc;
    }

    #[inline]
    pub fn inline_composite_list_element_count(&self) -> ElementCount32 {
        self.offset_and_kind >> 2
    }

    #[inline]
    pub fn set_kind_and_inline_composite_list_element_count(
        &mut self,
        kind: WirePointerKind,
        element_count: ElementCount32,
    ) {
        self.offset_and_kind = (element_count << 2) | (kind as u32)
    }

    #[inline]
    pub fn far_position_in_segment(&self) -> WordCount32 {
        self.offset_and_kind >> 3
    }

    #[inline]
    pub fn is_double_far(&self) -> bool {
        ((self.offset_and_kind >> 2) & 1) != 0
    }

    #[inline]
    pub fn set_far(&mut self, is_double_far: bool, pos: WordCount32) {
        self.offset_and_kind =
            (pos << 3) | (u32::from(is_double_far) << 2) | WirePointerKind::Far as u32;
    }

    #[inline]
    pub fn struct_data_size(&self) -> WordCount16 {
        (self.upper32bits & 0xffff) as WordCount16
    }

    #[inline]
    pub fn struct_ptr_count(&self) -> WirePointerCount16 {
        (self.upper32bits >> 16) as WirePointerCount16
    }

    #[inline]
    pub fn struct_word_size(&self) -> WordCount32 {
        self.struct_data_size() as WordCount32
            + self.struct_ptr_count() as WordCount32 * WORDS_PER_POINTER as u32
    }

    #[inline]
    pub fn set_struct_size(&mut self, size: StructSize) {
        self.set_struct_size_from_pieces(size.data_words(), size.pointers)
    }

    #[inline]
    pub fn set_struct_size_from_pieces(&mut self, ds: WordCount16, rc: WirePointerCount16) {
        self.upper32bits = u32::from(ds) | (u32::from(rc) << 16)
    }

    #[inline]
    pub fn list_element_size(&self) -> ElementSize {
        ElementSize::from(self.upper32bits as u8)
    }

    #[inline]
    pub fn list_element_count(&self) -> ElementCount32 {
        self.upper32bits >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(&self) -> WordCount32 {
        self.list_element_count()
    }

    #[inline]
    pub fn set_list_size_and_count(&mut self, es: ElementSize, ec: ElementCount32) {
        assert!(ec < (1 << 29), "Lists are limited to 2**29 elements");
        self.upper32bits = (ec << 3) | (es as u32);
    }

    #[inline]
    pub fn set_list_inline_composite(&mut self, wc: WordCount32) {
        assert!(
            wc < (1 << 29),
            "Inline composite lists are limited to 2**29 words"
        );
        self.upper32bits = (wc << 3) | (InlineComposite as u32);
    }

    #[inline]
    pub fn far_segment_id(&self) -> SegmentId {
        self.upper32bits as SegmentId
    }

    #[inline]
    pub fn set_far_segment_id(&mut self, si: SegmentId) {
        self.upper32bits = si
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.offset_and_kind == 0 && self.upper32bits == 0
    }
}

#[inline]
fn word_bytes(segment: &[u8], location: u32) -> &[u8] {
    let start = location as usize * BYTES_PER_WORD;
    &segment[start..start + BYTES_PER_WORD]
}

#[inline]
fn word_bytes_mut(segment: &mut [u8], location: u32) -> &mut [u8] {
    let start = location as usize * BYTES_PER_WORD;
    &mut segment[start..start + BYTES_PER_WORD]
}

/// Segment bytes of a builder arena, seen through its reader interface.
fn builder_segment(arena: &dyn ReaderArena, segment_id: u32) -> &[u8] {
    match arena.get_segment(segment_id) {
        Ok(segment) => segment,
        Err(e) => panic!("builder refers to segment {segment_id}, which does not exist: {e}"),
    }
}

mod wire_helpers {
    use log::trace;

    use crate::private::arena::{BuilderArena, ReaderArena};
    use crate::private::layout::ElementSize::*;
    use crate::private::layout::{
        data_bits_per_element, pointers_per_element, word_bytes, word_bytes_mut, ElementSize,
        ListBuilder, ListReader, StructBuilder, StructReader, StructSize, WirePointer,
        WirePointerKind,
    };
    use crate::private::units::*;
    use crate::{data, text, Error, ErrorKind, MessageSize, Result};

    #[inline]
    pub fn round_bytes_up_to_words(bytes: ByteCount32) -> WordCount32 {
        //# This code assumes 64-bit words.
        (bytes + 7) / BYTES_PER_WORD as u32
    }

    //# The maximum object size is 4GB - 1 byte. If measured in bits,
    //# this would overflow a 32-bit counter, so we need to accept
    //# BitCount64. However, 32 bits is enough for the returned
    //# ByteCounts and WordCounts.
    #[inline]
    pub fn round_bits_up_to_words(bits: BitCount64) -> WordCount32 {
        //# This code assumes 64-bit words.
        ((bits + 63) / (BITS_PER_WORD as u64)) as WordCount32
    }

    #[inline]
    pub fn round_bits_up_to_bytes(bits: BitCount64) -> ByteCount32 {
        ((bits + 7) / (BITS_PER_BYTE as u64)) as ByteCount32
    }

    /// Checks that the words `[start, start + size_in_words)` are inside the segment, and
    /// returns the whole segment.
    #[inline]
    pub fn bounds_check(
        arena: &dyn ReaderArena,
        segment_id: u32,
        start: i64,
        size_in_words: usize,
    ) -> Result<&[u8]> {
        arena.contains_interval(segment_id, start, size_in_words)?;
        arena.get_segment(segment_id)
    }

    // ---- builder-side primitives ----

    #[inline]
    pub fn get_pointer(arena: &mut dyn BuilderArena, segment_id: u32, location: u32) -> WirePointer {
        WirePointer::read(word_bytes(arena.get_segment_mut(segment_id), location))
    }

    #[inline]
    pub fn set_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        value: WirePointer,
    ) {
        value.write(word_bytes_mut(arena.get_segment_mut(segment_id), location))
    }

    #[inline]
    pub fn update_pointer<F>(arena: &mut dyn BuilderArena, segment_id: u32, location: u32, f: F)
    where
        F: FnOnce(&mut WirePointer),
    {
        let mut value = get_pointer(arena, segment_id, location);
        f(&mut value);
        set_pointer(arena, segment_id, location, value);
    }

    #[inline]
    pub fn zero_words(arena: &mut dyn BuilderArena, segment_id: u32, start: u32, count: usize) {
        let start = start as usize * BYTES_PER_WORD;
        arena.get_segment_mut(segment_id)[start..start + count * BYTES_PER_WORD].fill(0);
    }

    /// Copies `len` bytes between two places in a builder arena, possibly in different segments.
    pub fn copy_bytes(
        arena: &mut dyn BuilderArena,
        src_segment_id: u32,
        src: usize,
        dst_segment_id: u32,
        dst: usize,
        len: usize,
    ) {
        if src_segment_id == dst_segment_id {
            arena
                .get_segment_mut(src_segment_id)
                .copy_within(src..src + len, dst);
        } else {
            let tmp = arena.get_segment_mut(src_segment_id)[src..src + len].to_vec();
            arena.get_segment_mut(dst_segment_id)[dst..dst + len].copy_from_slice(&tmp);
        }
    }

    /// Where `allocate()` put an object, and where the pointer describing it lives. The
    /// describing pointer is the original one, or the landing pad if a far pointer was needed.
    pub struct Allocation {
        pub tag_segment_id: u32,
        pub tag_location: u32,
        pub segment_id: u32,
        pub ptr: u32,
    }

    pub fn allocate(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        amount: WordCount32,
        kind: WirePointerKind,
    ) -> Allocation {
        if !get_pointer(arena, segment_id, location).is_null() {
            zero_object(arena, segment_id, location);
        }

        let mut reff = WirePointer::default();
        if amount == 0 && kind == WirePointerKind::Struct {
            reff.set_kind_and_target_for_empty_struct();
            set_pointer(arena, segment_id, location, reff);
            return Allocation {
                tag_segment_id: segment_id,
                tag_location: location,
                segment_id,
                ptr: location,
            };
        }

        match arena.allocate(segment_id, amount) {
            None => {
                //# Need to allocate in a different segment. We'll need to
                //# allocate an extra pointer worth of space to act as
                //# the landing pad for a far pointer.
                let amount_plus_ref = amount + POINTER_SIZE_IN_WORDS as u32;
                let (far_segment_id, word_idx) = arena.allocate_anywhere(amount_plus_ref);
                trace!(
                    "far pointer from segment {segment_id} to landing pad at {far_segment_id}:{word_idx}"
                );

                //# Set up the original pointer to be a far pointer to
                //# the new segment.
                reff.set_far(false, word_idx);
                reff.set_far_segment_id(far_segment_id);
                set_pointer(arena, segment_id, location, reff);

                //# Initialize the landing pad to indicate that the
                //# data immediately follows the pad.
                let mut pad = WirePointer::default();
                pad.set_kind_and_target(kind, word_idx, word_idx + 1);
                set_pointer(arena, far_segment_id, word_idx, pad);
                Allocation {
                    tag_segment_id: far_segment_id,
                    tag_location: word_idx,
                    segment_id: far_segment_id,
                    ptr: word_idx + 1,
                }
            }
            Some(idx) => {
                reff.set_kind_and_target(kind, location, idx);
                set_pointer(arena, segment_id, location, reff);
                Allocation {
                    tag_segment_id: segment_id,
                    tag_location: location,
                    segment_id,
                    ptr: idx,
                }
            }
        }
    }

    /// If the pointer at `location` is a far pointer, follows it. Returns the pointer that
    /// describes the target object, and the object's position.
    pub fn follow_builder_fars(
        arena: &mut dyn BuilderArena,
        reff: WirePointer,
        location: u32,
        segment_id: u32,
    ) -> Result<(WirePointer, u32, u32)> {
        if reff.kind() != WirePointerKind::Far {
            return Ok((reff, segment_id, reff.target(location) as u32));
        }
        let pad_segment_id = reff.far_segment_id();
        let pad_location = reff.far_position_in_segment();
        let pad = get_pointer(arena, pad_segment_id, pad_location);
        if !reff.is_double_far() {
            Ok((pad, pad_segment_id, pad.target(pad_location) as u32))
        } else {
            //# Landing pad is another far pointer. It is followed by a
            //# tag describing the pointed-to object.
            if pad.kind() != WirePointerKind::Far || pad.is_double_far() {
                return Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer));
            }
            let tag = get_pointer(arena, pad_segment_id, pad_location + 1);
            Ok((tag, pad.far_segment_id(), pad.far_position_in_segment()))
        }
    }

    /// Zeroes the object the pointer at `location` refers to. Use when the pointer is about to
    /// be overwritten, making the target object unreachable.
    pub fn zero_object(arena: &mut dyn BuilderArena, segment_id: u32, location: u32) {
        let reff = get_pointer(arena, segment_id, location);
        match reff.kind() {
            WirePointerKind::Struct | WirePointerKind::List => {
                zero_object_helper(arena, segment_id, reff, reff.target(location) as u32)
            }
            WirePointerKind::Other => {}
            WirePointerKind::Far => {
                let pad_segment_id = reff.far_segment_id();
                let pad_location = reff.far_position_in_segment();
                if reff.is_double_far() {
                    let pad = get_pointer(arena, pad_segment_id, pad_location);
                    let tag = get_pointer(arena, pad_segment_id, pad_location + 1);
                    zero_object_helper(
                        arena,
                        pad.far_segment_id(),
                        tag,
                        pad.far_position_in_segment(),
                    );
                    zero_words(arena, pad_segment_id, pad_location, 2);
                } else {
                    zero_object(arena, pad_segment_id, pad_location);
                    zero_words(arena, pad_segment_id, pad_location, 1);
                }
            }
        }
    }

    pub fn zero_object_helper(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        tag: WirePointer,
        ptr: u32,
    ) {
        match tag.kind() {
            WirePointerKind::Other | WirePointerKind::Far => {}
            WirePointerKind::Struct => {
                let pointer_section = ptr + u32::from(tag.struct_data_size());
                for i in 0..u32::from(tag.struct_ptr_count()) {
                    zero_object(arena, segment_id, pointer_section + i);
                }
                zero_words(arena, segment_id, ptr, tag.struct_word_size() as usize);
            }
            WirePointerKind::List => match tag.list_element_size() {
                Void => {}
                Bit | Byte | TwoBytes | FourBytes | EightBytes => zero_words(
                    arena,
                    segment_id,
                    ptr,
                    round_bits_up_to_words(
                        u64::from(tag.list_element_count())
                            * u64::from(data_bits_per_element(tag.list_element_size())),
                    ) as usize,
                ),
                Pointer => {
                    let count = tag.list_element_count();
                    for i in 0..count {
                        zero_object(arena, segment_id, ptr + i);
                    }
                    zero_words(arena, segment_id, ptr, count as usize);
                }
                InlineComposite => {
                    let element_tag = get_pointer(arena, segment_id, ptr);
                    if element_tag.kind() != WirePointerKind::Struct {
                        return;
                    }

                    let data_size = u32::from(element_tag.struct_data_size());
                    let pointer_count = u32::from(element_tag.struct_ptr_count());
                    let count = element_tag.inline_composite_list_element_count();
                    let mut pos = ptr + 1;
                    if pointer_count > 0 {
                        for _ in 0..count {
                            pos += data_size;
                            for _ in 0..pointer_count {
                                zero_object(arena, segment_id, pos);
                                pos += 1;
                            }
                        }
                    }
                    zero_words(
                        arena,
                        segment_id,
                        ptr,
                        (element_tag.struct_word_size() * count + 1) as usize,
                    );
                }
            },
        }
    }

    /// Zeroes the pointer itself and, if it is a far pointer, its landing pad, but not the
    /// object. Used when upgrading.
    pub fn zero_pointer_and_fars(arena: &mut dyn BuilderArena, segment_id: u32, location: u32) {
        let reff = get_pointer(arena, segment_id, location);
        if reff.kind() == WirePointerKind::Far {
            let pad_words = if reff.is_double_far() { 2 } else { 1 };
            zero_words(
                arena,
                reff.far_segment_id(),
                reff.far_position_in_segment(),
                pad_words,
            );
        }
        zero_words(arena, segment_id, location, 1);
    }

    /// Moves the pointer at `src` to `dst`, leaving the object where it is.
    pub fn transfer_pointer(
        arena: &mut dyn BuilderArena,
        dst_segment_id: u32,
        dst: u32,
        src_segment_id: u32,
        src: u32,
    ) {
        //# Make *dst point to the same object as *src. Both must
        //# reside in the same message, but can be in different
        //# segments. Not always-inline because this is rarely used.
        //
        //# Caller MUST zero out the source pointer after calling this,
        //# to make sure no later code mistakenly thinks the source
        //# location still owns the object. transferPointer() doesn't
        //# do this zeroing itself because many callers transfer
        //# several pointers in a loop then zero out the whole section.

        let src_ref = get_pointer(arena, src_segment_id, src);
        if src_ref.is_null() {
            set_pointer(arena, dst_segment_id, dst, WirePointer::default());
        } else if src_ref.is_positional() {
            let target = src_ref.target(src) as u32;
            transfer_pointer_split(arena, dst_segment_id, dst, src_ref, src_segment_id, target);
        } else {
            //# Far and other pointers are position-independent, so we can just copy.
            set_pointer(arena, dst_segment_id, dst, src_ref);
        }
    }

    pub fn transfer_pointer_split(
        arena: &mut dyn BuilderArena,
        dst_segment_id: u32,
        dst: u32,
        src_tag: WirePointer,
        src_segment_id: u32,
        src_ptr: u32,
    ) {
        let mut dst_ref = WirePointer::default();
        if dst_segment_id == src_segment_id {
            //# Same segment, so create a direct pointer.
            if src_tag.kind() == WirePointerKind::Struct && src_tag.struct_word_size() == 0 {
                dst_ref.set_kind_and_target_for_empty_struct();
            } else {
                dst_ref.set_kind_and_target(src_tag.kind(), dst, src_ptr);
            }
            //# We can just copy the upper 32 bits.
            dst_ref.upper32bits = src_tag.upper32bits;
            set_pointer(arena, dst_segment_id, dst, dst_ref);
            return;
        }

        //# Need to create a far pointer. Try to allocate it in the
        //# same segment as the source, so that it doesn't need to
        //# be a double-far.
        match arena.allocate(src_segment_id, 1) {
            None => {
                //# Darn, need a double-far.
                let (far_segment_id, word_idx) = arena.allocate_anywhere(2);
                trace!("double-far landing pad at {far_segment_id}:{word_idx}");

                let mut landing_pad0 = WirePointer::default();
                landing_pad0.set_far(false, src_ptr);
                landing_pad0.set_far_segment_id(src_segment_id);
                set_pointer(arena, far_segment_id, word_idx, landing_pad0);

                let mut landing_pad1 = WirePointer::default();
                landing_pad1.set_kind_with_zero_offset(src_tag.kind());
                landing_pad1.upper32bits = src_tag.upper32bits;
                set_pointer(arena, far_segment_id, word_idx + 1, landing_pad1);

                dst_ref.set_far(true, word_idx);
                dst_ref.set_far_segment_id(far_segment_id);
            }
            Some(landing_pad_word) => {
                //# Simple landing pad is just a pointer.
                let mut landing_pad = WirePointer::default();
                landing_pad.set_kind_and_target(src_tag.kind(), landing_pad_word, src_ptr);
                landing_pad.upper32bits = src_tag.upper32bits;
                set_pointer(arena, src_segment_id, landing_pad_word, landing_pad);

                dst_ref.set_far(false, landing_pad_word);
                dst_ref.set_far_segment_id(src_segment_id);
            }
        }
        set_pointer(arena, dst_segment_id, dst, dst_ref);
    }

    // ---- builder-side objects ----

    pub fn init_struct_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        size: StructSize,
    ) -> StructBuilder<'_> {
        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            size.total(),
            WirePointerKind::Struct,
        );
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_struct_size(size),
        );

        StructBuilder {
            arena,
            segment_id: alloc.segment_id,
            data: alloc.ptr as usize * BYTES_PER_WORD,
            pointers: alloc.ptr + u32::from(size.data_words()),
            data_size: u32::from(size.data_words()) * BITS_PER_WORD as BitCount32,
            pointer_count: size.pointers,
        }
    }

    pub fn get_writable_struct_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        size: StructSize,
    ) -> Result<StructBuilder<'_>> {
        let reff = get_pointer(arena, segment_id, location);
        if reff.is_null() {
            return Ok(init_struct_pointer(arena, segment_id, location, size));
        }

        let (old_tag, old_segment_id, old_ptr) =
            follow_builder_fars(&mut *arena, reff, location, segment_id)?;
        if old_tag.kind() != WirePointerKind::Struct {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected,
            ));
        }

        let old_data_size = old_tag.struct_data_size();
        let old_pointer_count = old_tag.struct_ptr_count();
        let old_pointer_section = old_ptr + u32::from(old_data_size);

        if old_data_size < size.data_words() || old_pointer_count < size.pointers {
            //# The space allocated for this struct is too small.
            //# Unlike with readers, we can't just run with it and do
            //# bounds checks at access time, because how would we
            //# handle writes? Instead, we have to copy the struct to a
            //# new space now.

            let new_data_size = ::core::cmp::max(old_data_size, size.data_words());
            let new_pointer_count = ::core::cmp::max(old_pointer_count, size.pointers);
            let total_size =
                u32::from(new_data_size) + u32::from(new_pointer_count) * WORDS_PER_POINTER as u32;
            trace!(
                "upgrading struct from ({old_data_size}, {old_pointer_count}) to ({new_data_size}, {new_pointer_count})"
            );

            //# Don't let allocate() zero out the object just yet.
            zero_pointer_and_fars(&mut *arena, segment_id, location);

            let alloc = allocate(
                &mut *arena,
                segment_id,
                location,
                total_size,
                WirePointerKind::Struct,
            );
            update_pointer(
                &mut *arena,
                alloc.tag_segment_id,
                alloc.tag_location,
                |p| p.set_struct_size_from_pieces(new_data_size, new_pointer_count),
            );

            // Copy data section.
            copy_bytes(
                &mut *arena,
                old_segment_id,
                old_ptr as usize * BYTES_PER_WORD,
                alloc.segment_id,
                alloc.ptr as usize * BYTES_PER_WORD,
                old_data_size as usize * BYTES_PER_WORD,
            );

            //# Copy pointer section.
            let new_pointer_section = alloc.ptr + u32::from(new_data_size);
            for i in 0..u32::from(old_pointer_count) {
                transfer_pointer(
                    &mut *arena,
                    alloc.segment_id,
                    new_pointer_section + i,
                    old_segment_id,
                    old_pointer_section + i,
                );
            }

            zero_words(
                &mut *arena,
                old_segment_id,
                old_ptr,
                old_data_size as usize + old_pointer_count as usize,
            );

            Ok(StructBuilder {
                arena,
                segment_id: alloc.segment_id,
                data: alloc.ptr as usize * BYTES_PER_WORD,
                pointers: new_pointer_section,
                data_size: u32::from(new_data_size) * BITS_PER_WORD as u32,
                pointer_count: new_pointer_count,
            })
        } else {
            Ok(StructBuilder {
                arena,
                segment_id: old_segment_id,
                data: old_ptr as usize * BYTES_PER_WORD,
                pointers: old_pointer_section,
                data_size: u32::from(old_data_size) * BITS_PER_WORD as u32,
                pointer_count: old_pointer_count,
            })
        }
    }

    pub fn init_list_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        element_count: ElementCount32,
        element_size: ElementSize,
    ) -> ListBuilder<'_> {
        assert!(
            element_size != InlineComposite,
            "Should have called init_struct_list_pointer() instead"
        );

        let data_size = data_bits_per_element(element_size);
        let pointer_count = pointers_per_element(element_size);
        let step = data_size + pointer_count * BITS_PER_POINTER as u32;
        let word_count =
            round_bits_up_to_words(u64::from(element_count) * u64::from(step));
        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            word_count,
            WirePointerKind::List,
        );
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_list_size_and_count(element_size, element_count),
        );

        ListBuilder {
            arena,
            segment_id: alloc.segment_id,
            ptr: alloc.ptr as usize * BYTES_PER_WORD,
            step,
            element_count,
            element_size,
            struct_data_size: data_size,
            struct_pointer_count: pointer_count as u16,
        }
    }

    pub fn init_struct_list_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> ListBuilder<'_> {
        let words_per_element = element_size.total();

        //# Allocate the list, prefixed by a single WirePointer.
        let word_count: WordCount32 = element_count * words_per_element;
        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            POINTER_SIZE_IN_WORDS as u32 + word_count,
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_list_inline_composite(word_count),
        );
        let mut tag = WirePointer::default();
        tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        tag.set_struct_size(element_size);
        set_pointer(&mut *arena, alloc.segment_id, alloc.ptr, tag);

        ListBuilder {
            arena,
            segment_id: alloc.segment_id,
            ptr: (alloc.ptr as usize + POINTER_SIZE_IN_WORDS) * BYTES_PER_WORD,
            step: words_per_element * BITS_PER_WORD as u32,
            element_count,
            element_size: InlineComposite,
            struct_data_size: u32::from(element_size.data_words()) * (BITS_PER_WORD as u32),
            struct_pointer_count: element_size.pointers,
        }
    }

    pub fn get_writable_list_pointer(
        arena: &mut dyn BuilderArena,
        orig_segment_id: u32,
        orig_location: u32,
        element_size: ElementSize,
    ) -> Result<ListBuilder<'_>> {
        assert!(
            element_size != InlineComposite,
            "Use get_writable_struct_list_pointer() for struct lists"
        );

        let orig_ref = get_pointer(arena, orig_segment_id, orig_location);
        if orig_ref.is_null() {
            return Ok(ListBuilder::new_default(arena));
        }

        // We must verify that the pointer has the right size. Unlike in
        // get_writable_struct_list_pointer(), we never need to "upgrade" the data, because this
        // method is called only for non-struct lists, and there is no allowed upgrade path *to* a
        // non-struct list, only *from* them.

        let (reff, segment_id, mut ptr) =
            follow_builder_fars(&mut *arena, orig_ref, orig_location, orig_segment_id)?;

        if reff.kind() != WirePointerKind::List {
            return Err(Error::from_kind(ErrorKind::ExistingPointerIsNotAList));
        }

        let old_size = reff.list_element_size();

        if old_size == InlineComposite {
            // The existing element size is InlineComposite, which means that it is at least two
            // words, which makes it bigger than the expected element size. Since fields can only
            // grow when upgraded, the existing data must have been written with a newer version of
            // the protocol. We therefore never need to upgrade the data in this case, but we do
            // need to validate that it is a valid upgrade from what we expected.
            let tag = get_pointer(&mut *arena, segment_id, ptr);
            if tag.kind() != WirePointerKind::Struct {
                return Err(Error::from_kind(
                    ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                ));
            }

            ptr += POINTER_SIZE_IN_WORDS as u32;

            let data_size = tag.struct_data_size();
            let pointer_count = tag.struct_ptr_count();

            match element_size {
                Void => {} // Anything is a valid upgrade from Void.
                Bit => {
                    return Err(Error::from_kind(
                        ErrorKind::FoundStructListWhereBitListWasExpected,
                    ));
                }
                Byte | TwoBytes | FourBytes | EightBytes => {
                    if data_size < 1 {
                        return Err(Error::from_kind(
                            ErrorKind::ExistingListValueIsIncompatibleWithExpectedType,
                        ));
                    }
                }
                Pointer => {
                    if pointer_count < 1 {
                        return Err(Error::from_kind(
                            ErrorKind::ExistingListValueIsIncompatibleWithExpectedType,
                        ));
                    }
                    // Adjust the pointer to point at the reference segment.
                    ptr += u32::from(data_size);
                }
                InlineComposite => unreachable!(),
            }
            // OK, looks valid.

            Ok(ListBuilder {
                arena,
                segment_id,
                ptr: ptr as usize * BYTES_PER_WORD,
                element_count: tag.inline_composite_list_element_count(),
                element_size: InlineComposite,
                step: tag.struct_word_size() * BITS_PER_WORD as u32,
                struct_data_size: u32::from(data_size) * BITS_PER_WORD as u32,
                struct_pointer_count: pointer_count,
            })
        } else {
            let data_size = data_bits_per_element(old_size);
            let pointer_count = pointers_per_element(old_size);

            if data_size < data_bits_per_element(element_size)
                || pointer_count < pointers_per_element(element_size)
            {
                return Err(Error::from_kind(
                    ErrorKind::ExistingListValueIsIncompatibleWithExpectedType,
                ));
            }

            let step = data_size + pointer_count * BITS_PER_POINTER as u32;

            Ok(ListBuilder {
                arena,
                segment_id,
                ptr: ptr as usize * BYTES_PER_WORD,
                step,
                element_count: reff.list_element_count(),
                element_size: old_size,
                struct_data_size: data_size,
                struct_pointer_count: pointer_count as u16,
            })
        }
    }

    pub fn get_writable_struct_list_pointer(
        arena: &mut dyn BuilderArena,
        orig_segment_id: u32,
        orig_location: u32,
        element_size: StructSize,
    ) -> Result<ListBuilder<'_>> {
        let orig_ref = get_pointer(arena, orig_segment_id, orig_location);
        if orig_ref.is_null() {
            return Ok(ListBuilder::new_default(arena));
        }

        let (old_ref, old_segment_id, old_ptr) =
            follow_builder_fars(&mut *arena, orig_ref, orig_location, orig_segment_id)?;

        if old_ref.kind() != WirePointerKind::List {
            return Err(Error::from_kind(ErrorKind::ExistingPointerIsNotAList));
        }

        if old_ref.list_element_size() != InlineComposite {
            // Upgrading a primitive or pointer list to a struct list is not supported by this
            // runtime.
            return Err(Error::from_kind(
                ErrorKind::ExistingListValueIsIncompatibleWithExpectedType,
            ));
        }

        //# Existing list is InlineComposite, but we need to verify that the sizes match.
        let old_tag = get_pointer(&mut *arena, old_segment_id, old_ptr);
        if old_tag.kind() != WirePointerKind::Struct {
            return Err(Error::from_kind(
                ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
            ));
        }

        let old_data_size = old_tag.struct_data_size();
        let old_pointer_count = old_tag.struct_ptr_count();
        let old_step = u32::from(old_data_size) + u32::from(old_pointer_count);
        let element_count = old_tag.inline_composite_list_element_count();

        if old_data_size >= element_size.data_words() && old_pointer_count >= element_size.pointers {
            //# Old size is at least as large as we need. Ship it.
            return Ok(ListBuilder {
                arena,
                segment_id: old_segment_id,
                ptr: (old_ptr as usize + POINTER_SIZE_IN_WORDS) * BYTES_PER_WORD,
                element_count,
                element_size: InlineComposite,
                step: old_step * BITS_PER_WORD as u32,
                struct_data_size: u32::from(old_data_size) * BITS_PER_WORD as u32,
                struct_pointer_count: old_pointer_count,
            });
        }

        //# The structs in this list are smaller than expected, probably written using an older
        //# version of the protocol. We need to make a copy and expand them.
        let new_data_size = ::core::cmp::max(old_data_size, element_size.data_words());
        let new_pointer_count = ::core::cmp::max(old_pointer_count, element_size.pointers);
        let new_step = u32::from(new_data_size) + u32::from(new_pointer_count);
        let total_size = new_step * element_count;
        trace!("upgrading struct list of {element_count} elements to step {new_step}");

        //# Don't let allocate() zero out the object just yet.
        zero_pointer_and_fars(&mut *arena, orig_segment_id, orig_location);

        let alloc = allocate(
            &mut *arena,
            orig_segment_id,
            orig_location,
            total_size + POINTER_SIZE_IN_WORDS as u32,
            WirePointerKind::List,
        );
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_list_inline_composite(total_size),
        );

        let mut new_tag = WirePointer::default();
        new_tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        new_tag.set_struct_size_from_pieces(new_data_size, new_pointer_count);
        set_pointer(&mut *arena, alloc.segment_id, alloc.ptr, new_tag);

        let mut src = old_ptr + POINTER_SIZE_IN_WORDS as u32;
        let mut dst = alloc.ptr + POINTER_SIZE_IN_WORDS as u32;
        for _ in 0..element_count {
            copy_bytes(
                &mut *arena,
                old_segment_id,
                src as usize * BYTES_PER_WORD,
                alloc.segment_id,
                dst as usize * BYTES_PER_WORD,
                old_data_size as usize * BYTES_PER_WORD,
            );

            let new_pointer_section = dst + u32::from(new_data_size);
            let old_pointer_section = src + u32::from(old_data_size);
            for i in 0..u32::from(old_pointer_count) {
                transfer_pointer(
                    &mut *arena,
                    alloc.segment_id,
                    new_pointer_section + i,
                    old_segment_id,
                    old_pointer_section + i,
                );
            }

            dst += new_step;
            src += old_step;
        }

        //# Zero out old location. See explanation in get_writable_struct_pointer().
        //# Make sure to include the tag word.
        zero_words(
            &mut *arena,
            old_segment_id,
            old_ptr,
            (1 + old_step * element_count) as usize,
        );

        Ok(ListBuilder {
            arena,
            segment_id: alloc.segment_id,
            ptr: (alloc.ptr as usize + POINTER_SIZE_IN_WORDS) * BYTES_PER_WORD,
            element_count,
            element_size: InlineComposite,
            step: new_step * BITS_PER_WORD as u32,
            struct_data_size: u32::from(new_data_size) * BITS_PER_WORD as u32,
            struct_pointer_count: new_pointer_count,
        })
    }

    pub fn init_text_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        size: ByteCount32,
    ) -> text::Builder<'_> {
        //# The byte list must include a NUL terminator.
        let byte_size = size + 1;

        //# Allocate the space.
        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            round_bytes_up_to_words(byte_size),
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_list_size_and_count(Byte, byte_size),
        );

        let start = alloc.ptr as usize * BYTES_PER_WORD;
        let bytes = &mut arena.get_segment_mut(alloc.segment_id)[start..start + size as usize];
        text::Builder::new(bytes)
    }

    pub fn set_text_pointer<'a>(
        arena: &'a mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        value: &str,
    ) -> text::Builder<'a> {
        let value_bytes = value.as_bytes();
        let mut builder = init_text_pointer(arena, segment_id, location, value_bytes.len() as u32);
        builder.push_str(value);
        builder
    }

    pub fn get_writable_text_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
    ) -> Result<text::Builder<'_>> {
        let reff = get_pointer(arena, segment_id, location);
        if reff.is_null() {
            return Ok(text::Builder::new(&mut []));
        }
        let (reff, target_segment_id, ptr) =
            follow_builder_fars(&mut *arena, reff, location, segment_id)?;

        if reff.kind() != WirePointerKind::List {
            return Err(Error::from_kind(ErrorKind::ExistingPointerIsNotAList));
        }
        if reff.list_element_size() != Byte {
            return Err(Error::from_kind(
                ErrorKind::ExistingListPointerIsNotByteSized,
            ));
        }

        let count = reff.list_element_count() as usize;
        let start = ptr as usize * BYTES_PER_WORD;
        let segment = arena.get_segment_mut(target_segment_id);
        if count == 0 || segment[start + count - 1] != 0 {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsTextThatIsNotNULTerminated,
            ));
        }

        // Subtract 1 from the size for the NUL terminator.
        text::Builder::with_contents(&mut segment[start..start + count - 1])
    }

    pub fn init_data_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        size: ByteCount32,
    ) -> data::Builder<'_> {
        //# Allocate the space.
        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            round_bytes_up_to_words(size),
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_list_size_and_count(Byte, size),
        );

        let start = alloc.ptr as usize * BYTES_PER_WORD;
        &mut arena.get_segment_mut(alloc.segment_id)[start..start + size as usize]
    }

    pub fn set_data_pointer<'a>(
        arena: &'a mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        value: &[u8],
    ) -> data::Builder<'a> {
        let builder = init_data_pointer(arena, segment_id, location, value.len() as u32);
        builder.copy_from_slice(value);
        builder
    }

    pub fn get_writable_data_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
    ) -> Result<data::Builder<'_>> {
        let reff = get_pointer(arena, segment_id, location);
        if reff.is_null() {
            return Ok(&mut []);
        }
        let (reff, target_segment_id, ptr) =
            follow_builder_fars(&mut *arena, reff, location, segment_id)?;

        if reff.kind() != WirePointerKind::List {
            return Err(Error::from_kind(ErrorKind::ExistingPointerIsNotAList));
        }
        if reff.list_element_size() != Byte {
            return Err(Error::from_kind(
                ErrorKind::ExistingListPointerIsNotByteSized,
            ));
        }

        let start = ptr as usize * BYTES_PER_WORD;
        let count = reff.list_element_count() as usize;
        Ok(&mut arena.get_segment_mut(target_segment_id)[start..start + count])
    }

    /// Deep-copies `value` into a freshly allocated struct referenced from `location`.
    pub fn set_struct_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        value: &StructReader,
    ) -> Result<()> {
        let data_size: ByteCount32 = round_bits_up_to_bytes(u64::from(value.data_size));
        let ptr_count = value.pointer_count;

        let data_words = round_bytes_up_to_words(data_size);
        let total_size: WordCount32 = data_words + u32::from(ptr_count) * WORDS_PER_POINTER as u32;

        let alloc = allocate(
            &mut *arena,
            segment_id,
            location,
            total_size,
            WirePointerKind::Struct,
        );
        update_pointer(
            &mut *arena,
            alloc.tag_segment_id,
            alloc.tag_location,
            |p| p.set_struct_size_from_pieces(data_words as u16, ptr_count),
        );

        let start = alloc.ptr as usize * BYTES_PER_WORD;
        let segment = arena.get_segment_mut(alloc.segment_id);
        if value.data_size == 1 {
            segment[start] = u8::from(value.get_bool_field(0));
        } else {
            segment[start..start + data_size as usize]
                .copy_from_slice(value.get_data_section_as_blob());
        }

        let pointer_section = alloc.ptr + data_words;
        for i in 0..u32::from(ptr_count) {
            let src = value.get_pointer_field(i as usize);
            copy_pointer(
                &mut *arena,
                alloc.segment_id,
                pointer_section + i,
                src.arena,
                src.segment_id,
                src.pointer,
                src.location,
                value.nesting_limit,
            )?;
        }

        Ok(())
    }

    /// Deep-copies `value` into a freshly allocated list referenced from `location`.
    pub fn set_list_pointer(
        arena: &mut dyn BuilderArena,
        segment_id: u32,
        location: u32,
        value: &ListReader,
    ) -> Result<()> {
        let total_size =
            round_bits_up_to_words(u64::from(value.element_count) * u64::from(value.step));

        if value.element_size != InlineComposite {
            //# List of non-structs.
            let alloc = allocate(
                &mut *arena,
                segment_id,
                location,
                total_size,
                WirePointerKind::List,
            );

            if value.struct_pointer_count == 1 {
                //# List of pointers.
                update_pointer(
                    &mut *arena,
                    alloc.tag_segment_id,
                    alloc.tag_location,
                    |p| p.set_list_size_and_count(Pointer, value.element_count),
                );
                for i in 0..value.element_count {
                    let src = value.get_pointer_element(i);
                    copy_pointer(
                        &mut *arena,
                        alloc.segment_id,
                        alloc.ptr + i,
                        src.arena,
                        src.segment_id,
                        src.pointer,
                        src.location,
                        value.nesting_limit,
                    )?;
                }
            } else {
                //# List of data.
                let element_size = match value.step {
                    0 => Void,
                    1 => Bit,
                    8 => Byte,
                    16 => TwoBytes,
                    32 => FourBytes,
                    64 => EightBytes,
                    _ => {
                        return Err(Error::failed(format!(
                            "invalid list step size: {}",
                            value.step
                        )))
                    }
                };

                update_pointer(
                    &mut *arena,
                    alloc.tag_segment_id,
                    alloc.tag_location,
                    |p| p.set_list_size_and_count(element_size, value.element_count),
                );

                // Be careful to avoid copying any bytes past the end of the list.
                let total_bits = u64::from(value.element_count) * u64::from(value.step);
                let whole_byte_size = (total_bits / BITS_PER_BYTE as u64) as usize;
                let leftover_bits = total_bits % BITS_PER_BYTE as u64;

                let src = value.as_raw_bytes();
                let start = alloc.ptr as usize * BYTES_PER_WORD;
                let segment = arena.get_segment_mut(alloc.segment_id);
                segment[start..start + whole_byte_size].copy_from_slice(&src[..whole_byte_size]);
                if leftover_bits > 0 {
                    let mask: u8 = (1 << leftover_bits as u8) - 1;
                    segment[start + whole_byte_size] = mask & src[whole_byte_size];
                }
            }
            Ok(())
        } else {
            //# List of structs.
            let data_size = (value.struct_data_size / BITS_PER_WORD as u32) as u16;
            let ptr_count = value.struct_pointer_count;

            let alloc = allocate(
                &mut *arena,
                segment_id,
                location,
                total_size + POINTER_SIZE_IN_WORDS as u32,
                WirePointerKind::List,
            );
            update_pointer(
                &mut *arena,
                alloc.tag_segment_id,
                alloc.tag_location,
                |p| p.set_list_inline_composite(total_size),
            );

            let mut tag = WirePointer::default();
            tag.set_kind_and_inline_composite_list_element_count(
                WirePointerKind::Struct,
                value.element_count,
            );
            tag.set_struct_size_from_pieces(data_size, ptr_count);
            set_pointer(&mut *arena, alloc.segment_id, alloc.ptr, tag);

            let mut dst = alloc.ptr + POINTER_SIZE_IN_WORDS as u32;
            for index in 0..value.element_count {
                let element = value.get_struct_element(index);
                let start = dst as usize * BYTES_PER_WORD;
                arena.get_segment_mut(alloc.segment_id)
                    [start..start + data_size as usize * BYTES_PER_WORD]
                    .copy_from_slice(element.get_data_section_as_blob());
                dst += u32::from(data_size);

                for i in 0..ptr_count {
                    let src = element.get_pointer_field(i as usize);
                    copy_pointer(
                        &mut *arena,
                        alloc.segment_id,
                        dst,
                        src.arena,
                        src.segment_id,
                        src.pointer,
                        src.location,
                        value.nesting_limit,
                    )?;
                    dst += POINTER_SIZE_IN_WORDS as u32;
                }
            }
            Ok(())
        }
    }

    /// Deep-copies the object that `src` (located at `src_location` in `src_arena`) points
    /// to, and makes the pointer at `dst` refer to the copy.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_pointer(
        dst_arena: &mut dyn BuilderArena,
        dst_segment_id: u32,
        dst: u32,
        src_arena: &dyn ReaderArena,
        src_segment_id: u32,
        src: WirePointer,
        src_location: u32,
        nesting_limit: i32,
    ) -> Result<()> {
        if src.is_null() {
            if !get_pointer(dst_arena, dst_segment_id, dst).is_null() {
                zero_object(dst_arena, dst_segment_id, dst);
            }
            set_pointer(dst_arena, dst_segment_id, dst, WirePointer::default());
            return Ok(());
        }

        let (src_tag, ptr, src_segment_id) =
            follow_fars(src_arena, src, src_location, src_segment_id)?;

        match src_tag.kind() {
            WirePointerKind::Struct => {
                if nesting_limit <= 0 {
                    return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
                }
                let value =
                    struct_reader_from_tag(src_arena, src_segment_id, src_tag, ptr, nesting_limit)?;
                set_struct_pointer(dst_arena, dst_segment_id, dst, &value)
            }
            WirePointerKind::List => {
                if nesting_limit <= 0 {
                    return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
                }
                let value = list_reader_from_tag(
                    src_arena,
                    src_segment_id,
                    src_tag,
                    ptr,
                    None,
                    nesting_limit,
                )?;
                set_list_pointer(dst_arena, dst_segment_id, dst, &value)
            }
            WirePointerKind::Far => Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer)),
            WirePointerKind::Other => {
                if src_tag.is_capability() {
                    Err(Error::from_kind(ErrorKind::UnsupportedCapabilityPointer))
                } else {
                    Err(Error::from_kind(ErrorKind::UnknownPointerType))
                }
            }
        }
    }

    // ---- reader side ----

    /// If `reff` is a far pointer, follows it. Returns the pointer describing the target object,
    /// the word index of the object (not yet bounds-checked), and its segment.
    pub fn follow_fars(
        arena: &dyn ReaderArena,
        reff: WirePointer,
        location: u32,
        segment_id: u32,
    ) -> Result<(WirePointer, i64, u32)> {
        if reff.kind() != WirePointerKind::Far {
            return Ok((reff, reff.target(location), segment_id));
        }

        let far_segment_id = reff.far_segment_id();
        let pad_location = reff.far_position_in_segment();
        let pad_words: usize = if reff.is_double_far() { 2 } else { 1 };
        let segment = bounds_check(arena, far_segment_id, i64::from(pad_location), pad_words)?;
        let pad = WirePointer::read(word_bytes(segment, pad_location));

        if !reff.is_double_far() {
            if pad.kind() == WirePointerKind::Far {
                return Err(Error::failed(
                    "Far pointer's landing pad is another far pointer.".to_string(),
                ));
            }
            Ok((pad, pad.target(pad_location), far_segment_id))
        } else {
            //# Landing pad is another far pointer. It is
            //# followed by a tag describing the pointed-to
            //# object.
            if pad.kind() != WirePointerKind::Far || pad.is_double_far() {
                return Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer));
            }
            let tag = WirePointer::read(word_bytes(segment, pad_location + 1));
            Ok((
                tag,
                i64::from(pad.far_position_in_segment()),
                pad.far_segment_id(),
            ))
        }
    }

    pub fn struct_reader_from_tag(
        arena: &dyn ReaderArena,
        segment_id: u32,
        tag: WirePointer,
        ptr: i64,
        nesting_limit: i32,
    ) -> Result<StructReader<'_>> {
        let data_size_words = tag.struct_data_size();
        let segment = bounds_check(arena, segment_id, ptr, tag.struct_word_size() as usize)?;
        let ptr = ptr as u32;

        Ok(StructReader {
            arena,
            segment,
            segment_id,
            data: ptr as usize * BYTES_PER_WORD,
            pointers: ptr + u32::from(data_size_words),
            data_size: u32::from(data_size_words) * BITS_PER_WORD as BitCount32,
            pointer_count: tag.struct_ptr_count(),
            nesting_limit: nesting_limit - 1,
        })
    }

    pub fn read_struct_pointer(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
        nesting_limit: i32,
    ) -> Result<StructReader<'_>> {
        if reff.is_null() {
            return Ok(StructReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }

        let (tag, ptr, segment_id) = follow_fars(arena, reff, location, segment_id)?;

        if tag.kind() != WirePointerKind::Struct {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonStructPointerWhereStructPointerWasExpected,
            ));
        }

        struct_reader_from_tag(arena, segment_id, tag, ptr, nesting_limit)
    }

    pub fn list_reader_from_tag(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        ptr: i64,
        expected_element_size: Option<ElementSize>,
        nesting_limit: i32,
    ) -> Result<ListReader<'_>> {
        let element_size = reff.list_element_size();
        match element_size {
            InlineComposite => {
                let word_count = reff.list_inline_composite_word_count();
                let segment = bounds_check(arena, segment_id, ptr, word_count as usize + 1)?;
                let tag = WirePointer::read(word_bytes(segment, ptr as u32));
                let mut ptr = ptr as u32 + 1;

                if tag.kind() != WirePointerKind::Struct {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                    ));
                }

                let size = tag.inline_composite_list_element_count();
                let data_size = tag.struct_data_size();
                let ptr_count = tag.struct_ptr_count();
                let words_per_element = tag.struct_word_size();

                if u64::from(size) * u64::from(words_per_element) > u64::from(word_count) {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                    ));
                }

                if words_per_element == 0 {
                    // Watch out for lists of zero-sized structs, which can claim to be
                    // arbitrarily large without having sent actual data.
                    arena.amplified_read(u64::from(size))?;
                }

                // If a struct list was not expected, then presumably a non-struct list was upgraded
                // to a struct list. We need to manipulate the pointer to point at the first field
                // of the struct. Together with the `step` field, this will allow the struct list to
                // be accessed as if it were a primitive list without branching.

                // Check whether the size is compatible.
                match expected_element_size {
                    None | Some(Void) | Some(InlineComposite) => (),
                    Some(Bit) => {
                        return Err(Error::from_kind(
                            ErrorKind::FoundStructListWhereBitListWasExpected,
                        ));
                    }
                    Some(Byte) | Some(TwoBytes) | Some(FourBytes) | Some(EightBytes) => {
                        if data_size == 0 {
                            return Err(Error::from_kind(
                                ErrorKind::ExpectedAPrimitiveListButGotAListOfPointerOnlyStructs,
                            ));
                        }
                    }
                    Some(Pointer) => {
                        // We expected a list of pointers but got a list of structs. Assuming the
                        // first field in the struct is the pointer we were looking for, we want to
                        // munge the pointer to point at the first element's pointer section.
                        if ptr_count == 0 {
                            return Err(Error::from_kind(
                                ErrorKind::ExpectedAPointerListButGotAListOfDataOnlyStructs,
                            ));
                        }
                        ptr += u32::from(data_size);
                    }
                }

                Ok(ListReader {
                    arena,
                    segment,
                    segment_id,
                    ptr: ptr as usize * BYTES_PER_WORD,
                    element_count: size,
                    element_size,
                    step: words_per_element * BITS_PER_WORD as u32,
                    struct_data_size: u32::from(data_size) * (BITS_PER_WORD as u32),
                    struct_pointer_count: ptr_count,
                    nesting_limit: nesting_limit - 1,
                })
            }
            _ => {
                // This is a primitive or pointer list, but all such lists can also be interpreted
                // as struct lists. We need to compute the data size and pointer count for such
                // structs.
                let data_size = data_bits_per_element(element_size);
                let pointer_count = pointers_per_element(element_size);
                let element_count = reff.list_element_count();
                let step = data_size + pointer_count * BITS_PER_POINTER as u32;

                let word_count =
                    round_bits_up_to_words(u64::from(element_count) * u64::from(step));
                let segment = bounds_check(arena, segment_id, ptr, word_count as usize)?;

                if element_size == Void {
                    // Watch out for lists of void, which can claim to be arbitrarily large
                    // without having sent actual data.
                    arena.amplified_read(u64::from(element_count))?;
                }

                if let Some(expected_element_size) = expected_element_size {
                    if element_size == Bit && expected_element_size != Bit {
                        return Err(Error::from_kind(
                            ErrorKind::FoundBitListWhereStructListWasExpected,
                        ));
                    }

                    // Verify that the elements are at least as large as the expected type. Note that if
                    // we expected InlineComposite, the expected sizes here will be zero, because bounds
                    // checking will be performed at field access time. So this check here is for the
                    // case where we expected a list of some primitive or pointer type.

                    let expected_data_bits_per_element =
                        data_bits_per_element(expected_element_size);
                    let expected_pointers_per_element = pointers_per_element(expected_element_size);

                    if expected_data_bits_per_element > data_size
                        || expected_pointers_per_element > pointer_count
                    {
                        return Err(Error::from_kind(
                            ErrorKind::MessageContainsListWithIncompatibleElementType,
                        ));
                    }
                }

                Ok(ListReader {
                    arena,
                    segment,
                    segment_id,
                    ptr: ptr as usize * BYTES_PER_WORD,
                    element_count,
                    element_size,
                    step,
                    struct_data_size: data_size,
                    struct_pointer_count: pointer_count as u16,
                    nesting_limit: nesting_limit - 1,
                })
            }
        }
    }

    pub fn read_list_pointer(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
        expected_element_size: Option<ElementSize>,
        nesting_limit: i32,
    ) -> Result<ListReader<'_>> {
        if reff.is_null() {
            return Ok(ListReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }

        let (tag, ptr, segment_id) = follow_fars(arena, reff, location, segment_id)?;

        if tag.kind() != WirePointerKind::List {
            return Err(Error::from_kind(
                ErrorKind::MessageContainsNonListPointerWhereListPointerWasExpected,
            ));
        }

        list_reader_from_tag(
            arena,
            segment_id,
            tag,
            ptr,
            expected_element_size,
            nesting_limit,
        )
    }

    /// Follows a pointer to a byte list, returning its bytes.
    fn read_byte_list(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
        non_list: ErrorKind,
        non_bytes: ErrorKind,
    ) -> Result<&[u8]> {
        let (tag, ptr, segment_id) = follow_fars(arena, reff, location, segment_id)?;

        if tag.kind() != WirePointerKind::List {
            return Err(Error::from_kind(non_list));
        }

        if tag.list_element_size() != Byte {
            return Err(Error::from_kind(non_bytes));
        }

        let size = tag.list_element_count();
        let segment = bounds_check(
            arena,
            segment_id,
            ptr,
            round_bytes_up_to_words(size) as usize,
        )?;
        let start = ptr as usize * BYTES_PER_WORD;
        Ok(&segment[start..start + size as usize])
    }

    pub fn read_text_pointer(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
    ) -> Result<text::Reader<'_>> {
        if reff.is_null() {
            return Ok("");
        }

        let bytes = read_byte_list(
            arena,
            segment_id,
            reff,
            location,
            ErrorKind::MessageContainsNonListPointerWhereTextWasExpected,
            ErrorKind::MessageContainsListPointerOfNonBytesWhereTextWasExpected,
        )?;

        match bytes.split_last() {
            Some((&0, contents)) => text::new_reader(contents),
            _ => Err(Error::from_kind(
                ErrorKind::MessageContainsTextThatIsNotNULTerminated,
            )),
        }
    }

    pub fn read_data_pointer(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
    ) -> Result<data::Reader<'_>> {
        if reff.is_null() {
            return Ok(&[]);
        }

        read_byte_list(
            arena,
            segment_id,
            reff,
            location,
            ErrorKind::MessageContainsNonListPointerWhereDataWasExpected,
            ErrorKind::MessageContainsListPointerOfNonBytesWhereDataWasExpected,
        )
    }

    pub fn total_size(
        arena: &dyn ReaderArena,
        segment_id: u32,
        reff: WirePointer,
        location: u32,
        mut nesting_limit: i32,
    ) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: 0,
            cap_count: 0,
        };

        if reff.is_null() {
            return Ok(result);
        };

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }

        nesting_limit -= 1;

        let (tag, ptr, segment_id) = follow_fars(arena, reff, location, segment_id)?;

        match tag.kind() {
            WirePointerKind::Struct => {
                bounds_check(arena, segment_id, ptr, tag.struct_word_size() as usize)?;
                result.word_count += u64::from(tag.struct_word_size());

                let pointer_section = ptr as u32 + u32::from(tag.struct_data_size());
                for i in 0..u32::from(tag.struct_ptr_count()) {
                    let segment = arena.get_segment(segment_id)?;
                    let child = WirePointer::read(word_bytes(segment, pointer_section + i));
                    result.plus_eq(total_size(
                        arena,
                        segment_id,
                        child,
                        pointer_section + i,
                        nesting_limit,
                    )?);
                }
            }
            WirePointerKind::List => match tag.list_element_size() {
                Void => {}
                Bit | Byte | TwoBytes | FourBytes | EightBytes => {
                    let total_words = round_bits_up_to_words(
                        u64::from(tag.list_element_count())
                            * u64::from(data_bits_per_element(tag.list_element_size())),
                    );
                    bounds_check(arena, segment_id, ptr, total_words as usize)?;
                    result.word_count += u64::from(total_words);
                }
                Pointer => {
                    let count = tag.list_element_count();
                    let segment = bounds_check(
                        arena,
                        segment_id,
                        ptr,
                        count as usize * WORDS_PER_POINTER,
                    )?;

                    result.word_count += u64::from(count) * WORDS_PER_POINTER as u64;

                    for i in 0..count {
                        let location = ptr as u32 + i;
                        let child = WirePointer::read(word_bytes(segment, location));
                        result.plus_eq(total_size(
                            arena,
                            segment_id,
                            child,
                            location,
                            nesting_limit,
                        )?);
                    }
                }
                InlineComposite => {
                    let word_count = tag.list_inline_composite_word_count();
                    let segment = bounds_check(
                        arena,
                        segment_id,
                        ptr,
                        word_count as usize + POINTER_SIZE_IN_WORDS,
                    )?;

                    let element_tag = WirePointer::read(word_bytes(segment, ptr as u32));
                    let count = element_tag.inline_composite_list_element_count();

                    if element_tag.kind() != WirePointerKind::Struct {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                        ));
                    }

                    let actual_size =
                        u64::from(element_tag.struct_word_size()) * u64::from(count);
                    if actual_size > u64::from(word_count) {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsElementsOverrunItsWordCount,
                        ));
                    }

                    // Count the actual size rather than the claimed word count because
                    // that's what we end up with if we make a copy.
                    result.word_count += actual_size + POINTER_SIZE_IN_WORDS as u64;

                    let data_size = u32::from(element_tag.struct_data_size());
                    let pointer_count = u32::from(element_tag.struct_ptr_count());

                    if pointer_count > 0 {
                        let mut pos = ptr as u32 + POINTER_SIZE_IN_WORDS as u32;
                        for _ in 0..count {
                            pos += data_size;

                            for _ in 0..pointer_count {
                                let child = WirePointer::read(word_bytes(segment, pos));
                                result.plus_eq(total_size(
                                    arena,
                                    segment_id,
                                    child,
                                    pos,
                                    nesting_limit,
                                )?);
                                pos += POINTER_SIZE_IN_WORDS as u32;
                            }
                        }
                    }
                }
            },
            WirePointerKind::Far => {
                return Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer));
            }
            WirePointerKind::Other => {
                if tag.is_capability() {
                    result.cap_count += 1;
                } else {
                    return Err(Error::from_kind(ErrorKind::UnknownPointerType));
                }
            }
        }

        Ok(result)
    }
}

static NULL_ARENA: NullArena = NullArena;

/// A read-only view of one pointer slot.
#[derive(Clone, Copy)]
pub struct PointerReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: u32,
    pointer: WirePointer,
    location: u32,
    nesting_limit: i32,
}

impl<'a> PointerReader<'a> {
    pub fn new_default<'b>() -> PointerReader<'b> {
        PointerReader {
            arena: &NULL_ARENA,
            segment_id: 0,
            pointer: WirePointer::default(),
            location: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_root(
        arena: &'a dyn ReaderArena,
        segment_id: u32,
        location: u32,
        nesting_limit: i32,
    ) -> Result<Self> {
        let segment = wire_helpers::bounds_check(
            arena,
            segment_id,
            i64::from(location),
            POINTER_SIZE_IN_WORDS,
        )?;
        Ok(PointerReader {
            arena,
            segment_id,
            pointer: WirePointer::read(word_bytes(segment, location)),
            location,
            nesting_limit,
        })
    }

    pub fn is_null(&self) -> bool {
        self.pointer.is_null()
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        wire_helpers::total_size(
            self.arena,
            self.segment_id,
            self.pointer,
            self.location,
            self.nesting_limit,
        )
    }

    pub fn get_struct(&self) -> Result<StructReader<'a>> {
        wire_helpers::read_struct_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            self.location,
            self.nesting_limit,
        )
    }

    pub fn get_list(&self, expected_element_size: ElementSize) -> Result<ListReader<'a>> {
        wire_helpers::read_list_pointer(
            self.arena,
            self.segment_id,
            self.pointer,
            self.location,
            Some(expected_element_size),
            self.nesting_limit,
        )
    }

    pub fn get_text(&self) -> Result<text::Reader<'a>> {
        wire_helpers::read_text_pointer(self.arena, self.segment_id, self.pointer, self.location)
    }

    pub fn get_data(&self) -> Result<data::Reader<'a>> {
        wire_helpers::read_data_pointer(self.arena, self.segment_id, self.pointer, self.location)
    }

    pub fn get_pointer_type(&self) -> Result<PointerType> {
        if self.is_null() {
            Ok(PointerType::Null)
        } else {
            let (tag, _, _) = wire_helpers::follow_fars(
                self.arena,
                self.pointer,
                self.location,
                self.segment_id,
            )?;
            match tag.kind() {
                WirePointerKind::Far => Err(Error::from_kind(ErrorKind::MalformedDoubleFarPointer)),
                WirePointerKind::Struct => Ok(PointerType::Struct),
                WirePointerKind::List => Ok(PointerType::List),
                WirePointerKind::Other => {
                    if tag.is_capability() {
                        Ok(PointerType::Capability)
                    } else {
                        Err(Error::from_kind(ErrorKind::UnknownPointerType))
                    }
                }
            }
        }
    }
}

/// A mutable view of one pointer slot. Writing a non-null slot replaces it and zeroes
/// whatever it used to point to.
pub struct PointerBuilder<'a> {
    arena: &'a mut dyn BuilderArena,
    segment_id: u32,
    location: u32,
}

impl<'a> PointerBuilder<'a> {
    pub fn get_root(arena: &'a mut dyn BuilderArena, segment_id: u32, location: u32) -> Self {
        PointerBuilder {
            arena,
            segment_id,
            location,
        }
    }

    pub fn reborrow(&mut self) -> PointerBuilder<'_> {
        PointerBuilder {
            arena: &mut *self.arena,
            segment_id: self.segment_id,
            location: self.location,
        }
    }

    fn pointer(&self) -> WirePointer {
        WirePointer::read(word_bytes(
            builder_segment(self.arena.as_reader(), self.segment_id),
            self.location,
        ))
    }

    pub fn is_null(&self) -> bool {
        self.pointer().is_null()
    }

    /// Returns the struct this slot points to, allocating a zeroed one if the slot is null.
    pub fn get_struct(self, size: StructSize) -> Result<StructBuilder<'a>> {
        wire_helpers::get_writable_struct_pointer(self.arena, self.segment_id, self.location, size)
    }

    pub fn get_list(self, element_size: ElementSize) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_list_pointer(
            self.arena,
            self.segment_id,
            self.location,
            element_size,
        )
    }

    pub fn get_struct_list(self, element_size: StructSize) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_struct_list_pointer(
            self.arena,
            self.segment_id,
            self.location,
            element_size,
        )
    }

    pub fn get_text(self) -> Result<text::Builder<'a>> {
        wire_helpers::get_writable_text_pointer(self.arena, self.segment_id, self.location)
    }

    pub fn get_data(self) -> Result<data::Builder<'a>> {
        wire_helpers::get_writable_data_pointer(self.arena, self.segment_id, self.location)
    }

    pub fn init_struct(self, size: StructSize) -> StructBuilder<'a> {
        wire_helpers::init_struct_pointer(self.arena, self.segment_id, self.location, size)
    }

    pub fn init_list(
        self,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> ListBuilder<'a> {
        wire_helpers::init_list_pointer(
            self.arena,
            self.segment_id,
            self.location,
            element_count,
            element_size,
        )
    }

    pub fn init_struct_list(
        self,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> ListBuilder<'a> {
        wire_helpers::init_struct_list_pointer(
            self.arena,
            self.segment_id,
            self.location,
            element_count,
            element_size,
        )
    }

    pub fn init_text(self, size: ByteCount32) -> text::Builder<'a> {
        wire_helpers::init_text_pointer(self.arena, self.segment_id, self.location, size)
    }

    pub fn init_data(self, size: ByteCount32) -> data::Builder<'a> {
        wire_helpers::init_data_pointer(self.arena, self.segment_id, self.location, size)
    }

    pub fn set_struct(&mut self, value: &StructReader) -> Result<()> {
        wire_helpers::set_struct_pointer(&mut *self.arena, self.segment_id, self.location, value)
    }

    pub fn set_list(&mut self, value: &ListReader) -> Result<()> {
        wire_helpers::set_list_pointer(&mut *self.arena, self.segment_id, self.location, value)
    }

    pub fn set_text(&mut self, value: &str) {
        wire_helpers::set_text_pointer(&mut *self.arena, self.segment_id, self.location, value);
    }

    pub fn set_data(&mut self, value: &[u8]) {
        wire_helpers::set_data_pointer(&mut *self.arena, self.segment_id, self.location, value);
    }

    /// Makes this slot a deep copy of `other`.
    pub fn copy_from(&mut self, other: PointerReader) -> Result<()> {
        wire_helpers::copy_pointer(
            &mut *self.arena,
            self.segment_id,
            self.location,
            other.arena,
            other.segment_id,
            other.pointer,
            other.location,
            other.nesting_limit,
        )
    }

    pub fn clear(&mut self) {
        wire_helpers::zero_object(&mut *self.arena, self.segment_id, self.location);
        wire_helpers::zero_words(&mut *self.arena, self.segment_id, self.location, 1);
    }

    pub fn as_reader(&self) -> PointerReader<'_> {
        PointerReader {
            arena: self.arena.as_reader(),
            segment_id: self.segment_id,
            pointer: self.pointer(),
            location: self.location,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn into_reader(self) -> PointerReader<'a> {
        let pointer = self.pointer();
        let arena: &'a dyn BuilderArena = self.arena;
        PointerReader {
            arena: arena.as_reader(),
            segment_id: self.segment_id,
            pointer,
            location: self.location,
            nesting_limit: 0x7fffffff,
        }
    }
}

/// A read-only view of a struct: a data section at a byte offset and a pointer section at a
/// word offset, both inside `segment`.
#[derive(Clone, Copy)]
pub struct StructReader<'a> {
    arena: &'a dyn ReaderArena,
    segment: &'a [u8],
    segment_id: u32,
    data: ByteCount,
    pointers: WordCount32,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
    nesting_limit: i32,
}

impl<'a> StructReader<'a> {
    pub fn new_default<'b>() -> StructReader<'b> {
        StructReader {
            arena: &NULL_ARENA,
            segment: &[],
            segment_id: 0,
            data: 0,
            pointers: 0,
            data_size: 0,
            pointer_count: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    pub fn get_data_section_as_blob(&self) -> &'a [u8] {
        let len = self.data_size as usize / BITS_PER_BYTE;
        &self.segment[self.data..self.data + len]
    }

    /// Reads the `offset`-th element of type `T` in the data section.
    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        // We need to check the offset because the struct may have
        // been created with an old version of the protocol that did
        // not contain the field.
        if offset < self.data_size as usize / (T::WIDTH * BITS_PER_BYTE) {
            let start = self.data + offset * T::WIDTH;
            T::get(&self.segment[start..start + T::WIDTH])
        } else {
            T::zero()
        }
    }

    /// Reads the bit at `offset`, counted in bits from the start of the data section.
    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        if offset < self.data_size as usize {
            let b = self.segment[self.data + offset / BITS_PER_BYTE];
            (b & (1u8 << (offset % BITS_PER_BYTE))) != 0
        } else {
            false
        }
    }

    /// Reads bit `bit_index` (0 = least significant) of the byte at `byte_offset`.
    pub fn get_bool(&self, byte_offset: ByteCount, bit_index: u8) -> bool {
        assert!(bit_index < 8, "bit index {bit_index} is out of range 0..8");
        match byte_offset.checked_mul(BITS_PER_BYTE) {
            Some(bit) => self.get_bool_field(bit + bit_index as usize),
            None => false,
        }
    }

    /// Reads a little-endian unsigned integer of `width` bytes (1, 2, 4 or 8) starting at
    /// `byte_offset`, zero-extended.
    pub fn get_integer(&self, byte_offset: ByteCount, width: ByteCount) -> u64 {
        assert!(
            matches!(width, 1 | 2 | 4 | 8),
            "unsupported integer width: {width}"
        );
        let data_bytes = self.data_size as usize / BITS_PER_BYTE;
        if byte_offset < data_bytes && width <= data_bytes - byte_offset {
            primitive::read_uint(&self.segment[self.data + byte_offset..], width)
        } else {
            0
        }
    }

    #[inline]
    pub fn get_pointer_field(&self, ptr_index: WirePointerCount) -> PointerReader<'a> {
        if ptr_index < self.pointer_count as WirePointerCount {
            let location = self.pointers + ptr_index as u32;
            PointerReader {
                arena: self.arena,
                segment_id: self.segment_id,
                pointer: WirePointer::read(word_bytes(self.segment, location)),
                location,
                nesting_limit: self.nesting_limit,
            }
        } else {
            PointerReader::new_default()
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: u64::from(wire_helpers::round_bits_up_to_words(u64::from(self.data_size)))
                + u64::from(self.pointer_count) * WORDS_PER_POINTER as u64,
            cap_count: 0,
        };

        for i in 0..self.pointer_count as usize {
            result.plus_eq(self.get_pointer_field(i).total_size()?);
        }

        Ok(result)
    }
}

/// A mutable view of a struct inside a builder arena.
pub struct StructBuilder<'a> {
    arena: &'a mut dyn BuilderArena,
    segment_id: u32,
    data: ByteCount,
    pointers: WordCount32,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
}

impl<'a> StructBuilder<'a> {
    pub fn reborrow(&mut self) -> StructBuilder<'_> {
        StructBuilder {
            arena: &mut *self.arena,
            segment_id: self.segment_id,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
        }
    }

    pub fn as_reader(&self) -> StructReader<'_> {
        let arena = self.arena.as_reader();
        StructReader {
            arena,
            segment: builder_segment(arena, self.segment_id),
            segment_id: self.segment_id,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn into_reader(self) -> StructReader<'a> {
        let arena: &'a dyn BuilderArena = self.arena;
        let arena = arena.as_reader();
        StructReader {
            arena,
            segment: builder_segment(arena, self.segment_id),
            segment_id: self.segment_id,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    #[inline]
    fn check_data_range(&self, start_bit: usize, bits: usize) {
        assert!(
            start_bit + bits <= self.data_size as usize,
            "data field at bit {start_bit} (width {bits}) is outside the {}-bit data section",
            self.data_size
        );
    }

    #[inline]
    fn data_bytes(&self) -> &[u8] {
        let segment = builder_segment(self.arena.as_reader(), self.segment_id);
        &segment[self.data..self.data + self.data_size as usize / BITS_PER_BYTE]
    }

    #[inline]
    fn data_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.data_size as usize / BITS_PER_BYTE;
        &mut self.arena.get_segment_mut(self.segment_id)[self.data..self.data + len]
    }

    #[inline]
    pub fn set_data_field<T: Primitive>(&mut self, offset: ElementCount, value: T) {
        self.check_data_range(offset * T::WIDTH * BITS_PER_BYTE, T::WIDTH * BITS_PER_BYTE);
        let start = offset * T::WIDTH;
        T::set(&mut self.data_bytes_mut()[start..start + T::WIDTH], value)
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        self.check_data_range(offset * T::WIDTH * BITS_PER_BYTE, T::WIDTH * BITS_PER_BYTE);
        let start = offset * T::WIDTH;
        T::get(&self.data_bytes()[start..start + T::WIDTH])
    }

    #[inline]
    pub fn set_bool_field(&mut self, offset: ElementCount, value: bool) {
        //# This branch should be compiled out whenever this is
        //# inlined with a constant offset.
        self.check_data_range(offset, 1);
        let bitnum = offset % BITS_PER_BYTE;
        let b = &mut self.data_bytes_mut()[offset / BITS_PER_BYTE];
        *b = (*b & !(1 << bitnum)) | (u8::from(value) << bitnum)
    }

    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        self.check_data_range(offset, 1);
        let b = self.data_bytes()[offset / BITS_PER_BYTE];
        (b & (1 << (offset % BITS_PER_BYTE))) != 0
    }

    /// Sets or clears bit `bit_index` of the byte at `byte_offset`, leaving the other seven
    /// bits of that byte untouched.
    pub fn set_bool(&mut self, byte_offset: ByteCount, bit_index: u8, value: bool) {
        assert!(bit_index < 8, "bit index {bit_index} is out of range 0..8");
        self.set_bool_field(byte_offset * BITS_PER_BYTE + bit_index as usize, value)
    }

    pub fn get_bool(&self, byte_offset: ByteCount, bit_index: u8) -> bool {
        assert!(bit_index < 8, "bit index {bit_index} is out of range 0..8");
        self.get_bool_field(byte_offset * BITS_PER_BYTE + bit_index as usize)
    }

    /// Overwrites exactly `width` bytes at `byte_offset` with `value`, little-endian.
    ///
    /// Panics if `value` does not fit in `width` bytes.
    pub fn set_integer(&mut self, byte_offset: ByteCount, width: ByteCount, value: u64) {
        self.check_data_range(byte_offset * BITS_PER_BYTE, width * BITS_PER_BYTE);
        primitive::write_uint(&mut self.data_bytes_mut()[byte_offset..], width, value)
    }

    pub fn get_integer(&self, byte_offset: ByteCount, width: ByteCount) -> u64 {
        self.check_data_range(byte_offset * BITS_PER_BYTE, width * BITS_PER_BYTE);
        primitive::read_uint(&self.data_bytes()[byte_offset..], width)
    }

    #[inline]
    pub fn get_pointer_field(self, ptr_index: WirePointerCount) -> PointerBuilder<'a> {
        assert!(
            ptr_index < self.pointer_count as WirePointerCount,
            "pointer slot {ptr_index} is outside the {}-slot pointer section",
            self.pointer_count
        );
        PointerBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            location: self.pointers + ptr_index as u32,
        }
    }

    #[inline]
    pub fn get_pointer_field_mut(&mut self, ptr_index: WirePointerCount) -> PointerBuilder<'_> {
        self.reborrow().get_pointer_field(ptr_index)
    }
}

/// A read-only view of a list. `ptr` is the byte offset of the first element.
#[derive(Clone, Copy)]
pub struct ListReader<'a> {
    arena: &'a dyn ReaderArena,
    segment: &'a [u8],
    segment_id: u32,
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
    nesting_limit: i32,
}

impl<'a> ListReader<'a> {
    pub fn new_default<'b>() -> ListReader<'b> {
        ListReader {
            arena: &NULL_ARENA,
            segment: &[],
            segment_id: 0,
            ptr: 0,
            element_count: 0,
            element_size: ElementSize::Void,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    /// The bytes spanned by the list's elements.
    fn as_raw_bytes(&self) -> &'a [u8] {
        let len = wire_helpers::round_bits_up_to_bytes(
            u64::from(self.element_count) * u64::from(self.step),
        ) as usize;
        &self.segment[self.ptr..self.ptr + len]
    }

    #[inline]
    pub fn get_struct_element(&self, index: ElementCount32) -> StructReader<'a> {
        assert!(index < self.element_count, "list index out of bounds");
        let index_byte = (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize;
        let struct_data = self.ptr + index_byte;
        let struct_pointers = (struct_data + self.struct_data_size as usize / BITS_PER_BYTE)
            / BYTES_PER_WORD;

        StructReader {
            arena: self.arena,
            segment: self.segment,
            segment_id: self.segment_id,
            data: struct_data,
            pointers: struct_pointers as u32,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
            nesting_limit: self.nesting_limit - 1,
        }
    }

    #[inline]
    pub fn get_pointer_element(&self, index: ElementCount32) -> PointerReader<'a> {
        assert!(index < self.element_count, "list index out of bounds");
        let offset = self.ptr
            + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize;
        let location = (offset / BYTES_PER_WORD) as u32;
        PointerReader {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: WirePointer::read(word_bytes(self.segment, location)),
            location,
            nesting_limit: self.nesting_limit,
        }
    }
}

/// A mutable view of a list inside a builder arena.
pub struct ListBuilder<'a> {
    arena: &'a mut dyn BuilderArena,
    segment_id: u32,
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
}

impl<'a> ListBuilder<'a> {
    /// An empty list that refers to no memory.
    pub fn new_default(arena: &'a mut dyn BuilderArena) -> Self {
        ListBuilder {
            arena,
            segment_id: 0,
            ptr: 0,
            element_count: 0,
            element_size: ElementSize::Void,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
        }
    }

    pub fn reborrow(&mut self) -> ListBuilder<'_> {
        ListBuilder {
            arena: &mut *self.arena,
            segment_id: self.segment_id,
            ptr: self.ptr,
            element_count: self.element_count,
            step: self.step,
            struct_data_size: self.struct_data_size,
            struct_pointer_count: self.struct_pointer_count,
            element_size: self.element_size,
        }
    }

    fn reader_with<'b>(&self, arena: &'b dyn ReaderArena) -> ListReader<'b> {
        let segment = if self.element_count == 0 {
            &[][..]
        } else {
            builder_segment(arena, self.segment_id)
        };
        ListReader {
            arena,
            segment,
            segment_id: self.segment_id,
            ptr: self.ptr,
            element_count: self.element_count,
            step: self.step,
            struct_data_size: self.struct_data_size,
            struct_pointer_count: self.struct_pointer_count,
            element_size: self.element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn as_reader(&self) -> ListReader<'_> {
        self.reader_with(self.arena.as_reader())
    }

    pub fn into_reader(self) -> ListReader<'a> {
        let ListBuilder {
            arena,
            segment_id,
            ptr,
            element_count,
            step,
            struct_data_size,
            struct_pointer_count,
            element_size,
        } = self;
        let arena: &'a dyn BuilderArena = arena;
        let arena = arena.as_reader();
        let segment = if element_count == 0 {
            &[][..]
        } else {
            builder_segment(arena, segment_id)
        };
        ListReader {
            arena,
            segment,
            segment_id,
            ptr,
            element_count,
            step,
            struct_data_size,
            struct_pointer_count,
            element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    #[inline]
    pub fn get_struct_element(self, index: ElementCount32) -> StructBuilder<'a> {
        assert!(index < self.element_count, "list index out of bounds");
        let index_byte = (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize;
        let struct_data = self.ptr + index_byte;
        let struct_pointers = (struct_data + self.struct_data_size as usize / BITS_PER_BYTE)
            / BYTES_PER_WORD;
        StructBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            data: struct_data,
            pointers: struct_pointers as u32,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
        }
    }

    #[inline]
    pub fn get_pointer_element(self, index: ElementCount32) -> PointerBuilder<'a> {
        assert!(index < self.element_count, "list index out of bounds");
        let offset = self.ptr
            + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize;
        PointerBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            location: (offset / BYTES_PER_WORD) as u32,
        }
    }

    #[inline]
    fn element_byte_offset(&self, index: ElementCount32) -> usize {
        assert!(index < self.element_count, "list index out of bounds");
        self.ptr + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }
}

/// Elements of a primitive list.
pub trait PrimitiveElement {
    /// Gets the element at position `index`. Bounds checking is *not* performed.
    fn get(list_reader: &ListReader, index: ElementCount32) -> Self;

    /// Gets the element at position `index`. Bounds checking is *not* performed.
    fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self;

    /// Sets to element at position `index` to be `value`. Bounds checking is *not* performed.
    fn set(list_builder: &mut ListBuilder, index: ElementCount32, value: Self);

    /// Returns the size of an individual element.
    fn element_size() -> ElementSize;
}

macro_rules! primitive_element(
    ($typ:ty, $size:expr) => (
        impl PrimitiveElement for $typ {
            #[inline]
            fn get(list_reader: &ListReader, index: ElementCount32) -> Self {
                let offset = list_reader.ptr
                    + (u64::from(index) * u64::from(list_reader.step) / BITS_PER_BYTE as u64)
                        as usize;
                <$typ as Primitive>::get(&list_reader.segment[offset..])
            }

            #[inline]
            fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self {
                let offset = list_builder.element_byte_offset(index);
                let segment = builder_segment(list_builder.arena.as_reader(), list_builder.segment_id);
                <$typ as Primitive>::get(&segment[offset..])
            }

            #[inline]
            fn set(list_builder: &mut ListBuilder, index: ElementCount32, value: Self) {
                let offset = list_builder.element_byte_offset(index);
                let segment = list_builder.arena.get_segment_mut(list_builder.segment_id);
                <$typ as Primitive>::set(&mut segment[offset..], value)
            }

            fn element_size() -> ElementSize {
                $size
            }
        }
    )
);

primitive_element!(u8, Byte);
primitive_element!(i8, Byte);
primitive_element!(u16, TwoBytes);
primitive_element!(i16, TwoBytes);
primitive_element!(u32, FourBytes);
primitive_element!(i32, FourBytes);
primitive_element!(u64, EightBytes);
primitive_element!(i64, EightBytes);
primitive_element!(f32, FourBytes);
primitive_element!(f64, EightBytes);

impl PrimitiveElement for bool {
    #[inline]
    fn get(list: &ListReader, index: ElementCount32) -> Self {
        let bindex = u64::from(index) * u64::from(list.step);
        let b = list.segment[list.ptr + (bindex / BITS_PER_BYTE as u64) as usize];
        ((b >> (bindex % BITS_PER_BYTE as u64)) & 1) != 0
    }

    #[inline]
    fn get_from_builder(list: &ListBuilder, index: ElementCount32) -> Self {
        assert!(index < list.element_count, "list index out of bounds");
        let bindex = u64::from(index) * u64::from(list.step);
        let segment = builder_segment(list.arena.as_reader(), list.segment_id);
        let b = segment[list.ptr + (bindex / BITS_PER_BYTE as u64) as usize];
        ((b >> (bindex % BITS_PER_BYTE as u64)) & 1) != 0
    }

    #[inline]
    fn set(list: &mut ListBuilder, index: ElementCount32, value: Self) {
        assert!(index < list.element_count, "list index out of bounds");
        let bindex = u64::from(index) * u64::from(list.step);
        let bitnum = bindex % BITS_PER_BYTE as u64;
        let offset = list.ptr + (bindex / BITS_PER_BYTE as u64) as usize;
        let b = &mut list.arena.get_segment_mut(list.segment_id)[offset];
        *b = (*b & !(1 << bitnum)) | (u8::from(value) << bitnum)
    }

    fn element_size() -> ElementSize {
        Bit
    }
}

impl PrimitiveElement for () {
    #[inline]
    fn get(_list: &ListReader, _index: ElementCount32) {}

    #[inline]
    fn get_from_builder(_list: &ListBuilder, _index: ElementCount32) {}

    #[inline]
    fn set(_list: &mut ListBuilder, _index: ElementCount32, _value: ()) {}

    fn element_size() -> ElementSize {
        Void
    }
}
