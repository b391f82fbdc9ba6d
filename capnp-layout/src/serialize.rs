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

//! Reading and writing of messages using the
//! [standard stream framing](https://capnproto.org/encoding.html#serialization-over-a-stream).

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::message;
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, Result};

/// Segment tables longer than this are rejected.
pub const SEGMENTS_COUNT_LIMIT: usize = 512;

/// Segments read from a single flat slice of bytes. Offsets are in words.
pub struct SliceSegments<'a> {
    bytes: &'a [u8],
    segment_slices: Vec<(usize, usize)>,
}

impl<'a> message::ReaderSegments for SliceSegments<'a> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segment_slices
            .get(id as usize)
            .map(|&(a, b)| &self.bytes[a * BYTES_PER_WORD..b * BYTES_PER_WORD])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a serialized message from the front of `slice`, without copying, and advances
/// `slice` past it.
pub fn read_message_from_flat_slice<'a>(
    slice: &mut &'a [u8],
    options: message::ReaderOptions,
) -> Result<message::Reader<SliceSegments<'a>>> {
    let all_bytes = *slice;
    let mut bytes = *slice;
    let (total_words, segment_slices) = read_segment_table(&mut bytes, options)?;
    let available_words = bytes.len() / BYTES_PER_WORD;
    if total_words > available_words {
        return Err(Error::from_kind(ErrorKind::MessageEndsPrematurely(
            total_words,
            available_words,
        )));
    }
    let header_len = all_bytes.len() - bytes.len();
    let (message_bytes, rest) = bytes.split_at(total_words * BYTES_PER_WORD);
    *slice = rest;
    debug_assert_eq!(header_len % BYTES_PER_WORD, 0);
    Ok(message::Reader::new(
        SliceSegments {
            bytes: message_bytes,
            segment_slices,
        },
        options,
    ))
}

/// Segments read into a single owned buffer. Offsets are in words.
pub struct OwnedSegments {
    segment_slices: Vec<(usize, usize)>,
    owned_space: Vec<u8>,
}

impl message::ReaderSegments for OwnedSegments {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segment_slices
            .get(id as usize)
            .map(|&(a, b)| &self.owned_space[a * BYTES_PER_WORD..b * BYTES_PER_WORD])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a serialized message from a stream with the provided options.
///
/// For optimal performance, `read` should be a buffered reader type.
pub fn read_message<R>(
    mut read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<OwnedSegments>>
where
    R: Read,
{
    let (total_words, segment_slices) = read_segment_table(&mut read, options)?;
    let mut owned_space = vec![0u8; total_words * BYTES_PER_WORD];
    read.read_exact(&mut owned_space)?;
    Ok(message::Reader::new(
        OwnedSegments {
            segment_slices,
            owned_space,
        },
        options,
    ))
}

/// Reads a segment table from `read` and returns the total number of words across all
/// segments, as well as the segment offsets.
///
/// The segment table format for streams is defined in the Cap'n Proto
/// [encoding docs](https://capnproto.org/encoding.html)
pub(crate) fn read_segment_table<R>(
    read: &mut R,
    options: message::ReaderOptions,
) -> Result<(usize, Vec<(usize, usize)>)>
where
    R: Read,
{
    let mut buf: [u8; 8] = [0; 8];

    // The first word holds the segment count (minus one) and the first segment's length.
    read.read_exact(&mut buf)?;
    let segment_count = <LittleEndian as ByteOrder>::read_u32(&buf[0..4]).wrapping_add(1) as usize;

    if segment_count >= SEGMENTS_COUNT_LIMIT {
        return Err(Error::from_kind(ErrorKind::TooManySegments)
            .extend_with(&format!("{segment_count} segments")));
    } else if segment_count == 0 {
        return Err(Error::from_kind(ErrorKind::TooFewSegments));
    }

    let mut segment_slices = Vec::with_capacity(segment_count);
    let mut total_words = <LittleEndian as ByteOrder>::read_u32(&buf[4..8]) as usize;
    segment_slices.push((0, total_words));

    // The remaining lengths, padded to a whole word.
    let mut segment_sizes = vec![0u8; (segment_count & !1) * 4];
    read.read_exact(&mut segment_sizes)?;
    for size in segment_sizes.chunks_exact(4).take(segment_count - 1) {
        let segment_len = <LittleEndian as ByteOrder>::read_u32(size) as usize;
        segment_slices.push((total_words, total_words + segment_len));
        total_words += segment_len;
    }

    // Don't accept a message which the receiver couldn't possibly traverse without hitting the
    // traversal limit. Without this check, a malicious client could transmit a very large segment
    // size to make the receiver allocate excessive space and possibly crash.
    if total_words as u64 > options.traversal_limit_in_words {
        return Err(Error::from_kind(ErrorKind::MessageTooLarge)
            .extend_with(&format!("{total_words} words")));
    }

    Ok((total_words, segment_slices))
}

/// Constructs a flat byte vector containing the entire message.
pub fn write_message_to_words<A>(message: &message::Builder<A>) -> Vec<u8>
where
    A: message::Allocator,
{
    flatten_segments(&*message.get_segments_for_output())
}

pub fn write_message_segments_to_words<R>(message: &R) -> Vec<u8>
where
    R: message::ReaderSegments + ?Sized,
{
    flatten_segments(message)
}

fn flatten_segments<R: message::ReaderSegments + ?Sized>(segments: &R) -> Vec<u8> {
    let word_count = compute_serialized_size(segments);
    let mut result = Vec::with_capacity(word_count * BYTES_PER_WORD);
    // Writing into a Vec cannot fail.
    let _ = write_message_segments(&mut result, segments);
    result
}

/// Writes the provided message to `write`.
///
/// For optimal performance, `write` should be a buffered writer. `flush` will not be called on
/// the writer.
pub fn write_message<W, A>(write: W, message: &message::Builder<A>) -> ::std::io::Result<()>
where
    W: Write,
    A: message::Allocator,
{
    let segments = message.get_segments_for_output();
    write_message_segments(write, &*segments)
}

pub fn write_message_segments<W, R>(mut write: W, segments: &R) -> ::std::io::Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    write_segment_table(&mut write, segments)?;
    write_segments(&mut write, segments)
}

/// Writes a segment table to `write`.
///
/// `segments` must contain at least one segment. The first word and the remaining lengths are
/// written separately, mirroring how [`read_segment_table`] consumes them.
fn write_segment_table<W, R>(write: &mut W, segments: &R) -> ::std::io::Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    let segment_count = segments.len();
    let segment_words = |id: usize| -> u32 {
        segments
            .get_segment(id as u32)
            .map_or(0, |segment| (segment.len() / BYTES_PER_WORD) as u32)
    };

    let mut first: [u8; 8] = [0; 8];
    <LittleEndian as ByteOrder>::write_u32(&mut first[0..4], segment_count as u32 - 1);
    <LittleEndian as ByteOrder>::write_u32(&mut first[4..8], segment_words(0));
    write.write_all(&first)?;

    if segment_count > 1 {
        // Padded to a whole word when the number of remaining lengths is odd.
        let mut rest = vec![0u8; (segment_count & !1) * 4];
        for idx in 1..segment_count {
            let start = (idx - 1) * 4;
            <LittleEndian as ByteOrder>::write_u32(&mut rest[start..start + 4], segment_words(idx));
        }
        write.write_all(&rest)?;
    }
    Ok(())
}

/// Writes segments to `write`.
fn write_segments<W, R>(write: &mut W, segments: &R) -> ::std::io::Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    let mut i = 0;
    while let Some(segment) = segments.get_segment(i) {
        write.write_all(segment)?;
        i += 1;
    }
    Ok(())
}

fn compute_serialized_size<R: message::ReaderSegments + ?Sized>(segments: &R) -> usize {
    // Table size
    let len = segments.len();
    let mut size = (len / 2) + 1;
    for i in 0..len {
        if let Some(segment) = segments.get_segment(i as u32) {
            size += segment.len() / BYTES_PER_WORD;
        }
    }
    size
}

/// Returns the number of words required to serialize the message.
pub fn compute_serialized_size_in_words<A>(message: &message::Builder<A>) -> usize
where
    A: message::Allocator,
{
    compute_serialized_size(&*message.get_segments_for_output())
}
