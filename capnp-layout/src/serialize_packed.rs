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
//! [packed stream encoding](https://capnproto.org/encoding.html#packing).
//!
//! Each word is preceded by a tag byte whose bits mark the nonzero bytes that follow. A tag of
//! `0x00` is followed by a count of further all-zero words, and a tag of `0xff` by a count of
//! words copied through verbatim.

use std::io::{self, BufRead, Read, Write};

use crate::message;
use crate::private::units::BYTES_PER_WORD;
use crate::serialize;
use crate::{Error, ErrorKind, Result};

/// A `Read` wrapper that unpacks packed data. Returns an error on any `read()`
/// call that would end within an all-zero (tag 0x00) or uncompressed (tag 0xff)
/// run of words. Calls that come from `serialize_packed::read_message()` always
/// mirror `write_all()` calls from `serialize_packed::write_message()`, so they
/// always span such runs.
struct PackedRead<R>
where
    R: BufRead,
{
    inner: R,
}

impl<R> PackedRead<R>
where
    R: BufRead,
{
    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.inner.fill_buf()?.first().copied();
        if byte.is_some() {
            self.inner.consume(1);
        }
        Ok(byte)
    }

    fn require_byte(&mut self) -> Result<u8> {
        self.next_byte()?
            .ok_or_else(|| Error::from_kind(ErrorKind::PrematureEndOfPackedInput))
    }

    fn unpack(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        assert!(
            out.len() % BYTES_PER_WORD == 0,
            "PackedRead reads must be word-aligned."
        );

        let mut pos = 0;
        while pos < out.len() {
            let tag = match self.next_byte()? {
                Some(tag) => tag,
                None if pos == 0 => return Ok(0),
                None => return Err(Error::from_kind(ErrorKind::PrematureEndOfPackedInput)),
            };

            for (bit, byte) in out[pos..pos + BYTES_PER_WORD].iter_mut().enumerate() {
                *byte = if tag & (1u8 << bit) != 0 {
                    self.require_byte()?
                } else {
                    0
                };
            }
            pos += BYTES_PER_WORD;

            if tag == 0 || tag == 0xff {
                let run_length = self.require_byte()? as usize * BYTES_PER_WORD;
                if run_length > out.len() - pos {
                    return Err(Error::from_kind(
                        ErrorKind::PackedInputDidNotEndCleanlyOnASegmentBoundary,
                    ));
                }
                let run = &mut out[pos..pos + run_length];
                if tag == 0 {
                    run.fill(0);
                } else {
                    self.inner.read_exact(run).map_err(|e| {
                        if e.kind() == io::ErrorKind::UnexpectedEof {
                            Error::from_kind(ErrorKind::PrematureEndOfPackedInput)
                        } else {
                            Error::from(e)
                        }
                    })?;
                }
                pos += run_length;
            }
        }
        Ok(out.len())
    }
}

impl<R> Read for PackedRead<R>
where
    R: BufRead,
{
    fn read(&mut self, out_buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.unpack(out_buf)?)
    }
}

/// Reads a packed message from a stream using the provided options.
pub fn read_message<R>(
    read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<serialize::OwnedSegments>>
where
    R: BufRead,
{
    let packed_read = PackedRead { inner: read };
    serialize::read_message(packed_read, options)
}

struct PackedWrite<W>
where
    W: Write,
{
    inner: W,
}

/// Appends the packed form of `words` to `out`.
fn pack(words: &[u8], out: &mut Vec<u8>) {
    assert!(
        words.len() % BYTES_PER_WORD == 0,
        "PackedWrite writes must be word-aligned."
    );

    let mut rest = words;
    while let Some((word, tail)) = rest.split_first_chunk::<BYTES_PER_WORD>() {
        rest = tail;

        let tag_pos = out.len();
        out.push(0);
        let mut tag = 0u8;
        for (bit, &byte) in word.iter().enumerate() {
            if byte != 0 {
                tag |= 1 << bit;
                out.push(byte);
            }
        }
        out[tag_pos] = tag;

        if tag == 0 {
            // An all-zero word is followed by a count of consecutive zero words
            // (not including the first one).
            let run = rest
                .chunks_exact(BYTES_PER_WORD)
                .take(255)
                .take_while(|w| w.iter().all(|&b| b == 0))
                .count();
            out.push(run as u8);
            rest = &rest[run * BYTES_PER_WORD..];
        } else if tag == 0xff {
            // An all-nonzero word is followed by a count of consecutive uncompressed words,
            // followed by the uncompressed words themselves. The run stops at the first word
            // with two or more zero bytes, where packing becomes a net win again.
            let run = rest
                .chunks_exact(BYTES_PER_WORD)
                .take(255)
                .take_while(|w| w.iter().filter(|&&b| b == 0).count() < 2)
                .count();
            out.push(run as u8);
            out.extend_from_slice(&rest[..run * BYTES_PER_WORD]);
            rest = &rest[run * BYTES_PER_WORD..];
        }
    }
}

impl<W> Write for PackedWrite<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf)?;
        Ok(buf.len())
    }

    fn write_all(&mut self, in_buf: &[u8]) -> io::Result<()> {
        let mut packed = Vec::with_capacity(in_buf.len() + in_buf.len() / BYTES_PER_WORD + 2);
        pack(in_buf, &mut packed);
        self.inner.write_all(&packed)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes a packed message to a stream.
///
/// The only source of errors from this function are `write.write_all()` calls. If you pass in
/// a writer that never returns an error, then this function will never return an error.
pub fn write_message<W, A>(write: W, message: &message::Builder<A>) -> io::Result<()>
where
    W: Write,
    A: message::Allocator,
{
    let packed_write = PackedWrite { inner: write };
    serialize::write_message(packed_write, message)
}

pub fn write_message_segments<W, R>(write: W, segments: &R) -> io::Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    let packed_write = PackedWrite { inner: write };
    serialize::write_message_segments(packed_write, segments)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use quickcheck::{quickcheck, TestResult};

    use super::{read_message, write_message_segments, PackedRead, PackedWrite};
    use crate::message::{ReaderOptions, ReaderSegments};
    use crate::serialize::test::as_byte_segments;
    use crate::{Error, ErrorKind, Word};

    fn unpack_error(packed: &[u8], out_len: usize) -> ErrorKind {
        let mut packed_read = PackedRead { inner: packed };
        let mut bytes: Vec<u8> = vec![0; out_len];
        match packed_read.read_exact(&mut bytes[..]) {
            Ok(()) => panic!("should have been an error"),
            Err(e) => Error::from(e).kind,
        }
    }

    #[test]
    fn premature_eof() {
        let input_bytes: &[u8] = &[];
        let mut packed_read = PackedRead { inner: input_bytes };

        let mut output_bytes: Vec<u8> = vec![0; 8];
        assert!(packed_read.read_exact(&mut output_bytes[..]).is_err());
    }

    fn check_unpacks_to(packed: &[u8], unpacked: &[u8]) {
        let mut packed_read = PackedRead { inner: packed };

        let mut bytes: Vec<u8> = vec![0; unpacked.len()];
        packed_read.read_exact(&mut bytes[..]).unwrap();

        assert!(packed_read.inner.is_empty()); // nothing left to read
        assert_eq!(bytes, unpacked);
    }

    fn check_packing(unpacked: &[u8], packed: &[u8]) {
        let mut bytes: Vec<u8> = Vec::new();
        PackedWrite { inner: &mut bytes }
            .write_all(unpacked)
            .unwrap();
        assert_eq!(bytes, packed);

        check_unpacks_to(packed, unpacked);
    }

    #[test]
    fn simple_packing() {
        check_packing(&[], &[]);
        check_packing(&[0; 8], &[0, 0]);
        check_packing(&[0, 0, 12, 0, 0, 34, 0, 0], &[0x24, 12, 34]);
        check_packing(
            &[1, 3, 2, 4, 5, 7, 6, 8],
            &[0xff, 1, 3, 2, 4, 5, 7, 6, 8, 0],
        );
        check_packing(
            &[0, 0, 0, 0, 0, 0, 0, 0, 1, 3, 2, 4, 5, 7, 6, 8],
            &[0, 0, 0xff, 1, 3, 2, 4, 5, 7, 6, 8, 0],
        );
        check_packing(
            &[1, 3, 2, 4, 5, 7, 6, 8, 8, 6, 7, 4, 5, 2, 3, 1],
            &[0xff, 1, 3, 2, 4, 5, 7, 6, 8, 1, 8, 6, 7, 4, 5, 2, 3, 1],
        );
        check_packing(
            &[
                8, 0, 100, 6, 0, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 0, 0, 0, 0, 1, 0, 2, 0, 3, 1,
            ],
            &[0xed, 8, 100, 6, 1, 1, 2, 0, 2, 0xd4, 1, 2, 3, 1],
        );
        check_packing(&[0; 16], &[0, 1]);
        check_packing(&[0; 24], &[0, 2]);
    }

    #[test]
    fn literal_run_stops_at_word_with_two_zeros() {
        check_packing(
            &[
                1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4, 5, 6, 7, 8, 0, 2, 4, 0, 9, 0, 5, 1,
            ],
            &[
                0xff, 1, 2, 3, 4, 5, 6, 7, 8, 1, 1, 2, 3, 4, 5, 6, 7, 8, 0xd6, 2, 4, 9, 5, 1,
            ],
        );
    }

    #[test]
    fn zero_run_is_capped_at_255_words() {
        let unpacked = vec![0u8; 257 * 8];
        check_packing(&unpacked, &[0, 255, 0, 0]);
    }

    #[test]
    fn did_not_end_cleanly_on_a_segment_boundary() {
        assert_eq!(
            unpack_error(&[0xff, 1, 2, 3, 4, 5, 6, 7, 8, 37, 1, 2], 200),
            ErrorKind::PackedInputDidNotEndCleanlyOnASegmentBoundary
        );
    }

    #[test]
    fn premature_end_of_packed_input() {
        for packed in [
            &[0xf0, 1, 2][..],
            &[0][..],
            &[0xff, 1, 2, 3, 4, 5, 6, 7, 8][..],
            &[0xff, 1, 2, 3, 4, 5, 6, 7, 8, 2, 1][..],
            // The unpacked data does not fill up the given output buffer.
            &[1, 1][..],
        ] {
            assert_eq!(
                unpack_error(packed, 200),
                ErrorKind::PrematureEndOfPackedInput
            );
        }
    }

    #[test]
    fn packed_segment_table() {
        let packed_buf = &[0x11, 4, 1, 0, 1, 0, 0];

        check_unpacks_to(
            packed_buf,
            &[
                4, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 0,
            ],
        );

        let message = read_message(&mut &packed_buf[..], ReaderOptions::new()).unwrap();
        let segments = message.into_segments();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments.get_segment(0), Some(&[0u8; 8][..]));
    }

    #[test]
    fn check_round_trip() {
        fn round_trip(segments: Vec<Vec<Word>>) -> TestResult {
            if segments.is_empty() || segments.len() >= 512 {
                return TestResult::discard();
            }
            let borrowed = as_byte_segments(&segments);
            let mut buf: Vec<u8> = Vec::new();
            write_message_segments(&mut buf, &borrowed[..]).unwrap();

            let message = read_message(&mut &buf[..], ReaderOptions::new()).unwrap();
            let result_segments = message.into_segments();

            TestResult::from_bool(borrowed.iter().enumerate().all(|(i, segment)| {
                Some(*segment) == result_segments.get_segment(i as u32)
            }))
        }

        quickcheck(round_trip as fn(Vec<Vec<Word>>) -> TestResult);
    }

    #[test]
    fn unpacking_arbitrary_input_never_panics() {
        fn unpack(packed: Vec<u8>) -> TestResult {
            let len = packed.len();
            let mut packed_read = PackedRead { inner: &packed[..] };
            let mut out_buffer: Vec<u8> = vec![0; len * 8];
            let _ = packed_read.read_exact(&mut out_buffer);
            TestResult::from_bool(true)
        }

        quickcheck(unpack as fn(Vec<u8>) -> TestResult);
    }
}
