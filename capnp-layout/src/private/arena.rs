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

use log::debug;

use crate::message;
use crate::message::{Allocator, ReaderSegments};
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::{Error, ErrorKind, OutputSegments, Result};

pub type SegmentId = u32;

pub trait ReaderArena {
    /// Returns the bytes of the segment with index `id`.
    fn get_segment(&self, id: u32) -> Result<&[u8]>;

    /// Checks that the words `[start, start + size_in_words)` lie within segment `id`, and
    /// charges them against the traversal limit.
    fn contains_interval(&self, id: u32, start: i64, size_in_words: usize) -> Result<()>;

    fn amplified_read(&self, virtual_amount: u64) -> Result<()>;

    fn nesting_limit(&self) -> i32;
}

fn check_interval(segment: &[u8], start: i64, size_in_words: usize) -> Result<()> {
    let segment_words = (segment.len() / BYTES_PER_WORD) as i64;
    if start < 0 || start + size_in_words as i64 > segment_words {
        Err(Error::from_kind(
            ErrorKind::MessageContainsOutOfBoundsPointer,
        ))
    } else {
        Ok(())
    }
}

pub struct ReaderArenaImpl<S> {
    segments: S,
    read_limiter: ReadLimiter,
    nesting_limit: i32,
}

impl<S> ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: message::ReaderOptions) -> Self {
        let limiter = ReadLimiter::new(options.traversal_limit_in_words);
        Self {
            segments,
            read_limiter: limiter,
            nesting_limit: options.nesting_limit,
        }
    }

    pub fn into_segments(self) -> S {
        self.segments
    }

    pub fn segments(&self) -> &S {
        &self.segments
    }
}

impl<S> ReaderArena for ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    fn get_segment(&self, id: u32) -> Result<&[u8]> {
        match self.segments.get_segment(id) {
            Some(seg) => {
                if seg.len() % BYTES_PER_WORD != 0 {
                    return Err(Error::failed(format!(
                        "segment {id} has length {} which is not a whole number of words",
                        seg.len()
                    )));
                }
                Ok(seg)
            }
            None => Err(Error::from_kind(ErrorKind::InvalidSegmentId(id))),
        }
    }

    fn contains_interval(&self, id: u32, start: i64, size_in_words: usize) -> Result<()> {
        check_interval(self.get_segment(id)?, start, size_in_words)?;
        self.read_limiter.can_read(size_in_words)
    }

    fn amplified_read(&self, virtual_amount: u64) -> Result<()> {
        self.read_limiter.can_read(virtual_amount as usize)
    }

    fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }
}

pub trait BuilderArena: ReaderArena {
    /// Allocates `amount` words in segment `segment_id`, returning the word offset of the
    /// allocation, or `None` if the segment does not have room.
    fn allocate(&mut self, segment_id: u32, amount: WordCount32) -> Option<u32>;

    /// Allocates `amount` words in whichever segment has room, creating a new segment if needed.
    fn allocate_anywhere(&mut self, amount: u32) -> (SegmentId, u32);

    /// The allocated words of segment `id`. Panics on a bad id, which would be an internal bug.
    fn get_segment_mut(&mut self, id: u32) -> &mut [u8];

    fn as_reader(&self) -> &dyn ReaderArena;
}

/// A memory segment used in building a message.
struct BuilderSegment {
    /// Zeroed storage of `capacity` words.
    data: Vec<u8>,

    /// Total number of words the segment can hold.
    capacity: u32,

    /// Number of words already used in the segment.
    allocated: u32,
}

pub struct BuilderArenaImpl<A>
where
    A: Allocator,
{
    allocator: A,
    segments: Vec<BuilderSegment>,
}

impl<A> BuilderArenaImpl<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            segments: Vec::new(),
        }
    }

    /// Allocates a new segment with capacity for at least `minimum_size` words.
    pub fn allocate_segment(&mut self, minimum_size: u32) -> Result<()> {
        let data = self.allocator.allocate_segment(minimum_size);
        if data.len() % BYTES_PER_WORD != 0 || data.len() < minimum_size as usize * BYTES_PER_WORD
        {
            return Err(Error::failed(format!(
                "allocator returned {} bytes for a request of {minimum_size} words",
                data.len()
            )));
        }
        let capacity = (data.len() / BYTES_PER_WORD) as u32;
        debug!(
            "allocated segment {} with capacity {capacity} words",
            self.segments.len()
        );
        self.segments.push(BuilderSegment {
            data,
            capacity,
            allocated: 0,
        });
        Ok(())
    }

    pub fn get_segments_for_output(&self) -> OutputSegments<'_> {
        self.segments
            .iter()
            .map(|seg| &seg.data[..seg.allocated as usize * BYTES_PER_WORD])
            .collect()
    }

    /// Consumes the arena, returning each segment truncated to its allocated words.
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
            .into_iter()
            .map(|mut seg| {
                seg.data.truncate(seg.allocated as usize * BYTES_PER_WORD);
                seg.data
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl<A> ReaderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn get_segment(&self, id: u32) -> Result<&[u8]> {
        match self.segments.get(id as usize) {
            Some(seg) => Ok(&seg.data[..seg.allocated as usize * BYTES_PER_WORD]),
            None => Err(Error::from_kind(ErrorKind::InvalidSegmentId(id))),
        }
    }

    fn contains_interval(&self, id: u32, start: i64, size_in_words: usize) -> Result<()> {
        check_interval(self.get_segment(id)?, start, size_in_words)
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }
}

impl<A> BuilderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn allocate(&mut self, segment_id: u32, amount: WordCount32) -> Option<u32> {
        let seg = &mut self.segments[segment_id as usize];
        if amount > seg.capacity - seg.allocated {
            None
        } else {
            let result = seg.allocated;
            seg.allocated += amount;
            Some(result)
        }
    }

    fn allocate_anywhere(&mut self, amount: u32) -> (SegmentId, u32) {
        // first try the existing segments, then try allocating a new segment.
        let allocated_len = self.segments.len() as u32;
        for segment_id in 0..allocated_len {
            if let Some(idx) = self.allocate(segment_id, amount) {
                return (segment_id, idx);
            }
        }

        // Need to allocate a new segment.
        if let Err(e) = self.allocate_segment(amount) {
            panic!("failed to allocate a new segment: {e}");
        }
        match self.allocate(allocated_len, amount) {
            Some(idx) => (allocated_len, idx),
            None => unreachable!("new segment is large enough for the requested allocation"),
        }
    }

    fn get_segment_mut(&mut self, id: u32) -> &mut [u8] {
        let seg = &mut self.segments[id as usize];
        &mut seg.data[..seg.allocated as usize * BYTES_PER_WORD]
    }

    fn as_reader(&self) -> &dyn ReaderArena {
        self
    }
}

/// Arena backing the default, message-less readers. It holds no segments.
pub struct NullArena;

impl ReaderArena for NullArena {
    fn get_segment(&self, id: u32) -> Result<&[u8]> {
        Err(Error::from_kind(ErrorKind::InvalidSegmentId(id)))
    }

    fn contains_interval(&self, _id: u32, _start: i64, _size: usize) -> Result<()> {
        Err(Error::from_kind(
            ErrorKind::MessageContainsOutOfBoundsPointer,
        ))
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }
}
