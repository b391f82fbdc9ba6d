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

//! # capnp-layout
//!
//! Zero-copy struct accessors for the [Cap'n Proto](https://capnproto.org) wire format.
//!
//! A struct in a Cap'n Proto message is a fixed-size data section followed by a
//! pointer section. This crate maps logical fields onto byte and bit offsets within
//! those sections and exposes them through `Reader` (immutable) and `Builder`
//! (mutable) views, without ever copying or deserializing the underlying segments.
//!
//! Generated code (see [`schema`]) is a thin layer of named accessors on top of
//! [`private::layout::StructReader`] and [`private::layout::StructBuilder`],
//! configured by a per-type [`private::layout::StructSize`] and per-field
//! descriptors from [`field`].

pub mod any_pointer;
pub mod data;
pub mod field;
pub mod message;
pub mod primitive_list;
pub mod private;
pub mod schema;
pub mod serialize;
pub mod serialize_packed;
pub mod struct_list;
pub mod text;
pub mod traits;

pub use crate::private::layout::StructSize;

/// Eight bytes of memory with opaque interior. Use [`word()`] to construct one.
///
/// This type is used to ensure that the data of a message is properly aligned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Word {
    raw_content: [u8; 8],
}

/// Constructs a word with the given bytes.
#[allow(clippy::too_many_arguments)]
pub const fn word(b0: u8, b1: u8, b2: u8, b3: u8, b4: u8, b5: u8, b6: u8, b7: u8) -> Word {
    Word {
        raw_content: [b0, b1, b2, b3, b4, b5, b6, b7],
    }
}

impl Word {
    pub fn words_to_bytes(words: &[Word]) -> &[u8] {
        // Word is repr(C) over [u8; 8], so a slice of words is a valid slice of bytes.
        unsafe { core::slice::from_raw_parts(words.as_ptr() as *const u8, words.len() * 8) }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Word {
    fn arbitrary(g: &mut quickcheck::Gen) -> Word {
        crate::word(
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
            quickcheck::Arbitrary::arbitrary(g),
        )
    }
}

/// Size of a message. Every generated struct has a method `.total_size()` that returns this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MessageSize {
    pub word_count: u64,

    /// Size of the capability table.
    pub cap_count: u32,
}

impl MessageSize {
    pub fn plus_eq(&mut self, other: MessageSize) {
        self.word_count += other.word_count;
        self.cap_count += other.cap_count;
    }
}

/// An enum value or union discriminant that was not found among those defined in a schema.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct NotInSchema(pub u16);

impl ::core::fmt::Display for NotInSchema {
    fn fmt(&self, fmt: &mut ::core::fmt::Formatter) -> ::core::result::Result<(), ::core::fmt::Error> {
        write!(
            fmt,
            "Enum value or union discriminant {} was not present in the schema.",
            self.0
        )
    }
}

impl ::std::error::Error for NotInSchema {}

/// Because messages are lazily validated, the return type of any method that reads a pointer field
/// must be wrapped in a Result.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone)]
pub struct Error {
    /// The general kind of the error.
    pub kind: ErrorKind,

    /// Extra context about error.
    pub extra: String,
}

/// The general nature of an error. The purpose of this enum is not to describe the error itself,
/// but rather to describe how the client might want to respond to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong
    #[error("Failed")]
    Failed,

    #[error("Message contains text that is not NUL-terminated")]
    MessageContainsTextThatIsNotNULTerminated,

    #[error("Text contains non-utf8 data")]
    TextContainsNonUtf8Data,

    #[error("Message contains out-of-bounds pointer")]
    MessageContainsOutOfBoundsPointer,

    #[error("Message contains non-struct pointer where struct pointer was expected.")]
    MessageContainsNonStructPointerWhereStructPointerWasExpected,

    #[error("Message contains non-list pointer where list pointer was expected")]
    MessageContainsNonListPointerWhereListPointerWasExpected,

    #[error("Message contains non-list pointer where text was expected.")]
    MessageContainsNonListPointerWhereTextWasExpected,

    #[error("Message contains non-list pointer where data was expected.")]
    MessageContainsNonListPointerWhereDataWasExpected,

    #[error("Message contains list pointer of non-bytes where text was expected.")]
    MessageContainsListPointerOfNonBytesWhereTextWasExpected,

    #[error("Message contains list pointer of non-bytes where data was expected.")]
    MessageContainsListPointerOfNonBytesWhereDataWasExpected,

    #[error("Message contains list with incompatible element type.")]
    MessageContainsListWithIncompatibleElementType,

    #[error("Message is too deeply-nested or contains cycles. See ReaderOptions.")]
    MessageIsTooDeeplyNested,

    #[error("Read limit exceeded")]
    ReadLimitExceeded,

    #[error("Invalid segment id {0}")]
    InvalidSegmentId(u32),

    #[error("Malformed double-far pointer.")]
    MalformedDoubleFarPointer,

    #[error("Capability pointers are not supported by this runtime.")]
    UnsupportedCapabilityPointer,

    #[error("Unknown pointer type.")]
    UnknownPointerType,

    #[error("InlineComposite lists of non-STRUCT type are not supported.")]
    InlineCompositeListsOfNonStructTypeAreNotSupported,

    #[error("InlineComposite list's elements overrun its word count.")]
    InlineCompositeListsElementsOverrunItsWordCount,

    #[error("Found bit list where struct list was expected; upgrading boolean lists to structs is not supported.")]
    FoundBitListWhereStructListWasExpected,

    #[error("Found struct list where bit list was expected.")]
    FoundStructListWhereBitListWasExpected,

    #[error("Expected a primitive list, but got a list of pointer-only structs")]
    ExpectedAPrimitiveListButGotAListOfPointerOnlyStructs,

    #[error("Expected a pointer list, but got a list of data-only structs")]
    ExpectedAPointerListButGotAListOfDataOnlyStructs,

    #[error("Existing list value is incompatible with expected type.")]
    ExistingListValueIsIncompatibleWithExpectedType,

    #[error("Existing pointer is not a list.")]
    ExistingPointerIsNotAList,

    #[error("Existing list pointer is not byte-sized.")]
    ExistingListPointerIsNotByteSized,

    #[error("Message ends prematurely. Header claimed {0} words, but message only has {1} words.")]
    MessageEndsPrematurely(usize, usize),

    #[error("Message has too many segments.")]
    TooManySegments,

    #[error("Message has too few segments.")]
    TooFewSegments,

    #[error("Message is too large. To increase the limit on the receiving end, see ReaderOptions.")]
    MessageTooLarge,

    #[error("Premature end of file")]
    PrematureEndOfFile,

    #[error("Premature end of packed input.")]
    PrematureEndOfPackedInput,

    #[error("Packed input did not end cleanly on a segment boundary.")]
    PackedInputDidNotEndCleanlyOnASegmentBoundary,
}

impl Error {
    /// Wraps a formatted message in an error of kind `Failed`.
    pub fn failed(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Failed,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            extra: String::new(),
            kind,
        }
    }

    /// Attaches extra context to an error.
    pub fn extend_with(mut self, context: &str) -> Self {
        if self.extra.is_empty() {
            self.extra.push_str(context);
        } else {
            self.extra.push_str("; ");
            self.extra.push_str(context);
        }
        self
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        if self.extra.is_empty() {
            write!(fmt, "{}", self.kind)
        } else {
            write!(fmt, "{}: {}", self.kind, self.extra)
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io;
        // Errors raised inside our own `Read` adapters travel through `io::Error` unchanged.
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<Error>()) {
            return inner.clone();
        }
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof => ErrorKind::PrematureEndOfFile,
            _ => ErrorKind::Failed,
        };
        Self {
            kind,
            extra: format!("{err}"),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err)
    }
}

impl From<NotInSchema> for Error {
    fn from(e: NotInSchema) -> Self {
        Self::failed(format!("Enum value or union discriminant {} was not present in schema.", e.0))
    }
}

impl From<core::str::Utf8Error> for Error {
    fn from(err: core::str::Utf8Error) -> Self {
        Self {
            kind: ErrorKind::TextContainsNonUtf8Data,
            extra: format!("{err}"),
        }
    }
}

/// Helper type for `message::Builder::get_segments_for_output()`.
pub type OutputSegments<'a> = Vec<&'a [u8]>;
