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

//! Fixed little-endian encoding of the primitive values that can live in a data section.

use byteorder::{ByteOrder, LittleEndian};

/// A value with a fixed-width little-endian wire representation.
///
/// Encoding never depends on host byte order, so segments stay portable across
/// processes and machines.
pub trait Primitive: Copy {
    /// Number of bytes the value occupies on the wire.
    const WIDTH: usize;

    /// Reads the value from the first `WIDTH` bytes of `raw`.
    fn get(raw: &[u8]) -> Self;

    /// Writes the value into the first `WIDTH` bytes of `raw`.
    fn set(raw: &mut [u8], value: Self);

    fn zero() -> Self;
}

impl Primitive for u8 {
    const WIDTH: usize = 1;
    #[inline]
    fn get(raw: &[u8]) -> Self {
        raw[0]
    }
    #[inline]
    fn set(raw: &mut [u8], value: Self) {
        raw[0] = value;
    }
    #[inline]
    fn zero() -> Self {
        0
    }
}

impl Primitive for i8 {
    const WIDTH: usize = 1;
    #[inline]
    fn get(raw: &[u8]) -> Self {
        raw[0] as i8
    }
    #[inline]
    fn set(raw: &mut [u8], value: Self) {
        raw[0] = value as u8;
    }
    #[inline]
    fn zero() -> Self {
        0
    }
}

macro_rules! primitive_impl(
    ($typ:ty, $n:expr, $read:ident, $write:ident, $zero:expr) => (
        impl Primitive for $typ {
            const WIDTH: usize = $n;

            #[inline]
            fn get(raw: &[u8]) -> Self {
                <LittleEndian as ByteOrder>::$read(&raw[..$n])
            }

            #[inline]
            fn set(raw: &mut [u8], value: Self) {
                <LittleEndian as ByteOrder>::$write(&mut raw[..$n], value)
            }

            #[inline]
            fn zero() -> Self {
                $zero
            }
        }
    );
);

primitive_impl!(u16, 2, read_u16, write_u16, 0);
primitive_impl!(i16, 2, read_i16, write_i16, 0);
primitive_impl!(u32, 4, read_u32, write_u32, 0);
primitive_impl!(i32, 4, read_i32, write_i32, 0);
primitive_impl!(u64, 8, read_u64, write_u64, 0);
primitive_impl!(i64, 8, read_i64, write_i64, 0);
primitive_impl!(f32, 4, read_f32, write_f32, 0.0);
primitive_impl!(f64, 8, read_f64, write_f64, 0.0);

/// Reads an unsigned integer of `width` bytes (1, 2, 4 or 8), zero-extended to 64 bits.
pub fn read_uint(raw: &[u8], width: usize) -> u64 {
    match width {
        1 => u64::from(raw[0]),
        2 | 4 | 8 => <LittleEndian as ByteOrder>::read_uint(raw, width),
        _ => panic!("unsupported integer width: {width}"),
    }
}

/// Writes the low `width` bytes of `value`. Panics if `value` does not fit.
pub fn write_uint(raw: &mut [u8], width: usize, value: u64) {
    match width {
        1 | 2 | 4 | 8 => {
            assert!(
                width == 8 || value >> (width * 8) == 0,
                "value {value:#x} does not fit in {width} bytes"
            );
            <LittleEndian as ByteOrder>::write_uint(raw, value, width)
        }
        _ => panic!("unsupported integer width: {width}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_regardless_of_host() {
        let mut buf = [0u8; 8];
        u32::set(&mut buf, 0x0403_0201);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(u16::get(&buf[1..]), 0x0302);

        i16::set(&mut buf, -2);
        assert_eq!(&buf[..2], &[0xfe, 0xff]);

        f64::set(&mut buf, 1.5);
        assert_eq!(f64::get(&buf), 1.5);
    }

    #[test]
    fn uint_widths() {
        let mut buf = [0xffu8; 8];
        write_uint(&mut buf, 2, 0xabcd);
        assert_eq!(&buf, &[0xcd, 0xab, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(read_uint(&buf, 2), 0xabcd);
        assert_eq!(read_uint(&buf, 1), 0xcd);
        write_uint(&mut buf, 8, u64::MAX);
        assert_eq!(read_uint(&buf, 8), u64::MAX);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn uint_out_of_range() {
        let mut buf = [0u8; 8];
        write_uint(&mut buf, 1, 0x100);
    }

    #[test]
    #[should_panic(expected = "unsupported integer width")]
    fn uint_bad_width() {
        let buf = [0u8; 8];
        read_uint(&buf, 3);
    }
}
