// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors over OpenFlow wire buffers.
//!
//! OpenFlow 1.3 is big-endian end to end, so every primitive accessor here
//! goes through `to_be_bytes`/`from_be_bytes` rather than the native-endian
//! defaults.

use crate::error::{WireError, WireResult};

/// Generates a bounds-checked big-endian write method for a primitive type.
macro_rules! impl_write_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> WireResult<()> {
            if self.offset + $size > self.buffer.len() {
                return Err(WireError::WriteFailed {
                    offset: self.offset,
                    reason: "buffer too small".into(),
                });
            }
            let bytes = value.to_be_bytes();
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&bytes);
            self.offset += $size;
            Ok(())
        }
    };
}

/// Generates a bounds-checked big-endian read method for a primitive type.
macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> WireResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(WireError::ReadFailed {
                    offset: self.offset,
                    reason: "unexpected end of buffer".into(),
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        CursorMut { buffer, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> WireResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(WireError::WriteFailed {
                offset: self.offset,
                reason: "buffer too small".into(),
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> WireResult<()> {
        if self.offset + n > self.buffer.len() {
            return Err(WireError::WriteFailed {
                offset: self.offset,
                reason: "buffer too small".into(),
            });
        }
        self.offset += n;
        Ok(())
    }

    impl_write_be!(write_u8, u8, 1);
    impl_write_be!(write_u16, u16, 2);
    impl_write_be!(write_u32, u32, 4);
    impl_write_be!(write_u64, u64, 8);

    pub fn write_i32(&mut self, value: i32) -> WireResult<()> {
        self.write_u32(value as u32)
    }
}

pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Cursor { buffer, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn read_bytes(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.offset + n > self.buffer.len() {
            return Err(WireError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> WireResult<()> {
        self.read_bytes(n).map(|_| ())
    }

    impl_read_be!(read_u8, u8, 1);
    impl_read_be!(read_u16, u16, 2);
    impl_read_be!(read_u32, u32, 4);
    impl_read_be!(read_u64, u64, 8);

    pub fn read_i32(&mut self) -> WireResult<i32> {
        self.read_u32().map(|v| v as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let mut buf = [0u8; 16];
        {
            let mut w = CursorMut::new(&mut buf);
            w.write_u32(0xdead_beef).unwrap();
            w.write_u16(0x1234).unwrap();
            w.write_u8(0xff).unwrap();
        }
        let mut r = Cursor::new(&buf);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u8().unwrap(), 0xff);
    }

    #[test]
    fn write_past_end_fails() {
        let mut buf = [0u8; 2];
        let mut w = CursorMut::new(&mut buf);
        assert!(w.write_u32(1).is_err());
    }

    #[test]
    fn read_past_end_fails() {
        let buf = [0u8; 2];
        let mut r = Cursor::new(&buf);
        assert!(r.read_u32().is_err());
    }
}
