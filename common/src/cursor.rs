// 大端二进制读取游标
//
// 录像文件与RTP负载都是大端编码，所有读取都做越界检查，
// 越界时返回错误且不移动游标。

use crate::error::DecodeError;

/// 只读二进制游标
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// 当前读取位置
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 缓冲区总长度
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 剩余未读字节数
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn has_remaining(&self) -> bool {
        self.offset < self.buf.len()
    }

    /// 跳转到绝对位置
    pub fn seek_to(&mut self, offset: usize) -> Result<(), DecodeError> {
        if offset > self.buf.len() {
            return Err(DecodeError::OutOfBounds {
                offset,
                requested: 0,
                length: self.buf.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// 跳过n个字节
    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::OutOfBounds {
                offset: self.offset,
                requested: n,
                length: self.buf.len(),
            })?;
        let slice = &self.buf[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// 读取len字节的UTF-8字符串（有损解码，去掉末尾的NUL）
    pub fn read_string(&mut self, len: usize) -> Result<String, DecodeError> {
        let raw = self.take(len)?;
        let text = String::from_utf8_lossy(raw);
        Ok(text.trim_end_matches('\0').to_string())
    }

    /// 读取len字节的原始切片
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reads_big_endian() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0102_0304i32.to_be_bytes());
        data.extend_from_slice(&(-2i8).to_be_bytes());
        data.extend_from_slice(&1.5f32.to_be_bytes());
        data.extend_from_slice(&(-7i64).to_be_bytes());
        data.extend_from_slice(&2.25f64.to_be_bytes());

        let mut cursor = BinaryCursor::new(&data);
        assert_eq!(cursor.read_i32().unwrap(), 0x0102_0304);
        assert_eq!(cursor.read_i8().unwrap(), -2);
        assert_eq!(cursor.read_f32().unwrap(), 1.5);
        assert_eq!(cursor.read_i64().unwrap(), -7);
        assert_eq!(cursor.read_f64().unwrap(), 2.25);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_read_string_trims_trailing_nul() {
        let data = b"Arial\0\0\0";
        let mut cursor = BinaryCursor::new(data);
        assert_eq!(cursor.read_string(8).unwrap(), "Arial");
        assert_eq!(cursor.offset(), 8);
    }

    #[test]
    fn test_skip_past_end_fails() {
        let data = [0u8; 4];
        let mut cursor = BinaryCursor::new(&data);
        cursor.skip(3).unwrap();
        let err = cursor.skip(2).unwrap_err();
        assert_eq!(
            err,
            DecodeError::OutOfBounds {
                offset: 3,
                requested: 2,
                length: 4
            }
        );
        assert_eq!(cursor.offset(), 3);
    }

    #[test]
    fn test_short_read_does_not_advance() {
        let data = [0u8; 3];
        let mut cursor = BinaryCursor::new(&data);
        assert!(cursor.read_i32().is_err());
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.remaining(), 3);
    }

    #[test]
    fn test_seek_to() {
        let data = [1u8, 2, 3];
        let mut cursor = BinaryCursor::new(&data);
        cursor.seek_to(2).unwrap();
        assert_eq!(cursor.read_u8().unwrap(), 3);
        assert!(cursor.seek_to(4).is_err());
    }

    proptest! {
        #[test]
        fn prop_skip_never_passes_end(len in 0usize..64, skips in proptest::collection::vec(0usize..16, 0..16)) {
            let data = vec![0u8; len];
            let mut cursor = BinaryCursor::new(&data);
            for n in skips {
                let before = cursor.offset();
                match cursor.skip(n) {
                    Ok(()) => prop_assert_eq!(cursor.offset(), before + n),
                    Err(_) => {
                        prop_assert!(before + n > len);
                        prop_assert_eq!(cursor.offset(), before);
                    }
                }
                prop_assert!(cursor.offset() <= len);
            }
        }
    }
}
