use thiserror::Error;

use crate::crypto::{Hash, HASH_SIZE};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Not enough bytes: need {need}, have {have}")]
    NotEnoughBytes { need: usize, have: usize },

    #[error("Invalid value")]
    InvalidValue,

    #[error("Invalid size")]
    InvalidSize,

    #[error("Trailing bytes after value")]
    TrailingBytes,
}

// Cursor over an immutable byte slice
pub struct Reader<'a> {
    bytes: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader {
            bytes,
            total: bytes.len(),
        }
    }

    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn total_read(&self) -> usize {
        self.total - self.bytes.len()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReaderError> {
        if self.bytes.len() < n {
            return Err(ReaderError::NotEnoughBytes {
                need: n,
                have: self.bytes.len(),
            });
        }
        let (chunk, rest) = self.bytes.split_at(n);
        self.bytes = rest;
        Ok(chunk)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let chunk = self.take(4)?;
        Ok(u32::from_be_bytes(chunk.try_into().expect("4 bytes taken")))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let chunk = self.take(8)?;
        Ok(u64::from_be_bytes(chunk.try_into().expect("8 bytes taken")))
    }

    pub fn read_u128(&mut self) -> Result<u128, ReaderError> {
        let chunk = self.take(16)?;
        Ok(u128::from_be_bytes(chunk.try_into().expect("16 bytes taken")))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReaderError> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn read_bytes_32(&mut self) -> Result<[u8; 32], ReaderError> {
        let chunk = self.take(32)?;
        Ok(chunk.try_into().expect("32 bytes taken"))
    }

    pub fn read_bytes_64(&mut self) -> Result<[u8; 64], ReaderError> {
        let chunk = self.take(64)?;
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(chunk);
        Ok(bytes)
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let chunk = self.take(HASH_SIZE)?;
        let bytes: [u8; HASH_SIZE] = chunk.try_into().expect("hash-sized chunk taken");
        Ok(Hash::new(bytes))
    }

    // Length-prefixed variable byte string (u32 length)
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, ReaderError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(ReaderError::InvalidSize);
        }
        self.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert!(matches!(
            reader.read_u64(),
            Err(ReaderError::NotEnoughBytes { need: 8, have: 3 })
        ));
    }

    #[test]
    fn test_total_read_tracking() {
        let bytes = [0u8; 16];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.total_read(), 0);
        reader.read_u64().unwrap();
        assert_eq!(reader.total_read(), 8);
        assert_eq!(reader.total_size(), 16);
    }

    #[test]
    fn test_var_bytes_limit() {
        let mut encoded = (5u32).to_be_bytes().to_vec();
        encoded.extend_from_slice(&[0u8; 5]);

        let mut reader = Reader::new(&encoded);
        assert!(matches!(
            reader.read_var_bytes(4),
            Err(ReaderError::InvalidSize)
        ));
    }
}
