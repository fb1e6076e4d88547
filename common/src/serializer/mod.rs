mod reader;
mod writer;

pub use reader::{Reader, ReaderError};
pub use writer::Writer;

// Compact binary codec used for every artifact that crosses the harness
// boundary. The wire layout is the field order of each `write` impl; there
// is no self-description, so `read` must mirror `write` exactly.
pub trait Serializer: Sized {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>;

    // Exact encoded size in bytes, must match what `write` produces
    fn size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.size());
        let mut writer = Writer::new(&mut buffer);
        self.write(&mut writer);
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError> {
        let mut reader = Reader::new(bytes);
        let value = Self::read(&mut reader)?;
        if reader.total_read() != reader.total_size() {
            return Err(ReaderError::TrailingBytes);
        }
        Ok(value)
    }
}

impl Serializer for u8 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u32 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u32()
    }

    fn size(&self) -> usize {
        4
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

// Option is encoded as a presence byte followed by the value
impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_u8(1);
                value.write(writer);
            }
            None => writer.write_u8(0),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::read(reader)?)),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1 + self.as_ref().map(Serializer::size).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_round_trip() {
        let some: Option<u64> = Some(42);
        let none: Option<u64> = None;

        assert_eq!(Option::<u64>::from_bytes(&some.to_bytes()).unwrap(), some);
        assert_eq!(Option::<u64>::from_bytes(&none.to_bytes()).unwrap(), none);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = 7u64.to_bytes();
        bytes.push(0xff);
        assert!(matches!(
            u64::from_bytes(&bytes),
            Err(ReaderError::TrailingBytes)
        ));
    }

    #[test]
    fn test_size_matches_encoding() {
        let value: Option<u32> = Some(1234);
        assert_eq!(value.to_bytes().len(), value.size());
    }
}
