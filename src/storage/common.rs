const U32_SIZE: usize = std::mem::size_of::<u32>();
const I32_SIZE: usize = std::mem::size_of::<i32>();

/// Writes big-endian values to a byte buffer, advancing a cursor.
/// The caller guarantees the buffer is large enough.
pub(crate) struct Serializer<'a> {
    buffer: &'a mut [u8],
    pos: usize,
}

impl<'a> Serializer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn serialize_u32(&mut self, val: u32) {
        self.buffer[self.pos..self.pos + U32_SIZE].copy_from_slice(val.to_be_bytes().as_slice());
        self.pos += U32_SIZE;
    }

    pub fn serialize_i32(&mut self, val: i32) {
        self.buffer[self.pos..self.pos + I32_SIZE].copy_from_slice(val.to_be_bytes().as_slice());
        self.pos += I32_SIZE;
    }

    pub fn copy_bytes(&mut self, bytes: &[u8]) {
        self.buffer[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Writes `count` zero bytes.
    pub fn pad(&mut self, count: usize) {
        self.buffer[self.pos..self.pos + count].fill(0);
        self.pos += count;
    }

    pub fn end(self) -> usize {
        self.pos
    }
}

/// Reads big-endian values from a byte buffer. Every read returns `None` once
/// the buffer is exhausted.
pub(crate) struct Deserializer<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let bytes = self.buffer.get(self.pos..self.pos + count)?;
        self.pos += count;
        Some(bytes)
    }

    pub fn deserialize_u32(&mut self) -> Option<u32> {
        let bytes = self.take(U32_SIZE)?;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn deserialize_i32(&mut self) -> Option<i32> {
        let bytes = self.take(I32_SIZE)?;
        Some(i32::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        self.take(count)
    }

    pub fn skip(&mut self, count: usize) -> Option<()> {
        self.take(count).map(|_| ())
    }
}
