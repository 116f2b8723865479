//! Chunking of transfer buffers into packet- or staging-sized pieces.

/// Iterator over fixed-size chunks of a buffer.
pub struct ChunkIterator<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    current_chunk: usize,
}

impl<'a> ChunkIterator<'a> {
    /// A `chunk_size` of zero yields no chunks.
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size,
            offset: 0,
            current_chunk: 0,
        }
    }

    /// Total number of chunks (including a trailing partial one).
    pub fn total(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        self.data.len().div_ceil(self.chunk_size)
    }

    /// Index of the next chunk to be returned.
    pub fn current(&self) -> usize {
        self.current_chunk
    }

    /// Byte offset of the next chunk to be returned.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Check if the next chunk is the last.
    pub fn is_last(&self) -> bool {
        self.current_chunk + 1 >= self.total()
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.current_chunk = 0;
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.chunk_size == 0 || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let chunk_len = remaining.min(self.chunk_size);

        let chunk = &self.data[self.offset..self.offset + chunk_len];
        self.offset += chunk_len;
        self.current_chunk += 1;

        Some(chunk)
    }
}
