/// Outcome of filling a chunk from a reader.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk reached its configured size; the source may have more items.
    Full,
    /// The source is exhausted; the chunk holds whatever was left (possibly nothing).
    Finished,
}

/// An ordered, bounded buffer of items awaiting one atomic write.
pub struct Chunk<T> {
    items: Vec<T>,
    chunk_size: usize,
}

impl<T> Chunk<T> {
    pub fn new(chunk_size: usize) -> Chunk<T> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get_items(&self) -> &[T] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Chunk;

    #[test]
    fn chunk_should_be_full_at_its_size() {
        let mut chunk = Chunk::new(2);
        assert!(chunk.is_empty());

        chunk.push("a");
        assert!(!chunk.is_full());

        chunk.push("b");
        assert!(chunk.is_full());
        assert_eq!(chunk.get_items(), &["a", "b"]);

        chunk.clear();
        assert!(chunk.is_empty());
        assert_eq!(chunk.len(), 0);
    }
}
