use lru::LruCache;
use std::sync::Arc;

/// A decoded TIFF strip or tile, samples widened to `f64` and interleaved.
#[derive(Debug)]
pub struct DecodedChunk {
    pub width: usize,
    pub height: usize,
    pub samples_per_pixel: usize,
    pub values: Vec<f64>,
}

impl DecodedChunk {
    #[inline]
    #[must_use]
    pub fn sample(&self, row: usize, col: usize, sample: usize) -> f64 {
        self.values[(row * self.width + col) * self.samples_per_pixel + sample]
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }
}

/// Byte-bounded LRU of decoded chunks keyed by chunk index.
///
/// Owned by a single raster handle and dropped with it.
pub struct ChunkCache {
    current_bytes: usize,
    capacity_bytes: usize,
    entries: LruCache<u32, Arc<DecodedChunk>>,
}

impl ChunkCache {
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        ChunkCache {
            current_bytes: 0,
            capacity_bytes,
            entries: LruCache::unbounded(),
        }
    }

    pub fn get(&mut self, index: u32) -> Option<Arc<DecodedChunk>> {
        self.entries.get(&index).map(Arc::clone)
    }

    /// Insert a chunk, evicting least recently used chunks to stay within
    /// capacity. Chunks larger than the whole cache are not retained.
    pub fn insert(&mut self, index: u32, chunk: Arc<DecodedChunk>) {
        let size_bytes = chunk.size_bytes();
        if size_bytes > self.capacity_bytes {
            return;
        }

        if let Some(old) = self.entries.pop(&index) {
            self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes());
        }

        while self.current_bytes + size_bytes > self.capacity_bytes {
            if let Some((_index, evicted)) = self.entries.pop_lru() {
                self.current_bytes = self.current_bytes.saturating_sub(evicted.size_bytes());
            } else {
                break;
            }
        }

        self.current_bytes = self.current_bytes.saturating_add(size_bytes);
        self.entries.put(index, chunk);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }
}
