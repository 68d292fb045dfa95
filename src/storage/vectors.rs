use crate::core::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Magic prefix of the serialized vector artifact
const MAGIC: &[u8; 4] = b"VSIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// A scored row returned by a vector search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub row_id: usize,
}

/// Append-only exact inner-product index.
///
/// Rows are stored contiguously; row `i` is the `i`-th vector added. Vectors are
/// expected to be L2-normalized so that inner product equals cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector; its row id is the previous row count
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension || self.dimension == 0 {
            return Err(Error::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Vector stored at a row
    pub fn row(&self, row_id: usize) -> Option<&[f32]> {
        let start = row_id.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Return the `k` rows with the highest inner product, best first.
    ///
    /// `k` is clamped to the number of rows; equal scores keep insertion order.
    /// Uses a min-heap to maintain the top K without sorting every row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        for (row_id, row) in self.data.chunks_exact(self.dimension).enumerate() {
            let score = inner_product(query, row);
            heap.push(HeapEntry(Neighbor { score, row_id }));
            if heap.len() > k {
                heap.pop();
            }
        }

        // Ascending order of HeapEntry is best-first
        Ok(heap.into_sorted_vec().into_iter().map(|e| e.0).collect())
    }

    /// Serialize to the byte-level artifact
    pub fn to_bytes(&self) -> Vec<u8> {
        let rows = self.len() as u64;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&rows.to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from the byte-level artifact
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(Error::Snapshot("Vector artifact has no valid header".to_string()));
        }

        let version = u32::from_le_bytes(read_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(Error::Snapshot(format!(
                "Unsupported vector artifact version {}",
                version
            )));
        }

        let dimension = u32::from_le_bytes(read_array(&bytes[8..12])) as usize;
        let rows = u64::from_le_bytes(read_array(&bytes[12..20])) as usize;
        let payload = &bytes[HEADER_LEN..];
        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::Snapshot("Vector artifact size overflows".to_string()))?;
        if dimension == 0 || payload.len() != expected {
            return Err(Error::Snapshot(format!(
                "Vector artifact is truncated: expected {} bytes, found {}",
                expected,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(read_array(chunk)))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}

/// Inner product of two equal-length vectors
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Heap ordering: "greater" means worse (lower score, then later row), so the
/// max-heap top is the entry to evict.
struct HeapEntry(Neighbor);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .total_cmp(&self.0.score)
            .then_with(|| self.0.row_id.cmp(&other.0.row_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_add_assigns_sequential_rows() {
        let mut index = FlatIndex::new(3);
        index.add(&unit(3, 0)).unwrap();
        index.add(&unit(3, 1)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.row(1), Some(&[0.0, 1.0, 0.0][..]));
        assert!(index.row(2).is_none());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.add(&[1.0, 0.0]),
            Err(Error::Dimension { expected: 3, actual: 2 })
        ));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_search_orders_and_clamps() {
        let mut index = FlatIndex::new(2);
        index.add(&[0.6, 0.8]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.iter().map(|h| h.row_id).collect::<Vec<_>>(), vec![1, 0, 2]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let top = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].row_id, 1);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = FlatIndex::new(2);
        for _ in 0..4 {
            index.add(&[1.0, 0.0]).unwrap();
        }
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.row_id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_search() {
        let index = FlatIndex::new(4);
        assert!(index.search(&unit(4, 0), 5).unwrap().is_empty());
    }

    #[test]
    fn test_artifact_rejects_corruption() {
        let mut index = FlatIndex::new(2);
        index.add(&[0.6, 0.8]).unwrap();
        let bytes = index.to_bytes();

        assert_eq!(FlatIndex::from_bytes(&bytes).unwrap(), index);
        assert!(FlatIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(FlatIndex::from_bytes(b"nope").is_err());
    }
}
