use std::cmp::Ordering;

use thiserror::Error;

use crate::retrieval::embedder::EmbeddingVector;

pub const BLOB_MAGIC: [u8; 4] = *b"SQIX";
pub const BLOB_VERSION: u8 = 2;
const HEADER_LEN: usize = 4 + 1 + 4 + 8 + 4;
const CHECKSUM_LEN: usize = 32;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("index dimension must be greater than zero")]
    ZeroDimension,
    #[error("vector at ordinal {ordinal} has {actual} dimensions, index expects {expected}")]
    VectorDimension { ordinal: usize, expected: usize, actual: usize },
    #[error("query has {actual} dimensions, index expects {expected}")]
    QueryDimension { expected: usize, actual: usize },
    #[error("index blob is truncated ({len} bytes)")]
    Truncated { len: usize },
    #[error("index blob has an unknown magic header")]
    BadMagic,
    #[error("index blob version {0} is not supported")]
    UnsupportedVersion(u8),
    #[error("index blob checksum does not match its contents")]
    ChecksumMismatch,
    #[error("index blob declares {declared} bytes of vectors but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("index blob model id is not valid UTF-8")]
    ModelIdEncoding,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    /// Squared euclidean distance to the query.
    pub distance: f32,
}

/// Exact brute-force L2 index. Ordinal `i` is the `i`-th vector passed to [`FlatIndex::build`].
///
/// `model_id` names the embedder that produced the vectors and travels with the blob.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    model_id: String,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn empty(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self { dimension, model_id: String::new(), data: Vec::new() })
    }

    pub fn build(dimension: usize, vectors: &[EmbeddingVector]) -> Result<Self, IndexError> {
        let mut index = Self::empty(dimension)?;
        index.data.reserve(vectors.len() * dimension);
        for (ordinal, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::VectorDimension {
                    ordinal,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            index.data.extend_from_slice(vector);
        }
        Ok(index)
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn count(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Up to `k` nearest vectors by ascending distance; equal distances keep ordinal order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, vector)| Neighbor { ordinal, distance: squared_l2(query, vector) })
            .collect();

        let by_rank = |left: &Neighbor, right: &Neighbor| -> Ordering {
            left.distance.total_cmp(&right.distance).then(left.ordinal.cmp(&right.ordinal))
        };
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_rank);
            neighbors.truncate(k);
        }
        neighbors.sort_by(by_rank);
        Ok(neighbors)
    }

    /// `SQIX` | version u8 | dimension u32 LE | count u64 LE | model id length u32 LE |
    /// model id UTF-8 | f32 LE values | blake3(32).
    pub fn to_bytes(&self) -> Vec<u8> {
        let model = self.model_id.as_bytes();
        let mut bytes =
            Vec::with_capacity(HEADER_LEN + model.len() + self.data.len() * 4 + CHECKSUM_LEN);
        bytes.extend_from_slice(&BLOB_MAGIC);
        bytes.push(BLOB_VERSION);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.count() as u64).to_le_bytes());
        bytes.extend_from_slice(&(model.len() as u32).to_le_bytes());
        bytes.extend_from_slice(model);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let checksum = blake3::hash(&bytes);
        bytes.extend_from_slice(checksum.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(IndexError::Truncated { len: bytes.len() });
        }
        if bytes[..4] != BLOB_MAGIC {
            return Err(IndexError::BadMagic);
        }
        if bytes[4] != BLOB_VERSION {
            return Err(IndexError::UnsupportedVersion(bytes[4]));
        }

        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes() != checksum {
            return Err(IndexError::ChecksumMismatch);
        }

        let dimension = u32::from_le_bytes([body[5], body[6], body[7], body[8]]) as usize;
        let mut count_bytes = [0_u8; 8];
        count_bytes.copy_from_slice(&body[9..17]);
        let count = u64::from_le_bytes(count_bytes) as usize;
        let model_len = u32::from_le_bytes([body[17], body[18], body[19], body[20]]) as usize;
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let rest = &body[HEADER_LEN..];
        if rest.len() < model_len {
            return Err(IndexError::Truncated { len: bytes.len() });
        }
        let (model, payload) = rest.split_at(model_len);
        let model_id =
            std::str::from_utf8(model).map_err(|_| IndexError::ModelIdEncoding)?.to_string();
        let declared = count.saturating_mul(dimension).saturating_mul(4);
        if declared != payload.len() {
            return Err(IndexError::LengthMismatch { declared, actual: payload.len() });
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { dimension, model_id, data })
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::{FlatIndex, IndexError, Neighbor, BLOB_VERSION};

    fn sample() -> FlatIndex {
        FlatIndex::build(
            2,
            &[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0], vec![1.0, 0.0]],
        )
        .expect("build")
        .with_model_id("test-model")
    }

    fn ordinals(neighbors: &[Neighbor]) -> Vec<usize> {
        neighbors.iter().map(|neighbor| neighbor.ordinal).collect()
    }

    #[test]
    fn search_orders_by_distance_then_ordinal() {
        let index = sample();
        let neighbors = index.search(&[1.0, 0.0], 3).expect("search");

        assert_eq!(ordinals(&neighbors), vec![1, 4, 0]);
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[2].distance, 1.0);
    }

    #[test]
    fn search_is_deterministic_and_bounded() {
        let index = sample();
        let first = index.search(&[0.2, 0.3], 2).expect("search");
        let second = index.search(&[0.2, 0.3], 2).expect("search");
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let all = index.search(&[0.2, 0.3], 50).expect("search");
        assert_eq!(all.len(), index.count());
        assert!(index.search(&[0.2, 0.3], 0).expect("search").is_empty());
    }

    #[test]
    fn blob_round_trip_preserves_search_results() {
        let index = sample();
        let restored = FlatIndex::from_bytes(&index.to_bytes()).expect("load");

        assert_eq!(restored, index);
        assert_eq!(restored.model_id(), "test-model");
        for query in [[1.0, 0.0], [0.0, 0.9], [4.0, 4.0]] {
            assert_eq!(
                restored.search(&query, 3).expect("search"),
                index.search(&query, 3).expect("search")
            );
        }
    }

    #[test]
    fn corrupt_blobs_are_rejected() {
        let mut bytes = sample().to_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        assert_eq!(FlatIndex::from_bytes(&bytes), Err(IndexError::ChecksumMismatch));

        let mut wrong_magic = sample().to_bytes();
        wrong_magic[0] = b'X';
        assert_eq!(FlatIndex::from_bytes(&wrong_magic), Err(IndexError::BadMagic));

        assert!(matches!(FlatIndex::from_bytes(&[1, 2, 3]), Err(IndexError::Truncated { .. })));

        let mut old_version = sample().to_bytes();
        old_version[4] = BLOB_VERSION - 1;
        assert_eq!(
            FlatIndex::from_bytes(&old_version),
            Err(IndexError::UnsupportedVersion(BLOB_VERSION - 1))
        );
    }

    #[test]
    fn model_id_is_covered_by_the_checksum() {
        let mut bytes = sample().to_bytes();
        let model_start = bytes.windows(4).position(|window| window == b"test").expect("model id");
        bytes[model_start] = b'b';
        assert_eq!(FlatIndex::from_bytes(&bytes), Err(IndexError::ChecksumMismatch));
    }

    #[test]
    fn errors_can_be_cloned_into_stale_reasons() {
        let error = FlatIndex::from_bytes(b"garbage").expect_err("truncated");
        let copy = error.clone();
        assert_eq!(copy, error);
        assert_eq!(copy.to_string(), "index blob is truncated (7 bytes)");
    }

    #[test]
    fn dimension_errors_are_reported() {
        let error = FlatIndex::build(2, &[vec![0.0, 0.0], vec![1.0]]).expect_err("bad vector");
        assert_eq!(error, IndexError::VectorDimension { ordinal: 1, expected: 2, actual: 1 });

        let error = sample().search(&[1.0], 1).expect_err("bad query");
        assert_eq!(error, IndexError::QueryDimension { expected: 2, actual: 1 });
    }

    #[test]
    fn empty_index_round_trips() {
        let index = FlatIndex::empty(4).expect("empty");
        let restored = FlatIndex::from_bytes(&index.to_bytes()).expect("load");
        assert_eq!(restored.count(), 0);
        assert_eq!(restored.model_id(), "");
        assert!(restored.search(&[0.0; 4], 3).expect("search").is_empty());
    }
}
