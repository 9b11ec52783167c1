use std::{io::Write, path::Path};

use rayon::prelude::*;

use crate::{
    embedder::EmbeddingVector,
    error::{Error, Result},
};

const MAGIC: &[u8; 4] = b"VJVI";
const FORMAT_VERSION: u32 = 1;

/// Header size: 4 bytes magic + 4 bytes version + 4 bytes dimension +
/// 4 bytes vector count.
const HEADER_SIZE: usize = 16;

/// One hit from [`VectorIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the matched vector.
    pub position: usize,
    /// Squared Euclidean distance to the query. Lower is closer.
    pub distance: f32,
}

/// Exhaustive nearest-neighbor index under squared Euclidean distance.
///
/// Vectors are kept in insertion order in one flat row-major matrix, so
/// position `i` always refers to the `i`-th vector passed to [`build`].
///
/// Binary format:
/// - 4 bytes: magic `VJVI`
/// - 4 bytes: format version (u32 LE)
/// - 4 bytes: dimension D (u32 LE)
/// - 4 bytes: vector count N (u32 LE)
/// - N * D * 4 bytes: f32 LE values in row-major order
///
/// [`build`]: VectorIndex::build
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from vectors that all have `dimension` components.
    ///
    /// # Examples
    ///
    /// ```
    /// use vajra::{EmbeddingVector, VectorIndex};
    ///
    /// let index = VectorIndex::build(2, vec![
    ///     EmbeddingVector::new(vec![0.0, 0.0]),
    ///     EmbeddingVector::new(vec![3.0, 4.0]),
    /// ]).unwrap();
    ///
    /// let hits = index.search(&EmbeddingVector::new(vec![3.0, 4.0]), 1).unwrap();
    /// assert_eq!(hits[0].position, 1);
    /// assert_eq!(hits[0].distance, 0.0);
    /// ```
    pub fn build<I>(dimension: usize, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = EmbeddingVector>,
    {
        if dimension == 0 {
            return Err(Error::Config(
                "vector index dimension must be positive".into(),
            ));
        }

        let mut data = Vec::new();
        for vector in vectors {
            vector.check_dimension(dimension)?;
            data.extend_from_slice(vector.as_slice());
        }

        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The stored vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Return up to `k` nearest vectors, closest first.
    ///
    /// Every stored vector is scored. Equal distances keep insertion order.
    pub fn search(
        &self,
        query: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        query.check_dimension(self.dimension)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = query.as_slice();
        let mut scored: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Persist the index at `path`.
    ///
    /// The bytes go to a sibling temporary file first and are renamed into
    /// place, so `path` never holds a partially written index.
    pub fn save(&self, path: &Path) -> Result<()> {
        let count = u32::try_from(self.len()).map_err(|_| {
            Error::CorruptIndex(format!("too many vectors: {}", self.len()))
        })?;
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            Error::CorruptIndex(format!("dimension too large: {}", self.dimension))
        })?;

        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(&self.data[..]));
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        let payload: Vec<u32> =
            self.data.iter().map(|v| v.to_bits().to_le()).collect();
        bytes.extend_from_slice(bytemuck::cast_slice(&payload));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("vjx.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load an index written by [`save`](VectorIndex::save).
    ///
    /// Fails if the file is absent, if its header is not a VJVI header, if
    /// its dimension is not `expected_dimension`, or if the payload length
    /// disagrees with the header.
    pub fn load(path: &Path, expected_dimension: usize) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingData {
                kind: "index",
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path)?;
        if bytes.len() < HEADER_SIZE {
            return Err(Error::CorruptIndex(format!(
                "{}: file is {} bytes, shorter than the header",
                path.display(),
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(Error::CorruptIndex(format!(
                "{}: not a vector index file",
                path.display()
            )));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "{}: unsupported format version {version}",
                path.display()
            )));
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u32(&bytes[12..16]) as usize;

        if dimension == 0 {
            return Err(Error::CorruptIndex(format!(
                "{}: header declares dimension 0",
                path.display()
            )));
        }
        if dimension != expected_dimension {
            return Err(Error::DimensionMismatch {
                expected: expected_dimension,
                found: dimension,
            });
        }

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_SIZE));
        if expected_len != Some(bytes.len()) {
            return Err(Error::CorruptIndex(format!(
                "{}: header declares {count} vectors of dimension {dimension} \
                 but payload is {} bytes",
                path.display(),
                bytes.len() - HEADER_SIZE
            )));
        }

        let mut bits = vec![0u32; count * dimension];
        bytemuck::cast_slice_mut::<u32, u8>(&mut bits)
            .copy_from_slice(&bytes[HEADER_SIZE..]);
        let data = bits
            .into_iter()
            .map(|b| f32::from_bits(u32::from_le(b)))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
