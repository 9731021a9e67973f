//! Typed input batches for `fit`.
//!
//! A [`VectorBatch`] carries its element type so the index can reject a
//! mismatch against its declared [`DataType`] before any graph work starts.

use crate::config;
use crate::error::{Error, Result};
use crate::params::DataType;

/// Rows of equal length, tagged with their element type.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorBatch {
    Float32(Vec<Vec<f32>>),
    Int8(Vec<Vec<i8>>),
    Uint8(Vec<Vec<u8>>),
}

impl VectorBatch {
    pub fn data_type(&self) -> DataType {
        match self {
            VectorBatch::Float32(_) => DataType::Float32,
            VectorBatch::Int8(_) => DataType::Int8,
            VectorBatch::Uint8(_) => DataType::Uint8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VectorBatch::Float32(rows) => rows.len(),
            VectorBatch::Int8(rows) => rows.len(),
            VectorBatch::Uint8(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row_lengths(&self) -> Vec<usize> {
        match self {
            VectorBatch::Float32(rows) => rows.iter().map(Vec::len).collect(),
            VectorBatch::Int8(rows) => rows.iter().map(Vec::len).collect(),
            VectorBatch::Uint8(rows) => rows.iter().map(Vec::len).collect(),
        }
    }

    /// Common row length of a non-empty batch.
    ///
    /// Fails on an empty batch, a zero or oversized dimension, ragged rows,
    /// or non-finite float components.
    pub fn dimension(&self) -> Result<usize> {
        let lengths = self.row_lengths();
        let dim = *lengths
            .first()
            .ok_or_else(|| Error::Validation("vector batch is empty".to_string()))?;
        if dim == 0 || dim > config::MAX_DIMENSION {
            return Err(Error::Validation(format!(
                "dimension {dim} out of range [1, {}]",
                config::MAX_DIMENSION
            )));
        }
        if let Some((row, len)) = lengths.iter().enumerate().find(|(_, l)| **l != dim) {
            return Err(Error::Validation(format!(
                "row {row} has {len} components, expected {dim}"
            )));
        }
        if let VectorBatch::Float32(rows) = self {
            if let Some(row) = rows.iter().position(|r| r.iter().any(|x| !x.is_finite())) {
                return Err(Error::Validation(format!(
                    "row {row} contains a non-finite component"
                )));
            }
        }
        Ok(dim)
    }

    /// Widen every row to f32.
    pub fn into_f32(self) -> Vec<Vec<f32>> {
        match self {
            VectorBatch::Float32(rows) => rows,
            VectorBatch::Int8(rows) => rows
                .into_iter()
                .map(|r| r.into_iter().map(f32::from).collect())
                .collect(),
            VectorBatch::Uint8(rows) => rows
                .into_iter()
                .map(|r| r.into_iter().map(f32::from).collect())
                .collect(),
        }
    }
}

impl From<Vec<Vec<f32>>> for VectorBatch {
    fn from(rows: Vec<Vec<f32>>) -> Self {
        VectorBatch::Float32(rows)
    }
}

impl From<Vec<Vec<i8>>> for VectorBatch {
    fn from(rows: Vec<Vec<i8>>) -> Self {
        VectorBatch::Int8(rows)
    }
}

impl From<Vec<Vec<u8>>> for VectorBatch {
    fn from(rows: Vec<Vec<u8>>) -> Self {
        VectorBatch::Uint8(rows)
    }
}

/// Whether an f32 vector is representable in `data_type` without loss.
///
/// Collections receive documents as f32; integer-typed collections only
/// accept integral components inside the type's range.
pub fn admits(data_type: DataType, vector: &[f32]) -> bool {
    match data_type {
        DataType::Float32 => vector.iter().all(|x| x.is_finite()),
        DataType::Int8 => vector
            .iter()
            .all(|&x| x.fract() == 0.0 && (-128.0..=127.0).contains(&x)),
        DataType::Uint8 => vector
            .iter()
            .all(|&x| x.fract() == 0.0 && (0.0..=255.0).contains(&x)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_checks() {
        let ok = VectorBatch::from(vec![vec![1.0f32, 2.0], vec![3.0, 4.0]]);
        assert_eq!(ok.dimension().unwrap(), 2);

        let ragged = VectorBatch::from(vec![vec![1.0f32, 2.0], vec![3.0]]);
        assert!(matches!(ragged.dimension(), Err(Error::Validation(_))));

        let empty = VectorBatch::Float32(Vec::new());
        assert!(empty.dimension().is_err());

        let nan = VectorBatch::from(vec![vec![f32::NAN, 1.0]]);
        assert!(nan.dimension().is_err());
    }

    #[test]
    fn test_data_type_and_widening() {
        let batch = VectorBatch::from(vec![vec![-3i8, 7]]);
        assert_eq!(batch.data_type(), DataType::Int8);
        assert_eq!(batch.into_f32(), vec![vec![-3.0, 7.0]]);

        let batch = VectorBatch::from(vec![vec![200u8]]);
        assert_eq!(batch.data_type(), DataType::Uint8);
        assert_eq!(batch.into_f32(), vec![vec![200.0]]);
    }

    #[test]
    fn test_admits() {
        assert!(admits(DataType::Float32, &[0.5, -1.25]));
        assert!(admits(DataType::Int8, &[-128.0, 127.0]));
        assert!(!admits(DataType::Int8, &[128.0]));
        assert!(!admits(DataType::Uint8, &[0.5]));
        assert!(!admits(DataType::Uint8, &[-1.0]));
    }
}
