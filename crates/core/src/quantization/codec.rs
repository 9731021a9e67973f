//! Vector codec: the storage representation of indexed vectors.
//!
//! The codec is selected by [`QuantizationType`] and fit once per index. All
//! vectors it sees are already metric-prepared (unit length for cosine).

use crate::distance::{self, DistanceMetric};
use crate::error::{Error, Result};
use crate::params::QuantizationType;
use crate::quantization::scalar::ScalarQuantizer;
use serde::{Deserialize, Serialize};

/// A fitted codec. Closed set of strategies: raw, 8-bit, 4-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VectorCodec {
    /// Lossless f32 storage.
    Raw { dimension: usize },
    Sq8(ScalarQuantizer),
    Sq4(ScalarQuantizer),
}

/// Codec output for a single vector.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedVector {
    Raw(Vec<f32>),
    Quantized(Vec<u8>),
}

impl VectorCodec {
    /// Fit a codec of the requested type over the (prepared) build corpus.
    pub fn fit(
        quantization_type: QuantizationType,
        dimension: usize,
        rows: &[Vec<f32>],
    ) -> Result<Self> {
        let slices = rows.iter().map(Vec::as_slice);
        Ok(match quantization_type {
            QuantizationType::None => VectorCodec::Raw { dimension },
            QuantizationType::Sq8 => VectorCodec::Sq8(ScalarQuantizer::fit(8, dimension, slices)?),
            QuantizationType::Sq4 => VectorCodec::Sq4(ScalarQuantizer::fit(4, dimension, slices)?),
        })
    }

    pub fn quantization_type(&self) -> QuantizationType {
        match self {
            VectorCodec::Raw { .. } => QuantizationType::None,
            VectorCodec::Sq8(_) => QuantizationType::Sq8,
            VectorCodec::Sq4(_) => QuantizationType::Sq4,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorCodec::Raw { dimension } => *dimension,
            VectorCodec::Sq8(q) | VectorCodec::Sq4(q) => q.dimension(),
        }
    }

    pub fn is_quantized(&self) -> bool {
        !matches!(self, VectorCodec::Raw { .. })
    }

    fn quantizer(&self) -> Option<&ScalarQuantizer> {
        match self {
            VectorCodec::Raw { .. } => None,
            VectorCodec::Sq8(q) | VectorCodec::Sq4(q) => Some(q),
        }
    }

    /// Whether `vector` encodes without clamping. Always true for raw storage.
    pub fn covers(&self, vector: &[f32]) -> bool {
        self.quantizer().map_or(true, |q| q.covers(vector))
    }

    /// Bytes of quantized code per vector; zero for raw storage.
    pub fn code_len(&self) -> usize {
        self.quantizer().map_or(0, ScalarQuantizer::code_len)
    }

    pub fn encode(&self, vector: &[f32]) -> EncodedVector {
        match self.quantizer() {
            None => EncodedVector::Raw(vector.to_vec()),
            Some(q) => EncodedVector::Quantized(q.encode(vector)),
        }
    }

    /// Append the quantized code of `vector` to an arena. No-op for raw storage.
    pub(crate) fn encode_into(&self, vector: &[f32], arena: &mut Vec<u8>) {
        if let Some(q) = self.quantizer() {
            q.encode_into(vector, arena);
        }
    }

    /// Approximate reconstruction; identity for raw vectors.
    pub fn decode(&self, encoded: &EncodedVector) -> Result<Vec<f32>> {
        match (self.quantizer(), encoded) {
            (_, EncodedVector::Raw(v)) if v.len() == self.dimension() => Ok(v.clone()),
            (Some(q), EncodedVector::Quantized(codes)) if codes.len() == q.code_len() => {
                Ok(q.decode(codes))
            }
            _ => Err(Error::Validation(format!(
                "encoded vector does not match a {} codec of dimension {}",
                self.quantization_type(),
                self.dimension()
            ))),
        }
    }

    pub(crate) fn decode_codes_into(&self, codes: &[u8], out: &mut [f32]) {
        if let Some(q) = self.quantizer() {
            q.decode_into(codes, out);
        }
    }

    /// Distance between two encoded vectors, computed on codes where possible.
    pub fn distance_fastpath(
        &self,
        metric: DistanceMetric,
        a: &EncodedVector,
        b: &EncodedVector,
    ) -> Result<f32> {
        match (a, b) {
            (EncodedVector::Raw(x), EncodedVector::Raw(y)) if x.len() == y.len() => {
                Ok(metric.prepared_distance(x, y))
            }
            (EncodedVector::Quantized(x), EncodedVector::Quantized(y))
                if self.is_quantized() && x.len() == self.code_len() && y.len() == x.len() =>
            {
                Ok(self.code_distance(metric, x, y))
            }
            _ => Err(Error::Validation(
                "encoded vectors are not comparable under this codec".to_string(),
            )),
        }
    }

    /// Symmetric code-vs-code distance. Callers guarantee a quantized codec.
    pub(crate) fn code_distance(&self, metric: DistanceMetric, a: &[u8], b: &[u8]) -> f32 {
        let Some(q) = self.quantizer() else {
            return f32::MAX;
        };
        match metric {
            DistanceMetric::L2 => q.l2_sq_sym(a, b),
            DistanceMetric::Ip => -q.dot_sym(a, b),
            DistanceMetric::Cos => 1.0 - q.dot_sym(a, b),
        }
    }

    /// Asymmetric f32-query-vs-code distance. Callers guarantee a quantized codec.
    pub(crate) fn asym_distance(&self, metric: DistanceMetric, query: &[f32], codes: &[u8]) -> f32 {
        let Some(q) = self.quantizer() else {
            return f32::MAX;
        };
        match metric {
            DistanceMetric::L2 => q.l2_sq_asym(query, codes),
            DistanceMetric::Ip => -q.dot_asym(query, codes),
            DistanceMetric::Cos => 1.0 - q.dot_asym(query, codes),
        }
    }

    pub(crate) fn validate(&self, dimension: usize) -> std::result::Result<(), String> {
        match self {
            VectorCodec::Raw { dimension: d } if *d == dimension => Ok(()),
            VectorCodec::Raw { dimension: d } => Err(format!(
                "raw codec dimension {d} != index dimension {dimension}"
            )),
            VectorCodec::Sq8(q) if q.bits() == 8 => q.validate(dimension),
            VectorCodec::Sq4(q) if q.bits() == 4 => q.validate(dimension),
            _ => Err("codec variant does not match quantizer width".to_string()),
        }
    }
}

/// Relative error of a quantized distance against the exact one.
pub fn relative_error(approx: f32, exact: f32) -> f32 {
    let denom = exact.abs().max(1e-6);
    (approx - exact).abs() / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<f32>> {
        (0..16)
            .map(|i| {
                (0..12)
                    .map(|d| ((i * 7 + d * 3) % 11) as f32 / 11.0 - 0.5)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_raw_is_lossless() {
        let data = rows();
        let codec = VectorCodec::fit(QuantizationType::None, 12, &data).unwrap();
        let encoded = codec.encode(&data[3]);
        assert_eq!(codec.decode(&encoded).unwrap(), data[3]);
        assert_eq!(codec.code_len(), 0);
    }

    #[test]
    fn test_fastpath_tracks_exact_distance() {
        let data = rows();
        for qt in [QuantizationType::Sq8, QuantizationType::Sq4] {
            let codec = VectorCodec::fit(qt, 12, &data).unwrap();
            let a = codec.encode(&data[1]);
            let b = codec.encode(&data[5]);
            let approx = codec.distance_fastpath(DistanceMetric::L2, &a, &b).unwrap();
            let exact = distance::l2_sq(&data[1], &data[5]);
            let tolerance = if qt == QuantizationType::Sq8 { 0.05 } else { 0.35 };
            assert!(
                relative_error(approx, exact) < tolerance,
                "{qt}: approx={approx}, exact={exact}"
            );
        }
    }

    #[test]
    fn test_asym_cosine_on_prepared_vectors() {
        let metric = DistanceMetric::Cos;
        let data: Vec<Vec<f32>> = rows().iter().map(|r| metric.prepared(r)).collect();
        let codec = VectorCodec::fit(QuantizationType::Sq8, 12, &data).unwrap();
        let EncodedVector::Quantized(codes) = codec.encode(&data[2]) else {
            panic!("sq8 codec must produce codes");
        };
        let approx = codec.asym_distance(metric, &data[7], &codes);
        let exact = metric.prepared_distance(&data[7], &data[2]);
        assert!((approx - exact).abs() < 0.02, "approx={approx}, exact={exact}");
    }

    #[test]
    fn test_mismatched_encodings_are_rejected() {
        let data = rows();
        let codec = VectorCodec::fit(QuantizationType::Sq8, 12, &data).unwrap();
        let raw = EncodedVector::Raw(data[0].clone());
        let code = codec.encode(&data[0]);
        assert!(codec
            .distance_fastpath(DistanceMetric::L2, &raw, &code)
            .is_err());
        assert!(codec.decode(&EncodedVector::Quantized(vec![0; 3])).is_err());
    }

    #[test]
    fn test_validate_width() {
        let data = rows();
        let codec = VectorCodec::fit(QuantizationType::Sq4, 12, &data).unwrap();
        assert!(codec.validate(12).is_ok());
        assert!(codec.validate(8).is_err());
    }
}
