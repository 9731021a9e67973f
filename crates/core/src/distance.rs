//! Distance metrics: squared Euclidean, inner product, and cosine.
//!
//! All metrics return a distance where **lower is better**. Inner product is
//! negated and cosine is reported as `1 - cos(a, b)`, so a single ascending
//! ordering ranks every metric.
//!
//! Kernels use SIMD-friendly fixed-size f32 chunks with f64 accumulation at
//! chunk boundaries, which auto-vectorizes without platform intrinsics.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance function selected at index or collection creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance (L2²). Range: \[0, ∞).
    #[default]
    L2,
    /// Negative inner product: `-dot(a, b)`. Lower = higher similarity.
    Ip,
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    Cos,
}

impl DistanceMetric {
    /// Exact distance between two raw vectors.
    ///
    /// Cosine normalizes internally, so callers may pass unnormalized vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_sq(a, b),
            DistanceMetric::Ip => -dot(a, b),
            DistanceMetric::Cos => 1.0 - cosine_similarity(a, b),
        }
    }

    /// Distance between two vectors already passed through [`prepare`](Self::prepare).
    ///
    /// For cosine this skips the norm computation and reduces to `1 - dot`.
    #[inline]
    pub fn prepared_distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_sq(a, b),
            DistanceMetric::Ip => -dot(a, b),
            DistanceMetric::Cos => 1.0 - dot(a, b),
        }
    }

    /// Bring a vector into the representation stored by the index.
    /// Cosine vectors are scaled to unit length; other metrics are untouched.
    pub fn prepare(&self, v: &mut [f32]) {
        if *self == DistanceMetric::Cos {
            normalize(v);
        }
    }

    /// Returns the owned, prepared copy of `v`.
    pub fn prepared(&self, v: &[f32]) -> Vec<f32> {
        let mut out = v.to_vec();
        self.prepare(&mut out);
        out
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
            DistanceMetric::Cos => "cos",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "dot" | "inner_product" => Ok(DistanceMetric::Ip),
            "cos" | "cosine" => Ok(DistanceMetric::Cos),
            other => Err(Error::Configuration(format!(
                "unsupported metric '{other}' (expected l2, ip, or cos)"
            ))),
        }
    }
}

/// SIMD-friendly chunk size for f32 loops. 8 × f32 = 256 bit = one AVX register.
const CHUNK_F32: usize = 8;

/// Squared Euclidean distance between two f32 slices.
#[allow(clippy::needless_range_loop)]
pub fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut chunk_acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let diff = a[base + j] - b[base + j];
            chunk_acc += diff * diff;
        }
        sum += chunk_acc as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        let diff = a[i] as f64 - b[i] as f64;
        sum += diff * diff;
    }

    sum as f32
}

/// Dot product between two f32 slices.
#[allow(clippy::needless_range_loop)]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut chunk_acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            chunk_acc += a[base + j] * b[base + j];
        }
        sum += chunk_acc as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        sum += a[i] as f64 * b[i] as f64;
    }

    sum as f32
}

/// Cosine similarity between two f32 slices. Returns 0 when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a) as f64;
    let norm_b = dot(b, b) as f64;
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot(a, b) as f64 / denom) as f32
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = (dot(v, v) as f64).sqrt();
    if norm < 1e-12 {
        return;
    }
    let inv = (1.0 / norm) as f32;
    for x in v.iter_mut() {
        *x *= inv;
    }
}
