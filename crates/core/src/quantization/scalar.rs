//! Scalar quantization with per-dimension min/max calibration.
//!
//! The quantizer is fit once over a build corpus: every dimension keeps its
//! observed minimum and a step `scale = (max - min) / levels`. Components are
//! stored as `round((v - min) / scale)` clamped to `[0, levels]`, so the
//! reconstruction error of a component inside the fit range is at most
//! `scale / 2`. Values outside the fit range are clamped.
//!
//! 8-bit codes take one byte per dimension. 4-bit codes are packed two per
//! byte, low nibble first.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// SIMD-friendly chunk size for f32 loops. 8 × f32 = 256 bit = one AVX register.
const CHUNK_F32: usize = 8;

/// Per-dimension affine quantizer at 4 or 8 bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarQuantizer {
    bits: u8,
    min: Vec<f32>,
    scale: Vec<f32>,
}

impl ScalarQuantizer {
    /// Fit per-dimension min/max over `rows`. Every row must have `dimension` components.
    ///
    /// Constant dimensions get `scale == 0` and decode to their single value.
    pub fn fit<'a, I>(bits: u8, dimension: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        if bits != 4 && bits != 8 {
            return Err(Error::Configuration(format!(
                "scalar quantization supports 4 or 8 bits, got {bits}"
            )));
        }
        let mut min = vec![f32::MAX; dimension];
        let mut max = vec![f32::MIN; dimension];
        let mut seen = false;
        for row in rows {
            if row.len() != dimension {
                return Err(Error::Validation(format!(
                    "quantizer fit row has {} components, expected {dimension}",
                    row.len()
                )));
            }
            seen = true;
            for (d, &v) in row.iter().enumerate() {
                if v < min[d] {
                    min[d] = v;
                }
                if v > max[d] {
                    max[d] = v;
                }
            }
        }
        if !seen {
            min.fill(0.0);
            max.fill(0.0);
        }

        let levels = Self::levels_for(bits);
        let scale = min
            .iter()
            .zip(&max)
            .map(|(&lo, &hi)| {
                let range = hi - lo;
                if range < f32::EPSILON {
                    0.0
                } else {
                    range / levels
                }
            })
            .collect();

        Ok(Self { bits, min, scale })
    }

    fn levels_for(bits: u8) -> f32 {
        ((1u32 << bits) - 1) as f32
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    /// Bytes per encoded vector.
    pub fn code_len(&self) -> usize {
        if self.bits == 8 {
            self.dimension()
        } else {
            self.dimension().div_ceil(2)
        }
    }

    /// Largest per-component reconstruction error inside the fit range.
    pub fn max_error(&self) -> f32 {
        self.scale.iter().fold(0.0f32, |acc, &s| acc.max(s / 2.0))
    }

    #[inline]
    fn quantize_component(&self, d: usize, v: f32) -> u8 {
        let s = self.scale[d];
        if s == 0.0 {
            return 0;
        }
        ((v - self.min[d]) / s)
            .round()
            .clamp(0.0, Self::levels_for(self.bits)) as u8
    }

    #[inline]
    fn code_at(&self, codes: &[u8], d: usize) -> u8 {
        if self.bits == 8 {
            codes[d]
        } else {
            let byte = codes[d / 2];
            if d % 2 == 0 {
                byte & 0x0F
            } else {
                byte >> 4
            }
        }
    }

    #[inline]
    fn reconstruct(&self, codes: &[u8], d: usize) -> f32 {
        self.min[d] + self.code_at(codes, d) as f32 * self.scale[d]
    }

    /// Append the code of `v` to `out`.
    pub fn encode_into(&self, v: &[f32], out: &mut Vec<u8>) {
        debug_assert_eq!(v.len(), self.dimension());
        if self.bits == 8 {
            out.extend(v.iter().enumerate().map(|(d, &x)| self.quantize_component(d, x)));
        } else {
            for (pair_idx, pair) in v.chunks(2).enumerate() {
                let d = pair_idx * 2;
                let lo = self.quantize_component(d, pair[0]);
                let hi = pair
                    .get(1)
                    .map_or(0, |&x| self.quantize_component(d + 1, x));
                out.push(lo | (hi << 4));
            }
        }
    }

    pub fn encode(&self, v: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code_len());
        self.encode_into(v, &mut out);
        out
    }

    /// Reconstruct an approximate vector into `out`. Lossy.
    pub fn decode_into(&self, codes: &[u8], out: &mut [f32]) {
        debug_assert_eq!(codes.len(), self.code_len());
        for (d, slot) in out.iter_mut().enumerate() {
            *slot = self.reconstruct(codes, d);
        }
    }

    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dimension()];
        self.decode_into(codes, &mut out);
        out
    }

    /// Asymmetric squared Euclidean distance: f32 query vs stored code.
    #[allow(clippy::needless_range_loop)]
    pub fn l2_sq_asym(&self, query: &[f32], codes: &[u8]) -> f32 {
        debug_assert_eq!(query.len(), self.dimension());
        let len = query.len();
        let mut sum = 0.0f64;

        let full_chunks = len / CHUNK_F32;
        for c in 0..full_chunks {
            let base = c * CHUNK_F32;
            let mut chunk_acc = 0.0f32;
            for j in 0..CHUNK_F32 {
                let diff = query[base + j] - self.reconstruct(codes, base + j);
                chunk_acc += diff * diff;
            }
            sum += chunk_acc as f64;
        }

        for d in (full_chunks * CHUNK_F32)..len {
            let diff = query[d] as f64 - self.reconstruct(codes, d) as f64;
            sum += diff * diff;
        }

        sum as f32
    }

    /// Asymmetric dot product: f32 query vs stored code.
    #[allow(clippy::needless_range_loop)]
    pub fn dot_asym(&self, query: &[f32], codes: &[u8]) -> f32 {
        debug_assert_eq!(query.len(), self.dimension());
        let len = query.len();
        let mut sum = 0.0f64;

        let full_chunks = len / CHUNK_F32;
        for c in 0..full_chunks {
            let base = c * CHUNK_F32;
            let mut chunk_acc = 0.0f32;
            for j in 0..CHUNK_F32 {
                chunk_acc += query[base + j] * self.reconstruct(codes, base + j);
            }
            sum += chunk_acc as f64;
        }

        for d in (full_chunks * CHUNK_F32)..len {
            sum += query[d] as f64 * self.reconstruct(codes, d) as f64;
        }

        sum as f32
    }

    /// Symmetric squared Euclidean distance between two codes.
    ///
    /// The per-dimension offset cancels, so only `scale * (ca - cb)` is summed.
    pub fn l2_sq_sym(&self, a: &[u8], b: &[u8]) -> f32 {
        let mut sum = 0.0f64;
        for d in 0..self.dimension() {
            let diff = (self.code_at(a, d) as i32 - self.code_at(b, d) as i32) as f32
                * self.scale[d];
            sum += (diff * diff) as f64;
        }
        sum as f32
    }

    /// Symmetric dot product between two codes.
    pub fn dot_sym(&self, a: &[u8], b: &[u8]) -> f32 {
        let mut sum = 0.0f64;
        for d in 0..self.dimension() {
            sum += self.reconstruct(a, d) as f64 * self.reconstruct(b, d) as f64;
        }
        sum as f32
    }

    /// Whether every component of `v` lies inside the fit range, give or take
    /// half a step. Outside it codes clamp and the error bound no longer holds.
    pub fn covers(&self, v: &[f32]) -> bool {
        let levels = Self::levels_for(self.bits);
        v.iter()
            .zip(self.min.iter().zip(&self.scale))
            .all(|(&x, (&lo, &s))| {
                let slack = (s * 0.5).max(1e-6 * (1.0 + lo.abs()));
                x >= lo - slack && x <= lo + s * levels + slack
            })
    }

    /// Structural checks after deserialization.
    pub fn validate(&self, dimension: usize) -> std::result::Result<(), String> {
        if self.bits != 4 && self.bits != 8 {
            return Err(format!("quantizer bits {} not in {{4, 8}}", self.bits));
        }
        if self.min.len() != dimension || self.scale.len() != dimension {
            return Err(format!(
                "quantizer parameters cover {}/{} dimensions, expected {dimension}",
                self.min.len(),
                self.scale.len()
            ));
        }
        if self
            .min
            .iter()
            .chain(&self.scale)
            .any(|x| !x.is_finite())
            || self.scale.iter().any(|&s| s < 0.0)
        {
            return Err("quantizer parameters contain invalid values".to_string());
        }
        Ok(())
    }
}
