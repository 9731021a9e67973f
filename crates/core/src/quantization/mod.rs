//! Vector quantization for memory-efficient storage.
//!
//! Compresses prepared f32 vectors to 8-bit or 4-bit codes using
//! per-dimension min/max calibration fit once per index, with asymmetric
//! (f32 vs code) and symmetric (code vs code) distance kernels.

/// The fitted codec selected by `quantization_type`.
pub mod codec;
/// Scalar quantization: per-dimension min/scale calibration and distance kernels.
pub mod scalar;

pub use codec::{EncodedVector, VectorCodec};
pub use scalar::ScalarQuantizer;
