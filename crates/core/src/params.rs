//! Creation parameters shared by indices and collections.
//!
//! [`IndexParams`] is validated once when a handle is created and is immutable
//! afterwards; it is persisted verbatim inside the schema descriptor.

use crate::config;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vector compression applied by the codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationType {
    /// Raw f32 storage, no loss.
    #[default]
    None,
    /// 8-bit scalar quantization with per-dimension min/max.
    Sq8,
    /// 4-bit scalar quantization with per-dimension min/max, two codes per byte.
    Sq4,
}

impl QuantizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantizationType::None => "none",
            QuantizationType::Sq8 => "sq8",
            QuantizationType::Sq4 => "sq4",
        }
    }

    pub fn is_quantized(&self) -> bool {
        *self != QuantizationType::None
    }
}

impl FromStr for QuantizationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(QuantizationType::None),
            "sq8" => Ok(QuantizationType::Sq8),
            "sq4" => Ok(QuantizationType::Sq4),
            other => Err(Error::Configuration(format!(
                "unsupported quantization type '{other}' (expected none, sq8, or sq4)"
            ))),
        }
    }
}

/// Graph topology built by `fit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Single sparse navigable graph, neighbors kept only when they pass the diversity rule.
    #[default]
    Nsg,
    /// Denser graph over quantized codes with raw-vector re-ranking of the final candidates.
    Fusion,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Nsg => "nsg",
            IndexType::Fusion => "fusion",
        }
    }
}

impl FromStr for IndexType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nsg" => Ok(IndexType::Nsg),
            "fusion" => Ok(IndexType::Fusion),
            other => Err(Error::Configuration(format!(
                "unsupported index type '{other}' (expected nsg or fusion)"
            ))),
        }
    }
}

/// Declared width of node ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    #[default]
    Uint32,
    Uint64,
}

impl IdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Uint32 => "uint32",
            IdType::Uint64 => "uint64",
        }
    }
}

impl FromStr for IdType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uint32" | "u32" => Ok(IdType::Uint32),
            "uint64" | "u64" => Ok(IdType::Uint64),
            other => Err(Error::Configuration(format!(
                "unsupported id type '{other}' (expected uint32 or uint64)"
            ))),
        }
    }
}

/// Element type of the vectors a handle accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Float32,
    Int8,
    Uint8,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(DataType::Float32),
            "int8" | "i8" => Ok(DataType::Int8),
            "uint8" | "u8" => Ok(DataType::Uint8),
            other => Err(Error::Configuration(format!(
                "unsupported data type '{other}' (expected float32, int8, or uint8)"
            ))),
        }
    }
}

macro_rules! impl_display_via_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_via_as_str!(QuantizationType, IndexType, IdType, DataType);

/// Options accepted by `create_index` / `create_collection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub metric: DistanceMetric,
    pub quantization_type: QuantizationType,
    pub index_type: IndexType,
    /// Upper bound on the adjacency list size of every node.
    pub max_nbrs: usize,
    pub id_type: IdType,
    pub data_type: DataType,
    /// Candidate list size used while inserting nodes.
    pub ef_construction: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::default(),
            quantization_type: QuantizationType::default(),
            index_type: IndexType::default(),
            max_nbrs: config::DEFAULT_MAX_NBRS,
            id_type: IdType::default(),
            data_type: DataType::default(),
            ef_construction: config::DEFAULT_EF_CONSTRUCTION,
        }
    }
}

impl IndexParams {
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_quantization(mut self, quantization_type: QuantizationType) -> Self {
        self.quantization_type = quantization_type;
        self
    }

    pub fn with_index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    pub fn with_max_nbrs(mut self, max_nbrs: usize) -> Self {
        self.max_nbrs = max_nbrs;
        self
    }

    pub fn with_id_type(mut self, id_type: IdType) -> Self {
        self.id_type = id_type;
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Reject out-of-range bounds and unsupported combinations.
    pub fn validate(&self) -> Result<()> {
        if self.max_nbrs < config::MIN_MAX_NBRS || self.max_nbrs > config::MAX_NBRS_CEILING {
            return Err(Error::Configuration(format!(
                "max_nbrs {} out of range [{}, {}]",
                self.max_nbrs,
                config::MIN_MAX_NBRS,
                config::MAX_NBRS_CEILING
            )));
        }
        if self.ef_construction == 0 {
            return Err(Error::Configuration(
                "ef_construction must be greater than 0".to_string(),
            ));
        }
        if self.index_type == IndexType::Fusion && !self.quantization_type.is_quantized() {
            return Err(Error::Configuration(
                "fusion index requires sq8 or sq4 quantization for its coarse layer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate an index or collection name: non-empty, bounded, one path component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Configuration("name must not be empty".to_string()));
    }
    if name.len() > config::MAX_NAME_LEN {
        return Err(Error::Configuration(format!(
            "name exceeds {} bytes",
            config::MAX_NAME_LEN
        )));
    }
    if name.starts_with('.') {
        return Err(Error::Configuration(format!(
            "name '{name}' must not start with '.'"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(Error::Configuration(format!(
            "name '{name}' must be a single path component"
        )));
    }
    Ok(())
}
