//! Model metadata advertised to the serving boundary.

use serde::{Deserialize, Serialize};

/// Datatype of every input and output series.
pub const FP64: &str = "FP64";

/// Name, datatype and shape of one tensor; `-1` marks a variable dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub name: String,
    pub datatype: String,
    pub shape: Vec<i64>,
}

impl TensorMetadata {
    /// Variable-length 1-D float64 series.
    pub fn fp64_series(name: &str) -> Self {
        Self {
            name: name.to_string(),
            datatype: FP64.to_string(),
            shape: vec![-1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub versions: Vec<String>,
    pub platform: String,
    pub inputs: Vec<TensorMetadata>,
    pub outputs: Vec<TensorMetadata>,
}
