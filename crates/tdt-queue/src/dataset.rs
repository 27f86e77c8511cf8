// Copyright 2025 TDT Queue Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tensor datasets carried over channels
//!
//! New-protocol queues carry a [`Dataset`] as one bincode buffer. The legacy
//! transport carries each item with its shape as `"[d0,d1,...]"` and its
//! dtype as a name.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::legacy::{LegacyItem, LegacyItemKind};

/// Most dimensions a tensor item may declare
pub const MAX_DIM_COUNT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Tensor,
    EndOfSequence,
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int8,
    Uint8,
    Float16,
    Int16,
    Uint16,
    Float32,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float64,
    String,
    Undefined,
}

impl DataType {
    /// Name used on the legacy wire
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
            DataType::Float16 => "half",
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Float32 => "float",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Int64 => "int64",
            DataType::Uint64 => "uint64",
            DataType::Float64 => "double",
            DataType::String => "string",
            DataType::Undefined => "",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => DataType::Bool,
            "int8" => DataType::Int8,
            "uint8" => DataType::Uint8,
            "half" => DataType::Float16,
            "int16" => DataType::Int16,
            "uint16" => DataType::Uint16,
            "float" => DataType::Float32,
            "int32" => DataType::Int32,
            "uint32" => DataType::Uint32,
            "int64" => DataType::Int64,
            "uint64" => DataType::Uint64,
            "double" => DataType::Float64,
            "string" => DataType::String,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    kind: ItemKind,
    dims: Vec<i64>,
    data_type: DataType,
    data: Vec<u8>,
}

impl DataItem {
    pub fn tensor(dims: Vec<i64>, data_type: DataType, data: Vec<u8>) -> Result<Self> {
        if dims.len() > MAX_DIM_COUNT {
            return Err(QueueError::InvalidArgument(format!(
                "{} dims exceeds the limit of {}",
                dims.len(),
                MAX_DIM_COUNT
            )));
        }
        if data_type == DataType::Undefined {
            return Err(QueueError::InvalidArgument(
                "tensor items need a concrete data type".to_string(),
            ));
        }
        Ok(Self {
            kind: ItemKind::Tensor,
            dims,
            data_type,
            data,
        })
    }

    pub fn end_of_sequence() -> Self {
        Self::marker(ItemKind::EndOfSequence)
    }

    pub fn abnormal() -> Self {
        Self::marker(ItemKind::Abnormal)
    }

    fn marker(kind: ItemKind) -> Self {
        Self {
            kind,
            dims: Vec::new(),
            data_type: DataType::Undefined,
            data: Vec::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_legacy(&self) -> LegacyItem {
        match self.kind {
            ItemKind::Tensor => LegacyItem {
                kind: LegacyItemKind::Tensor,
                tensor_shape: format_shape(&self.dims),
                tensor_type: self.data_type.name().to_string(),
                data: self.data.clone(),
            },
            ItemKind::EndOfSequence | ItemKind::Abnormal => LegacyItem {
                kind: if self.kind == ItemKind::EndOfSequence {
                    LegacyItemKind::EndOfSequence
                } else {
                    LegacyItemKind::Abnormal
                },
                tensor_shape: String::new(),
                tensor_type: String::new(),
                data: Vec::new(),
            },
        }
    }

    pub fn from_legacy(item: &LegacyItem) -> Result<Self> {
        match item.kind {
            LegacyItemKind::Tensor => {
                let data_type = DataType::from_name(&item.tensor_type).ok_or_else(|| {
                    QueueError::Codec(format!("unknown tensor type '{}'", item.tensor_type))
                })?;
                let dims = parse_shape(&item.tensor_shape)?;
                DataItem::tensor(dims, data_type, item.data.clone())
            }
            LegacyItemKind::EndOfSequence => Ok(DataItem::end_of_sequence()),
            LegacyItemKind::Abnormal => Ok(DataItem::abnormal()),
        }
    }
}

/// Ordered collection of items sent as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    items: Vec<DataItem>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: DataItem) {
        self.items.push(item);
    }

    pub fn get(&self, index: usize) -> Option<&DataItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataItem> {
        self.items.iter()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn to_legacy(&self) -> Vec<LegacyItem> {
        self.items.iter().map(DataItem::to_legacy).collect()
    }

    pub fn from_legacy(items: &[LegacyItem]) -> Result<Self> {
        Ok(Self {
            items: items.iter().map(DataItem::from_legacy).collect::<Result<_>>()?,
        })
    }
}

impl FromIterator<DataItem> for Dataset {
    fn from_iter<T: IntoIterator<Item = DataItem>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

pub fn format_shape(dims: &[i64]) -> String {
    let joined = dims.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("[{}]", joined)
}

/// Parse `"[d0, d1, ...]"`; whitespace is ignored, `"[]"` is a scalar
pub fn parse_shape(shape: &str) -> Result<Vec<i64>> {
    let compact: String = shape.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| QueueError::Codec(format!("tensor shape '{}' is not bracketed", shape)))?;
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let dims = inner
        .split(',')
        .map(|dim| {
            dim.parse::<i64>()
                .map_err(|_| QueueError::Codec(format!("bad dimension '{}' in shape '{}'", dim, shape)))
        })
        .collect::<Result<Vec<_>>>()?;
    if dims.len() > MAX_DIM_COUNT {
        return Err(QueueError::Codec(format!("shape '{}' has too many dims", shape)));
    }
    Ok(dims)
}
