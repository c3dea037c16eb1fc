// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! N-dimensional detector arrays.
//!
//! An [`NDArray`] is the unit of data delivered by an upstream port to plugins. Arrays
//! are built once by their producer and then published as a [`SharedArray`]
//! (`Arc<NDArray>`). After publication nobody mutates them: the payload is a
//! reference-counted [`Bytes`] buffer and every field is private behind getters.
//! A consumer that needs a modified array clones it (cheap, the payload is shared)
//! and uses the `with_*` builders on its own copy.
//!
//! Elements are stored little-endian. Typed access copies out through [`NDElement`]
//! so no unaligned reinterpretation of the byte buffer ever happens.

use bytes::{Bytes, BytesMut};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{NdKitError, Result};

/// An array shared between its producer and every plugin currently holding it.
///
/// Dropping the last handle frees the payload.
pub type SharedArray = Arc<NDArray>;

/// Element type of an array payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NDDataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl NDDataType {
    /// Size in bytes of one element.
    pub const fn element_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }
}

/// A Rust scalar type that can be stored in an [`NDArray`].
pub trait NDElement: Copy + Send + Sync + 'static {
    const DATA_TYPE: NDDataType;

    /// Appends the little-endian encoding of `self`.
    fn put_le(self, buf: &mut BytesMut);

    /// Decodes one element from exactly `size_of::<Self>()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! impl_nd_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NDElement for $ty {
                const DATA_TYPE: NDDataType = NDDataType::$variant;

                #[inline]
                fn put_le(self, buf: &mut BytesMut) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless, clippy::unnecessary_cast)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_nd_element! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

/// One dimension of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NDDimension {
    /// Number of elements along this dimension.
    pub size: usize,
    /// Offset of this region relative to the detector origin.
    pub offset: usize,
    /// Binning applied relative to the detector pixels.
    pub binning: usize,
    /// Whether the data along this dimension is reversed.
    pub reverse: bool,
}

impl NDDimension {
    pub const fn new(size: usize) -> Self {
        Self { size, offset: 0, binning: 1, reverse: false }
    }
}

/// A named metadata value attached to an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NDAttribute {
    pub name: String,
    pub description: String,
    pub value: serde_json::Value,
}

impl NDAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self { name: name.into(), description: String::new(), value: value.into() }
    }
}

/// Lightweight, serializable summary of an array (no payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NDArrayInfo {
    pub unique_id: u64,
    pub timestamp: f64,
    pub data_type: NDDataType,
    pub dims: Vec<usize>,
    pub total_bytes: usize,
}

/// An immutable, typed N-dimensional array with metadata.
#[derive(Debug, Clone)]
pub struct NDArray {
    unique_id: u64,
    timestamp: f64,
    wall_time: SystemTime,
    dims: SmallVec<[NDDimension; 3]>,
    data_type: NDDataType,
    data: Bytes,
    attributes: Vec<NDAttribute>,
}

impl NDArray {
    /// Creates an array from raw little-endian bytes.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if there are no dimensions, a dimension is
    /// zero, or the payload length does not match `product(dims) * element_size`.
    pub fn new(dims: &[usize], data_type: NDDataType, data: Bytes) -> Result<Self> {
        let expected = expected_bytes(dims, data_type)?;
        if data.len() != expected {
            return Err(NdKitError::Configuration(format!(
                "payload is {} bytes but dimensions {dims:?} of {data_type:?} need {expected}",
                data.len()
            )));
        }
        Ok(Self {
            unique_id: 0,
            timestamp: 0.0,
            wall_time: SystemTime::now(),
            dims: dims.iter().copied().map(NDDimension::new).collect(),
            data_type,
            data,
            attributes: Vec::new(),
        })
    }

    /// Creates an array by encoding a slice of typed elements.
    ///
    /// # Errors
    ///
    /// Same conditions as [`NDArray::new`].
    pub fn from_elements<T: NDElement>(dims: &[usize], values: &[T]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * T::DATA_TYPE.element_size());
        for value in values {
            value.put_le(&mut buf);
        }
        Self::new(dims, T::DATA_TYPE, buf.freeze())
    }

    /// Creates a zero-filled array.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` for empty or zero-sized dimensions.
    pub fn zeros(dims: &[usize], data_type: NDDataType) -> Result<Self> {
        let len = expected_bytes(dims, data_type)?;
        Self::new(dims, data_type, Bytes::from(vec![0u8; len]))
    }

    #[must_use]
    pub fn with_unique_id(mut self, unique_id: u64) -> Self {
        self.unique_id = unique_id;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_wall_time(mut self, wall_time: SystemTime) -> Self {
        self.wall_time = wall_time;
        self
    }

    /// Adds or replaces an attribute by name.
    #[must_use]
    pub fn with_attribute(mut self, attribute: NDAttribute) -> Self {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            *existing = attribute;
        } else {
            self.attributes.push(attribute);
        }
        self
    }

    /// Replaces the dimension descriptors, keeping the element count unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if the new dimensions describe a
    /// different number of elements.
    pub fn with_dimensions(mut self, dims: &[NDDimension]) -> Result<Self> {
        let sizes: SmallVec<[usize; 3]> = dims.iter().map(|d| d.size).collect();
        let expected = expected_bytes(&sizes, self.data_type)?;
        if expected != self.data.len() {
            return Err(NdKitError::Configuration(format!(
                "dimensions {sizes:?} do not match the {} byte payload",
                self.data.len()
            )));
        }
        self.dims = dims.iter().copied().collect();
        Ok(self)
    }

    /// Wraps the array for publication.
    pub fn into_shared(self) -> SharedArray {
        Arc::new(self)
    }

    pub const fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub const fn wall_time(&self) -> SystemTime {
        self.wall_time
    }

    pub const fn data_type(&self) -> NDDataType {
        self.data_type
    }

    pub fn dims(&self) -> &[NDDimension] {
        &self.dims
    }

    /// Sizes of each dimension, fastest varying first.
    pub fn sizes(&self) -> SmallVec<[usize; 3]> {
        self.dims.iter().map(|d| d.size).collect()
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().map(|d| d.size).product()
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// Raw little-endian payload. Cloning the returned `Bytes` shares the buffer.
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn attributes(&self) -> &[NDAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&NDAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Decodes the payload as `T`. Returns `None` if the element type differs.
    pub fn to_vec<T: NDElement>(&self) -> Option<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return None;
        }
        let size = self.data_type.element_size();
        Some(self.data.chunks_exact(size).map(T::read_le).collect())
    }

    /// Decodes the payload as `f64`, whatever the element type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        fn decode<T: NDElement>(data: &[u8]) -> Vec<f64> {
            data.chunks_exact(std::mem::size_of::<T>()).map(|c| T::read_le(c).to_f64()).collect()
        }

        match self.data_type {
            NDDataType::Int8 => decode::<i8>(&self.data),
            NDDataType::UInt8 => decode::<u8>(&self.data),
            NDDataType::Int16 => decode::<i16>(&self.data),
            NDDataType::UInt16 => decode::<u16>(&self.data),
            NDDataType::Int32 => decode::<i32>(&self.data),
            NDDataType::UInt32 => decode::<u32>(&self.data),
            NDDataType::Int64 => decode::<i64>(&self.data),
            NDDataType::UInt64 => decode::<u64>(&self.data),
            NDDataType::Float32 => decode::<f32>(&self.data),
            NDDataType::Float64 => decode::<f64>(&self.data),
        }
    }

    pub fn info(&self) -> NDArrayInfo {
        NDArrayInfo {
            unique_id: self.unique_id,
            timestamp: self.timestamp,
            data_type: self.data_type,
            dims: self.sizes().to_vec(),
            total_bytes: self.data.len(),
        }
    }
}

fn expected_bytes(dims: &[usize], data_type: NDDataType) -> Result<usize> {
    if dims.is_empty() {
        return Err(NdKitError::Configuration("array must have at least one dimension".into()));
    }
    if dims.contains(&0) {
        return Err(NdKitError::Configuration(format!("zero-sized dimension in {dims:?}")));
    }
    dims.iter()
        .try_fold(data_type.element_size(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NdKitError::Configuration(format!("dimensions {dims:?} overflow")))
}
