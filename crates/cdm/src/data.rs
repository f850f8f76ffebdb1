//! Typed data buffers.
//!
//! A [`Data`] buffer holds the values of one variable (or one slice of it) in
//! row-major order: the first dimension varies slowest. Arithmetic is done on
//! the `f64`/`f32` bulk views; element writes convert back into the storage
//! type.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};

use crate::error::{CdmError, Result};

/// Element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Int64,
    Float,
    Double,
}

impl DataType {
    /// Get the type name as used in CDM metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::UByte => "ubyte",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Size of one element in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Byte | Self::UByte => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Int64 | Self::Double => 8,
        }
    }

    /// Whether this is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// The netCDF default fill value for this type.
    pub fn default_fill_value(&self) -> f64 {
        match self {
            Self::Byte => -127.0,
            Self::UByte => 255.0,
            Self::Short => -32767.0,
            Self::UShort => 65535.0,
            Self::Int => -2147483647.0,
            Self::UInt => 4294967295.0,
            Self::Int64 => -9223372036854775806.0,
            Self::Float => 9.969_209_968_386_869e36,
            Self::Double => 9.969_209_968_386_869e36,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sized, typed array of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Byte(Vec<i8>),
    UByte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

macro_rules! dispatch {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            Data::Byte($v) => $body,
            Data::UByte($v) => $body,
            Data::Short($v) => $body,
            Data::UShort($v) => $body,
            Data::Int($v) => $body,
            Data::UInt($v) => $body,
            Data::Int64($v) => $body,
            Data::Float($v) => $body,
            Data::Double($v) => $body,
        }
    };
}

macro_rules! rebuild {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            Data::Byte($v) => Data::Byte($body),
            Data::UByte($v) => Data::UByte($body),
            Data::Short($v) => Data::Short($body),
            Data::UShort($v) => Data::UShort($body),
            Data::Int($v) => Data::Int($body),
            Data::UInt($v) => Data::UInt($body),
            Data::Int64($v) => Data::Int64($body),
            Data::Float($v) => Data::Float($body),
            Data::Double($v) => Data::Double($body),
        }
    };
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for Data {
                fn from(values: Vec<$ty>) -> Self {
                    Data::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => Byte,
    u8 => UByte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
);

/// Cast a double into a storage type; values that do not fit (NaN into an
/// integer, overflow) become the type's zero.
fn cast_from_f64<T: NumCast + Default>(value: f64) -> T {
    <T as NumCast>::from(value).unwrap_or_default()
}

fn to_f64<T: NumCast + Copy>(value: T) -> f64 {
    <f64 as NumCast>::from(value).unwrap_or(f64::NAN)
}

impl Data {
    /// Create a buffer of `size` elements, all set to `fill`.
    pub fn new(data_type: DataType, size: usize, fill: f64) -> Self {
        match data_type {
            DataType::Byte => Data::Byte(vec![cast_from_f64(fill); size]),
            DataType::UByte => Data::UByte(vec![cast_from_f64(fill); size]),
            DataType::Short => Data::Short(vec![cast_from_f64(fill); size]),
            DataType::UShort => Data::UShort(vec![cast_from_f64(fill); size]),
            DataType::Int => Data::Int(vec![cast_from_f64(fill); size]),
            DataType::UInt => Data::UInt(vec![cast_from_f64(fill); size]),
            DataType::Int64 => Data::Int64(vec![cast_from_f64(fill); size]),
            DataType::Float => Data::Float(vec![fill as f32; size]),
            DataType::Double => Data::Double(vec![fill; size]),
        }
    }

    /// Create an empty buffer.
    pub fn empty(data_type: DataType) -> Self {
        Self::new(data_type, 0, 0.0)
    }

    /// Create a buffer of the given type from double values.
    pub fn from_f64(data_type: DataType, values: &[f64]) -> Self {
        let mut data = Self::new(data_type, values.len(), 0.0);
        for (i, v) in values.iter().enumerate() {
            data.set_unchecked(i, *v);
        }
        data
    }

    /// Element type of this buffer.
    pub fn data_type(&self) -> DataType {
        match self {
            Data::Byte(_) => DataType::Byte,
            Data::UByte(_) => DataType::UByte,
            Data::Short(_) => DataType::Short,
            Data::UShort(_) => DataType::UShort,
            Data::Int(_) => DataType::Int,
            Data::UInt(_) => DataType::UInt,
            Data::Int64(_) => DataType::Int64,
            Data::Float(_) => DataType::Float,
            Data::Double(_) => DataType::Double,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    /// Check if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a single element as double.
    pub fn get(&self, index: usize) -> Option<f64> {
        dispatch!(self, v => v.get(index).map(|x| to_f64(*x)))
    }

    /// Set a single element, converting into the storage type.
    pub fn set(&mut self, index: usize, value: f64) -> Result<()> {
        if index >= self.len() {
            return Err(CdmError::out_of_bounds(format!(
                "element {} of buffer with {} elements",
                index,
                self.len()
            )));
        }
        self.set_unchecked(index, value);
        Ok(())
    }

    fn set_unchecked(&mut self, index: usize, value: f64) {
        match self {
            Data::Byte(v) => v[index] = cast_from_f64(value),
            Data::UByte(v) => v[index] = cast_from_f64(value),
            Data::Short(v) => v[index] = cast_from_f64(value),
            Data::UShort(v) => v[index] = cast_from_f64(value),
            Data::Int(v) => v[index] = cast_from_f64(value),
            Data::UInt(v) => v[index] = cast_from_f64(value),
            Data::Int64(v) => v[index] = cast_from_f64(value),
            Data::Float(v) => v[index] = value as f32,
            Data::Double(v) => v[index] = value,
        }
    }

    /// Bulk view as doubles.
    pub fn as_f64(&self) -> Vec<f64> {
        dispatch!(self, v => v.iter().map(|x| to_f64(*x)).collect())
    }

    /// Bulk view as floats.
    pub fn as_f32(&self) -> Vec<f32> {
        match self {
            Data::Float(v) => v.clone(),
            _ => self.as_f64().into_iter().map(|x| x as f32).collect(),
        }
    }

    /// Copy all values of `other` into this buffer starting at `pos`.
    pub fn set_values(&mut self, pos: usize, other: &Data) -> Result<()> {
        if pos + other.len() > self.len() {
            return Err(CdmError::out_of_bounds(format!(
                "cannot place {} values at {} in buffer of {}",
                other.len(),
                pos,
                self.len()
            )));
        }
        if self.data_type() == other.data_type() {
            match (self, other) {
                (Data::Byte(dst), Data::Byte(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::UByte(dst), Data::UByte(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::Short(dst), Data::Short(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::UShort(dst), Data::UShort(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::Int(dst), Data::Int(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::UInt(dst), Data::UInt(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::Int64(dst), Data::Int64(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::Float(dst), Data::Float(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                (Data::Double(dst), Data::Double(src)) => dst[pos..pos + src.len()].copy_from_slice(src),
                _ => unreachable!("data types compared equal"),
            }
        } else {
            for (i, v) in other.as_f64().into_iter().enumerate() {
                self.set_unchecked(pos + i, v);
            }
        }
        Ok(())
    }

    /// Convert into another element type.
    pub fn convert(&self, data_type: DataType) -> Data {
        if self.data_type() == data_type {
            return self.clone();
        }
        Data::from_f64(data_type, &self.as_f64())
    }

    /// Cut a hyper-rectangle out of this buffer.
    ///
    /// `max_sizes` is the shape of the buffer, `starts` and `sizes` describe
    /// the sub-region per dimension. The result has `product(sizes)` elements.
    pub fn slice(&self, max_sizes: &[usize], starts: &[usize], sizes: &[usize]) -> Result<Data> {
        if max_sizes.len() != starts.len() || max_sizes.len() != sizes.len() {
            return Err(CdmError::shape_mismatch(format!(
                "slice rank mismatch: max {:?}, starts {:?}, sizes {:?}",
                max_sizes, starts, sizes
            )));
        }
        let total: usize = max_sizes.iter().product();
        if total != self.len() {
            return Err(CdmError::shape_mismatch(format!(
                "buffer of {} elements does not match shape {:?}",
                self.len(),
                max_sizes
            )));
        }
        for i in 0..max_sizes.len() {
            if starts[i] + sizes[i] > max_sizes[i] {
                return Err(CdmError::out_of_bounds(format!(
                    "slice start {} size {} exceeds dimension of {}",
                    starts[i], sizes[i], max_sizes[i]
                )));
            }
        }
        Ok(rebuild!(self, v => slice_values(v, max_sizes, starts, sizes)))
    }

    /// Serialize the values big-endian.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len() * self.data_type().byte_size());
        match self {
            Data::Byte(v) => v.iter().for_each(|x| buf.put_i8(*x)),
            Data::UByte(v) => buf.put_slice(v),
            Data::Short(v) => v.iter().for_each(|x| buf.put_i16(*x)),
            Data::UShort(v) => v.iter().for_each(|x| buf.put_u16(*x)),
            Data::Int(v) => v.iter().for_each(|x| buf.put_i32(*x)),
            Data::UInt(v) => v.iter().for_each(|x| buf.put_u32(*x)),
            Data::Int64(v) => v.iter().for_each(|x| buf.put_i64(*x)),
            Data::Float(v) => v.iter().for_each(|x| buf.put_f32(*x)),
            Data::Double(v) => v.iter().for_each(|x| buf.put_f64(*x)),
        }
        buf.freeze()
    }

    /// Stream the values big-endian into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }
}

/// Row-major hyper-rectangle copy; the innermost dimension is copied as a run.
fn slice_values<T: Copy>(src: &[T], max_sizes: &[usize], starts: &[usize], sizes: &[usize]) -> Vec<T> {
    let total: usize = sizes.iter().product();
    let mut out = Vec::with_capacity(total);
    if total == 0 {
        return out;
    }
    let rank = max_sizes.len();
    if rank == 0 {
        out.extend_from_slice(&src[..1]);
        return out;
    }

    let mut strides = vec![1usize; rank];
    for d in (0..rank - 1).rev() {
        strides[d] = strides[d + 1] * max_sizes[d + 1];
    }

    let run = sizes[rank - 1];
    let mut counter = vec![0usize; rank - 1];
    loop {
        let mut offset = starts[rank - 1];
        for d in 0..rank - 1 {
            offset += (starts[d] + counter[d]) * strides[d];
        }
        out.extend_from_slice(&src[offset..offset + run]);

        // advance the outer counters, last outer dimension fastest
        let mut d = rank - 1;
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            counter[d] += 1;
            if counter[d] < sizes[d] {
                break;
            }
            counter[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filled() {
        let data = Data::new(DataType::Short, 4, -1.0);
        assert_eq!(data, Data::Short(vec![-1; 4]));
        assert_eq!(data.data_type(), DataType::Short);
    }

    #[test]
    fn test_nan_fill_into_integer_is_zero() {
        let data = Data::new(DataType::Int, 2, f64::NAN);
        assert_eq!(data, Data::Int(vec![0, 0]));
    }

    #[test]
    fn test_slice_2d() {
        // 3 rows x 4 columns: value = row * 10 + col
        let values: Vec<f64> = (0..3)
            .flat_map(|r| (0..4).map(move |c| (r * 10 + c) as f64))
            .collect();
        let data = Data::from(values);
        let sliced = data.slice(&[3, 4], &[1, 1], &[2, 2]).unwrap();
        assert_eq!(sliced.as_f64(), vec![11.0, 12.0, 21.0, 22.0]);
    }

    #[test]
    fn test_slice_3d_size() {
        let data = Data::from((0..24).map(|x| x as i32).collect::<Vec<_>>());
        let sliced = data.slice(&[2, 3, 4], &[1, 0, 2], &[1, 3, 2]).unwrap();
        assert_eq!(sliced.len(), 6);
        assert_eq!(sliced.as_f64(), vec![14.0, 15.0, 18.0, 19.0, 22.0, 23.0]);
    }

    #[test]
    fn test_slice_zero_size() {
        let data = Data::from(vec![1.0f32, 2.0, 3.0]);
        let sliced = data.slice(&[3], &[1], &[0]).unwrap();
        assert!(sliced.is_empty());
        assert_eq!(sliced.data_type(), DataType::Float);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let data = Data::from(vec![1.0f32, 2.0, 3.0]);
        assert!(matches!(
            data.slice(&[3], &[2], &[2]),
            Err(CdmError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_set_values_converts_type() {
        let mut dst = Data::new(DataType::Int, 4, 0.0);
        dst.set_values(1, &Data::from(vec![2.0f64, 3.0])).unwrap();
        assert_eq!(dst, Data::Int(vec![0, 2, 3, 0]));
    }

    #[test]
    fn test_to_bytes_big_endian() {
        let data = Data::from(vec![1i16, 258]);
        assert_eq!(data.to_bytes().as_ref(), &[0, 1, 1, 2]);
    }
}
