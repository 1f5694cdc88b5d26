// Host value model: the binding's view of what the numeric host passes in.
// Arrays are column-major, matching the host's native layout; struct fields
// keep their insertion order.
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};

/// Dense column-major numeric array of `rows * cols` elements.
#[derive(Clone, Debug, PartialEq)]
pub struct NumArray<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> NumArray<T> {
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, Error> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
                "array data length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Borrow one column; columns are contiguous in column-major storage.
    pub fn column(&self, index: usize) -> &[T] {
        &self.data[index * self.rows..(index + 1) * self.rows]
    }

    pub fn scalar(&self) -> Option<&T> {
        if self.data.len() == 1 {
            self.data.first()
        } else {
            None
        }
    }
}

impl<T: Serialize> Serialize for NumArray<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("rows", &self.rows)?;
        map.serialize_entry("cols", &self.cols)?;
        map.serialize_entry("data", &self.data)?;
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NumArray<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr<T> {
            rows: usize,
            cols: usize,
            data: Vec<T>,
        }
        let repr = Repr::deserialize(deserializer)?;
        NumArray::new(repr.rows, repr.cols, repr.data).map_err(serde::de::Error::custom)
    }
}

/// Ordered struct fields. The host's record type is ordered and the
/// configuration flattener depends on visiting fields in that order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = Fields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a struct value object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    fields.push((name, value));
                }
                Ok(Fields(fields))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// One host value crossing the binding boundary.
///
/// Wire encoding is externally tagged JSON: `{"str": "cg"}`, `{"bool": true}`,
/// `{"double": {"rows": 3, "cols": 2, "data": [..]}}`, `{"uint64": {..}}`,
/// `{"struct": {"field": <value>, ..}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Bool(bool),
    Double(NumArray<f64>),
    Uint64(NumArray<u64>),
    Struct(Fields),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn scalar(value: f64) -> Self {
        Value::Double(NumArray {
            rows: 1,
            cols: 1,
            data: vec![value],
        })
    }

    pub fn uint64_scalar(value: u64) -> Self {
        Value::Uint64(NumArray {
            rows: 1,
            cols: 1,
            data: vec![value],
        })
    }

    /// N×1 column vector, the host-side shape for driver result vectors.
    pub fn column_vector(data: Vec<f64>) -> Self {
        Value::Double(NumArray {
            rows: data.len(),
            cols: 1,
            data,
        })
    }

    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, Error> {
        Ok(Value::Double(NumArray::new(rows, cols, data)?))
    }

    pub fn uint64_matrix(rows: usize, cols: usize, data: Vec<u64>) -> Result<Self, Error> {
        Ok(Value::Uint64(NumArray::new(rows, cols, data)?))
    }

    /// Host class name used in marshaling error messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "char",
            Value::Bool(_) => "logical",
            Value::Double(_) => "double",
            Value::Uint64(_) => "uint64",
            Value::Struct(_) => "struct",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Fields> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<&NumArray<f64>> {
        match self {
            Value::Double(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_uint64(&self) -> Option<&NumArray<u64>> {
        match self {
            Value::Uint64(array) => Some(array),
            _ => None,
        }
    }
}
