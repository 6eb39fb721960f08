use arrow::datatypes::DataType;

use crate::record::RecordError;

/// Scalar type of a registered annotation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `bool`
    Boolean,
    /// `i32`
    Int32,
    /// `i64`
    Int64,
    /// `u32`
    UInt32,
    /// `u64`
    UInt64,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
    /// UTF-8 string
    Utf8,
}

impl FieldType {
    /// Arrow column type used to persist this field.
    pub fn data_type(&self) -> DataType {
        match self {
            FieldType::Boolean => DataType::Boolean,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::UInt32 => DataType::UInt32,
            FieldType::UInt64 => DataType::UInt64,
            FieldType::Float32 => DataType::Float32,
            FieldType::Float64 => DataType::Float64,
            FieldType::Utf8 => DataType::Utf8,
        }
    }

    /// Inverse of [`FieldType::data_type`]; `None` for column types fields never use.
    pub fn from_data_type(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Boolean => FieldType::Boolean,
            DataType::Int32 => FieldType::Int32,
            DataType::Int64 => FieldType::Int64,
            DataType::UInt32 => FieldType::UInt32,
            DataType::UInt64 => FieldType::UInt64,
            DataType::Float32 => FieldType::Float32,
            DataType::Float64 => FieldType::Float64,
            DataType::Utf8 => FieldType::Utf8,
            _ => return None,
        })
    }
}

/// Typed value of an annotation field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// `bool`
    Boolean(bool),
    /// `i32`
    Int32(i32),
    /// `i64`
    Int64(i64),
    /// `u32`
    UInt32(u32),
    /// `u64`
    UInt64(u64),
    /// `f32`
    Float32(f32),
    /// `f64`
    Float64(f64),
    /// UTF-8 string
    Utf8(String),
}

impl FieldValue {
    /// Type tag of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Float32(_) => FieldType::Float32,
            FieldValue::Float64(_) => FieldType::Float64,
            FieldValue::Utf8(_) => FieldType::Utf8,
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Utf8(value.to_string())
    }
}

/// Name and type of one registered field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    field_type: FieldType,
}

impl FieldDef {
    /// Field name without the column prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared scalar type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

/// Annotation fields declared up front: typed extra fields plus boolean discard flags.
///
/// Records built against a registry store their values positionally, in registration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldRegistry {
    fields: Vec<FieldDef>,
    discard_fields: Vec<String>,
}

impl FieldRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed field.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Result<Self, RecordError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(RecordError::DuplicateField(name));
        }
        self.fields.push(FieldDef { name, field_type });
        Ok(self)
    }

    /// Register several fields sharing one type.
    pub fn with_fields<I, S>(mut self, names: I, field_type: FieldType) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.with_field(name, field_type)?;
        }
        Ok(self)
    }

    /// Register a field name that records may flag as discarded.
    pub fn with_discard_field(mut self, name: impl Into<String>) -> Result<Self, RecordError> {
        let name = name.into();
        if self.discard_position(&name).is_some() {
            return Err(RecordError::DuplicateField(name));
        }
        self.discard_fields.push(name);
        Ok(self)
    }

    /// Typed fields in registration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Discard-flag names in registration order.
    pub fn discard_fields(&self) -> &[String] {
        &self.discard_fields
    }

    /// Index of a typed field.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|def| def.name == name)
    }

    /// Index of a discard flag.
    pub fn discard_position(&self, name: &str) -> Option<usize> {
        self.discard_fields.iter().position(|field| field == name)
    }

    /// Declared type of a field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.position(name).map(|idx| self.fields[idx].field_type)
    }

    /// Whether neither typed fields nor discard flags are registered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.discard_fields.is_empty()
    }
}
