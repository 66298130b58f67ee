use std::collections::BTreeMap;

use prost::encoding::WireType;

/// Scalar field types.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool => WireType::Varint,
            Self::Fixed32 | Self::Sfixed32 | Self::Float => WireType::ThirtyTwoBit,
            Self::Fixed64 | Self::Sfixed64 | Self::Double => WireType::SixtyFourBit,
            Self::String | Self::Bytes => WireType::LengthDelimited,
        }
    }

    /// 64 bit integers, affected by [LongShape](crate::LongShape).
    pub fn is_long(&self) -> bool {
        matches!(
            self,
            Self::Int64 | Self::Uint64 | Self::Sint64 | Self::Fixed64 | Self::Sfixed64
        )
    }

    /// Whether repeated values of this kind may be packed.
    pub fn is_packable(&self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// Whether this kind may key a map.
    pub fn is_map_key(&self) -> bool {
        !matches!(self, Self::Double | Self::Float | Self::Bytes)
    }
}

/// The type of a field, with enum and message references fully qualified.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FieldType {
    Scalar(ScalarKind),
    Enum(String),
    Message(String),
    Map {
        key: ScalarKind,
        value: Box<FieldType>,
    },
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub tag: u32,
    pub label: Label,
    pub field_type: FieldType,
    /// The oneof this field is a member of.
    pub oneof: Option<String>,
    /// Encode repeated scalars packed.
    pub packed: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, tag: u32, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            tag,
            label: Label::Optional,
            field_type,
            oneof: None,
            packed: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.label = Label::Required;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    pub fn is_required(&self) -> bool {
        self.label == Label::Required
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_map(&self) -> bool {
        matches!(self.field_type, FieldType::Map { .. })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OneofDescriptor {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MessageDescriptor {
    /// Fully qualified name, e.g. `binlog.BinLog`.
    pub name: String,
    /// Sorted by tag.
    pub fields: Vec<FieldDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>, mut fields: Vec<FieldDescriptor>) -> Self {
        fields.sort_by_key(|field| field.tag);
        Self {
            name: name.into(),
            fields,
            oneofs: Vec::new(),
        }
    }

    /// Group `fields` in to a oneof called `name`.
    pub fn with_oneof(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        let name = name.into();
        for field in self.fields.iter_mut() {
            if fields.contains(&field.name.as_str()) {
                field.oneof = Some(name.clone());
            }
        }
        self.oneofs.push(OneofDescriptor {
            name,
            fields: fields.iter().map(|field| field.to_string()).collect(),
        });
        self
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&FieldDescriptor> {
        self.fields
            .binary_search_by_key(&tag, |field| field.tag)
            .ok()
            .map(|index| &self.fields[index])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Short name, without the package.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EnumDescriptor {
    /// Fully qualified name.
    pub name: String,
    /// In declaration order.
    values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<String>, values: Vec<(String, i32)>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(value_name, _)| value_name == name)
            .map(|(_, value)| *value)
    }

    /// The name of `number`. Aliases resolve to the first declared name.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, value)| *value == number)
            .map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, number: i32) -> bool {
        self.values.iter().any(|(_, value)| *value == number)
    }

    /// The first declared value, or zero for an empty enum.
    pub fn default_value(&self) -> i32 {
        self.values.first().map_or(0, |(_, value)| *value)
    }
}

/// A set of message and enum definitions, keyed by fully qualified name.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Schema {
    messages: BTreeMap<String, MessageDescriptor>,
    enums: BTreeMap<String, EnumDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: MessageDescriptor) {
        self.messages.insert(message.name.clone(), message);
    }

    pub fn add_enum(&mut self, enumeration: EnumDescriptor) {
        self.enums.insert(enumeration.name.clone(), enumeration);
    }

    /// Look up a message. A leading `.` is accepted.
    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name.strip_prefix('.').unwrap_or(name))
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name.strip_prefix('.').unwrap_or(name))
    }

    /// Check that every referenced enum and message is defined.
    pub fn validate(&self) -> Result<(), String> {
        for message in self.messages.values() {
            for field in &message.fields {
                self.check_type(&message.name, &field.name, &field.field_type)?;
                if field.is_map() && field.label != Label::Optional {
                    return Err(format!(
                        "{}.{}: map fields can't be {:?}",
                        message.name, field.name, field.label
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_type(&self, message: &str, field: &str, field_type: &FieldType) -> Result<(), String> {
        match field_type {
            FieldType::Scalar(_) => Ok(()),
            FieldType::Enum(name) if self.enums.contains_key(name) => Ok(()),
            FieldType::Message(name) if self.messages.contains_key(name) => Ok(()),
            FieldType::Enum(name) | FieldType::Message(name) => {
                Err(format!("{}.{}: no such type {}", message, field, name))
            }
            FieldType::Map { key, value } => {
                if !key.is_map_key() {
                    return Err(format!(
                        "{}.{}: {} can't key a map",
                        message,
                        field,
                        key.name()
                    ));
                }
                if matches!(**value, FieldType::Map { .. }) {
                    return Err(format!("{}.{}: map values can't be maps", message, field));
                }
                self.check_type(message, field, value)
            }
        }
    }
}
