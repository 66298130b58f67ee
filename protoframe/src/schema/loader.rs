//! Loads a [Schema] from the JSON reflection layout used by protobuf.js:
//!
//! ```json
//! {"nested": {"binlog": {"nested": {
//!     "BinLog": {"fields": {
//!         "type": {"type": "string", "id": 1, "rule": "required"},
//!         "timestamp": {"type": "int64", "id": 3}
//!     }},
//!     "Level": {"values": {"INFO": 0, "WARN": 1}}
//! }}}}
//! ```
//!
//! `.proto` files are read in to the same layout first.
//!
//! A node with `fields` is a message, a node with `values` an enum, anything
//! else a namespace. Type references resolve from the innermost enclosing
//! scope outwards; a leading `.` makes them absolute.

use std::{collections::BTreeMap, fmt};

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};

use crate::{
    error::ConfigError,
    schema::{
        descriptor::{
            EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, ScalarKind, Schema,
        },
        proto_file,
    },
};

#[derive(Debug, Default, Deserialize)]
pub(super) struct ReflectionNode {
    #[serde(default)]
    pub nested: BTreeMap<String, ReflectionNode>,
    pub fields: Option<BTreeMap<String, FieldDef>>,
    #[serde(default, deserialize_with = "ordered_values")]
    pub values: Option<Vec<(String, i32)>>,
    #[serde(default)]
    pub oneofs: BTreeMap<String, OneofDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FieldDef {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: u32,
    pub rule: Option<String>,
    pub key_type: Option<String>,
    #[serde(default)]
    pub options: FieldOptions,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct FieldOptions {
    pub packed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OneofDef {
    pub oneof: Vec<String>,
}

/// Enum values keep the order they're written in.
struct ValuesVisitor;

impl<'de> Visitor<'de> for ValuesVisitor {
    type Value = Vec<(String, i32)>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of enum value names to numbers")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut values = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry()? {
            values.push(entry);
        }
        Ok(values)
    }
}

fn ordered_values<'de, D>(deserializer: D) -> Result<Option<Vec<(String, i32)>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(ValuesVisitor).map(Some)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Kind {
    Message,
    Enum,
}

impl Schema {
    /// Parse a JSON reflection document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        load_json("<inline>", json)
    }

    /// Parse the text of a `.proto` file.
    pub fn from_proto(text: &str) -> Result<Self, ConfigError> {
        load_proto("<inline>", text)
    }
}

/// Parse a JSON reflection document, naming `source_name` in errors.
pub(crate) fn load_json(source_name: &str, json: &str) -> Result<Schema, ConfigError> {
    let root: ReflectionNode =
        serde_json::from_str(json).map_err(|error| ConfigError::SchemaParse {
            source_name: source_name.to_string(),
            error,
        })?;
    from_reflection(&root)
}

/// Parse a `.proto` file, naming `source_name` in errors.
pub(crate) fn load_proto(source_name: &str, text: &str) -> Result<Schema, ConfigError> {
    let root = proto_file::parse(text).map_err(|error| ConfigError::ProtoSyntax {
        source_name: source_name.to_string(),
        line: error.line,
        message: error.message,
    })?;
    from_reflection(&root)
}

fn from_reflection(root: &ReflectionNode) -> Result<Schema, ConfigError> {
    let mut kinds = BTreeMap::new();
    collect_kinds(root, "", &mut kinds).map_err(ConfigError::InvalidSchema)?;
    let mut schema = Schema::new();
    build(root, "", &kinds, &mut schema).map_err(ConfigError::InvalidSchema)?;
    schema.validate().map_err(ConfigError::InvalidSchema)?;
    Ok(schema)
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn collect_kinds(
    node: &ReflectionNode,
    scope: &str,
    kinds: &mut BTreeMap<String, Kind>,
) -> Result<(), String> {
    for (name, child) in &node.nested {
        let name = qualify(scope, name);
        match (&child.fields, &child.values) {
            (Some(_), Some(_)) => return Err(format!("{} has both fields and values", name)),
            (Some(_), None) => {
                kinds.insert(name.clone(), Kind::Message);
            }
            (None, Some(_)) => {
                kinds.insert(name.clone(), Kind::Enum);
            }
            (None, None) => {}
        }
        collect_kinds(child, &name, kinds)?;
    }
    Ok(())
}

fn build(
    node: &ReflectionNode,
    scope: &str,
    kinds: &BTreeMap<String, Kind>,
    schema: &mut Schema,
) -> Result<(), String> {
    for (name, child) in &node.nested {
        let name = qualify(scope, name);
        if let Some(values) = &child.values {
            schema.add_enum(EnumDescriptor::new(&name, values.clone()));
        }
        if let Some(fields) = &child.fields {
            schema.add_message(build_message(&name, fields, &child.oneofs, kinds)?);
        }
        build(child, &name, kinds, schema)?;
    }
    Ok(())
}

fn build_message(
    name: &str,
    fields: &BTreeMap<String, FieldDef>,
    oneofs: &BTreeMap<String, OneofDef>,
    kinds: &BTreeMap<String, Kind>,
) -> Result<MessageDescriptor, String> {
    let mut descriptors = Vec::with_capacity(fields.len());
    for (field_name, def) in fields {
        let value_type = resolve(&def.type_name, name, kinds)?;
        let field_type = match &def.key_type {
            Some(key_type) => FieldType::Map {
                key: ScalarKind::from_name(key_type).ok_or_else(|| {
                    format!("{}.{}: invalid map key type {}", name, field_name, key_type)
                })?,
                value: Box::new(value_type),
            },
            None => value_type,
        };
        if def.id == 0 {
            return Err(format!("{}.{}: field ids start at 1", name, field_name));
        }
        let field = FieldDescriptor::new(field_name, def.id, field_type);
        let mut field = match def.rule.as_deref() {
            None | Some("optional") => field,
            Some("required") => field.required(),
            Some("repeated") => field.repeated(),
            Some(rule) => return Err(format!("{}.{}: unknown rule {}", name, field_name, rule)),
        };
        field.packed = def.options.packed.unwrap_or(true);
        descriptors.push(field);
    }
    let mut message = MessageDescriptor::new(name, descriptors);
    for window in message.fields.windows(2) {
        if window[0].tag == window[1].tag {
            return Err(format!("{}: duplicate field id {}", name, window[0].tag));
        }
    }
    for (oneof_name, def) in oneofs {
        if let Some(missing) = def
            .oneof
            .iter()
            .find(|member| message.field_by_name(member).is_none())
        {
            return Err(format!(
                "{}.{}: no such member {}",
                name, oneof_name, missing
            ));
        }
        let members: Vec<&str> = def.oneof.iter().map(String::as_str).collect();
        message = message.with_oneof(oneof_name, &members);
    }
    Ok(message)
}

fn resolve(
    type_name: &str,
    scope: &str,
    kinds: &BTreeMap<String, Kind>,
) -> Result<FieldType, String> {
    if let Some(kind) = ScalarKind::from_name(type_name) {
        return Ok(FieldType::Scalar(kind));
    }
    let typed = |name: &str| {
        kinds.get(name).map(|kind| match kind {
            Kind::Message => FieldType::Message(name.to_string()),
            Kind::Enum => FieldType::Enum(name.to_string()),
        })
    };
    if let Some(absolute) = type_name.strip_prefix('.') {
        return typed(absolute).ok_or_else(|| format!("no such type {} in {}", type_name, scope));
    }
    let mut scope_name = scope;
    loop {
        if let Some(found) = typed(&qualify(scope_name, type_name)) {
            return Ok(found);
        }
        if scope_name.is_empty() {
            return Err(format!("no such type {} in {}", type_name, scope));
        }
        scope_name = scope_name.rsplit_once('.').map_or("", |(parent, _)| parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "nested": {
            "shop": {
                "nested": {
                    "Status": {"values": {"OPEN": 0, "CLOSED": 1}},
                    "Order": {
                        "fields": {
                            "id": {"type": "uint64", "id": 1, "rule": "required"},
                            "status": {"type": "Status", "id": 2},
                            "lines": {"type": "Line", "id": 3, "rule": "repeated"},
                            "tags": {"type": "string", "id": 4, "keyType": "string"},
                            "card": {"type": "string", "id": 5},
                            "cash": {"type": "bool", "id": 6},
                            "codes": {"type": "int32", "id": 7, "rule": "repeated", "options": {"packed": false}}
                        },
                        "oneofs": {"payment": {"oneof": ["card", "cash"]}},
                        "nested": {
                            "Line": {
                                "fields": {
                                    "sku": {"type": "string", "id": 1},
                                    "status": {"type": ".shop.Status", "id": 2}
                                }
                            }
                        }
                    }
                }
            }
        }
    }"#;

    #[test]
    fn loads_nested_definitions() {
        let schema = Schema::from_json(SCHEMA).unwrap();
        let order = schema.message("shop.Order").unwrap();
        assert_eq!(
            order.field_by_name("status").unwrap().field_type,
            FieldType::Enum("shop.Status".to_string())
        );
        assert_eq!(
            order.field_by_name("lines").unwrap().field_type,
            FieldType::Message("shop.Order.Line".to_string())
        );
        assert!(order.field_by_name("lines").unwrap().is_repeated());
        assert!(order.field_by_name("id").unwrap().is_required());
        assert!(!order.field_by_name("codes").unwrap().packed);
        assert_eq!(
            order.field_by_name("tags").unwrap().field_type,
            FieldType::Map {
                key: ScalarKind::String,
                value: Box::new(FieldType::Scalar(ScalarKind::String)),
            }
        );
        assert_eq!(order.oneofs.len(), 1);
        assert_eq!(
            order.field_by_name("cash").unwrap().oneof.as_deref(),
            Some("payment")
        );
        let line = schema.message("shop.Order.Line").unwrap();
        assert_eq!(
            line.field_by_name("status").unwrap().field_type,
            FieldType::Enum("shop.Status".to_string())
        );
        assert_eq!(schema.enumeration("shop.Status").unwrap().value_of("CLOSED"), Some(1));
    }

    #[test]
    fn enum_values_keep_declaration_order() {
        let schema = Schema::from_json(
            r#"{"nested": {"Level": {"values": {"WARN": 2, "INFO": 1, "NOTICE": 1}}}}"#,
        )
        .unwrap();
        let level = schema.enumeration("Level").unwrap();
        assert_eq!(level.default_value(), 2);
        assert_eq!(level.name_of(1), Some("INFO"));
    }

    #[test]
    fn unresolved_type() {
        let err = Schema::from_json(
            r#"{"nested": {"A": {"fields": {"b": {"type": "Missing", "id": 1}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSchema(msg) if msg.contains("Missing")));
    }

    #[test]
    fn duplicate_ids() {
        let err = Schema::from_json(
            r#"{"nested": {"A": {"fields": {
                "b": {"type": "string", "id": 1},
                "c": {"type": "string", "id": 1}
            }}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSchema(_)));
    }

    #[test]
    fn not_json() {
        assert!(matches!(
            Schema::from_json("syntax = \"proto3\";"),
            Err(ConfigError::SchemaParse { .. })
        ));
    }
}
