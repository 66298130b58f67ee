//! Runtime message definitions, for records whose type is only known once a
//! schema has been loaded.

mod descriptor;
mod loader;
mod proto_file;
mod registry;

pub use descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, OneofDescriptor,
    ScalarKind, Schema,
};
pub use registry::SchemaRegistry;
