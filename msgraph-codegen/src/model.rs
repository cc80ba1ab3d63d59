//! Intermediate schema model
//!
//! Both parsers (CSDL XML, OpenAPI YAML) lower into this shape; the emitter
//! only ever sees the model. Type names are already canonical at this
//! point, so reference resolution is a set lookup at emission time.

use std::collections::HashSet;

/// Canonical field types the emitter knows how to render.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Textual scalars: strings, GUIDs, dates, times of day, decimals.
    Text,
    Int32,
    Int64,
    Boolean,
    /// Point in time with offset.
    Instant,
    /// ISO-8601 duration, kept textual.
    DurationText,
    Binary,
    Float64,
    Float32,
    /// Ordered sequence of the inner kind.
    Collection(Box<FieldKind>),
    /// Another declared record or enumeration, by canonical name.
    Reference(String),
    /// Explicitly untyped content, preserved as raw JSON.
    Opaque,
}

#[derive(Debug, Clone)]
pub struct Field {
    /// Name exactly as declared in the schema; preserved on the wire.
    pub json_name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Record {
    /// Canonical type name (first character capitalized).
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    /// Declared member name; preserved on the wire.
    pub json_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Enumeration {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone)]
pub struct PathTemplate {
    /// URL template, e.g. `/deviceManagement/managedDevices/{id}`.
    pub template: String,
}

impl PathTemplate {
    /// First path segment, used to group templates at emission.
    pub fn group(&self) -> &str {
        self.template
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("root")
    }
}

/// Everything a schema description lowers into.
#[derive(Debug, Clone, Default)]
pub struct SchemaModel {
    pub records: Vec<Record>,
    pub enums: Vec<Enumeration>,
    pub paths: Vec<PathTemplate>,
}

impl SchemaModel {
    /// All declared type names, for reference resolution.
    pub fn declared_names(&self) -> HashSet<String> {
        self.records
            .iter()
            .map(|r| r.name.clone())
            .chain(self.enums.iter().map(|e| e.name.clone()))
            .collect()
    }
}

/// Render a schema-declared name canonically: capitalize the first
/// character. Dotted names from the schema's own namespace (or alias)
/// resolve to the local record; foreign dotted names collapse to
/// concatenated capitalized segments.
pub fn canonical_type_name(raw: &str, own_prefixes: &[String]) -> String {
    for prefix in own_prefixes {
        if let Some(rest) = raw.strip_prefix(prefix.as_str()) {
            if let Some(local) = rest.strip_prefix('.') {
                if !local.contains('.') {
                    return capitalize(local);
                }
            }
        }
    }

    if raw.contains('.') {
        raw.split('.').map(capitalize).collect()
    } else {
        capitalize(raw)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
