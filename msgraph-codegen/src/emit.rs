//! Rust source emission
//!
//! Renders the intermediate model into three modules: `models.rs` (one
//! struct per record), `enums.rs` (closed enumerations), and `paths.rs`
//! (URL templates grouped by first path segment), plus a `mod.rs` tying
//! them together.
//!
//! Every field is optional and serialized under its original declared name;
//! absent values are omitted on encode. References to other declared types
//! go through `Box` so cyclic schemas emit without infinite-size structs.
//! References that resolve to nothing degrade to raw JSON with a warning.

use crate::model::{Enumeration, FieldKind, PathTemplate, Record, SchemaModel};
use anyhow::{Context, Result};
use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::Path;

const GENERATED_HEADER: &str = "// Code generated by msgraph-codegen. DO NOT EDIT.\n";

/// Emit all generated modules into `output` (created if absent).
pub fn write_all(output: &Path, model: &SchemaModel) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("cannot create output directory {}", output.display()))?;

    let known = model.declared_names();
    let files = [
        ("models.rs", emit_models(model, &known)),
        ("enums.rs", emit_enums(model)),
        ("paths.rs", emit_paths(model)),
        ("mod.rs", emit_mod()),
    ];
    for (name, content) in files {
        let path = output.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(())
}

pub fn emit_models(model: &SchemaModel, known: &HashSet<String>) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("//! Resource and complex-type records.\n\n");
    out.push_str("use serde::{Deserialize, Serialize};\n");

    for record in &model.records {
        out.push('\n');
        emit_record(&mut out, record, known);
    }
    out
}

fn emit_record(out: &mut String, record: &Record, known: &HashSet<String>) {
    push_doc(out, "", record.description.as_deref());
    let _ = writeln!(out, "#[derive(Debug, Clone, Default, Serialize, Deserialize)]");
    let _ = writeln!(out, "pub struct {} {{", record.name);

    for field in &record.fields {
        push_doc(out, "    ", field.description.as_deref());
        let _ = writeln!(
            out,
            "    #[serde(rename = \"{}\", skip_serializing_if = \"Option::is_none\")]",
            field.json_name
        );
        let _ = writeln!(
            out,
            "    pub {}: Option<{}>,",
            rust_field_ident(&field.json_name),
            field_type(&field.kind, known, &record.name, &field.json_name)
        );
    }
    out.push_str("}\n");
}

pub fn emit_enums(model: &SchemaModel) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("//! Closed enumerations with their declared members.\n\n");
    out.push_str("use serde::{Deserialize, Serialize};\n");

    for declared in &model.enums {
        out.push('\n');
        emit_enum(&mut out, declared);
    }
    out
}

fn emit_enum(out: &mut String, declared: &Enumeration) {
    push_doc(out, "", declared.description.as_deref());
    let _ = writeln!(
        out,
        "#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]"
    );
    let _ = writeln!(out, "pub enum {} {{", declared.name);
    for member in &declared.members {
        push_doc(out, "    ", member.description.as_deref());
        let _ = writeln!(out, "    #[serde(rename = \"{}\")]", member.json_name);
        let _ = writeln!(out, "    {},", member.json_name.to_upper_camel_case());
    }
    out.push_str("}\n");
}

pub fn emit_paths(model: &SchemaModel) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("//! URL path templates, grouped by leading path segment.\n");

    let mut groups: BTreeMap<String, Vec<&PathTemplate>> = BTreeMap::new();
    for path in &model.paths {
        groups.entry(path.group().to_string()).or_default().push(path);
    }

    for (group, templates) in groups {
        out.push('\n');
        let _ = writeln!(out, "pub mod {} {{", module_ident(&group));
        let mut seen = BTreeSet::new();
        for template in templates {
            let name = const_ident(&template.template);
            if !seen.insert(name.clone()) {
                continue;
            }
            let _ = writeln!(out, "    pub const {}: &str = \"{}\";", name, template.template);
        }
        out.push_str("}\n");
    }
    out
}

pub fn emit_mod() -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push_str("pub mod enums;\npub mod models;\npub mod paths;\n");
    out
}

/// Rendered Rust type for a record field. Direct references are boxed so
/// cyclic schemas stay finite-size; unresolvable names degrade to raw JSON.
fn field_type(kind: &FieldKind, known: &HashSet<String>, record: &str, field: &str) -> String {
    match kind {
        FieldKind::Reference(name) if known.contains(name) => format!("Box<{name}>"),
        FieldKind::Reference(name) => {
            log::warn!("{record}.{field}: unresolved reference {name}, emitting opaque value");
            "serde_json::Value".to_string()
        }
        FieldKind::Collection(inner) => {
            format!("Vec<{}>", item_type(inner, known, record, field))
        }
        scalar => scalar_type(scalar).to_string(),
    }
}

/// Element type inside a collection. `Vec` already provides indirection,
/// so references are not boxed here.
fn item_type(kind: &FieldKind, known: &HashSet<String>, record: &str, field: &str) -> String {
    match kind {
        FieldKind::Reference(name) if known.contains(name) => name.clone(),
        FieldKind::Reference(name) => {
            log::warn!("{record}.{field}: unresolved reference {name}, emitting opaque value");
            "serde_json::Value".to_string()
        }
        FieldKind::Collection(inner) => {
            format!("Vec<{}>", item_type(inner, known, record, field))
        }
        scalar => scalar_type(scalar).to_string(),
    }
}

fn scalar_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "String",
        FieldKind::Int32 => "i32",
        FieldKind::Int64 => "i64",
        FieldKind::Boolean => "bool",
        FieldKind::Instant => "chrono::DateTime<chrono::Utc>",
        FieldKind::DurationText => "String",
        FieldKind::Binary => "Vec<u8>",
        FieldKind::Float64 => "f64",
        FieldKind::Float32 => "f32",
        FieldKind::Opaque => "serde_json::Value",
        FieldKind::Collection(_) | FieldKind::Reference(_) => {
            unreachable!("handled by field_type/item_type")
        }
    }
}

/// Keywords that cannot appear as bare identifiers. Most escape with the
/// raw prefix; the path-keywords cannot and get a trailing underscore.
const RESERVED: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let",
    "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return",
    "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized", "use",
    "virtual", "where", "while", "yield",
];

fn escape_keyword(ident: String) -> String {
    if matches!(ident.as_str(), "self" | "Self" | "super" | "crate" | "extern") {
        format!("{ident}_")
    } else if RESERVED.contains(&ident.as_str()) {
        format!("r#{ident}")
    } else {
        ident
    }
}

/// Rust field name for a declared JSON name. The wire name is preserved by
/// a serde rename, so this only has to be a legal identifier.
fn rust_field_ident(json_name: &str) -> String {
    let ident = sanitize(json_name).to_snake_case();
    if ident.is_empty() {
        return "value".to_string();
    }
    escape_keyword(ident)
}

fn module_ident(segment: &str) -> String {
    let ident = sanitize(segment).to_snake_case();
    if ident.is_empty() {
        return "root".to_string();
    }
    escape_keyword(ident)
}

fn const_ident(template: &str) -> String {
    let ident = sanitize(template).to_shouty_snake_case();
    if ident.is_empty() {
        "ROOT".to_string()
    } else if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{ident}")
    } else {
        ident
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect()
}

fn push_doc(out: &mut String, indent: &str, description: Option<&str>) {
    if let Some(text) = description {
        for line in text.lines() {
            let _ = writeln!(out, "{indent}/// {}", line.trim_end());
        }
    }
}
