//! OpenAPI 3 (YAML) parser
//!
//! Lowers `components.schemas` into records and enumerations and the
//! `paths` map into path templates. Only the subset of the OpenAPI surface
//! needed for type generation is modeled; everything else is ignored.

use crate::model::{
    EnumMember, Enumeration, Field, FieldKind, PathTemplate, Record, SchemaModel,
    canonical_type_name,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ApiDocument {
    #[serde(default)]
    components: Option<Components>,
    #[serde(default)]
    paths: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Deserialize)]
struct Components {
    #[serde(default)]
    schemas: BTreeMap<String, SchemaObject>,
}

#[derive(Debug, Default, Deserialize)]
struct SchemaObject {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    properties: Option<BTreeMap<String, SchemaObject>>,
    #[serde(default)]
    items: Option<Box<SchemaObject>>,
    #[serde(rename = "$ref", default)]
    reference: Option<String>,
    #[serde(rename = "enum", default)]
    members: Option<Vec<String>>,
}

pub fn parse(yaml: &str) -> Result<SchemaModel> {
    let doc: ApiDocument = serde_yaml::from_str(yaml).context("malformed OpenAPI document")?;
    let mut model = SchemaModel::default();

    if let Some(components) = doc.components {
        for (name, schema) in &components.schemas {
            if let Some(members) = &schema.members {
                model.enums.push(Enumeration {
                    name: canonical_type_name(name, &[]),
                    description: schema.description.clone(),
                    members: members
                        .iter()
                        .map(|m| EnumMember {
                            json_name: m.clone(),
                            description: None,
                        })
                        .collect(),
                });
                continue;
            }

            let Some(properties) = &schema.properties else {
                log::debug!("skipping schema {name}: no properties and not an enum");
                continue;
            };

            model.records.push(Record {
                name: canonical_type_name(name, &[]),
                description: schema.description.clone(),
                fields: properties
                    .iter()
                    .map(|(prop_name, prop)| Field {
                        json_name: prop_name.clone(),
                        kind: map_schema_type(prop),
                        description: prop.description.clone(),
                    })
                    .collect(),
            });
        }
    }

    if let Some(paths) = doc.paths {
        model.paths.extend(paths.keys().map(|template| PathTemplate {
            template: template.clone(),
        }));
    }

    Ok(model)
}

fn map_schema_type(schema: &SchemaObject) -> FieldKind {
    if let Some(reference) = &schema.reference {
        let name = reference.rsplit('/').next().unwrap_or(reference);
        return FieldKind::Reference(canonical_type_name(name, &[]));
    }

    match schema.kind.as_deref() {
        Some("string") => match schema.format.as_deref() {
            Some("date-time") => FieldKind::Instant,
            Some("duration") => FieldKind::DurationText,
            Some("byte" | "binary") => FieldKind::Binary,
            _ => FieldKind::Text,
        },
        Some("integer") => match schema.format.as_deref() {
            Some("int64") => FieldKind::Int64,
            _ => FieldKind::Int32,
        },
        Some("number") => match schema.format.as_deref() {
            Some("float") => FieldKind::Float32,
            _ => FieldKind::Float64,
        },
        Some("boolean") => FieldKind::Boolean,
        Some("array") => {
            let inner = schema
                .items
                .as_deref()
                .map(map_schema_type)
                .unwrap_or(FieldKind::Opaque);
            FieldKind::Collection(Box::new(inner))
        }
        _ => FieldKind::Opaque,
    }
}
