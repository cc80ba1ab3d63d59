//! CSDL (OData $metadata) parser
//!
//! Lowers `EntityType`/`ComplexType` elements into records, `EnumType`
//! elements into enumerations, and `EntityContainer`/`EntitySet` elements
//! into path templates. `Org.OData.Core.V1.Description` annotations become
//! documentation on the generated items.

use crate::model::{
    EnumMember, Enumeration, Field, FieldKind, PathTemplate, Record, SchemaModel,
    canonical_type_name,
};
use anyhow::{Context, Result};
use roxmltree::{Document, Node};

pub fn parse(xml: &str) -> Result<SchemaModel> {
    let doc = Document::parse(xml).context("malformed CSDL document")?;

    // Namespaces and aliases of every Schema element; references within
    // these prefixes resolve to locally declared types.
    let prefixes: Vec<String> = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Schema")
        .flat_map(|schema| {
            ["Namespace", "Alias"]
                .into_iter()
                .filter_map(move |attr| schema.attribute(attr).map(str::to_string))
        })
        .collect();

    let mut model = SchemaModel::default();

    for schema in doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Schema")
    {
        for node in schema.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "EntityType" | "ComplexType" => {
                    if let Some(record) = parse_record(&node, &prefixes) {
                        model.records.push(record);
                    }
                }
                "EnumType" => {
                    if let Some(declared) = parse_enum(&node) {
                        model.enums.push(declared);
                    }
                }
                "EntityContainer" => {
                    for set in node
                        .children()
                        .filter(|c| c.tag_name().name() == "EntitySet")
                    {
                        if let Some(name) = set.attribute("Name") {
                            model.paths.push(PathTemplate {
                                template: format!("/{name}"),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok(model)
}

fn parse_record(node: &Node<'_, '_>, prefixes: &[String]) -> Option<Record> {
    let name = node.attribute("Name")?;
    let mut fields = Vec::new();

    for child in node.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if tag != "Property" && tag != "NavigationProperty" {
            continue;
        }
        let (Some(prop_name), Some(prop_type)) = (child.attribute("Name"), child.attribute("Type"))
        else {
            continue;
        };
        fields.push(Field {
            json_name: prop_name.to_string(),
            kind: map_edm_type(prop_type, prefixes),
            description: description_of(&child),
        });
    }

    Some(Record {
        name: canonical_type_name(name, &[]),
        description: description_of(node),
        fields,
    })
}

fn parse_enum(node: &Node<'_, '_>) -> Option<Enumeration> {
    let name = node.attribute("Name")?;
    let members = node
        .children()
        .filter(|c| c.tag_name().name() == "Member")
        .filter_map(|member| {
            member.attribute("Name").map(|n| EnumMember {
                json_name: n.to_string(),
                description: description_of(&member),
            })
        })
        .collect();

    Some(Enumeration {
        name: canonical_type_name(name, &[]),
        description: description_of(node),
        members,
    })
}

/// `Org.OData.Core.V1.Description` annotation text, when present.
fn description_of(node: &Node<'_, '_>) -> Option<String> {
    node.children()
        .filter(|c| c.tag_name().name() == "Annotation")
        .find(|c| {
            c.attribute("Term")
                .is_some_and(|t| t.ends_with(".Description"))
        })
        .and_then(|c| c.attribute("String"))
        .map(str::to_string)
}

fn map_edm_type(raw: &str, prefixes: &[String]) -> FieldKind {
    if let Some(inner) = raw
        .strip_prefix("Collection(")
        .and_then(|s| s.strip_suffix(')'))
    {
        return FieldKind::Collection(Box::new(map_edm_type(inner, prefixes)));
    }

    match raw {
        "Edm.String" | "Edm.Guid" | "Edm.Date" | "Edm.TimeOfDay" | "Edm.Decimal" => {
            FieldKind::Text
        }
        "Edm.Int16" | "Edm.Int32" => FieldKind::Int32,
        "Edm.Int64" => FieldKind::Int64,
        "Edm.Boolean" => FieldKind::Boolean,
        "Edm.DateTimeOffset" => FieldKind::Instant,
        "Edm.Duration" => FieldKind::DurationText,
        "Edm.Binary" => FieldKind::Binary,
        "Edm.Double" => FieldKind::Float64,
        "Edm.Single" => FieldKind::Float32,
        other => FieldKind::Reference(canonical_type_name(other, prefixes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="microsoft.graph" Alias="graph">
      <EnumType Name="complianceState">
        <Member Name="unknown" Value="0"/>
        <Member Name="compliant" Value="1"/>
        <Member Name="noncompliant" Value="2"/>
      </EnumType>
      <EntityType Name="managedDevice">
        <Annotation Term="Org.OData.Core.V1.Description" String="A device enrolled in management."/>
        <Property Name="id" Type="Edm.String" Nullable="false"/>
        <Property Name="enrolledDateTime" Type="Edm.DateTimeOffset"/>
        <Property Name="complianceGracePeriod" Type="Edm.Duration"/>
        <Property Name="isEncrypted" Type="Edm.Boolean"/>
        <Property Name="storageTotal" Type="Edm.Int64"/>
        <Property Name="batteryLevel" Type="Edm.Double"/>
        <Property Name="roleScopeTagIds" Type="Collection(Edm.String)"/>
        <Property Name="complianceState" Type="microsoft.graph.complianceState"/>
        <NavigationProperty Name="deviceCategory" Type="graph.deviceCategory"/>
      </EntityType>
      <ComplexType Name="deviceCategory">
        <Property Name="displayName" Type="Edm.String"/>
        <NavigationProperty Name="devices" Type="Collection(microsoft.graph.managedDevice)"/>
      </ComplexType>
      <EntityContainer Name="GraphService">
        <EntitySet Name="managedDevices" EntityType="microsoft.graph.managedDevice"/>
        <EntitySet Name="deviceCategories" EntityType="microsoft.graph.deviceCategory"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn parses_records_enums_and_paths() {
        let model = parse(SAMPLE).unwrap();
        assert_eq!(model.records.len(), 2);
        assert_eq!(model.enums.len(), 1);
        assert_eq!(model.paths.len(), 2);
        assert_eq!(model.paths[0].template, "/managedDevices");
    }

    #[test]
    fn record_names_are_canonical() {
        let model = parse(SAMPLE).unwrap();
        let names: Vec<&str> = model.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ManagedDevice", "DeviceCategory"]);
    }

    #[test]
    fn descriptions_are_carried() {
        let model = parse(SAMPLE).unwrap();
        assert_eq!(
            model.records[0].description.as_deref(),
            Some("A device enrolled in management.")
        );
    }

    #[test]
    fn scalar_types_map_to_canonical_kinds() {
        let model = parse(SAMPLE).unwrap();
        let device = &model.records[0];
        let kind_of = |name: &str| {
            device
                .fields
                .iter()
                .find(|f| f.json_name == name)
                .map(|f| f.kind.clone())
                .unwrap()
        };
        assert_eq!(kind_of("id"), FieldKind::Text);
        assert_eq!(kind_of("enrolledDateTime"), FieldKind::Instant);
        assert_eq!(kind_of("complianceGracePeriod"), FieldKind::DurationText);
        assert_eq!(kind_of("isEncrypted"), FieldKind::Boolean);
        assert_eq!(kind_of("storageTotal"), FieldKind::Int64);
        assert_eq!(kind_of("batteryLevel"), FieldKind::Float64);
        assert_eq!(
            kind_of("roleScopeTagIds"),
            FieldKind::Collection(Box::new(FieldKind::Text))
        );
    }

    #[test]
    fn namespace_and_alias_refs_resolve_locally() {
        let model = parse(SAMPLE).unwrap();
        let device = &model.records[0];
        let compliance = device
            .fields
            .iter()
            .find(|f| f.json_name == "complianceState")
            .unwrap();
        assert_eq!(
            compliance.kind,
            FieldKind::Reference("ComplianceState".to_string())
        );

        let category = device
            .fields
            .iter()
            .find(|f| f.json_name == "deviceCategory")
            .unwrap();
        assert_eq!(
            category.kind,
            FieldKind::Reference("DeviceCategory".to_string())
        );
    }

    #[test]
    fn cyclic_references_parse_both_directions() {
        let model = parse(SAMPLE).unwrap();
        let category = &model.records[1];
        let devices = category
            .fields
            .iter()
            .find(|f| f.json_name == "devices")
            .unwrap();
        assert_eq!(
            devices.kind,
            FieldKind::Collection(Box::new(FieldKind::Reference(
                "ManagedDevice".to_string()
            )))
        );
    }

    #[test]
    fn enum_members_preserve_declared_names() {
        let model = parse(SAMPLE).unwrap();
        let states: Vec<&str> = model.enums[0]
            .members
            .iter()
            .map(|m| m.json_name.as_str())
            .collect();
        assert_eq!(states, vec!["unknown", "compliant", "noncompliant"]);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse("<Schema><unclosed").is_err());
    }
}
