//! End-to-end generation tests: schema description in, Rust modules out.

use std::fs;
use tempfile::tempdir;

const CSDL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="microsoft.graph">
      <EnumType Name="complianceState">
        <Member Name="unknown" Value="0"/>
        <Member Name="compliant" Value="1"/>
      </EnumType>
      <EntityType Name="managedDevice">
        <Property Name="id" Type="Edm.String"/>
        <Property Name="roleScopeTagIds" Type="Collection(Edm.String)"/>
        <NavigationProperty Name="deviceCategory" Type="microsoft.graph.deviceCategory"/>
      </EntityType>
      <ComplexType Name="deviceCategory">
        <Property Name="displayName" Type="Edm.String"/>
        <NavigationProperty Name="devices" Type="Collection(microsoft.graph.managedDevice)"/>
      </ComplexType>
      <EntityContainer Name="GraphService">
        <EntitySet Name="managedDevices" EntityType="microsoft.graph.managedDevice"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

#[test]
fn csdl_generates_all_modules() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("metadata.xml");
    let output = dir.path().join("generated");
    fs::write(&input, CSDL).unwrap();

    msgraph_codegen::run(&input, &output).unwrap();

    let models = fs::read_to_string(output.join("models.rs")).unwrap();
    assert!(models.contains("pub struct ManagedDevice {"));
    assert!(models.contains("pub role_scope_tag_ids: Option<Vec<String>>,"));
    assert!(models.contains("pub device_category: Option<Box<DeviceCategory>>,"));
    // Cycle back-edge stays finite through Vec.
    assert!(models.contains("pub devices: Option<Vec<ManagedDevice>>,"));

    let enums = fs::read_to_string(output.join("enums.rs")).unwrap();
    assert!(enums.contains("pub enum ComplianceState {"));
    assert!(enums.contains("#[serde(rename = \"compliant\")]"));

    let paths = fs::read_to_string(output.join("paths.rs")).unwrap();
    assert!(paths.contains("pub mod managed_devices {"));
    assert!(paths.contains("\"/managedDevices\""));

    let module = fs::read_to_string(output.join("mod.rs")).unwrap();
    assert!(module.contains("pub mod models;"));
}

#[test]
fn openapi_yaml_generates_models_and_paths() {
    let yaml = r#"
openapi: 3.0.1
paths:
  /deviceManagement/managedDevices:
    get: {}
components:
  schemas:
    managedDevice:
      type: object
      properties:
        id:
          type: string
        enrolledDateTime:
          type: string
          format: date-time
"#;
    let dir = tempdir().unwrap();
    let input = dir.path().join("openapi.yaml");
    let output = dir.path().join("generated");
    fs::write(&input, yaml).unwrap();

    msgraph_codegen::run(&input, &output).unwrap();

    let models = fs::read_to_string(output.join("models.rs")).unwrap();
    assert!(models.contains("pub struct ManagedDevice {"));
    assert!(models.contains("pub enrolled_date_time: Option<chrono::DateTime<chrono::Utc>>,"));

    let paths = fs::read_to_string(output.join("paths.rs")).unwrap();
    assert!(paths.contains("pub mod device_management {"));
}

#[test]
fn unreadable_input_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.xml");
    let output = dir.path().join("generated");
    assert!(msgraph_codegen::run(&missing, &output).is_err());
}

#[test]
fn malformed_schema_is_an_error_and_emits_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.xml");
    let output = dir.path().join("generated");
    fs::write(&input, "<Schema><unclosed").unwrap();

    assert!(msgraph_codegen::run(&input, &output).is_err());
    assert!(!output.exists());
}

#[test]
fn unknown_format_is_an_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("mystery.txt");
    let output = dir.path().join("generated");
    fs::write(&input, "just some text").unwrap();

    assert!(msgraph_codegen::run(&input, &output).is_err());
}
