//! Offline schema generator for the Graph client.
//!
//! Consumes a CSDL (`$metadata` XML) or OpenAPI 3 (YAML) description of
//! the upstream service and emits typed Rust modules: one record per
//! entity/complex/schema type, one closed enumeration per declared
//! enumeration, and the URL path templates grouped by leading segment.
//! The generated code is what the endpoint wrappers compile against.

pub mod csdl;
pub mod emit;
pub mod model;
pub mod openapi;

use anyhow::{Context, Result, bail};
use std::path::Path;

/// Parse `input` and emit generated modules into `output`.
///
/// The input format is chosen by extension (`.xml`/`.csdl` vs
/// `.yaml`/`.yml`), falling back to content sniffing for anything else.
pub fn run(input: &Path, output: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read schema description {}", input.display()))?;

    let model = match input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("xml" | "csdl") => csdl::parse(&raw)?,
        Some("yaml" | "yml") => openapi::parse(&raw)?,
        _ if raw.trim_start().starts_with('<') => csdl::parse(&raw)?,
        _ if raw.contains("openapi") || raw.contains("components") => openapi::parse(&raw)?,
        _ => bail!(
            "cannot determine schema format of {} (expected CSDL XML or OpenAPI YAML)",
            input.display()
        ),
    };

    log::info!(
        "parsed {}: {} records, {} enums, {} paths",
        input.display(),
        model.records.len(),
        model.enums.len(),
        model.paths.len()
    );

    emit::write_all(output, &model)
}
