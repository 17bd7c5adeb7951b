//! Embedded file templates.
//!
//! Templates live in `templates/` and use `{{NAME}}` placeholders. Rendering
//! fails if any placeholder is left unreplaced.

use std::path::Path;

use include_dir::{Dir, include_dir};

use crate::types::XcforgeError;

static TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates");

pub const INFO_PLIST: &str = "framework.info.plist";
pub const MODULE_MAP: &str = "framework.modulemap";
pub const SWIFT_RESOURCE_ACCESSOR: &str = "resource_bundle_accessor.swift";
pub const OBJC_RESOURCE_ACCESSOR: &str = "resource_bundle_accessor.m";

/// A `{{name}}` substitution.
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

impl TemplateVar {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Renders the embedded template `name`.
pub fn render(name: &str, vars: &[TemplateVar]) -> Result<String, XcforgeError> {
    let file = TEMPLATES.get_file(name).ok_or_else(|| {
        XcforgeError::Build(format!("Template not found: {}", name))
    })?;
    let source = file.contents_utf8().ok_or_else(|| {
        XcforgeError::Build(format!("Template is not valid UTF-8: {}", name))
    })?;
    let rendered = render_str(source, vars);
    validate_no_unreplaced_placeholders(&rendered, Path::new(name))?;
    Ok(rendered)
}

/// Renders `name` into `dest`, creating parent directories.
pub fn render_to(name: &str, vars: &[TemplateVar], dest: &Path) -> Result<(), XcforgeError> {
    let rendered = render(name, vars)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, rendered).map_err(|e| {
        XcforgeError::Build(format!("Failed to write {}: {}", dest.display(), e))
    })
}

fn render_str(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}

fn validate_no_unreplaced_placeholders(content: &str, file_path: &Path) -> Result<(), XcforgeError> {
    let mut pos = 0;
    let mut unreplaced = Vec::new();

    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        let Some(end) = content[abs_start..].find("}}") else {
            break;
        };
        let var_name = &content[abs_start + 2..abs_start + end];
        if !var_name.is_empty()
            && var_name
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            unreplaced.push(content[abs_start..abs_start + end + 2].to_string());
        }
        pos = abs_start + end + 2;
    }

    if !unreplaced.is_empty() {
        return Err(XcforgeError::Build(format!(
            "Template validation failed for {}: unreplaced placeholders found: {:?}",
            file_path.display(),
            unreplaced
        )));
    }

    Ok(())
}
