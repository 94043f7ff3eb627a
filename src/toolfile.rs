//! Toolfile generation.
//!
//! A toolfile is the XML descriptor registered with the SCRAM build system.
//! It declares where the compiled objects and headers of a packaged model
//! live and which link flags consumers pick up.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TfaotError};
use crate::wrapper::{render_template, Substituter, TemplateValue};

/// Embedded template for the toolfile.
const TOOLFILE_TEMPLATE: &str = include_str!("../templates/toolfile.xml.in");

/// Variables describing a tool, with defaults for everything but the name.
#[derive(Debug, Clone)]
pub struct ToolVars {
    /// Tool name registered with the build system.
    pub tool_name: String,

    /// Tool version.
    pub tool_version: String,

    /// Base directory of the tool, usually left as a `@TOOL_BASE@` marker
    /// that deployment substitutes.
    pub tool_base: String,

    /// Environment variable naming the base directory. Derived from the tool
    /// name when not set explicitly.
    pub tool_base_name: Option<String>,

    /// Library directory below the tool base.
    pub lib_dir: String,

    /// Include directory below the tool base.
    pub inc_dir: String,

    /// Linker flags. Bare object file names are expanded below the library
    /// directory and wrapped in `<flags/>` tags.
    pub ld_flags: Vec<String>,
}

impl ToolVars {
    /// Create tool variables with defaults filled in.
    pub fn new(tool_name: impl Into<String>) -> Result<Self> {
        let tool_name = tool_name.into();
        if tool_name.is_empty() {
            return Err(TfaotError::config(
                "missing field 'tool_name' in tool variables".to_string(),
            ));
        }
        Ok(Self {
            tool_name,
            tool_version: "1.0.0".to_string(),
            tool_base: "@TOOL_BASE@".to_string(),
            tool_base_name: None,
            lib_dir: "lib".to_string(),
            inc_dir: "include".to_string(),
            ld_flags: Vec::new(),
        })
    }

    /// The environment variable naming the tool base directory.
    pub fn tool_base_name(&self) -> String {
        self.tool_base_name.clone().unwrap_or_else(|| {
            format!("{}_BASE", self.tool_name.to_uppercase().replace('-', "_"))
        })
    }

    /// Expand and tag the linker flags.
    fn format_ld_flags(&self) -> String {
        let base_name = self.tool_base_name();
        self.ld_flags
            .iter()
            .map(|flag| {
                // a bare basename refers to an object below the lib dir
                let flag = if !flag.contains('/') && !flag.contains('<') {
                    format!("${}/{}/{}", base_name, self.lib_dir, flag)
                } else {
                    flag.clone()
                };
                if flag.starts_with("<flags ") {
                    flag
                } else {
                    format!("<flags LDFLAGS=\"{}\"/>", flag)
                }
            })
            .collect::<Vec<_>>()
            .join("\n  ")
    }
}

/// Render the toolfile and write it to `output_file`.
///
/// Parent directories are created as needed. Returns the output path.
pub fn create_toolfile(output_file: &Path, vars: &ToolVars) -> Result<PathBuf> {
    let values: Vec<(&str, TemplateValue)> = vec![
        ("tool_name", vars.tool_name.as_str().into()),
        ("tool_version", vars.tool_version.as_str().into()),
        ("tool_base", vars.tool_base.as_str().into()),
        ("tool_base_name", vars.tool_base_name().into()),
        ("lib_dir", vars.lib_dir.as_str().into()),
        ("inc_dir", vars.inc_dir.as_str().into()),
        ("ld_flags", vars.format_ld_flags().into()),
    ];
    let substituter = Substituter::new(values);

    let rendered = render_template(TOOLFILE_TEMPLATE, &substituter, &BTreeMap::new())?;

    if let Some(parent) = output_file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_file, rendered)?;

    Ok(output_file.to_path_buf())
}
