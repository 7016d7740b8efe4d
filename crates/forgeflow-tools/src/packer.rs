//! Packer adapter
//!
//! Builds the Packer template by merging layered JSON sources, rendering
//! templated variables, and wraps `packer build` / manifest parsing.

use crate::error::{Result, ToolError};
use crate::process::{self, RunOpts};
use crate::sources::{list_sources, source_dirs, source_filters};
use crate::{json_read, json_write};
use forgeflow_config::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PROGRAM: &str = "packer";
const EXTS_INCLUDE: &[&str] = &[".json"];
const EXTS_EXCLUDE: &[&str] = &[".tf.json", ".tfvars.json"];
const TEMPLATE_FILE: &str = "template.json";
const MANIFEST_FILE: &str = "packer-manifest.json";

/// Builder families with distinct artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderKind {
    /// Builders producing local files
    File,
    /// AWS EBS builder, artifact is `region:ami-id`
    AmazonEbs,
    /// Anything else, artifact id used verbatim
    Other,
}

impl From<&str> for BuilderKind {
    fn from(builder_type: &str) -> Self {
        match builder_type {
            "file" => BuilderKind::File,
            "amazon-ebs" => BuilderKind::AmazonEbs,
            _ => BuilderKind::Other,
        }
    }
}

/// Packer CLI wrapper bound to one host configuration directory
#[derive(Debug)]
pub struct Packer {
    ctx: Context,
    config_dir: PathBuf,
    program: String,
}

impl Packer {
    pub fn new(ctx: Context, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            config_dir: config_dir.into(),
            program: PROGRAM.to_string(),
        }
    }

    /// Use a specific executable instead of `packer` from PATH
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn template_path(&self) -> PathBuf {
        self.config_dir.join(TEMPLATE_FILE)
    }

    /// Generate the Packer template file
    ///
    /// Layered JSON sources are merged in sorted name order with a
    /// recursive mapping update, then templated string variables are
    /// rendered and non-string variables dropped (Packer accepts only
    /// strings as user variables).
    pub async fn create_configuration(
        &self,
        provider: Option<&str>,
        application_type: Option<&str>,
        variables: &serde_json::Map<String, serde_json::Value>,
        user_config: Option<&Path>,
    ) -> Result<()> {
        let mut sources: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        sources.insert(
            "vars".to_string(),
            serde_json::json!({ "variables": variables }),
        );

        let dirs = source_dirs(&self.ctx, PROGRAM, user_config);
        let names = source_filters(provider, application_type);
        for (name, path) in list_sources(&dirs, &names, EXTS_INCLUDE, EXTS_EXCLUDE) {
            sources.insert(name, json_read(&path)?);
        }

        let mut template = serde_json::Value::Object(serde_json::Map::new());
        for source in sources.into_values() {
            recursive_update(&mut template, source);
        }

        render_variables(&mut template)?;
        json_write(&template, &self.template_path())
    }

    /// Build the image and return the manifest entry of this run
    pub async fn build(&self, quiet: bool) -> Result<serde_json::Value> {
        let color_arg = if self.ctx.is_no_color() {
            "-color=false"
        } else {
            ""
        };
        let opts = RunOpts {
            pipe_stdout: quiet,
            ..RunOpts::default()
        };
        process::run(
            &self.program,
            &["build", color_arg, TEMPLATE_FILE],
            &self.config_dir,
            &opts,
        )
        .await?;

        let manifest = json_read(&self.config_dir.join(MANIFEST_FILE))?;
        let last_run_uuid = manifest["last_run_uuid"].as_str().unwrap_or_default();
        manifest["builds"]
            .as_array()
            .and_then(|builds| {
                builds
                    .iter()
                    .find(|build| build["packer_run_uuid"].as_str() == Some(last_run_uuid))
            })
            .cloned()
            .ok_or_else(|| {
                ToolError::Runtime(format!(
                    "No packer manifest for run with UUID {last_run_uuid}"
                ))
            })
    }

    /// Validate the generated template
    pub async fn validate(&self) -> Result<()> {
        process::run(
            &self.program,
            &["validate", TEMPLATE_FILE],
            &self.config_dir,
            &RunOpts::piped(),
        )
        .await?;
        Ok(())
    }

    /// Packer executable version
    pub async fn version(&self) -> Result<String> {
        process::version(&self.program, &self.config_dir).await
    }

    /// Extract the image identifier from a manifest build entry
    pub fn artifact(build: &serde_json::Value) -> Result<String> {
        let kind = BuilderKind::from(build["builder_type"].as_str().unwrap_or_default());
        let artifact_id = build["artifact_id"].as_str().unwrap_or_default();

        let artifact = match kind {
            BuilderKind::File => build["files"][0]["name"].as_str().unwrap_or_default(),
            BuilderKind::AmazonEbs => artifact_id
                .split_once(':')
                .map(|(_, id)| id)
                .unwrap_or(artifact_id),
            BuilderKind::Other => artifact_id,
        };

        if artifact.is_empty() {
            return Err(ToolError::Runtime(
                "No artifact found in packer manifest".to_string(),
            ));
        }
        Ok(artifact.to_string())
    }
}

/// Recursively update mappings, replacing every other value kind
fn recursive_update(base: &mut serde_json::Value, update: serde_json::Value) {
    match (base, update) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        recursive_update(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, update) => *base = update,
    }
}

/// Render templated string variables and drop non-string ones
///
/// Rendering is done in sorted key order against the current variable
/// map, so rendered values are visible to later templates.
fn render_variables(template: &mut serde_json::Value) -> Result<()> {
    let Some(variables) = template
        .get_mut("variables")
        .and_then(serde_json::Value::as_object_mut)
    else {
        return Ok(());
    };

    let keys: Vec<String> = variables.keys().cloned().collect();
    for key in &keys {
        let Some(text) = variables[key].as_str() else {
            continue;
        };
        if !text.contains('{') {
            continue;
        }
        let context = tera::Context::from_serialize(&*variables)?;
        let rendered = tera::Tera::one_off(text, &context, false)?;
        variables.insert(key.clone(), serde_json::Value::String(rendered));
    }

    variables.retain(|_, value| value.is_string());
    Ok(())
}
