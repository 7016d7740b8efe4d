//! Terraform adapter
//!
//! Generates the per-host Terraform configuration from layered sources and
//! wraps the `terraform` CLI for plan/apply/destroy/output/state.

use crate::error::{Result, ToolError};
use crate::process::{self, ExecOutput, RunOpts};
use crate::sources::{link_source, list_sources, source_dirs, source_filters};
use crate::json_write;
use forgeflow_config::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROGRAM: &str = "terraform";
const EXTS_INCLUDE: &[&str] = &[".tf", ".tfvars", ".tf.json", ".tfvars.json"];
const VARIABLES_FILE: &str = "generated.auto.tfvars.json";
const STATE_FILE: &str = "terraform.tfstate";
const PLAN_FILE: &str = "tfplan";

const INIT_RETRIES: u32 = 3;
const APPLY_RETRIES: u32 = 10;
const APPLY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Known-transient provider error signatures eligible for apply retry.
///
/// Matched by substring against the failure message. The entries are the
/// baseline compatibility set; extend the table when a new transient
/// signature is identified, never loosen the match.
const RETRYABLE_APPLY_ERRORS: &[&str] = &[
    "Error requesting spot instances: InvalidSubnetID.NotFound: \
     No default subnet for availability zone: 'null'",
    "Error while waiting for spot request",
];

/// Terraform CLI wrapper bound to one host configuration directory
#[derive(Debug)]
pub struct Terraform {
    ctx: Context,
    config_dir: PathBuf,
    program: String,
}

impl Terraform {
    pub fn new(ctx: Context, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            config_dir: config_dir.into(),
            program: PROGRAM.to_string(),
        }
    }

    /// Use a specific executable instead of `terraform` from PATH
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Generate the Terraform configuration
    ///
    /// Links every layered source file matching the provider/application
    /// filters, writes the input variables, then runs `terraform init`.
    pub async fn create_configuration(
        &self,
        provider: Option<&str>,
        application_type: Option<&str>,
        variables: &serde_json::Map<String, serde_json::Value>,
        user_config: Option<&Path>,
    ) -> Result<()> {
        let dirs = source_dirs(&self.ctx, PROGRAM, user_config);
        let names = source_filters(provider, application_type);
        for (name, src) in list_sources(&dirs, &names, EXTS_INCLUDE, &[]) {
            link_source(&src, &self.config_dir.join(name))?;
        }

        // Null variables are left to their Terraform-side defaults
        let tf_vars: serde_json::Map<String, serde_json::Value> = variables
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        json_write(
            &serde_json::Value::Object(tf_vars),
            &self.config_dir.join(VARIABLES_FILE),
        )?;

        let opts = RunOpts {
            pipe_stdout: true,
            retries: INIT_RETRIES,
            envs: self.exec_envs()?,
            ..RunOpts::default()
        };
        process::run(
            &self.program,
            &["init", self.no_color_arg(), "-input=false"],
            &self.config_dir,
            &opts,
        )
        .await?;
        Ok(())
    }

    /// Generate and show an execution plan, also saved as `tfplan`
    pub async fn plan(&self) -> Result<String> {
        let output = self
            .exec(
                &["plan", self.no_color_arg(), "-input=false", "-out=tfplan"],
                true,
            )
            .await?;
        Ok(output.stdout)
    }

    /// Build or change the infrastructure
    ///
    /// Retried only on the known-transient signatures, up to the default
    /// attempt budget; any other failure is fatal immediately.
    pub async fn apply(&self, quiet: bool) -> Result<()> {
        self.apply_with_retries(quiet, APPLY_RETRIES, APPLY_RETRY_DELAY)
            .await
    }

    pub async fn apply_with_retries(
        &self,
        quiet: bool,
        retries: u32,
        delay: Duration,
    ) -> Result<()> {
        let mut args = vec![
            "apply",
            self.no_color_arg(),
            "-auto-approve",
            "-input=false",
        ];
        if self.config_dir.join(PLAN_FILE).is_file() {
            args.push(PLAN_FILE);
        }

        let mut failures = 0;
        loop {
            match self.exec(&args, quiet).await {
                Ok(_) => return Ok(()),
                Err(error) => {
                    let retryable = RETRYABLE_APPLY_ERRORS
                        .iter()
                        .any(|signature| error.to_string().contains(signature));
                    if !retryable {
                        return Err(error);
                    }
                    if failures >= retries {
                        return Err(ToolError::ApplyRetriesExceeded {
                            retries,
                            source: Box::new(error),
                        });
                    }
                    failures += 1;
                    tracing::warn!("Transient apply failure, retry {failures}/{retries}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Destroy the managed infrastructure
    pub async fn destroy(&self, quiet: bool) -> Result<()> {
        self.exec(&["destroy", self.no_color_arg(), "-auto-approve"], quiet)
            .await?;
        Ok(())
    }

    /// Reconcile the state with the real-world infrastructure
    pub async fn refresh(&self, quiet: bool) -> Result<()> {
        if self.has_state_file() {
            self.exec(&["refresh", self.no_color_arg(), "-input=false"], quiet)
                .await?;
        }
        Ok(())
    }

    /// Read outputs from the Terraform state
    pub async fn output(&self) -> Result<HashMap<String, serde_json::Value>> {
        let output = self
            .exec(&["output", self.no_color_arg(), "-json"], true)
            .await?;
        let raw: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        let Some(entries) = raw.as_object() else {
            return Ok(HashMap::new());
        };
        // Each output is wrapped as {"value": ..., "type": ...}
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry["value"].clone()))
            .collect())
    }

    /// List resources within the Terraform state
    ///
    /// A failure caused by a missing state file counts as "no state" and
    /// returns an empty list; any other failure propagates.
    pub async fn state_list(&self) -> Result<Vec<String>> {
        let opts = RunOpts {
            check: false,
            pipe_stdout: true,
            envs: self.exec_envs()?,
            ..RunOpts::default()
        };
        let result = process::run(&self.program, &["state", "list"], &self.config_dir, &opts).await?;

        if !result.success() {
            if !self.has_state_file() {
                return Ok(Vec::new());
            }
            return Err(ToolError::Runtime(result.stderr));
        }

        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether a state file is present in the configuration directory
    pub fn has_state_file(&self) -> bool {
        self.config_dir.join(STATE_FILE).is_file()
    }

    /// Terraform executable version
    pub async fn version(&self) -> Result<String> {
        process::version(&self.program, &self.config_dir).await
    }

    async fn exec(&self, args: &[&str], pipe_stdout: bool) -> Result<ExecOutput> {
        let opts = RunOpts {
            pipe_stdout,
            envs: self.exec_envs()?,
            ..RunOpts::default()
        };
        process::run(&self.program, args, &self.config_dir, &opts).await
    }

    fn exec_envs(&self) -> Result<Vec<(String, String)>> {
        // Shared provider plugin cache avoids re-downloading per host
        let plugin_cache = self.ctx.cache_dir().join("terraform").join("plugins");
        std::fs::create_dir_all(&plugin_cache)?;
        Ok(vec![(
            "TF_PLUGIN_CACHE_DIR".to_string(),
            plugin_cache.to_string_lossy().into_owned(),
        )])
    }

    fn no_color_arg(&self) -> &'static str {
        if self.ctx.is_no_color() { "-no-color" } else { "" }
    }
}
