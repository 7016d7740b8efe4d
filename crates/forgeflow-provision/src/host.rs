//! Host lifecycle management
//!
//! A [`Host`] owns one named configuration directory and drives the three
//! tool adapters through the create → plan → apply → destroy lifecycle.
//! The directory's existence is the sole source of truth for whether a
//! named configuration exists.
//!
//! Safety invariant: the configuration directory is never deleted while
//! the Terraform state still lists resources, because the directory holds
//! the only material needed to reach and destroy that infrastructure.

use crate::error::{HostError, Result};
use forgeflow_client::WsClient;
use forgeflow_config::{Context, Credentials};
use forgeflow_core::Definition;
use forgeflow_tools::sources::link_source;
use forgeflow_tools::{Ansible, Packer, Terraform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const APPLICATION_FILE: &str = "application.yml";
const CREDENTIALS_FILE: &str = "cred.json";
const USER_PARAMETERS_FILE: &str = "user_parameters.json";
const DRM_CONF_FILE: &str = "accelize_drm_conf.json";

/// Where the application definition comes from
#[derive(Debug, Clone)]
pub enum ApplicationSource {
    /// Local definition file, linked into the configuration directory
    Path(PathBuf),
    /// `product_id[:version]` id, fetched from the web service
    Id(String),
}

impl ApplicationSource {
    /// Interpret an argument as a local path when one exists, else as an id
    pub fn detect(application: &str) -> Self {
        let path = Path::new(application);
        if path.is_file() {
            Self::Path(path.to_path_buf())
        } else {
            Self::Id(application.to_string())
        }
    }
}

/// Executable overrides for the tool adapters (used by tests and
/// non-standard installs)
#[derive(Debug, Clone, Default)]
pub struct ToolPrograms {
    pub terraform: Option<String>,
    pub packer: Option<String>,
    pub ansible_galaxy: Option<String>,
}

/// Options for creating or loading a host configuration
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Configuration name; a random one is generated when omitted
    pub name: Option<String>,

    /// Application definition, required to create a new configuration
    pub application: Option<ApplicationSource>,

    /// Provider name the definition is resolved for
    pub provider: Option<String>,

    /// Extra user configuration directory layered into the generators
    pub user_config: Option<PathBuf>,

    /// Destroy the managed infrastructure on [`Host::close`]
    pub destroy_on_exit: bool,

    /// Keep the configuration directory on [`Host::close`]; a
    /// configuration is never removed while its infrastructure exists
    pub keep_config: bool,

    pub programs: ToolPrograms,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            name: None,
            application: None,
            provider: None,
            user_config: None,
            destroy_on_exit: false,
            keep_config: true,
            programs: ToolPrograms::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserParameters {
    provider: Option<String>,
    user_config: Option<String>,
}

/// One named host configuration
#[derive(Debug)]
pub struct Host {
    ctx: Context,
    name: String,
    config_dir: PathBuf,
    destroy_on_exit: bool,
    keep_config: bool,
    terraform: Terraform,
    packer: Packer,
    ansible: Ansible,
    output_cache: Mutex<Option<HashMap<String, serde_json::Value>>>,
}

impl Host {
    /// Create a new configuration, or load it when the name already exists
    ///
    /// Creation is transactional: any failure removes the partially-built
    /// directory unless a Terraform state is already present for it.
    pub async fn create(ctx: &Context, options: HostOptions) -> Result<Self> {
        let name = options.name.clone().unwrap_or_else(generated_name);
        let mut host = Self::bind(ctx, &name, &options.programs);
        host.destroy_on_exit = options.destroy_on_exit;
        host.keep_config = options.keep_config;

        if !host.config_dir.is_dir() {
            let Some(application) = &options.application else {
                return Err(HostError::Configuration(
                    "Require at least an existing host name, or an application to create \
                     a new host"
                        .to_string(),
                ));
            };
            host.create_config(
                application,
                options.provider.as_deref(),
                options.user_config.as_deref(),
            )
            .await?;
        }
        Ok(host)
    }

    /// Load an existing configuration
    pub fn open(ctx: &Context, name: &str) -> Result<Self> {
        Self::open_with_programs(ctx, name, ToolPrograms::default())
    }

    pub fn open_with_programs(ctx: &Context, name: &str, programs: ToolPrograms) -> Result<Self> {
        let host = Self::bind(ctx, name, &programs);
        if !host.config_dir.is_dir() {
            return Err(HostError::Configuration(format!(
                "No configuration named \"{name}\""
            )));
        }
        Ok(host)
    }

    fn bind(ctx: &Context, name: &str, programs: &ToolPrograms) -> Self {
        let config_dir = ctx.hosts_dir().join(name);

        let mut terraform = Terraform::new(ctx.clone(), &config_dir);
        if let Some(program) = &programs.terraform {
            terraform = terraform.with_program(program);
        }
        let mut packer = Packer::new(ctx.clone(), &config_dir);
        if let Some(program) = &programs.packer {
            packer = packer.with_program(program);
        }
        let mut ansible = Ansible::new(ctx.clone(), &config_dir);
        if let Some(program) = &programs.ansible_galaxy {
            ansible = ansible.with_galaxy_program(program);
        }

        Self {
            ctx: ctx.clone(),
            name: name.to_string(),
            config_dir,
            destroy_on_exit: false,
            keep_config: true,
            terraform,
            packer,
            ansible,
            output_cache: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    async fn create_config(
        &self,
        application: &ApplicationSource,
        provider: Option<&str>,
        user_config: Option<&Path>,
    ) -> Result<()> {
        // Both levels hold secret material (state files, SSH keys)
        self.ctx.ensure_config_dir()?;
        forgeflow_config::ensure_host_dir(&self.config_dir)?;

        let result = self
            .create_config_inner(application, provider, user_config)
            .await;

        // A failed creation leaves no trace, unless infrastructure state
        // is already attached to this directory
        if result.is_err() && !self.terraform.has_state_file() {
            let _ = std::fs::remove_dir_all(&self.config_dir);
        }
        result
    }

    async fn create_config_inner(
        &self,
        application: &ApplicationSource,
        provider: Option<&str>,
        user_config: Option<&Path>,
    ) -> Result<()> {
        let parameters = UserParameters {
            provider: provider.map(str::to_string),
            user_config: user_config.map(|path| path.to_string_lossy().into_owned()),
        };
        std::fs::write(
            self.config_dir.join(USER_PARAMETERS_FILE),
            serde_json::to_string_pretty(&parameters)?,
        )?;

        // Materialize the application definition
        let definition_path = self.config_dir.join(APPLICATION_FILE);
        match application {
            ApplicationSource::Path(path) => {
                link_source(path, &definition_path).map_err(forgeflow_tools::ToolError::Io)?;
            }
            ApplicationSource::Id(id) => {
                let definition = self.ws_client(user_config)?.fetch_by_id(id).await?;
                definition.save(Some(&definition_path))?;
            }
        }
        let definition = Definition::from_path(std::fs::canonicalize(&definition_path)?)?;

        let fpga_count = definition.get_int("fpga", "count", provider)?.unwrap_or(1);
        let application_type = definition.get_str("application", "type", provider)?;
        let drm_enabled = definition
            .get_bool("accelize_drm", "use_service", provider)?
            .unwrap_or(true);

        // DRM prerequisites
        let cred_src = self.find_credentials(user_config)?;
        let cred_path = self.config_dir.join(CREDENTIALS_FILE);
        link_source(&cred_src, &cred_path).map_err(forgeflow_tools::ToolError::Io)?;
        let drm_conf_path = self.init_drm_conf(&definition, provider, drm_enabled)?;

        // Ansible variables
        let mut ansible_vars = serde_json::Map::new();
        ansible_vars.insert(
            "fpga_image".to_string(),
            serde_json::to_value(definition.get_str_list("fpga", "image", provider)?)?,
        );
        ansible_vars.insert(
            "fpga_driver".to_string(),
            opt_string(definition.get_str("fpga", "driver", provider)?),
        );
        ansible_vars.insert(
            "fpga_driver_version".to_string(),
            opt_string(definition.get_str("fpga", "driver_version", provider)?),
        );
        ansible_vars.insert(
            "fpga_slots".to_string(),
            serde_json::to_value((0..fpga_count).collect::<Vec<i64>>())?,
        );
        ansible_vars.insert(
            "firewall_rules".to_string(),
            serde_json::to_value(definition.section_list("firewall_rules", provider))?,
        );
        ansible_vars.insert(
            "package_name".to_string(),
            opt_string(definition.get_str("package", "name", provider)?),
        );
        ansible_vars.insert(
            "package_version".to_string(),
            opt_string(definition.get_str("package", "version", provider)?),
        );
        ansible_vars.insert(
            "package_repository".to_string(),
            opt_string(definition.get_str("package", "repository", provider)?),
        );
        ansible_vars.insert(
            "accelize_drm_disabled".to_string(),
            serde_json::Value::Bool(!drm_enabled),
        );
        ansible_vars.insert(
            "accelize_drm_conf_src".to_string(),
            serde_json::Value::String(drm_conf_path.to_string_lossy().into_owned()),
        );
        ansible_vars.insert(
            "accelize_drm_cred_src".to_string(),
            serde_json::Value::String(cred_path.to_string_lossy().into_owned()),
        );
        // Application-specific variables are passed through as-is
        let variables = definition.get_map("application", "variables", provider)?;
        if let serde_json::Value::Object(entries) = serde_json::to_value(&variables)? {
            for (key, value) in entries {
                ansible_vars.insert(key, value);
            }
        }

        // Packer variables
        let mut packer_vars = serde_json::Map::new();
        for (index, segment) in provider.unwrap_or_default().split(',').enumerate() {
            packer_vars.insert(
                format!("provider_param_{index}"),
                serde_json::Value::String(segment.to_string()),
            );
        }
        packer_vars.insert(
            "image_name".to_string(),
            serde_json::Value::String(self.name.clone()),
        );
        packer_vars.insert(
            "ansible".to_string(),
            serde_json::Value::String(Ansible::playbook_exec().to_string()),
        );
        packer_vars.insert(
            "fpga_count".to_string(),
            serde_json::Value::String(fpga_count.to_string()),
        );

        // Terraform variables
        let ansible_command: Vec<String> = Ansible::environment()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .chain([Ansible::playbook_exec().to_string()])
            .collect();
        let package_vm_image =
            if definition.get_str("package", "type", provider)? == Some("vm_image") {
                definition
                    .get_str("package", "name", provider)?
                    .unwrap_or_default()
            } else {
                ""
            };
        let mut terraform_vars = serde_json::Map::new();
        terraform_vars.insert(
            "ansible".to_string(),
            serde_json::Value::String(ansible_command.join(" ")),
        );
        terraform_vars.insert(
            "firewall_rules".to_string(),
            serde_json::to_value(definition.section_list("firewall_rules", provider))?,
        );
        terraform_vars.insert("fpga_count".to_string(), serde_json::json!(fpga_count));
        terraform_vars.insert(
            "package_vm_image".to_string(),
            serde_json::Value::String(package_vm_image.to_string()),
        );
        terraform_vars.insert(
            "host_name".to_string(),
            serde_json::Value::String(self.name.clone()),
        );
        terraform_vars.insert("host_provider".to_string(), opt_string(provider));

        // The three generators are independent; all must succeed before
        // the configuration is considered valid
        tokio::try_join!(
            self.terraform
                .create_configuration(provider, application_type, &terraform_vars, user_config),
            self.ansible
                .create_configuration(provider, application_type, &ansible_vars, user_config),
            self.packer
                .create_configuration(provider, application_type, &packer_vars, user_config),
        )?;
        Ok(())
    }

    /// Write the DRM configuration file
    ///
    /// An enabled DRM service requires a non-empty `conf` mapping. The
    /// board type is forced to the selected provider.
    fn init_drm_conf(
        &self,
        definition: &Definition,
        provider: Option<&str>,
        drm_enabled: bool,
    ) -> Result<PathBuf> {
        let conf = definition.get_map("accelize_drm", "conf", provider)?;
        if drm_enabled && conf.is_empty() {
            return Err(HostError::Configuration(
                "Application definition section \"accelize_drm\" requires \"conf\" value \
                 to be specified if \"use_service\" is enabled"
                    .to_string(),
            ));
        }

        let mut conf = match serde_json::to_value(&conf)? {
            serde_json::Value::Object(entries) => entries,
            _ => serde_json::Map::new(),
        };
        if let Some(provider) = provider {
            let design = conf
                .entry("design".to_string())
                .or_insert_with(|| serde_json::json!({}));
            if let Some(design) = design.as_object_mut() {
                design.insert(
                    "boardType".to_string(),
                    serde_json::Value::String(provider.to_string()),
                );
            }
        }

        let path = self.config_dir.join(DRM_CONF_FILE);
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&serde_json::Value::Object(conf))?,
        )?;
        Ok(path)
    }

    fn ws_client(&self, user_config: Option<&Path>) -> Result<WsClient> {
        let cred_path = self.find_credentials(user_config)?;
        let credentials = Credentials::from_path(&cred_path)?;
        Ok(WsClient::new(self.ctx.clone(), credentials)?)
    }

    fn find_credentials(&self, user_config: Option<&Path>) -> Result<PathBuf> {
        let extra: Vec<&Path> = user_config.into_iter().collect();
        Ok(self.ctx.find_credentials(&extra)?)
    }

    fn user_parameters(&self) -> Result<UserParameters> {
        let content = std::fs::read_to_string(self.config_dir.join(USER_PARAMETERS_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Plan the infrastructure creation and return the details
    pub async fn plan(&self) -> Result<String> {
        Ok(self.terraform.plan().await?)
    }

    /// Create the host infrastructure
    pub async fn apply(&mut self, quiet: bool) -> Result<()> {
        *self.output_cache.lock().await = None;
        self.terraform.apply(quiet).await?;
        Ok(())
    }

    /// Build a machine image of the configured host and return its id
    ///
    /// With `update_definition`, the definition's `package` section is
    /// rewritten for the stored provider to point at the new image. The
    /// rewrite re-serializes the file; formatting and comments are lost.
    pub async fn build(&mut self, update_definition: bool, quiet: bool) -> Result<String> {
        let manifest = self.packer.build(quiet).await?;
        let image = Packer::artifact(&manifest)?;

        if update_definition {
            let provider = self.user_parameters()?.provider;
            let real_path = std::fs::canonicalize(self.config_dir.join(APPLICATION_FILE))?;
            let mut definition = Definition::from_path(&real_path)?;
            definition.set_override(
                "package",
                provider.as_deref(),
                "type",
                serde_yaml::Value::String("vm_image".to_string()),
            )?;
            definition.set_override(
                "package",
                provider.as_deref(),
                "name",
                serde_yaml::Value::String(image.clone()),
            )?;
            definition.save(None)?;
        }
        Ok(image)
    }

    /// Destroy the host infrastructure
    ///
    /// With `delete`, the configuration is also marked for removal on
    /// [`Host::close`] (it is still kept while state remains).
    pub async fn destroy(&mut self, quiet: bool, delete: Option<bool>) -> Result<()> {
        if let Some(delete) = delete {
            self.keep_config = !delete;
        }
        self.terraform.destroy(quiet).await?;
        *self.output_cache.lock().await = None;
        Ok(())
    }

    /// Path of the SSH private key to connect to the host
    pub async fn ssh_private_key(&self) -> Result<PathBuf> {
        let path = self.output_value("host_ssh_private_key").await?;
        let path = Path::new(&path);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            // Terraform returns relative paths as "./file"
            let trimmed = path.strip_prefix("./").unwrap_or(path);
            Ok(self.config_dir.join(trimmed))
        }
    }

    /// Name of the user to connect with SSH
    pub async fn ssh_user(&self) -> Result<String> {
        self.output_value("remote_user").await
    }

    /// Private IP address
    pub async fn private_ip(&self) -> Result<String> {
        self.output_value("host_private_ip").await
    }

    /// Public IP address
    pub async fn public_ip(&self) -> Result<String> {
        self.output_value("host_public_ip").await
    }

    /// Read one Terraform output, fetching and caching the whole map on
    /// first access
    async fn output_value(&self, key: &str) -> Result<String> {
        let mut guard = self.output_cache.lock().await;
        if guard.is_none() {
            *guard = Some(self.terraform.output().await?);
        }
        let outputs = guard.as_ref().expect("just populated");

        // A missing key means the configuration was not applied yet,
        // which is not a tool error
        outputs
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| HostError::NotApplied(key.to_string()))
    }

    /// Whether the Terraform state lists at least one resource
    ///
    /// "No state file" outcomes count as no state; other listing errors
    /// propagate.
    pub async fn has_state(&self) -> Result<bool> {
        Ok(!self.terraform.state_list().await?.is_empty())
    }

    /// Release the configuration
    ///
    /// Destroys the infrastructure first when requested, then removes the
    /// configuration directory only when the caller did not ask to keep
    /// it AND the state is verified empty after the optional destroy.
    pub async fn close(&mut self) -> Result<()> {
        if !self.config_dir.is_dir() {
            return Ok(());
        }

        if self.destroy_on_exit && self.has_state().await? {
            self.terraform.destroy(true).await?;
            *self.output_cache.lock().await = None;
        }

        if !self.keep_config && !self.has_state().await? {
            // Best-effort removal; a directory that partially vanished
            // underneath us is not an error
            if let Err(error) = std::fs::remove_dir_all(&self.config_dir) {
                tracing::debug!(
                    "Unable to remove configuration \"{}\": {error}",
                    self.name
                );
            }
        }
        Ok(())
    }
}

fn generated_name() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn opt_string(value: Option<&str>) -> serde_json::Value {
    match value {
        Some(text) => serde_json::Value::String(text.to_string()),
        None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TERRAFORM_STUB: &str = r#"cmd="$1"
case "$cmd" in
  init) : ;;
  plan) echo 'Plan: 1 to add, 0 to change, 0 to destroy.' ;;
  apply) echo '{}' > terraform.tfstate ;;
  destroy) rm -f terraform.tfstate ;;
  output) cat <<'EOF'
{"host_ssh_private_key": {"value": "./ssh_private.pem"},
 "remote_user": {"value": "centos"},
 "host_private_ip": {"value": "10.0.0.1"},
 "host_public_ip": {"value": "127.0.0.1"}}
EOF
  ;;
  state) if [ -f terraform.tfstate ]; then echo 'aws_instance.host'; else echo 'No state file was found!' >&2; exit 1; fi ;;
esac"#;

    struct TestEnv {
        _base: tempfile::TempDir,
        ctx: Context,
        programs: ToolPrograms,
        application: PathBuf,
    }

    fn write_stub(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    fn write_application(dir: &Path, drm_conf: &str) -> PathBuf {
        let path = dir.join("application.yml");
        fs::write(
            &path,
            format!(
                r#"application:
  product_id: my_product_id
  version: 1.0.0
package:
  - type: container_image
    name: my_image
fpga:
  image: fpga_image
accelize_drm:
{drm_conf}
"#
            ),
        )
        .unwrap();
        path
    }

    fn setup() -> TestEnv {
        setup_with_terraform(TERRAFORM_STUB)
    }

    fn setup_with_terraform(terraform_stub: &str) -> TestEnv {
        let base = tempfile::tempdir().unwrap();
        let ctx = Context::with_dirs(base.path().join("config"), base.path().join("cache"));
        ctx.ensure_config_dir().unwrap();

        fs::write(
            ctx.config_dir().join("cred.json"),
            r#"{"client_id": "id", "client_secret": "secret"}"#,
        )
        .unwrap();

        // Minimal generator sources
        let ansible_assets = ctx.assets_dir("ansible");
        fs::create_dir_all(&ansible_assets).unwrap();
        fs::write(ansible_assets.join("playbook.yml"), "- hosts: all\n").unwrap();

        let programs = ToolPrograms {
            terraform: Some(write_stub(base.path(), "terraform-stub", terraform_stub)),
            packer: Some(write_stub(base.path(), "packer-stub", "exit 0")),
            ansible_galaxy: Some(write_stub(base.path(), "galaxy-stub", "exit 0")),
        };

        let application = write_application(base.path(), "  use_service: false");
        TestEnv {
            _base: base,
            ctx,
            programs,
            application,
        }
    }

    fn create_options(env: &TestEnv) -> HostOptions {
        HostOptions {
            name: Some("testing".to_string()),
            application: Some(ApplicationSource::Path(env.application.clone())),
            programs: env.programs.clone(),
            ..HostOptions::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_application() {
        let env = setup();
        let options = HostOptions {
            name: Some("missing".to_string()),
            programs: env.programs.clone(),
            ..HostOptions::default()
        };
        let error = Host::create(&env.ctx, options).await.unwrap_err();
        assert!(matches!(error, HostError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_create_generates_configurations() {
        let env = setup();
        let host = Host::create(&env.ctx, create_options(&env)).await.unwrap();

        assert_eq!(host.name(), "testing");
        let dir = host.config_dir();
        assert!(dir.join(APPLICATION_FILE).exists());
        assert!(dir.join(CREDENTIALS_FILE).exists());
        assert!(dir.join(USER_PARAMETERS_FILE).is_file());
        assert!(dir.join(DRM_CONF_FILE).is_file());
        assert!(dir.join("playbook.yml").is_file());
        assert!(dir.join("template.json").is_file());
        assert!(dir.join("generated.auto.tfvars.json").is_file());

        // Terraform variables carry the host identity
        let tf_vars: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.join("generated.auto.tfvars.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(tf_vars["host_name"], "testing");
        assert_eq!(tf_vars["fpga_count"], 1);

        // Packer variables only keep strings
        let template: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("template.json")).unwrap()).unwrap();
        assert_eq!(template["variables"]["image_name"], "testing");
        assert_eq!(template["variables"]["fpga_count"], "1");
    }

    #[tokio::test]
    async fn test_create_with_generated_name() {
        let env = setup();
        let options = HostOptions {
            name: None,
            ..create_options(&env)
        };
        let host = Host::create(&env.ctx, options).await.unwrap();
        assert_eq!(host.name().len(), 32);
        assert!(host.config_dir().is_dir());
    }

    #[tokio::test]
    async fn test_create_failure_removes_directory() {
        // Terraform init fails, so creation must roll the directory back
        let env = setup_with_terraform("echo 'init failed' >&2; exit 1");
        let error = Host::create(&env.ctx, create_options(&env))
            .await
            .unwrap_err();
        assert!(matches!(error, HostError::Tool(_)));
        assert!(!env.ctx.hosts_dir().join("testing").exists());
    }

    #[tokio::test]
    async fn test_create_missing_drm_conf_is_configuration_error() {
        let env = setup();
        let application = write_application(env._base.path(), "  use_service: true");
        let options = HostOptions {
            application: Some(ApplicationSource::Path(application)),
            ..create_options(&env)
        };
        let error = Host::create(&env.ctx, options).await.unwrap_err();
        assert!(matches!(error, HostError::Configuration(_)));
        assert!(!env.ctx.hosts_dir().join("testing").exists());
    }

    #[tokio::test]
    async fn test_open_unknown_name() {
        let env = setup();
        assert!(Host::open(&env.ctx, "nope").is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_apply_outputs_destroy() {
        let env = setup();
        let mut host = Host::create(&env.ctx, create_options(&env)).await.unwrap();

        // Not applied yet: outputs are a distinct error
        // (the stub returns outputs unconditionally, so exercise the
        // missing-key path instead)
        assert!(matches!(
            host.output_value("not_an_output").await.unwrap_err(),
            HostError::NotApplied(_)
        ));

        assert!(host.plan().await.unwrap().contains("Plan:"));
        assert!(!host.has_state().await.unwrap());

        host.apply(true).await.unwrap();
        assert!(host.config_dir().join("terraform.tfstate").is_file());
        assert!(host.has_state().await.unwrap());

        assert_eq!(host.public_ip().await.unwrap(), "127.0.0.1");
        assert_eq!(host.private_ip().await.unwrap(), "10.0.0.1");
        assert_eq!(host.ssh_user().await.unwrap(), "centos");
        // Relative key paths resolve against the configuration directory
        assert_eq!(
            host.ssh_private_key().await.unwrap(),
            host.config_dir().join("ssh_private.pem")
        );

        host.destroy(true, None).await.unwrap();
        assert!(!host.has_state().await.unwrap());
    }

    #[tokio::test]
    async fn test_close_keeps_directory_while_state_exists() {
        let env = setup();
        let options = HostOptions {
            keep_config: false,
            ..create_options(&env)
        };
        let mut host = Host::create(&env.ctx, options).await.unwrap();
        host.apply(true).await.unwrap();

        // State still lists resources: the directory must survive even
        // though keep_config is false
        host.close().await.unwrap();
        assert!(env.ctx.hosts_dir().join("testing").is_dir());
    }

    #[tokio::test]
    async fn test_close_removes_directory_without_state() {
        let env = setup();
        let options = HostOptions {
            keep_config: false,
            ..create_options(&env)
        };
        let mut host = Host::create(&env.ctx, options).await.unwrap();
        host.close().await.unwrap();
        assert!(!env.ctx.hosts_dir().join("testing").exists());
    }

    #[tokio::test]
    async fn test_close_destroy_on_exit() {
        let env = setup();
        let options = HostOptions {
            destroy_on_exit: true,
            keep_config: false,
            ..create_options(&env)
        };
        let mut host = Host::create(&env.ctx, options).await.unwrap();
        host.apply(true).await.unwrap();

        host.close().await.unwrap();
        assert!(!env.ctx.hosts_dir().join("testing").exists());
    }

    #[tokio::test]
    async fn test_close_keep_config_by_default() {
        let env = setup();
        let mut host = Host::create(&env.ctx, create_options(&env)).await.unwrap();
        host.close().await.unwrap();
        assert!(env.ctx.hosts_dir().join("testing").is_dir());

        // Reopen the kept configuration
        let host = Host::open_with_programs(&env.ctx, "testing", env.programs.clone()).unwrap();
        assert_eq!(host.name(), "testing");
    }

    #[tokio::test]
    async fn test_destroy_with_delete_marks_for_removal() {
        let env = setup();
        let mut host = Host::create(&env.ctx, create_options(&env)).await.unwrap();
        host.apply(true).await.unwrap();

        host.destroy(true, Some(true)).await.unwrap();
        host.close().await.unwrap();
        assert!(!env.ctx.hosts_dir().join("testing").exists());
    }

    #[tokio::test]
    async fn test_build_updates_definition() {
        let env = setup();
        let options = HostOptions {
            provider: Some("testing_provider".to_string()),
            ..create_options(&env)
        };
        let mut host = Host::create(&env.ctx, options).await.unwrap();

        // Canned packer manifest for this run
        fs::write(
            host.config_dir().join("packer-manifest.json"),
            r#"{
                "builds": [{"packer_run_uuid": "run1", "builder_type": "amazon-ebs",
                            "artifact_id": "eu-west-1:ami-0fedcba9876543210"}],
                "last_run_uuid": "run1"
            }"#,
        )
        .unwrap();

        // Build without updating leaves the definition alone
        let image = host.build(false, true).await.unwrap();
        assert_eq!(image, "ami-0fedcba9876543210");
        let definition = Definition::from_path(&env.application).unwrap();
        assert_eq!(
            definition
                .get_str("package", "name", Some("testing_provider"))
                .unwrap(),
            Some("my_image")
        );

        // Build with update rewrites the provider override
        host.build(true, true).await.unwrap();
        let definition = Definition::from_path(&env.application).unwrap();
        assert_eq!(
            definition
                .get_str("package", "name", Some("testing_provider"))
                .unwrap(),
            Some("ami-0fedcba9876543210")
        );
        assert_eq!(
            definition
                .get_str("package", "type", Some("testing_provider"))
                .unwrap(),
            Some("vm_image")
        );
        // The default view is untouched
        assert_eq!(
            definition.get_str("package", "name", None).unwrap(),
            Some("my_image")
        );
    }
}
