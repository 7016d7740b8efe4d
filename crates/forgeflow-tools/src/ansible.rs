//! Ansible adapter
//!
//! Assembles the per-host playbook from layered sources: local roles are
//! linked into the configuration directory (with their local dependencies,
//! resolved depth-first), Galaxy dependencies are fetched in parallel, and
//! the playbook gets the host variables injected.

use crate::error::{Result, ToolError};
use crate::process::{self, RunOpts};
use crate::sources::{link_source, source_dirs, source_filters};
use forgeflow_config::Context;
use futures_util::StreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const PROGRAM: &str = "ansible";
const GALAXY_PROGRAM: &str = "ansible-galaxy";
const PLAYBOOK_PROGRAM: &str = "ansible-playbook";
const PLAYBOOK_FILE: &str = "playbook.yml";

/// Concurrent Galaxy role downloads
const GALAXY_FETCH_CONCURRENCY: usize = 4;

/// Ansible configuration generator bound to one host configuration directory
#[derive(Debug)]
pub struct Ansible {
    ctx: Context,
    config_dir: PathBuf,
    galaxy_program: String,
}

impl Ansible {
    pub fn new(ctx: Context, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            config_dir: config_dir.into(),
            galaxy_program: GALAXY_PROGRAM.to_string(),
        }
    }

    /// Use a specific executable instead of `ansible-galaxy` from PATH
    pub fn with_galaxy_program(mut self, program: impl Into<String>) -> Self {
        self.galaxy_program = program.into();
        self
    }

    /// Command used by the other tools to run the playbook remotely
    pub fn playbook_exec() -> &'static str {
        PLAYBOOK_PROGRAM
    }

    /// Environment applied to playbook invocations
    pub fn environment() -> Vec<(String, String)> {
        vec![(
            "ANSIBLE_HOST_KEY_CHECKING".to_string(),
            "False".to_string(),
        )]
    }

    /// Generate the Ansible configuration
    pub async fn create_configuration(
        &self,
        provider: Option<&str>,
        application_type: Option<&str>,
        variables: &serde_json::Map<String, serde_json::Value>,
        user_config: Option<&Path>,
    ) -> Result<()> {
        let dirs = source_dirs(&self.ctx, PROGRAM, user_config);
        let names = source_filters(provider, application_type);

        // Scan sources: playbook, local roles, other configuration files
        let mut playbook_src: Option<PathBuf> = None;
        let mut roles_local: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut yaml_files: BTreeMap<String, PathBuf> = BTreeMap::new();

        for dir in &dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.filter_map(|entry| entry.ok()) {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                let path = entry.path();
                if name == PLAYBOOK_FILE && path.is_file() {
                    playbook_src = Some(path);
                } else if name == "roles" && path.is_dir() {
                    for role in std::fs::read_dir(&path)?.filter_map(|role| role.ok()) {
                        roles_local.insert(
                            role.file_name().to_string_lossy().to_lowercase(),
                            role.path(),
                        );
                    }
                } else if path.extension().is_some_and(|ext| ext == "yml") && path.is_file() {
                    yaml_files.insert(entry.file_name().to_string_lossy().into_owned(), path);
                }
            }
        }

        let playbook_src = playbook_src.ok_or_else(|| {
            ToolError::Runtime("No playbook.yml found in configuration sources".to_string())
        })?;

        // Roles participating in this configuration
        let selected: BTreeSet<String> = roles_local
            .keys()
            .filter(|role| {
                let tag = role.split('.').next().unwrap_or_default();
                names.iter().any(|name| name == tag)
            })
            .cloned()
            .collect();

        // Resolve local role dependencies, collecting Galaxy ones
        let mut resolved = BTreeSet::new();
        let mut galaxy_roles = BTreeSet::new();
        for role in &selected {
            resolve_role(
                role,
                &roles_local,
                &mut resolved,
                &mut Vec::new(),
                &mut galaxy_roles,
            )?;
        }

        // Link resolved roles into the configuration directory
        let role_dir = self.config_dir.join("roles");
        std::fs::create_dir_all(&role_dir)?;
        for role in &resolved {
            link_source(&roles_local[role], &role_dir.join(role))?;
        }

        self.galaxy_install(&galaxy_roles, &role_dir).await?;

        // Build the playbook: inject variables, list selected roles with
        // ".init" roles first
        let content = std::fs::read_to_string(&playbook_src)?;
        let mut playbook: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let play = playbook
            .as_sequence_mut()
            .and_then(|plays| plays.first_mut())
            .ok_or_else(|| {
                ToolError::Runtime("playbook.yml must contain at least one play".to_string())
            })?;

        let mut vars = serde_yaml::Mapping::new();
        for (key, value) in variables {
            if !value.is_null() {
                vars.insert(
                    serde_yaml::Value::String(key.clone()),
                    serde_yaml::to_value(value)?,
                );
            }
        }
        play["vars"] = serde_yaml::Value::Mapping(vars);

        let mut roles: Vec<&String> = selected.iter().collect();
        roles.sort_by(|a, b| {
            (!a.ends_with(".init"), a.as_str()).cmp(&(!b.ends_with(".init"), b.as_str()))
        });
        play["roles"] = serde_yaml::Value::Sequence(
            roles
                .into_iter()
                .map(|role| serde_yaml::Value::String(role.clone()))
                .collect(),
        );

        std::fs::write(
            self.config_dir.join(PLAYBOOK_FILE),
            serde_yaml::to_string(&playbook)?,
        )?;

        // Link remaining configuration files
        for (name, path) in &yaml_files {
            if name.to_lowercase() != PLAYBOOK_FILE {
                link_source(path, &self.config_dir.join(name))?;
            }
        }
        Ok(())
    }

    /// Install roles from Ansible Galaxy, bounded parallel fetch
    pub async fn galaxy_install(&self, roles: &BTreeSet<String>, roles_path: &Path) -> Result<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let roles_path_arg = format!("--roles-path={}", roles_path.display());

        let results: Vec<Result<_>> = futures_util::stream::iter(roles)
            .map(|role| {
                let roles_path_arg = roles_path_arg.clone();
                async move {
                    process::run(
                        &self.galaxy_program,
                        &["install", roles_path_arg.as_str(), role.as_str()],
                        &self.config_dir,
                        &RunOpts::piped(),
                    )
                    .await
                }
            })
            .buffer_unordered(GALAXY_FETCH_CONCURRENCY)
            .collect()
            .await;

        for result in results {
            result?;
        }
        Ok(())
    }
}

/// Depth-first resolution of local role dependencies
///
/// `stack` carries the roles currently being resolved; meeting one again
/// is a dependency cycle and a hard error rather than an endless loop.
fn resolve_role(
    role: &str,
    roles_local: &BTreeMap<String, PathBuf>,
    resolved: &mut BTreeSet<String>,
    stack: &mut Vec<String>,
    galaxy_roles: &mut BTreeSet<String>,
) -> Result<()> {
    if resolved.contains(role) {
        return Ok(());
    }
    if stack.iter().any(|entry| entry == role) {
        let mut chain = stack.clone();
        chain.push(role.to_string());
        return Err(ToolError::RoleCycle(chain.join(" -> ")));
    }
    stack.push(role.to_string());

    for dependency in role_dependencies(&roles_local[role]) {
        if roles_local.contains_key(&dependency) {
            resolve_role(&dependency, roles_local, resolved, stack, galaxy_roles)?;
        } else {
            galaxy_roles.insert(dependency);
        }
    }

    stack.pop();
    resolved.insert(role.to_string());
    Ok(())
}

/// Read a role's dependency list from `meta/main.yml`
///
/// Entries come either as a bare name or as `role: name`. A missing meta
/// file or dependency key means no dependencies.
fn role_dependencies(role_path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(role_path.join("meta/main.yml")) else {
        return Vec::new();
    };
    let Ok(meta) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
        return Vec::new();
    };
    let Some(dependencies) = meta.get("dependencies").and_then(|deps| deps.as_sequence()) else {
        return Vec::new();
    };

    dependencies
        .iter()
        .filter_map(|entry| match entry {
            serde_yaml::Value::String(name) => Some(name.clone()),
            serde_yaml::Value::Mapping(mapping) => mapping
                .get("role")
                .and_then(|name| name.as_str())
                .map(str::to_string),
            _ => None,
        })
        .collect()
}
