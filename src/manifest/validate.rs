// The miette/thiserror derive macros generate code that triggers false
// positive unused_assignments warnings on enum variant fields.
#![allow(unused_assignments)]

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::config::interpolate::{check_template, TemplateError, TEMPLATE_VARIABLES};
use crate::manifest::model::{Manifest, RawManifest, ServiceSpec, StorageSpec};

#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("manifest not found at {}", path.display())]
    #[diagnostic(
        code(previewrig::manifest_missing),
        help("add a preview.toml at the root of the session tree")
    )]
    Missing { path: PathBuf },

    #[error("failed to read manifest {}", path.display())]
    #[diagnostic(code(previewrig::manifest_unreadable))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}: {message}", path.display())]
    #[diagnostic(code(previewrig::manifest_syntax))]
    Parse { path: PathBuf, message: String },

    #[error("manifest declares no services")]
    #[diagnostic(code(previewrig::no_services))]
    NoServices,

    #[error("no service is marked as the entrypoint")]
    #[diagnostic(
        code(previewrig::no_entrypoint),
        help("set `entrypoint = true` on the one service that should be reachable from outside")
    )]
    NoEntrypoint,

    #[error("more than one service is marked as the entrypoint: {services:?}")]
    #[diagnostic(
        code(previewrig::multiple_entrypoints),
        help("only one service per preview can be externally reachable")
    )]
    MultipleEntrypoints { services: Vec<String> },

    #[error("invalid {kind} name `{name}`")]
    #[diagnostic(
        code(previewrig::invalid_name),
        help("names must be lowercase letters, digits, `-` or `_`, starting with a letter or digit")
    )]
    InvalidName { kind: &'static str, name: String },

    #[error("service `{service}` has invalid directory `{dir}`")]
    #[diagnostic(
        code(previewrig::invalid_directory),
        help("use a path relative to the session tree that does not contain `..`")
    )]
    InvalidDirectory { service: String, dir: String },

    #[error("`{variable}` in {owner} is not a valid environment variable name")]
    #[diagnostic(code(previewrig::invalid_variable))]
    InvalidVariable { owner: String, variable: String },

    #[error("environment variable `{variable}` is written by more than one declaration: {owners:?}")]
    #[diagnostic(
        code(previewrig::duplicate_variable),
        help("each connection variable must be unique across services and storages")
    )]
    DuplicateVariable {
        variable: String,
        owners: Vec<String>,
    },

    #[error("service `{service}` has port 0")]
    #[diagnostic(code(previewrig::invalid_port))]
    InvalidPort { service: String },

    #[error("service `{service}` has an empty command")]
    #[diagnostic(code(previewrig::empty_command))]
    EmptyCommand { service: String },

    #[error(transparent)]
    #[diagnostic(
        code(previewrig::unresolved_template),
        help("templates may use {{{{ project }}}}, {{{{ session }}}}, {{{{ service }}}} and {{{{ port }}}}")
    )]
    Template(#[from] TemplateError),
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    name.len() <= 40
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

pub(crate) fn valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn normalize_dir(service: &str, dir: &str) -> Result<PathBuf, ManifestError> {
    let invalid = || ManifestError::InvalidDirectory {
        service: service.to_string(),
        dir: dir.to_string(),
    };
    let path = Path::new(dir);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    Ok(out)
}

fn check_variable(owner: &str, variable: &str) -> Result<(), ManifestError> {
    if valid_env_name(variable) {
        Ok(())
    } else {
        Err(ManifestError::InvalidVariable {
            owner: owner.to_string(),
            variable: variable.to_string(),
        })
    }
}

/// Turn a raw manifest into the typed form, failing on the first problem.
pub fn validate(raw: RawManifest) -> Result<Manifest, ManifestError> {
    if raw.services.is_empty() {
        return Err(ManifestError::NoServices);
    }

    let mut writers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut services = BTreeMap::new();

    for (name, svc) in raw.services {
        if !valid_name(&name) {
            return Err(ManifestError::InvalidName {
                kind: "service",
                name,
            });
        }
        let owner = format!("services.{name}");
        let dir = normalize_dir(&name, &svc.dir)?;

        if let Some(var) = &svc.connection_variable {
            check_variable(&owner, var)?;
            writers.entry(var.clone()).or_default().push(owner.clone());
        }
        if let Some(var) = &svc.external_connection_variable {
            check_variable(&owner, var)?;
        }
        for (var, value) in &svc.env {
            check_variable(&format!("{owner}.env"), var)?;
            let field = format!("{owner}.env.{var}");
            if let Some(err) = check_template(value, TEMPLATE_VARIABLES, &field)
                .into_iter()
                .next()
            {
                return Err(err.into());
            }
        }
        if svc.port == Some(0) {
            return Err(ManifestError::InvalidPort { service: name });
        }
        let command = match svc.command {
            Some(cmd) if cmd.0.iter().all(|part| part.trim().is_empty()) => {
                return Err(ManifestError::EmptyCommand { service: name });
            }
            Some(cmd) => Some(cmd.into_command()),
            None => None,
        };

        let port = svc.port.unwrap_or_else(|| svc.runtime.default_port());
        services.insert(
            name.clone(),
            ServiceSpec {
                name,
                runtime: svc.runtime,
                dir,
                entrypoint: svc.entrypoint,
                connection_variable: svc.connection_variable,
                external_connection_variable: svc.external_connection_variable,
                command,
                port,
                health_path: svc.health_path,
                env: svc.env,
            },
        );
    }

    let mut storages = BTreeMap::new();
    for (name, storage) in raw.storages {
        if !valid_name(&name) {
            return Err(ManifestError::InvalidName {
                kind: "storage",
                name,
            });
        }
        let owner = format!("storages.{name}");
        check_variable(&owner, &storage.connection_variable)?;
        writers
            .entry(storage.connection_variable.clone())
            .or_default()
            .push(owner);
        storages.insert(
            name.clone(),
            StorageSpec {
                name,
                engine: storage.engine,
                connection_variable: storage.connection_variable,
            },
        );
    }

    if let Some((variable, owners)) = writers.into_iter().find(|(_, owners)| owners.len() > 1) {
        return Err(ManifestError::DuplicateVariable { variable, owners });
    }

    let entrypoints: Vec<String> = services
        .values()
        .filter(|s| s.entrypoint)
        .map(|s| s.name.clone())
        .collect();
    let entrypoint = match entrypoints.as_slice() {
        [] => return Err(ManifestError::NoEntrypoint),
        [one] => one.clone(),
        _ => {
            return Err(ManifestError::MultipleEntrypoints {
                services: entrypoints,
            })
        }
    };

    Ok(Manifest {
        services,
        storages,
        entrypoint,
    })
}
