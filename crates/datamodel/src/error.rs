// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("config file {path}: {source}")]
    ConfigIo { path: String, #[source] source: std::io::Error },

    #[error("config file {path}: {source}")]
    ConfigParse { path: String, #[source] source: toml::de::Error },

    #[error("local type '{local_type}' maps to unknown remote type '{hermes_type}'")]
    UnknownHermesType { local_type: String, hermes_type: String },

    #[error(
        "template for '{local_type}.{local_attr}' references unknown remote attribute '{remote_attr}'"
    )]
    UnknownRemoteAttribute { local_type: String, local_attr: String, remote_attr: String },

    #[error("primary-key attribute '{local_type}.{local_attr}' may not be a template expression")]
    PrimaryKeyIsExpression { local_type: String, local_attr: String },

    #[error("duplicate local type declared: '{0}'")]
    DuplicateLocalType(String),
}
