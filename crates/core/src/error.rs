// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error type for object-model and schema validation failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown object type '{0}'")]
    UnknownType(String),

    #[error("unknown attribute '{attr}' on type '{objtype}'")]
    UnknownAttribute { objtype: String, attr: String },

    #[error(
        "foreign key source attribute '{attr}' on type '{objtype}' is not part of its primary key"
    )]
    ForeignKeySourceNotPkey { objtype: String, attr: String },

    #[error(
        "foreign key target '{other_type}.{other_attr}' is not that type's single-attribute primary key"
    )]
    ForeignKeyTargetNotPkey { other_type: String, other_attr: String },

    #[error("foreign-key graph contains a cycle through type '{0}'")]
    ForeignKeyCycle(String),

    #[error("object type '{0}' has an empty primary key")]
    EmptyPrimaryKey(String),

    #[error("object of type '{objtype}' is missing primary-key attribute '{attr}'")]
    MissingPrimaryKeyValue { objtype: String, attr: String },
}
