//! Configuration System
//!
//! Each object (a context, and later datasets) owns a configuration namespace, a
//! [`ConfigRegistry`], in which typed variables are bound with a default value, a
//! description and flags. Values are resolved when a variable is bound:
//! default, then a file-sourced override for the same (object, key), then the
//! `CKPTIO_<KEY>` environment variable.
//!
//! File-sourced overrides for variables that are not bound yet are kept as
//! [`ConfigKv`] triples by the owning context until something binds them.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

mod registry;
mod sources;

pub use registry::{ConfigRegistry, ConfigVar, Validator};
pub use sources::environment::{env_override, ENV_PREFIX};
pub use sources::file::parse_file;

/// Type tag of a configuration variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float64,
    String,
}

impl ConfigType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigType::Bool => "bool",
            ConfigType::Int32 => "int32",
            ConfigType::UInt32 => "uint32",
            ConfigType::Int64 => "int64",
            ConfigType::UInt64 => "uint64",
            ConfigType::Float64 => "float64",
            ConfigType::String => "string",
        }
    }
}

/// A typed configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    String(String),
}

impl ConfigValue {
    pub fn config_type(&self) -> ConfigType {
        match self {
            ConfigValue::Bool(_) => ConfigType::Bool,
            ConfigValue::Int32(_) => ConfigType::Int32,
            ConfigValue::UInt32(_) => ConfigType::UInt32,
            ConfigValue::Int64(_) => ConfigType::Int64,
            ConfigValue::UInt64(_) => ConfigType::UInt64,
            ConfigValue::Float64(_) => ConfigType::Float64,
            ConfigValue::String(_) => ConfigType::String,
        }
    }

    /// Parse a textual value (from a file or the environment) as `ty`.
    pub fn parse(ty: ConfigType, text: &str) -> Result<Self, Error> {
        let text = text.trim();
        let invalid = || Error::Config(format!("Invalid {} value: {:?}", ty.as_str(), text));
        let value = match ty {
            ConfigType::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => ConfigValue::Bool(true),
                "0" | "false" | "no" | "off" => ConfigValue::Bool(false),
                _ => return Err(invalid()),
            },
            ConfigType::Int32 => ConfigValue::Int32(text.parse().map_err(|_| invalid())?),
            ConfigType::UInt32 => ConfigValue::UInt32(text.parse().map_err(|_| invalid())?),
            ConfigType::Int64 => ConfigValue::Int64(text.parse().map_err(|_| invalid())?),
            ConfigType::UInt64 => ConfigValue::UInt64(text.parse().map_err(|_| invalid())?),
            ConfigType::Float64 => ConfigValue::Float64(text.parse().map_err(|_| invalid())?),
            ConfigType::String => ConfigValue::String(text.to_string()),
        };
        Ok(value)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ConfigValue::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Int32(v) => write!(f, "{}", v),
            ConfigValue::UInt32(v) => write!(f, "{}", v),
            ConfigValue::Int64(v) => write!(f, "{}", v),
            ConfigValue::UInt64(v) => write!(f, "{}", v),
            ConfigValue::Float64(v) => write!(f, "{}", v),
            ConfigValue::String(v) => f.write_str(v),
        }
    }
}

/// Flags attached to a bound variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VarFlags(u32);

impl VarFlags {
    pub const NONE: VarFlags = VarFlags(0);
    /// The variable may only be set when it is bound
    pub const READ_ONLY: VarFlags = VarFlags(1);

    pub fn contains(self, other: VarFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for VarFlags {
    type Output = VarFlags;

    fn bitor(self, rhs: VarFlags) -> VarFlags {
        VarFlags(self.0 | rhs.0)
    }
}

/// A file-sourced override that has not been applied to a bound variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigKv {
    pub key: String,
    pub value: String,
    pub object_identifier: String,
}

impl ConfigKv {
    pub fn matches(&self, object_identifier: &str, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
            && self.object_identifier.eq_ignore_ascii_case(object_identifier)
    }
}

/// Apply parsed file entries to `registry`.
///
/// Entries addressed to the registry's object whose variable is already bound
/// update that variable; every other entry is returned so the caller can keep it
/// for variables bound later.
pub fn apply_file_entries(
    registry: &mut ConfigRegistry,
    entries: Vec<ConfigKv>,
) -> Result<Vec<ConfigKv>, Error> {
    let mut unbound = Vec::new();
    for entry in entries {
        let bound = entry
            .object_identifier
            .eq_ignore_ascii_case(registry.object_identifier())
            && registry.is_bound(&entry.key);
        if bound {
            registry.set_from_str(&entry.key, &entry.value)?;
        } else {
            unbound.push(entry);
        }
    }
    Ok(unbound)
}
