//! Per-object namespace of bound configuration variables.

use super::sources::environment::env_override;
use super::{ConfigKv, ConfigType, ConfigValue, VarFlags};
use crate::error::Error;
use serde::Serialize;
use tracing::debug;

/// Checks a candidate value before it is stored
pub type Validator = fn(&ConfigValue) -> Result<(), String>;

/// A variable bound into a [`ConfigRegistry`]
#[derive(Debug, Clone, Serialize)]
pub struct ConfigVar {
    pub key: String,
    pub description: String,
    pub value: ConfigValue,
    pub flags: VarFlags,
    #[serde(skip)]
    pub validator: Option<Validator>,
}

impl ConfigVar {
    pub fn config_type(&self) -> ConfigType {
        self.value.config_type()
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(VarFlags::READ_ONLY)
    }

    fn validate(&self, value: &ConfigValue) -> Result<(), Error> {
        if let Some(validator) = self.validator {
            validator(value).map_err(|reason| {
                Error::BadParameter(format!("Invalid value for {}: {}", self.key, reason))
            })?;
        }
        Ok(())
    }
}

/// Configuration namespace of one object
#[derive(Debug)]
pub struct ConfigRegistry {
    object_identifier: String,
    vars: Vec<ConfigVar>,
    active: bool,
}

impl ConfigRegistry {
    /// Open the namespace for `object_identifier`
    pub fn init(object_identifier: impl Into<String>) -> Self {
        Self {
            object_identifier: object_identifier.into(),
            vars: Vec::new(),
            active: true,
        }
    }

    /// Close the namespace, dropping every bound variable
    pub fn fini(&mut self) {
        debug!(
            object = %self.object_identifier,
            variables = self.vars.len(),
            "Finalizing configuration namespace"
        );
        self.vars.clear();
        self.active = false;
    }

    pub fn object_identifier(&self) -> &str {
        &self.object_identifier
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_bound(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.find(key).map(|var| &var.value)
    }

    pub fn var(&self, key: &str) -> Option<&ConfigVar> {
        self.find(key)
    }

    /// Bound variables in binding order
    pub fn vars(&self) -> &[ConfigVar] {
        &self.vars
    }

    /// Bind a variable.
    ///
    /// The stored value is `default`, replaced by a matching entry of
    /// `file_entries`, replaced by the `CKPTIO_<KEY>` environment variable.
    /// Read-only variables take their resolved value here and reject every later
    /// [`set`](Self::set).
    pub fn add(
        &mut self,
        key: &str,
        default: ConfigValue,
        validator: Option<Validator>,
        description: &str,
        flags: VarFlags,
        file_entries: &[ConfigKv],
    ) -> Result<(), Error> {
        if !self.active {
            return Err(Error::Config(format!(
                "Configuration namespace of {} is finalized",
                self.object_identifier
            )));
        }
        if self.is_bound(key) {
            return Err(Error::BadParameter(format!(
                "Configuration variable {} is already bound for {}",
                key, self.object_identifier
            )));
        }

        let ty = default.config_type();
        let mut var = ConfigVar {
            key: key.to_string(),
            description: description.to_string(),
            value: default,
            flags,
            validator,
        };

        if let Some(entry) = file_entries
            .iter()
            .rev()
            .find(|kv| kv.matches(&self.object_identifier, key))
        {
            var.value = ConfigValue::parse(ty, &entry.value)?;
            debug!(object = %self.object_identifier, key, value = %var.value, "Applied file override");
        }

        if let Some(text) = env_override(key) {
            var.value = ConfigValue::parse(ty, &text)?;
            debug!(object = %self.object_identifier, key, value = %var.value, "Applied environment override");
        }

        var.validate(&var.value)?;
        self.vars.push(var);
        Ok(())
    }

    /// Change the value of a bound variable
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<(), Error> {
        let object = self.object_identifier.clone();
        let var = self
            .vars
            .iter_mut()
            .find(|var| var.key == key)
            .ok_or_else(|| Error::UnknownVariable {
                object: object.clone(),
                key: key.to_string(),
            })?;

        if var.is_read_only() {
            return Err(Error::ReadOnly {
                object,
                key: key.to_string(),
            });
        }
        if value.config_type() != var.config_type() {
            return Err(Error::BadParameter(format!(
                "Configuration variable {} expects {}, got {}",
                key,
                var.config_type().as_str(),
                value.config_type().as_str()
            )));
        }
        var.validate(&value)?;
        var.value = value;
        Ok(())
    }

    /// Change the value of a bound variable from its textual form
    pub fn set_from_str(&mut self, key: &str, text: &str) -> Result<(), Error> {
        let ty = self
            .find(key)
            .map(ConfigVar::config_type)
            .ok_or_else(|| Error::UnknownVariable {
                object: self.object_identifier.clone(),
                key: key.to_string(),
            })?;
        self.set(key, ConfigValue::parse(ty, text)?)
    }

    fn find(&self, key: &str) -> Option<&ConfigVar> {
        self.vars.iter().find(|var| var.key == key)
    }
}
