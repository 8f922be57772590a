//! File source: override entries read through the `config` crate.
//!
//! The format is inferred from the file extension (TOML when there is none).
//! With a prefix, the table named by the prefix is the scope; otherwise the
//! document root is. Inside the scope, scalar entries address the context
//! object and each table addresses the object named by its key:
//!
//! ```toml
//! [app]
//! context_verbose = 20
//!
//! [app.restart_dataset]
//! dataset_buffer_size = 1048576
//! ```

use super::super::ConfigKv;
use crate::error::Error;
use config::{Config, ConfigError, File, FileFormat, Map, Value, ValueKind};
use std::path::Path;
use tracing::{debug, warn};

/// Parse `path` into override entries, sorted by object then key.
///
/// `context_identifier` is the object that scalar entries of the scope belong to.
pub fn parse_file(
    path: &Path,
    prefix: Option<&str>,
    context_identifier: &str,
) -> Result<Vec<ConfigKv>, Error> {
    if !path.is_file() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }

    let mut source = File::from(path.to_path_buf()).required(true);
    if path.extension().is_none() {
        source = source.format(FileFormat::Toml);
    }
    let settings = Config::builder().add_source(source).build()?;

    let scope: Map<String, Value> = match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => match settings.get_table(prefix) {
            Ok(table) => table,
            Err(ConfigError::NotFound(_)) => {
                debug!(path = %path.display(), prefix, "No configuration section for prefix");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        },
        None => settings.try_deserialize()?,
    };

    let mut entries = Vec::new();
    for (key, value) in scope {
        match value.kind {
            ValueKind::Table(table) => {
                for (object_key, object_value) in table {
                    push_scalar(&mut entries, &key, object_key, object_value, path)?;
                }
            }
            _ => push_scalar(&mut entries, context_identifier, key, value, path)?,
        }
    }

    entries.sort_by(|a, b| {
        (a.object_identifier.as_str(), a.key.as_str())
            .cmp(&(b.object_identifier.as_str(), b.key.as_str()))
    });
    debug!(path = %path.display(), entries = entries.len(), "Parsed configuration file");
    Ok(entries)
}

fn push_scalar(
    entries: &mut Vec<ConfigKv>,
    object_identifier: &str,
    key: String,
    value: Value,
    path: &Path,
) -> Result<(), Error> {
    match value.kind {
        ValueKind::Nil => Ok(()),
        ValueKind::Table(_) | ValueKind::Array(_) => {
            warn!(
                path = %path.display(),
                object = object_identifier,
                key = %key,
                "Ignoring non-scalar configuration entry"
            );
            Ok(())
        }
        _ => {
            entries.push(ConfigKv {
                key,
                value: value.into_string()?,
                object_identifier: object_identifier.to_string(),
            });
            Ok(())
        }
    }
}
