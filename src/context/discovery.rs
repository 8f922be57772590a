//! Module discovery: bind one module per data root, in order.

use super::Context;
use crate::component::{ComponentRegistry, Module};
use crate::error::{push_error, Error, ErrorKind};

/// Split a data-roots specification into its specifiers, in preference order.
///
/// Specifiers are trimmed and empty ones are skipped.
pub fn split_data_roots(data_roots: &str) -> Vec<&str> {
    data_roots
        .split(',')
        .map(str::trim)
        .filter(|root| !root.is_empty())
        .collect()
}

/// Query `registry` for every data root of `data_roots`.
///
/// A data root no component can service fails the whole discovery; modules
/// acquired for earlier data roots are finalized first. Reaching `capacity`
/// with data roots left over is only a warning.
pub(super) fn discover_modules(
    context: &Context,
    registry: &ComponentRegistry,
    data_roots: &str,
    capacity: usize,
) -> Result<Vec<Box<dyn Module>>, Error> {
    let specifiers = split_data_roots(data_roots);
    if specifiers.is_empty() {
        let e = Error::BadParameter(format!(
            "Data roots specification {:?} names no data root",
            data_roots
        ));
        push_error(Some(context), e.kind(), None, None, e.to_string());
        return Err(e);
    }

    let mut modules: Vec<Box<dyn Module>> = Vec::with_capacity(capacity.min(specifiers.len()));
    for (position, data_root) in specifiers.iter().enumerate() {
        match registry.query(context, data_root) {
            Ok(module) => modules.push(module),
            Err(e) => {
                push_error(
                    Some(context),
                    e.kind(),
                    None,
                    None,
                    format!("Could not find an io module for data root {}: {}", data_root, e),
                );
                roll_back(context, modules);
                return Err(e);
            }
        }

        if modules.len() == capacity {
            let skipped = specifiers.len() - position - 1;
            if skipped > 0 {
                push_error(
                    Some(context),
                    ErrorKind::Warning,
                    None,
                    None,
                    format!(
                        "Maximum number of io modules ({}) reached for this context; ignoring {} data root(s)",
                        capacity, skipped
                    ),
                );
            }
            break;
        }
    }

    Ok(modules)
}

fn roll_back(context: &Context, modules: Vec<Box<dyn Module>>) {
    for mut module in modules {
        if let Err(e) = module.fini() {
            push_error(
                Some(context),
                e.kind(),
                Some(module.data_root()),
                None,
                format!("Error finalizing module during rollback: {}", e),
            );
        }
    }
}
