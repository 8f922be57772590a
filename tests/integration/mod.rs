mod config_integration;
mod context_lifecycle;
