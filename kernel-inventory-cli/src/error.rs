//! CLI error type.

use std::fmt;

use kernel_inventory::config::ConfigError;
use kernel_inventory::database::StoreError;
use kernel_inventory::settings::SettingsError;
use kernel_inventory::toolkit::ToolkitError;
use kernel_inventory::InventoryError;

/// Errors surfaced to the user by `kinv`.
#[derive(Debug)]
pub enum CliError {
    /// Settings could not be resolved.
    Settings(SettingsError),
    /// A library operation failed.
    Inventory(InventoryError),
    /// A command-line value could not be interpreted.
    InvalidArgument(String),
    /// The result could not be written to stdout.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Settings(e) => write!(
                f,
                "{}\nSet the data root with --data-root or the KINV_DATA_ROOT environment variable.",
                e
            ),
            CliError::Inventory(InventoryError::Store(StoreError::NotFound(path))) => write!(
                f,
                "No kernel database at {}. Run 'kinv build' first.",
                path.display()
            ),
            CliError::Inventory(e) => write!(f, "{}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Settings(e) => Some(e),
            CliError::Inventory(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InventoryError> for CliError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::Settings(e) => CliError::Settings(e),
            InventoryError::UnknownKernelType(_) | InventoryError::UnknownQuality(_) => {
                CliError::InvalidArgument(e.to_string())
            }
            other => CliError::Inventory(other),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        CliError::Settings(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Inventory(e.into())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Inventory(e.into())
    }
}

impl From<ToolkitError> for CliError {
    fn from(e: ToolkitError) -> Self {
        CliError::Inventory(e.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_store_hint() {
        let err: CliError = StoreError::NotFound(PathBuf::from("/cache/kernel_inventory.db")).into();
        let msg = err.to_string();
        assert!(msg.contains("/cache/kernel_inventory.db"));
        assert!(msg.contains("kinv build"));
    }

    #[test]
    fn test_unknown_type_is_invalid_argument() {
        let err: CliError = InventoryError::UnknownKernelType("xyz".to_string()).into();
        assert!(matches!(err, CliError::InvalidArgument(_)));
        assert!(err.to_string().contains("xyz"));
    }
}
