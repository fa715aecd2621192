pub mod provision;
pub mod settings;

pub use provision::{ProvisionCommands, provision_command};
pub use settings::{SettingsCommands, settings_command};
