use aide_core::config::{AppConfig, LoadOptions};
use aide_core::review::ReviewStore;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("gates", "config_validation", error.to_string(), 2)
        }
    };

    let store = ReviewStore::from_config(&config.review);
    let operations = store.registry().operations();
    if operations.is_empty() {
        return CommandResult::success("gates", "no tools require review");
    }

    let lines = operations
        .iter()
        .map(|operation| {
            format!(
                "{} [{}] {}",
                operation.tool_name, operation.category, operation.description_template
            )
        })
        .collect::<Vec<_>>();

    CommandResult::success("gates", lines.join("\n"))
}
