//! `tailctl tools` handler: the dispatcher catalog.

use tailctl_core::{ToolInfo, catalog};

use crate::cli::{GlobalOpts, OutputFormat, ToolsArgs};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ToolsArgs, global: &GlobalOpts, format: OutputFormat) -> Result<(), CliError> {
    let tools = select(args.tool.as_deref())?;
    output::print_output(&output::render(format, &tools)?, global.quiet);
    Ok(())
}

/// The whole catalog, or the one named tool.
fn select(tool: Option<&str>) -> Result<Vec<ToolInfo>, CliError> {
    let all = catalog();
    let Some(name) = tool else {
        return Ok(all);
    };
    let known: Vec<String> = all.iter().map(|t| t.name.clone()).collect();
    let selected: Vec<ToolInfo> = all.into_iter().filter(|t| t.name == name).collect();
    if selected.is_empty() {
        return Err(CliError::Validation {
            field: "tool".into(),
            reason: format!("unknown tool '{name}'; expected one of: {}", known.join(", ")),
        });
    }
    Ok(selected)
}
