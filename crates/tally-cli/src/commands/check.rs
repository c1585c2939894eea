//! Check command: compile a rule file and summarize it.

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use tally_core::Rules;

use crate::commands::util;
use crate::config::Config;

/// Formats a short summary of compiled rules.
pub fn format_summary(rules: &Rules) -> String {
    let mut output = String::new();
    writeln!(output, "Rules:        {}", rules.name).unwrap();
    writeln!(output, "Associations: {}", rules.associations.len()).unwrap();
    // The roots are not counted.
    writeln!(output, "Categories:   {}", rules.categories.len() - 1).unwrap();
    writeln!(output, "Tags:         {}", rules.tags.len() - 1).unwrap();
    writeln!(output, "Colors:       {}", rules.colors.len()).unwrap();
    output
}

/// Runs the check command.
pub fn run(config: &Config, rules_path: Option<&Path>) -> Result<()> {
    let rules = util::read_rules(rules_path.unwrap_or(&config.rules_path))?;
    print!("{}", format_summary(&rules));
    Ok(())
}
