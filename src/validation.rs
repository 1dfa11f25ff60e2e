//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Validate WGSL source code using naga's parser.
///
/// Returns the parsed naga Module on success, or an error carrying a
/// line-numbered dump of the offending source on failure.
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL validation failed:\n{}", format_naga_error(source, &e)))
}

/// Validate WGSL and provide context about which pipeline generated it.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{context} generated invalid WGSL"))
}

/// Workgroup size of a compute entry point in an already parsed module.
pub fn entry_workgroup_size(module: &naga::Module, entry: &str) -> Result<[u32; 3]> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry)
        .map(|ep| ep.workgroup_size)
        .ok_or_else(|| anyhow!("compute entry point `{entry}` not found in module"))
}

fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = String::new();
    output.push_str(&format!("  {error}\n"));

    output.push_str("\nGenerated WGSL:\n");
    output.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");

    output
}
