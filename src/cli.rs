use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "claude-template",
    about = "Build a prompt from markdown templates and start claude with it",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/claude-template/logs/claude-template.log"
)]
pub struct Cli {
    /// Template to render: a path relative to the current directory, or a
    /// file name / trailing path fragment found anywhere below it
    pub template_file: String,

    /// Extra instructions appended after the rendered prompt
    pub additional_instructions: Option<String>,

    /// Print the rendered prompt instead of starting claude
    #[arg(long)]
    pub dry: bool,

    /// Append a diff of the rendered prompt against the last commit
    #[arg(long)]
    pub changed: bool,

    /// Template variable for the entry template (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_define)]
    pub define: Vec<(String, String)>,

    /// Path to config file (overrides default locations)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Parse a `KEY=VALUE` define; the value may itself contain `=`
pub fn parse_define(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("template argument must be in KEY=VALUE format, got: {}", arg)),
    }
}
