use crate::config::HandoffConfig;
use eyre::{Context, Result};
use log::info;
use std::process::Command;

/// Build the command that receives the prompt as its final argument
pub fn command(config: &HandoffConfig, prompt: &str) -> Result<Command> {
    let program = which::which(&config.command)
        .context(format!("{} not found on PATH", config.command))?;

    let mut cmd = Command::new(program);
    cmd.args(&config.args).arg(prompt);
    Ok(cmd)
}

/// Replace the current process with the configured command
#[cfg(unix)]
pub fn exec(config: &HandoffConfig, prompt: &str) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let mut cmd = command(config, prompt)?;
    info!("Handing prompt ({} bytes) to {}", prompt.len(), config.command);
    let err = cmd.exec();
    Err::<(), _>(err).context(format!("Failed to execute {}", config.command))
}

/// Run the configured command and exit with its status
#[cfg(not(unix))]
pub fn exec(config: &HandoffConfig, prompt: &str) -> Result<()> {
    let mut cmd = command(config, prompt)?;
    info!("Handing prompt ({} bytes) to {}", prompt.len(), config.command);
    let status = cmd
        .status()
        .context(format!("Failed to execute {}", config.command))?;
    std::process::exit(status.code().unwrap_or(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_places_prompt_last() {
        let config = HandoffConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo \"$0\"".to_string()],
        };
        let output = command(&config, "the prompt").unwrap().output().unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "the prompt\n");
    }

    #[test]
    fn test_missing_command_is_error() {
        let config = HandoffConfig {
            command: "definitely-not-a-real-command-xyz".to_string(),
            args: Vec::new(),
        };
        assert!(command(&config, "p").is_err());
    }
}
