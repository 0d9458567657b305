//! Config command handler

use super::CommandContext;
use crate::cli::ConfigOperation;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};

pub fn run_config(ctx: &CommandContext, operation: &ConfigOperation) -> Result<String> {
    match operation {
        ConfigOperation::Show => show(ctx),
        ConfigOperation::Init { force } => init(ctx, *force),
    }
}

fn show(ctx: &CommandContext) -> Result<String> {
    let config = ctx.load_config()?;
    let source = if ctx.config_file.exists() {
        ctx.config_file.display().to_string()
    } else {
        format!("{} (not found, using defaults)", ctx.config_file.display())
    };

    let mut output = format!("# {}\n", source);
    output.push_str(&config.to_toml()?);
    Ok(output)
}

fn init(ctx: &CommandContext, force: bool) -> Result<String> {
    if ctx.config_file.exists() && !force {
        return Err(DaemonError::Config {
            message: format!(
                "{} already exists (use --force to overwrite)",
                ctx.config_file.display()
            ),
        });
    }

    DaemonConfig::default().save_to(&ctx.config_file)?;
    Ok(format!("Wrote {}\n", ctx.config_file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> CommandContext {
        CommandContext {
            config_file: dir.path().join("config.toml"),
            control_endpoint: PathBuf::from("unused.sock"),
        }
    }

    #[test]
    fn test_show_reports_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let output = run_config(&context(&dir), &ConfigOperation::Show).unwrap();
        assert!(output.contains("not found, using defaults"));
        assert!(output.contains("port = 4141"));
    }

    #[test]
    fn test_init_writes_then_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        run_config(&ctx, &ConfigOperation::Init { force: false }).unwrap();
        let loaded = DaemonConfig::load_from(&ctx.config_file).unwrap();
        assert_eq!(loaded.port, 4141);

        let err = run_config(&ctx, &ConfigOperation::Init { force: false }).unwrap_err();
        assert!(matches!(err, DaemonError::Config { .. }));

        run_config(&ctx, &ConfigOperation::Init { force: true }).unwrap();
    }
}
