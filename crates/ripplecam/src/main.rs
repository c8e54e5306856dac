mod cli;
mod paths;
mod run;

use anyhow::{bail, Context, Result};
use cli::{Command, ConfigAction, RunArgs};
use paths::resolve_config_file;
use rippleconfig::RippleConfig;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing(cli.run.verbose);

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action, &cli.run),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction, args: &RunArgs) -> Result<()> {
    let path = resolve_config_file(args.config.as_deref())?;
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = run::effective_config(args)?;
            let rendered = config
                .to_toml_string()
                .context("failed to serialise configuration")?;
            print!("{rendered}");
            Ok(())
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite it",
                    path.display()
                );
            }
            RippleConfig::default()
                .write_to(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
