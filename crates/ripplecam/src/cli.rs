use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rippleconfig::{ColorSpaceSetting, PowerSetting};

#[derive(Parser, Debug)]
#[command(
    name = "ripplecam",
    author,
    version,
    about = "Live video with an interactive water-ripple distortion",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Read settings from this TOML file instead of the default location.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Ripple a still image instead of a live feed.
    #[arg(long, value_name = "FILE", conflicts_with = "camera")]
    pub image: Option<PathBuf>,

    /// Capture from a camera (index 0 when no index is given).
    #[arg(
        long,
        value_name = "INDEX",
        num_args = 0..=1,
        default_missing_value = "0"
    )]
    pub camera: Option<u32>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub size: Option<(u32, u32)>,

    /// Energy retained per wave step, strictly between 0 and 1.
    #[arg(long, value_name = "FACTOR")]
    pub damping: Option<f32>,

    /// Scale applied to the ripple gradient when displacing the video (0-1).
    #[arg(long, value_name = "SCALE")]
    pub ripple_strength: Option<f32>,

    /// Show the video unmirrored.
    #[arg(long)]
    pub no_mirror: bool,

    /// GPU power preference (`high` or `low`).
    #[arg(long, value_name = "PREF", value_parser = parse_power)]
    pub power: Option<PowerSetting>,

    /// Colour handling for video and swapchain (`auto`, `gamma`, `linear`).
    #[arg(long, value_name = "MODE", value_parser = parse_color_space)]
    pub color_space: Option<ColorSpaceSetting>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or create the configuration file.
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration file path.
    Path,
    /// Print the effective configuration (file plus flags) as TOML.
    Show,
    /// Write the default configuration file.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_color_space(value: &str) -> Result<ColorSpaceSetting, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ColorSpaceSetting::Auto),
        "gamma" | "srgb-off" => Ok(ColorSpaceSetting::Gamma),
        "linear" | "srgb" => Ok(ColorSpaceSetting::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected auto, gamma, or linear"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<PowerSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "high" | "high-performance" | "discrete" => Ok(PowerSetting::High),
        "low" | "low-power" | "integrated" => Ok(PowerSetting::Low),
        "" => Err("power preference must not be empty".to_string()),
        other => Err(format!("unknown power preference '{other}'; expected high or low")),
    }
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WIDTHxHEIGHT, e.g. 1280x720".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in size".to_string())?;
    if width == 0 || height == 0 {
        return Err("window dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions() {
        assert_eq!(parse_dimensions("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_dimensions(" 640 X 480 ").unwrap(), (640, 480));
        assert!(parse_dimensions("1920").is_err());
        assert!(parse_dimensions("0x720").is_err());
        assert!(parse_dimensions("widexhigh").is_err());
    }

    #[test]
    fn parses_color_space_aliases() {
        assert_eq!(parse_color_space("Auto").unwrap(), ColorSpaceSetting::Auto);
        assert_eq!(parse_color_space("srgb").unwrap(), ColorSpaceSetting::Linear);
        assert_eq!(parse_color_space("gamma").unwrap(), ColorSpaceSetting::Gamma);
        assert!(parse_color_space("").is_err());
        assert!(parse_color_space("hdr").is_err());
    }

    #[test]
    fn parses_power_preference() {
        assert_eq!(parse_power("LOW").unwrap(), PowerSetting::Low);
        assert_eq!(parse_power("discrete").unwrap(), PowerSetting::High);
        assert!(parse_power("turbo").is_err());
    }

    #[test]
    fn bare_camera_flag_selects_first_device() {
        let cli = Cli::try_parse_from(["ripplecam", "--camera"]).unwrap();
        assert_eq!(cli.run.camera, Some(0));

        let cli = Cli::try_parse_from(["ripplecam", "--camera", "2"]).unwrap();
        assert_eq!(cli.run.camera, Some(2));
    }

    #[test]
    fn image_and_camera_conflict() {
        assert!(Cli::try_parse_from(["ripplecam", "--image", "a.png", "--camera"]).is_err());
    }

    #[test]
    fn config_subcommand_parses() {
        let cli = Cli::try_parse_from(["ripplecam", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Init { force: true }
            }))
        ));
    }
}
