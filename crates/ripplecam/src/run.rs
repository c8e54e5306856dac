use std::path::Path;

use anyhow::{Context, Result};
use ripple::{
    ColorSpaceMode, FrameSourceKind, GpuPowerPreference, ImpulseParams, RendererConfig,
    RippleRuntime, SimulationParams,
};
use rippleconfig::{ColorSpaceSetting, ImpulseSection, PowerSetting, RippleConfig, SourceKind};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::resolve_config_file;

pub fn run(args: RunArgs) -> Result<()> {
    let config = effective_config(&args)?;
    let renderer_config = renderer_config(&config);
    tracing::info!(
        source = %renderer_config.source,
        resolution = renderer_config.params.resolution,
        damping = renderer_config.params.damping,
        "starting ripplecam"
    );
    RippleRuntime::run(renderer_config)
}

pub fn initialise_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The config file (or defaults) with command-line overrides applied and
/// validated.
pub fn effective_config(args: &RunArgs) -> Result<RippleConfig> {
    let path = resolve_config_file(args.config.as_deref())?;
    let mut config = load_config(&path)?;
    apply_overrides(&mut config, args);
    config
        .validate()
        .context("invalid settings after applying command-line flags")?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<RippleConfig> {
    let config = RippleConfig::load_or_default(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn apply_overrides(config: &mut RippleConfig, args: &RunArgs) {
    if let Some(path) = &args.image {
        config.source.kind = SourceKind::Image;
        config.source.path = Some(path.clone());
    }
    if let Some(index) = args.camera {
        config.source.kind = SourceKind::Camera;
        config.source.camera_index = index;
    }
    if let Some((width, height)) = args.size {
        config.window.width = width;
        config.window.height = height;
    }
    if let Some(damping) = args.damping {
        config.simulation.damping = damping;
    }
    if let Some(strength) = args.ripple_strength {
        config.compositing.ripple_strength = strength;
    }
    if args.no_mirror {
        config.compositing.mirror = false;
    }
    if let Some(power) = args.power {
        config.gpu.power = power;
    }
    if let Some(color_space) = args.color_space {
        config.gpu.color_space = color_space;
    }
}

pub fn renderer_config(config: &RippleConfig) -> RendererConfig {
    let params = SimulationParams {
        resolution: config.simulation.resolution,
        damping: config.simulation.damping,
        hover: impulse_params(&config.hover),
        press: impulse_params(&config.press),
        ripple_strength: config.compositing.ripple_strength,
        mirror: config.compositing.mirror,
    };

    RendererConfig {
        surface_size: (config.window.width, config.window.height),
        title: config.window.title.clone(),
        params,
        source: frame_source(config),
        color_space: match config.gpu.color_space {
            ColorSpaceSetting::Auto => ColorSpaceMode::Auto,
            ColorSpaceSetting::Gamma => ColorSpaceMode::Gamma,
            ColorSpaceSetting::Linear => ColorSpaceMode::Linear,
        },
        gpu_power: match config.gpu.power {
            PowerSetting::High => GpuPowerPreference::High,
            PowerSetting::Low => GpuPowerPreference::Low,
        },
    }
}

fn impulse_params(section: &ImpulseSection) -> ImpulseParams {
    ImpulseParams {
        radius: section.radius,
        strength: section.strength,
    }
}

fn frame_source(config: &RippleConfig) -> FrameSourceKind {
    let source = &config.source;
    match (source.kind, &source.path) {
        (SourceKind::Image, Some(path)) => FrameSourceKind::Image(path.clone()),
        (SourceKind::Camera, _) => FrameSourceKind::Camera {
            index: source.camera_index,
            width: source.width,
            height: source.height,
        },
        // validate() rejects an image source without a path.
        (SourceKind::Image, None) | (SourceKind::TestPattern, _) => FrameSourceKind::TestPattern {
            width: source.width,
            height: source.height,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn flags_override_file_values() {
        let mut config = RippleConfig::default();
        let args = RunArgs {
            camera: Some(1),
            size: Some((800, 600)),
            damping: Some(0.97),
            ripple_strength: Some(0.25),
            no_mirror: true,
            power: Some(PowerSetting::Low),
            color_space: Some(ColorSpaceSetting::Linear),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.source.kind, SourceKind::Camera);
        assert_eq!(config.source.camera_index, 1);
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.simulation.damping, 0.97);
        assert_eq!(config.compositing.ripple_strength, 0.25);
        assert!(!config.compositing.mirror);
        assert_eq!(config.gpu.power, PowerSetting::Low);
        assert_eq!(config.gpu.color_space, ColorSpaceSetting::Linear);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut config = RippleConfig::default();
        config.simulation.damping = 0.9;
        apply_overrides(&mut config, &RunArgs::default());
        assert_eq!(config, {
            let mut expected = RippleConfig::default();
            expected.simulation.damping = 0.9;
            expected
        });
    }

    #[test]
    fn image_flag_selects_image_source() {
        let mut config = RippleConfig::default();
        let args = RunArgs {
            image: Some(PathBuf::from("pond.png")),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);
        let renderer = renderer_config(&config);
        assert_eq!(renderer.source, FrameSourceKind::Image(PathBuf::from("pond.png")));
    }

    #[test]
    fn default_config_matches_library_defaults() {
        let renderer = renderer_config(&RippleConfig::default());
        assert_eq!(renderer.params, SimulationParams::default());
        assert_eq!(renderer.surface_size, (1280, 720));
        assert_eq!(renderer.color_space, ColorSpaceMode::Auto);
        assert_eq!(renderer.gpu_power, GpuPowerPreference::High);
        assert_eq!(
            renderer.source,
            FrameSourceKind::TestPattern {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn out_of_range_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            config: Some(dir.path().join("missing.toml")),
            damping: Some(1.5),
            ..RunArgs::default()
        };
        assert!(effective_config(&args).is_err());
    }
}
