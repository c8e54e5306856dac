use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RippleConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default = "default_hover", deserialize_with = "deserialize_hover")]
    pub hover: ImpulseSection,
    #[serde(default = "default_press", deserialize_with = "deserialize_press")]
    pub press: ImpulseSection,
    #[serde(default)]
    pub compositing: CompositingSection,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub gpu: GpuSection,
    #[serde(default)]
    pub source: SourceSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SimulationSection {
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_damping")]
    pub damping: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ImpulseSection {
    pub radius: f32,
    pub strength: f32,
}

/// `[hover]`/`[press]` as written; missing keys fall back per section.
#[derive(Debug, Default, Deserialize)]
struct PartialImpulse {
    radius: Option<f32>,
    strength: Option<f32>,
}

impl PartialImpulse {
    fn over(self, base: ImpulseSection) -> ImpulseSection {
        ImpulseSection {
            radius: self.radius.unwrap_or(base.radius),
            strength: self.strength.unwrap_or(base.strength),
        }
    }
}

fn deserialize_hover<'de, D>(deserializer: D) -> Result<ImpulseSection, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialImpulse::deserialize(deserializer)?.over(default_hover()))
}

fn deserialize_press<'de, D>(deserializer: D) -> Result<ImpulseSection, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(PartialImpulse::deserialize(deserializer)?.over(default_press()))
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CompositingSection {
    #[serde(default = "default_ripple_strength")]
    pub ripple_strength: f32,
    #[serde(default = "default_true")]
    pub mirror: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct GpuSection {
    #[serde(default)]
    pub power: PowerSetting,
    #[serde(default)]
    pub color_space: ColorSpaceSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpaceSetting {
    #[default]
    Auto,
    Gamma,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    TestPattern,
    Image,
    Camera,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::TestPattern => f.write_str("test-pattern"),
            SourceKind::Image => f.write_str("image"),
            SourceKind::Camera => f.write_str("camera"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceSection {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub camera_index: u32,
    #[serde(default = "default_source_width")]
    pub width: u32,
    #[serde(default = "default_source_height")]
    pub height: u32,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_resolution() -> u32 {
    512
}

fn default_damping() -> f32 {
    0.985
}

fn default_hover() -> ImpulseSection {
    ImpulseSection {
        radius: 0.04,
        strength: 0.1,
    }
}

fn default_press() -> ImpulseSection {
    ImpulseSection {
        radius: 0.05,
        strength: 1.0,
    }
}

fn default_ripple_strength() -> f32 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_title() -> String {
    "ripplecam".to_string()
}

fn default_source_width() -> u32 {
    640
}

fn default_source_height() -> u32 {
    480
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            damping: default_damping(),
        }
    }
}

impl Default for CompositingSection {
    fn default() -> Self {
        Self {
            ripple_strength: default_ripple_strength(),
            mirror: true,
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
            title: default_title(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: None,
            camera_index: 0,
            width: default_source_width(),
            height: default_source_height(),
        }
    }
}

impl Default for RippleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            simulation: SimulationSection::default(),
            hover: default_hover(),
            press: default_press(),
            compositing: CompositingSection::default(),
            window: WindowSection::default(),
            gpu: GpuSection::default(),
            source: SourceSection::default(),
        }
    }
}

impl RippleConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RippleConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a config file; a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let resolution = self.simulation.resolution;
        if !resolution.is_power_of_two() || !(64..=2048).contains(&resolution) {
            return Err(ConfigError::Invalid(format!(
                "simulation.resolution must be a power of two between 64 and 2048, got {resolution}"
            )));
        }

        let damping = self.simulation.damping;
        if !damping.is_finite() || damping <= 0.0 || damping >= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "simulation.damping must lie strictly between 0 and 1, got {damping}"
            )));
        }

        validate_impulse("hover", &self.hover)?;
        validate_impulse("press", &self.press)?;

        let strength = self.compositing.ripple_strength;
        if !strength.is_finite() || !(0.0..=1.0).contains(&strength) {
            return Err(ConfigError::Invalid(format!(
                "compositing.ripple_strength must be within [0, 1], got {strength}"
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window dimensions must be non-zero".into(),
            ));
        }

        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(
                "source dimensions must be non-zero".into(),
            ));
        }

        if self.source.kind == SourceKind::Image && self.source.path.is_none() {
            return Err(ConfigError::Invalid(
                "source.kind = \"image\" requires source.path".into(),
            ));
        }

        Ok(())
    }
}

fn validate_impulse(section: &str, impulse: &ImpulseSection) -> Result<(), ConfigError> {
    if !impulse.radius.is_finite() || impulse.radius <= 0.0 || impulse.radius > 1.0 {
        return Err(ConfigError::Invalid(format!(
            "{section}.radius must lie within (0, 1], got {}",
            impulse.radius
        )));
    }
    if !impulse.strength.is_finite() {
        return Err(ConfigError::Invalid(format!(
            "{section}.strength must be finite"
        )));
    }
    Ok(())
}
