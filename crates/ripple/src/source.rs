//! Frame sources feeding the compositing stage.
//!
//! A source is polled once per tick. `None` means "nothing new", in which case
//! the renderer keeps showing the texture it already has.

use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "camera")]
pub use crate::camera::CameraSource;

/// Borrowed, tightly packed RGBA8 frame (row stride = `width * 4`).
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

impl<'a> VideoFrame<'a> {
    pub fn new(width: u32, height: u32, pixels: &'a [u8]) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn stride(&self) -> u32 {
        self.width * 4
    }

    /// True when the pixel slice covers the declared dimensions.
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.pixels.len() >= (self.width as usize) * (self.height as usize) * 4
    }

    /// Aspect-preserving copy whose sides fit `max_dimension`, or `None` when
    /// the frame already fits or is incomplete.
    pub fn downscaled(&self, max_dimension: u32) -> Option<image::RgbaImage> {
        let (width, height) = fit_within(self.width, self.height, max_dimension);
        if (width, height) == (self.width, self.height) || !self.is_complete() {
            return None;
        }
        let len = (self.stride() as usize) * (self.height as usize);
        let view = image::ImageBuffer::<image::Rgba<u8>, &[u8]>::from_raw(
            self.width,
            self.height,
            &self.pixels[..len],
        )?;
        Some(image::imageops::resize(&view, width, height, FilterType::Triangle))
    }
}

/// Shrinks `width`x`height` so neither side exceeds `max_dimension`, keeping
/// the aspect ratio. Sides never drop below one texel.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = |side: u32| {
        let scaled = u64::from(side) * u64::from(max_dimension) / u64::from(longest);
        (scaled as u32).clamp(1, max_dimension)
    };
    (scale(width), scale(height))
}

pub trait FrameSource {
    /// Short human-readable label for logs.
    fn describe(&self) -> String;

    /// The newest frame if one arrived since the last poll.
    fn poll_frame(&mut self) -> Option<VideoFrame<'_>>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("camera {index} unavailable: {message}")]
    Camera { index: u32, message: String },
    #[error("camera capture requires building with the `camera` feature")]
    CameraDisabled,
}

/// Which source the runtime should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSourceKind {
    TestPattern { width: u32, height: u32 },
    Image(PathBuf),
    Camera { index: u32, width: u32, height: u32 },
}

impl Default for FrameSourceKind {
    fn default() -> Self {
        Self::TestPattern {
            width: 640,
            height: 480,
        }
    }
}

impl fmt::Display for FrameSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TestPattern { width, height } => write!(f, "test pattern {width}x{height}"),
            Self::Image(path) => write!(f, "image {}", path.display()),
            Self::Camera { index, .. } => write!(f, "camera #{index}"),
        }
    }
}

pub fn open_source(kind: &FrameSourceKind) -> Result<Box<dyn FrameSource>, SourceError> {
    let source: Box<dyn FrameSource> = match kind {
        FrameSourceKind::TestPattern { width, height } => {
            Box::new(TestPatternSource::new(*width, *height))
        }
        FrameSourceKind::Image(path) => Box::new(ImageSource::open(path)?),
        #[cfg(feature = "camera")]
        FrameSourceKind::Camera {
            index,
            width,
            height,
        } => Box::new(CameraSource::open(*index, *width, *height)?),
        #[cfg(not(feature = "camera"))]
        FrameSourceKind::Camera { .. } => return Err(SourceError::CameraDisabled),
    };
    debug!(source = %source.describe(), "frame source opened");
    Ok(source)
}

/// Colour bars drifting sideways, one new frame per poll.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame: u64,
    pixels: Vec<u8>,
}

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            frame: 0,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    fn paint(&mut self) {
        let width = self.width as usize;
        let height = self.height as usize;
        let shift = (self.frame as usize) % width;
        for (row, line) in self.pixels.chunks_exact_mut(width * 4).enumerate() {
            // Bottom strip is a grey ramp so horizontal mirroring is visible.
            let ramp = row * 5 >= height * 4;
            for (column, px) in line.chunks_exact_mut(4).enumerate() {
                let rgb = if ramp {
                    let level = (column * 255 / width.max(1)) as u8;
                    [level, level, level]
                } else {
                    BARS[((column + shift) % width) * BARS.len() / width]
                };
                px.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn poll_frame(&mut self) -> Option<VideoFrame<'_>> {
        self.paint();
        self.frame = self.frame.wrapping_add(1);
        Some(VideoFrame::new(self.width, self.height, &self.pixels))
    }
}

/// A still image, delivered once.
pub struct ImageSource {
    path: PathBuf,
    image: image::RgbaImage,
    delivered: bool,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let image = image::open(path)
            .map_err(|source| SourceError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        Ok(Self::from_image(path.to_path_buf(), image))
    }

    pub fn from_image(path: PathBuf, image: image::RgbaImage) -> Self {
        Self {
            path,
            image,
            delivered: false,
        }
    }
}

impl FrameSource for ImageSource {
    fn describe(&self) -> String {
        format!(
            "image {} ({}x{})",
            self.path.display(),
            self.image.width(),
            self.image.height()
        )
    }

    fn poll_frame(&mut self) -> Option<VideoFrame<'_>> {
        if self.delivered {
            return None;
        }
        self.delivered = true;
        Some(VideoFrame::new(
            self.image.width(),
            self.image.height(),
            self.image.as_raw(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_always_ready_and_animates() {
        let mut source = TestPatternSource::new(64, 32);
        let first = source.poll_frame().map(|f| f.pixels.to_vec()).expect("frame");
        let frame = source.poll_frame().expect("frame");
        assert!(frame.is_complete());
        assert_eq!((frame.width, frame.height), (64, 32));
        assert_ne!(first, frame.pixels);
    }

    #[test]
    fn image_source_is_ready_exactly_once() {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let mut source = ImageSource::from_image(PathBuf::from("still.png"), image);
        let frame = source.poll_frame().expect("first poll delivers");
        assert_eq!(frame.stride(), 12);
        assert_eq!(&frame.pixels[..4], &[1, 2, 3, 4]);
        assert!(source.poll_frame().is_none());
        assert!(source.describe().contains("3x2"));
    }

    #[test]
    fn missing_image_reports_path() {
        let err = match open_source(&FrameSourceKind::Image(PathBuf::from("/nonexistent/x.png"))) {
            Err(err) => err,
            Ok(_) => panic!("opening a missing file must fail"),
        };
        assert!(err.to_string().contains("/nonexistent/x.png"));
    }

    #[test]
    fn incomplete_frames_are_detected() {
        let pixels = [0u8; 15];
        assert!(!VideoFrame::new(2, 2, &pixels).is_complete());
        assert!(!VideoFrame::new(0, 2, &pixels).is_complete());
        assert!(VideoFrame::new(2, 1, &pixels).is_complete());
    }

    #[test]
    fn fit_within_keeps_aspect_and_limit() {
        assert_eq!(fit_within(640, 480, 8192), (640, 480));
        assert_eq!(fit_within(8192, 8192, 8192), (8192, 8192));
        assert_eq!(fit_within(16384, 8192, 8192), (8192, 4096));
        assert_eq!(fit_within(1000, 30000, 3000), (100, 3000));
        assert_eq!(fit_within(100000, 1, 4096), (4096, 1));
    }

    #[test]
    fn oversized_frame_is_downscaled_to_limit() {
        let image = image::RgbaImage::from_pixel(40, 20, image::Rgba([10, 20, 30, 255]));
        let frame = VideoFrame::new(40, 20, image.as_raw());
        let small = frame.downscaled(16).expect("frame exceeds the limit");
        assert_eq!(small.dimensions(), (16, 8));
        assert_eq!(small.get_pixel(8, 4), &image::Rgba([10, 20, 30, 255]));

        assert!(frame.downscaled(40).is_none());
        assert!(VideoFrame::new(40, 20, &image.as_raw()[..16]).downscaled(16).is_none());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn camera_without_feature_is_an_error() {
        let kind = FrameSourceKind::Camera {
            index: 0,
            width: 640,
            height: 480,
        };
        assert!(matches!(open_source(&kind), Err(SourceError::CameraDisabled)));
    }
}
