use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::Deserialize;

/// Largest output the upscaler will allocate, in pixels.
const MAX_OUTPUT_PIXELS: u64 = 16_384 * 16_384;

pub const MIN_SCALE: u32 = 2;
pub const MAX_SCALE: u32 = 8;

/// Image super-resolution capability used by workers.
///
/// Implementations are constructed once per worker process and shared across
/// tasks. Calls are synchronous and may take seconds.
pub trait Upscaler: Send + Sync {
    /// Integer factor applied to both dimensions.
    fn scale(&self) -> u32;

    fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, UpscaleError>;
}

/// Resampling kernel used by [`ResampleUpscaler`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Upscaler that resamples by a fixed integer factor.
#[derive(Debug, Clone)]
pub struct ResampleUpscaler {
    filter: ResampleFilter,
    scale: u32,
}

impl ResampleUpscaler {
    pub fn new(filter: ResampleFilter, scale: u32) -> Result<Self, UpscaleError> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
            return Err(UpscaleError::UnsupportedScale(scale));
        }
        Ok(Self { filter, scale })
    }

    pub fn filter(&self) -> ResampleFilter {
        self.filter
    }

    fn target_dimensions(&self, width: u32, height: u32) -> Result<(u32, u32), UpscaleError> {
        if width == 0 || height == 0 {
            return Err(UpscaleError::EmptyImage);
        }
        let too_large = || UpscaleError::TooLarge { width, height };
        let target_w = width.checked_mul(self.scale).ok_or_else(too_large)?;
        let target_h = height.checked_mul(self.scale).ok_or_else(too_large)?;
        if u64::from(target_w) * u64::from(target_h) > MAX_OUTPUT_PIXELS {
            return Err(too_large());
        }
        Ok((target_w, target_h))
    }
}

impl Upscaler for ResampleUpscaler {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, UpscaleError> {
        let (width, height) = image.dimensions();
        let (target_w, target_h) = self.target_dimensions(width, height)?;
        Ok(image.resize_exact(target_w, target_h, self.filter.into()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    #[error("Unsupported scale factor {0} (expected {min}..={max})", min = MIN_SCALE, max = MAX_SCALE)]
    UnsupportedScale(u32),

    #[error("Image has zero width or height")]
    EmptyImage,

    #[error("Upscaled {width}x{height} image would exceed the output size limit")]
    TooLarge { width: u32, height: u32 },
}
