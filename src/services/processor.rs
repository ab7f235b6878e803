use bytes::Bytes;
use image::ImageFormat;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use crate::models::task::TaskOutcome;
use crate::services::upscaler::Upscaler;

/// Decode, upscale and re-encode one image as PNG.
///
/// Every failure is folded into the returned outcome.
pub fn process_image(upscaler: &dyn Upscaler, input: &[u8]) -> TaskOutcome {
    let image = match image::load_from_memory(input) {
        Ok(image) => image,
        Err(e) => {
            return TaskOutcome::InvalidInput {
                reason: format!("not a decodable image ({})", e),
            }
        }
    };

    let upscaled = match upscaler.upscale(&image) {
        Ok(upscaled) => upscaled,
        Err(e) => {
            return TaskOutcome::TransformError {
                reason: e.to_string(),
            }
        }
    };

    let mut encoded = Cursor::new(Vec::new());
    if let Err(e) = upscaled.write_to(&mut encoded, ImageFormat::Png) {
        return TaskOutcome::TransformError {
            reason: format!("PNG encoding failed: {}", e),
        };
    }

    TaskOutcome::Success {
        image: Bytes::from(encoded.into_inner()),
    }
}

/// Run [`process_image`] on the blocking pool.
///
/// A panic inside the upscaler becomes a `TransformError`. With a deadline,
/// an overrun becomes `TimedOut`; the blocking call itself is left to finish
/// in the background since it cannot be interrupted.
pub async fn run_processing(
    upscaler: Arc<dyn Upscaler>,
    input: Bytes,
    deadline: Option<Duration>,
) -> TaskOutcome {
    let handle = tokio::task::spawn_blocking(move || process_image(upscaler.as_ref(), &input));

    let joined = match deadline {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return TaskOutcome::TimedOut {
                    after_secs: limit.as_secs(),
                }
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| TaskOutcome::TransformError {
        reason: if e.is_panic() {
            "upscaler panicked".to_string()
        } else {
            "processing was cancelled".to_string()
        },
    })
}
