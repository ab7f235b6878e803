//! Test helper utilities shared by the API and end-to-end suites

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::multipart;
use std::io::Cursor;
use std::time::Duration;
use tokio::time::sleep;

use upscale_service::models::api::{SubmitResponse, TaskStatusResponse};
use upscale_service::models::task::TaskState;

pub const BOUNDARY: &str = "upscale-test-boundary";

/// Encode a small gradient image as PNG.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 20) as u8, (y * 20) as u8, 128, 255])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode sample PNG");
    out.into_inner()
}

/// Build a multipart/form-data body with a single file field.
/// Returns the Content-Type header value and the body.
pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

/// Upload an image to a running deployment.
pub async fn upload_image(
    client: &reqwest::Client,
    base_url: &str,
    filename: &str,
    image_bytes: Vec<u8>,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let form = multipart::Form::new().part(
        "image",
        multipart::Part::bytes(image_bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")?,
    );

    let response = client
        .post(format!("{}/upscale", base_url))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::ACCEPTED {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll task status until it leaves PENDING (with timeout).
/// Returns the HTTP status code alongside the body, since invalid input is reported as 400.
pub async fn poll_task_status(
    client: &reqwest::Client,
    base_url: &str,
    task_id: &str,
    timeout_secs: u64,
) -> Result<(u16, TaskStatusResponse), Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/tasks/{}", base_url, task_id))
            .send()
            .await?;
        let code = response.status().as_u16();
        let body = response.json::<TaskStatusResponse>().await?;

        if body.status != TaskState::Pending {
            return Ok((code, body));
        }
        if attempt % 10 == 0 && attempt > 0 {
            println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
        }
        sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Task did not complete within {} seconds", timeout_secs).into())
}
