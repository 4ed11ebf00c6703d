use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use uuid::Uuid;

use crate::{error::AppError, storage::StorageClient};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const PRESIGN_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
}

/// Rejects non-image MIME types and anything over 5 MiB.
pub fn validate_image(img: &ImageUpload) -> Result<(), AppError> {
    if !img.content_type.starts_with("image/") {
        return Err(AppError::invalid(format!(
            "expected an image, got {}",
            img.content_type
        )));
    }
    if img.body.is_empty() {
        return Err(AppError::invalid("image is empty"));
    }
    if img.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::invalid("image exceeds 5MB"));
    }
    Ok(())
}

/// Pulls the first multipart field named `field` (or `field[]`) as an image.
pub async fn read_image_field(mp: &mut Multipart, field: &str) -> Result<ImageUpload, AppError> {
    let array_name = format!("{field}[]");
    while let Some(part) = mp
        .next_field()
        .await
        .map_err(|e| AppError::invalid(format!("malformed multipart body: {e}")))?
    {
        let name = part.name().map(|s| s.to_string());
        if name.as_deref() == Some(field) || name.as_deref() == Some(array_name.as_str()) {
            let content_type = part
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = part
                .bytes()
                .await
                .map_err(|e| AppError::invalid(format!("failed to read upload: {e}")))?;
            return Ok(ImageUpload { body, content_type });
        }
    }
    Err(AppError::invalid(format!("{field} is required")))
}

pub async fn upload_listing_image(
    storage: &dyn StorageClient,
    restaurant_id: Uuid,
    listing_id: Uuid,
    img: ImageUpload,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
    let key = format!("listings/{}/{}-{}.{}", restaurant_id, listing_id, Uuid::new_v4(), ext);
    storage
        .put_object(&key, img.body, &img.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

pub async fn presign_image(storage: &dyn StorageClient, key: &str) -> anyhow::Result<String> {
    storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
