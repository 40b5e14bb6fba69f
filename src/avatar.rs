use bytes::Bytes;
use image::imageops::FilterType;
use uuid::Uuid;

/// BlurHash component counts; 4x3 is the usual choice for portrait-ish thumbnails.
const COMPONENTS_X: u32 = 4;
const COMPONENTS_Y: u32 = 3;
/// Images are shrunk to this bound first; the hash only captures low frequencies.
const SAMPLE_SIZE: u32 = 64;

#[derive(Debug)]
pub struct Avatar {
    pub body: Bytes,
    pub content_type: String,
    pub blur_hash: String,
}

impl Avatar {
    /// Sniffs the upload's real format (the client-declared type is ignored) and computes
    /// its placeholder.
    pub fn from_upload(body: Bytes) -> Result<Self, String> {
        let format = image::guess_format(&body).map_err(|e| format!("Unrecognized image: {e}"))?;
        let content_type = content_type_for(format)
            .ok_or_else(|| "Avatar must be a JPEG, PNG, WebP or GIF image".to_string())?
            .to_string();

        let blur_hash = blur_hash(&body)?;
        Ok(Self {
            body,
            content_type,
            blur_hash,
        })
    }

    pub fn object_key(&self, user_id: Uuid) -> String {
        let ext = ext_from_mime(&self.content_type).unwrap_or("bin");
        format!("avatars/{user_id}/{}.{ext}", Uuid::now_v7())
    }
}

pub fn blur_hash(bytes: &[u8]) -> Result<String, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("Invalid image: {e}"))?;
    let small = img.resize(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle).to_rgba8();
    let (width, height) = small.dimensions();

    blurhash::encode(COMPONENTS_X, COMPONENTS_Y, width, height, small.as_raw())
        .map_err(|e| format!("BlurHash encoding failed: {e}"))
}

fn content_type_for(format: image::ImageFormat) -> Option<&'static str> {
    match format {
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageOutputFormat, Rgba};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn png_upload_gets_placeholder_and_key() {
        let avatar = Avatar::from_upload(Bytes::from(png(120, 80))).unwrap();
        assert_eq!(avatar.content_type, "image/png");
        // size flag + max AC + 4 DC chars, then 2 chars per AC component.
        let ac = (COMPONENTS_X * COMPONENTS_Y - 1) as usize;
        assert_eq!(avatar.blur_hash.len(), 1 + 1 + 4 + 2 * ac);

        let id = Uuid::now_v7();
        let key = avatar.object_key(id);
        assert!(key.starts_with(&format!("avatars/{id}/")));
        assert!(key.ends_with(".png"));
    }

    #[test]
    fn same_image_same_hash() {
        let bytes = png(32, 32);
        assert_eq!(blur_hash(&bytes).unwrap(), blur_hash(&bytes).unwrap());
    }

    #[test]
    fn non_image_is_rejected() {
        let err = Avatar::from_upload(Bytes::from_static(b"hello world"));
        assert!(err.is_err());
    }
}
