// ============================================================================
// EXPORTER — PNG encoding, download naming, gallery upload
// ============================================================================

use std::io::Cursor;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;

use crate::error::{SignError, from_ureq};
use crate::log_info;
use crate::nft::REQUEST_TIMEOUT;
use crate::signs::Collection;

/// Brand prefix baked into download filenames.
pub const BRAND: &str = "SignStudio";

/// Encode a composited raster as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, SignError> {
    let mut bytes: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .map_err(|e| SignError::Export(format!("PNG encode failed: {}", e)))?;
    Ok(bytes)
}

/// Write PNG bytes to a local file (the "download" path).
pub fn write_download(bytes: &[u8], path: &Path) -> Result<(), SignError> {
    std::fs::write(path, bytes)
        .map_err(|e| SignError::Export(format!("write {}: {}", path.display(), e)))?;
    log_info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Lowercase, whitespace → hyphen, strip everything outside `[a-z0-9_-]`.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Download filename: `<brand>-<collection>-<tokenId>-Sign-<slug>.png`.
pub fn download_filename(collection: Collection, token_id: u64, sign_name: &str) -> String {
    format!(
        "{}-{}-{}-Sign-{}.png",
        BRAND,
        collection.id(),
        token_id,
        slugify(sign_name)
    )
}

/// Collision-resistant gallery object path:
/// `<collection>/sign-<collection>-<tokenId>-<unixMillis>.png`.
pub fn gallery_path(collection: Collection, token_id: u64, unix_millis: u128) -> String {
    format!(
        "{}/sign-{}-{}-{}.png",
        collection.id(),
        collection.id(),
        token_id,
        unix_millis
    )
}

/// Milliseconds since the Unix epoch, for gallery path generation.
pub fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
//  Gallery storage
// ---------------------------------------------------------------------------

/// External object-storage collaborator for the public gallery.
pub trait GalleryStore {
    /// Store `bytes` at `path` with `content_type`, refusing to overwrite an
    /// existing object. One attempt — failures surface to the caller,
    /// never retried automatically.
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), SignError>;
}

/// HTTP-backed gallery bucket: a PUT per object, `If-None-Match: *` for
/// no-overwrite semantics.
pub struct HttpGalleryStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpGalleryStore {
    pub fn new(base_url: &str) -> Self {
        HttpGalleryStore {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl GalleryStore for HttpGalleryStore {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), SignError> {
        let url = format!("{}/{}", self.base_url, path);
        let result = self
            .agent
            .put(&url)
            .set("Content-Type", content_type)
            .set("If-None-Match", "*")
            .send_bytes(bytes);
        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(412, _)) => Err(SignError::Export(format!(
                "gallery object already exists: {}",
                path
            ))),
            Err(e) => Err(from_ureq(e, &url)),
        }
    }
}

/// Upload an encoded PNG to the gallery. Returns the object path on success.
pub fn upload_to_gallery(
    store: &dyn GalleryStore,
    collection: Collection,
    token_id: u64,
    png_bytes: &[u8],
) -> Result<String, SignError> {
    let path = gallery_path(collection, token_id, now_unix_millis());
    store.put(&path, png_bytes, "image/png")?;
    log_info!("uploaded {} bytes to gallery at {}", png_bytes.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_hyphenates_and_strips() {
        assert_eq!(slugify("Happy Birthday!"), "happy-birthday");
        assert_eq!(slugify("GM  fren"), "gm--fren");
        assert_eq!(slugify("under_score-ok"), "under_score-ok");
        assert_eq!(slugify("émoji ☠ name"), "moji--name");
    }

    #[test]
    fn download_filename_encodes_collection_token_and_sign() {
        assert_eq!(
            download_filename(Collection::Ghn, 1114, "Happy Birthday"),
            "SignStudio-GHN-1114-Sign-happy-birthday.png"
        );
    }

    #[test]
    fn gallery_path_is_collision_resistant_per_timestamp() {
        let p = gallery_path(Collection::Gcc, 7, 1724400000123);
        assert_eq!(p, "GCC/sign-GCC-7-1724400000123.png");
    }

    #[test]
    fn encode_png_roundtrips_through_the_decoder() {
        let img = RgbaImage::from_pixel(5, 3, image::Rgba([1, 2, 3, 255]));
        let bytes = encode_png(&img).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(back.dimensions(), (5, 3));
        assert_eq!(back.get_pixel(4, 2).0, [1, 2, 3, 255]);
    }

    #[test]
    fn write_download_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        write_download(&[1, 2, 3], &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }
}
