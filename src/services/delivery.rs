//! URLs for resized renditions served by the CDN in front of the bucket.

use serde::Serialize;

/// Widths the resizer produces for every original.
pub const RESIZED_WIDTHS: [u32; 11] = [180, 256, 384, 640, 750, 828, 1080, 1200, 1920, 2048, 3840];

/// Width used for the primary `src` of a photo.
pub const DEFAULT_WIDTH: u32 = 1080;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Rendition {
    pub width: u32,
    pub url: String,
}

pub fn image_url(distribution_domain: &str, width: u32, filename: &str) -> String {
    format!(
        "https://{}/assets/gallery/w_{}/{}",
        distribution_domain, width, filename
    )
}

pub fn srcset(distribution_domain: &str, filename: &str) -> Vec<Rendition> {
    RESIZED_WIDTHS
        .iter()
        .map(|&width| Rendition {
            width,
            url: image_url(distribution_domain, width, filename),
        })
        .collect()
}
