/*!
 * Image CDN URLs
 * Inserts on-the-fly transformation directives into CDN image URLs.
 */
use regex::Regex;

pub const CDN_HOST: &str = "res.cloudinary.com";
const UPLOAD_MARKER: &str = "/upload/";

lazy_static::lazy_static! {
    /// One transformation directive, e.g. `w_400` or `q_auto:good`
    static ref DIRECTIVE_REGEX: Regex = Regex::new(r"^[a-z]{1,3}_[A-Za-z0-9:.]+$").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transform {
    format: Option<String>,
    quality: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    crop: Option<String>,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn crop(mut self, crop: impl Into<String>) -> Self {
        self.crop = Some(crop.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The path segment, e.g. `f_auto,q_auto,w_400,c_fill`.
    pub fn segment(&self) -> String {
        let mut parts = Vec::new();
        if let Some(f) = &self.format {
            parts.push(format!("f_{f}"));
        }
        if let Some(q) = &self.quality {
            parts.push(format!("q_{q}"));
        }
        if let Some(w) = self.width {
            parts.push(format!("w_{w}"));
        }
        if let Some(h) = self.height {
            parts.push(format!("h_{h}"));
        }
        if let Some(c) = &self.crop {
            parts.push(format!("c_{c}"));
        }
        parts.join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Thumbnail,
    Gallery,
    Hero,
}

impl Preset {
    pub fn width(self) -> u32 {
        match self {
            Preset::Thumbnail => 400,
            Preset::Gallery => 1200,
            Preset::Hero => 1920,
        }
    }

    pub fn transform(self) -> Transform {
        let crop = match self {
            Preset::Thumbnail => "fill",
            Preset::Gallery | Preset::Hero => "limit",
        };
        Transform::new()
            .format("auto")
            .quality("auto")
            .width(self.width())
            .crop(crop)
    }
}

pub fn is_cdn_url(url: &str) -> bool {
    url.contains(CDN_HOST) && url.contains(UPLOAD_MARKER)
}

fn is_transform_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.split(',').all(|d| DIRECTIVE_REGEX.is_match(d))
}

/// Returns `url` with `transform` placed right after `/upload/`, replacing
/// any transformation already there. Non-CDN URLs come back unchanged.
pub fn optimize_url(url: &str, transform: &Transform) -> String {
    if transform.is_empty() || !is_cdn_url(url) {
        return url.to_string();
    }
    let Some((head, tail)) = url.split_once(UPLOAD_MARKER) else {
        return url.to_string();
    };

    let rest = match tail.split_once('/') {
        Some((first, rest)) if is_transform_segment(first) => rest,
        _ => tail,
    };
    format!("{head}{UPLOAD_MARKER}{}/{rest}", transform.segment())
}

pub fn preset_url(url: &str, preset: Preset) -> String {
    optimize_url(url, &preset.transform())
}

/// A `srcset` attribute value with one candidate per width, or `None` for
/// URLs the CDN cannot resize.
pub fn srcset(url: &str, widths: &[u32]) -> Option<String> {
    if !is_cdn_url(url) || widths.is_empty() {
        return None;
    }
    Some(
        widths
            .iter()
            .map(|&w| {
                let transform = Transform::new().format("auto").quality("auto").width(w);
                format!("{} {}w", optimize_url(url, &transform), w)
            })
            .collect::<Vec<_>>()
            .join(", "),
    )
}
