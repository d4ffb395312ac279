//! Video reference normalization.
//!
//! Maps the many shapes a pasted video link can take onto exactly one
//! embeddable URL per provider. Normalization is pure string matching: no
//! network access, same input always gives the same output, and canonical
//! URLs map to themselves.

use std::sync::LazyLock;

#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
use regex::Regex;
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
use regex_lite::Regex;

/// Canonical YouTube embed prefix.
pub const YOUTUBE_EMBED: &str = "https://www.youtube.com/embed/";
/// Canonical Vimeo player prefix.
pub const VIMEO_PLAYER: &str = "https://player.vimeo.com/video/";

static SNIPPET_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

static YOUTUBE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^https://(?:www\.|m\.)?(?:youtube\.com|youtube-nocookie\.com)/(?:embed|shorts|live|v)/([A-Za-z0-9_-]+)",
    )
    .unwrap()
});

static YOUTUBE_WATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://(?:www\.|m\.|music\.)?youtube\.com/watch/?\?(?:[^#]*&)?v=([A-Za-z0-9_-]+)")
        .unwrap()
});

static YOUTUBE_SHORT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https://(?:www\.)?youtu\.be/([A-Za-z0-9_-]+)").unwrap());

static VIMEO_PLAYER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https://player\.vimeo\.com/video/(\d+)").unwrap());

static VIMEO_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://(?:www\.)?vimeo\.com/(?:video/|channels/[^/?#]+/|groups/[^/?#]+/videos/)?(\d+)")
        .unwrap()
});

/// Provider family of a canonical video URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoProvider {
    YouTube,
    Vimeo,
}

/// A normalized, embeddable video URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl {
    provider: VideoProvider,
    id: String,
}

impl CanonicalUrl {
    pub fn provider(&self) -> VideoProvider {
        self.provider
    }

    /// Provider-specific video id.
    pub fn video_id(&self) -> &str {
        &self.id
    }

    pub fn as_url(&self) -> String {
        match self.provider {
            VideoProvider::YouTube => format!("{YOUTUBE_EMBED}{}", self.id),
            VideoProvider::Vimeo => format!("{VIMEO_PLAYER}{}", self.id),
        }
    }

    /// Preview image for the reorder list.
    pub fn thumbnail_url(&self) -> String {
        match self.provider {
            VideoProvider::YouTube => format!("https://img.youtube.com/vi/{}/hqdefault.jpg", self.id),
            VideoProvider::Vimeo => format!("https://vumbnail.com/{}.jpg", self.id),
        }
    }
}

impl std::fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_url())
    }
}

/// Normalize a pasted video link or embed snippet.
///
/// Returns `None` when the input matches no supported shape.
pub fn normalize(raw: &str) -> Option<CanonicalUrl> {
    let url = extract_url(raw)?;
    let url = upgrade_scheme(url);

    let youtube = YOUTUBE_PATH
        .captures(&url)
        .or_else(|| YOUTUBE_WATCH.captures(&url))
        .or_else(|| YOUTUBE_SHORT_LINK.captures(&url));
    if let Some(caps) = youtube {
        return Some(CanonicalUrl {
            provider: VideoProvider::YouTube,
            id: caps.get(1)?.as_str().to_owned(),
        });
    }

    let vimeo = VIMEO_PLAYER_PATH
        .captures(&url)
        .or_else(|| VIMEO_PAGE.captures(&url));
    if let Some(caps) = vimeo {
        return Some(CanonicalUrl {
            provider: VideoProvider::Vimeo,
            id: caps.get(1)?.as_str().to_owned(),
        });
    }

    tracing::debug!(input = %raw, "video link matched no known shape");
    None
}

/// Canonical preview image for an already-embedded video URL.
pub fn thumbnail_url(src: &str) -> Option<String> {
    normalize(src).map(|c| c.thumbnail_url())
}

/// Pull the URL out of an embed snippet, or take the trimmed input as-is.
fn extract_url(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with('<') {
        return SNIPPET_SRC
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim());
    }
    Some(raw)
}

fn upgrade_scheme(url: &str) -> String {
    if url.len() >= 7 && url[..7].eq_ignore_ascii_case("http://") {
        format!("https://{}", &url[7..])
    } else if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_owned()
    }
}
