use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Social platform a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
    Twitter,
    Unknown,
}

impl Platform {
    /// Every platform the pipeline can resolve
    pub const SUPPORTED: [Platform; 4] = [
        Platform::YouTube,
        Platform::Instagram,
        Platform::TikTok,
        Platform::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
            Platform::Twitter => "Twitter/X",
            Platform::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::YouTube),
            "instagram" | "ig" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            "twitter" | "x" => Ok(Platform::Twitter),
            "unknown" => Ok(Platform::Unknown),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Kind of content a target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Profile,
    Hashtag,
    Post,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Profile => "profile",
            ContentType::Hashtag => "hashtag",
            ContentType::Post => "post",
        }
    }

    /// Whether a playback duration is meaningful for this content
    pub fn has_duration(&self) -> bool {
        matches!(self, ContentType::Video | ContentType::Post)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, normalized user input.
///
/// Built only by the classifier; fields are private so a target cannot be
/// altered after classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    platform: Platform,
    content_type: ContentType,
    canonical_id: String,
    original_input: String,
}

impl Target {
    pub(crate) fn new(
        platform: Platform,
        content_type: ContentType,
        canonical_id: impl Into<String>,
        original_input: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            content_type,
            canonical_id: canonical_id.into(),
            original_input: original_input.into(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn canonical_id(&self) -> &str {
        &self.canonical_id
    }

    pub fn original_input(&self) -> &str {
        &self.original_input
    }

    /// Username embedded in the canonical id, if any.
    ///
    /// Profile ids are the username itself; TikTok and Twitter ids for
    /// videos/posts are stored as `user/id`.
    pub fn owner(&self) -> Option<&str> {
        match self.content_type {
            ContentType::Profile => Some(&self.canonical_id),
            _ => self.canonical_id.split_once('/').map(|(user, _)| user),
        }
    }

    /// The trailing media/post id of the canonical id
    pub fn media_id(&self) -> &str {
        self.canonical_id
            .rsplit_once('/')
            .map(|(_, id)| id)
            .unwrap_or(&self.canonical_id)
    }

    /// Canonical page URL for this target on its platform
    pub fn canonical_url(&self) -> String {
        let id = &self.canonical_id;
        match (self.platform, self.content_type) {
            (Platform::YouTube, ContentType::Video) => {
                format!("https://www.youtube.com/watch?v={}", id)
            }
            (Platform::YouTube, ContentType::Profile) => {
                if id.starts_with("UC") && id.len() == 24 {
                    format!("https://www.youtube.com/channel/{}", id)
                } else {
                    format!("https://www.youtube.com/@{}", id)
                }
            }
            (Platform::YouTube, ContentType::Hashtag) => {
                format!("https://www.youtube.com/hashtag/{}", id)
            }
            (Platform::YouTube, ContentType::Post) => {
                format!("https://www.youtube.com/post/{}", id)
            }
            (Platform::Instagram, ContentType::Video) => {
                format!("https://www.instagram.com/reel/{}/", id)
            }
            (Platform::Instagram, ContentType::Post) => {
                format!("https://www.instagram.com/p/{}/", id)
            }
            (Platform::Instagram, ContentType::Profile) => {
                format!("https://www.instagram.com/{}/", id)
            }
            (Platform::Instagram, ContentType::Hashtag) => {
                format!("https://www.instagram.com/explore/tags/{}/", id)
            }
            (Platform::TikTok, ContentType::Video) => match self.owner() {
                Some(user) => format!("https://www.tiktok.com/@{}/video/{}", user, self.media_id()),
                None => format!("https://www.tiktok.com/t/{}/", id),
            },
            (Platform::TikTok, ContentType::Post) => match self.owner() {
                Some(user) => format!("https://www.tiktok.com/@{}/photo/{}", user, self.media_id()),
                None => format!("https://www.tiktok.com/t/{}/", id),
            },
            (Platform::TikTok, ContentType::Profile) => {
                format!("https://www.tiktok.com/@{}", id)
            }
            (Platform::TikTok, ContentType::Hashtag) => {
                format!("https://www.tiktok.com/tag/{}", id)
            }
            (Platform::Twitter, ContentType::Video | ContentType::Post) => {
                let user = self.owner().unwrap_or("i");
                format!("https://x.com/{}/status/{}", user, self.media_id())
            }
            (Platform::Twitter, ContentType::Profile) => format!("https://x.com/{}", id),
            (Platform::Twitter, ContentType::Hashtag) => {
                format!("https://x.com/hashtag/{}", id)
            }
            (Platform::Unknown, _) => self.original_input.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.platform, self.content_type, self.canonical_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str_aliases() {
        assert_eq!("YT".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_owner_and_media_id() {
        let t = Target::new(
            Platform::TikTok,
            ContentType::Video,
            "scout2015/6718335390845095173",
            "x",
        );
        assert_eq!(t.owner(), Some("scout2015"));
        assert_eq!(t.media_id(), "6718335390845095173");

        let p = Target::new(Platform::Instagram, ContentType::Profile, "natgeo", "x");
        assert_eq!(p.owner(), Some("natgeo"));
        assert_eq!(p.media_id(), "natgeo");
    }

    #[test]
    fn test_canonical_urls() {
        let yt = Target::new(Platform::YouTube, ContentType::Video, "dQw4w9WgXcQ", "x");
        assert_eq!(
            yt.canonical_url(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );

        let tw = Target::new(Platform::Twitter, ContentType::Post, "jack/20", "x");
        assert_eq!(tw.canonical_url(), "https://x.com/jack/status/20");

        let tag = Target::new(Platform::Instagram, ContentType::Hashtag, "sunset", "x");
        assert_eq!(
            tag.canonical_url(),
            "https://www.instagram.com/explore/tags/sunset/"
        );
    }

    #[test]
    fn test_display() {
        let t = Target::new(Platform::YouTube, ContentType::Video, "abc", "x");
        assert_eq!(t.to_string(), "youtube:video:abc");
    }
}
