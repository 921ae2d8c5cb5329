//! Target classification.
//!
//! Maps a raw URL or handle to a [`Target`]: host match first, then an
//! ordered list of path shapes per platform, most specific shape first so a
//! creator's video URL is never read as the bare creator profile.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use url::Url;

use crate::domain::{ContentType, Platform, Target};

/// Input could not be mapped to a supported platform and content type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized target '{input}': {reason}")]
pub struct UnrecognizedTarget {
    pub input: String,
    pub reason: String,
}

impl UnrecognizedTarget {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

type IdBuilder = fn(&Captures) -> String;

struct PathRule {
    pattern: Regex,
    content_type: ContentType,
    id: IdBuilder,
}

impl PathRule {
    fn new(pattern: &str, content_type: ContentType, id: IdBuilder) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("path pattern must compile"),
            content_type,
            id,
        }
    }
}

fn first(caps: &Captures) -> String {
    caps[1].to_string()
}

fn first_lower(caps: &Captures) -> String {
    caps[1].to_lowercase()
}

fn user_and_id(caps: &Captures) -> String {
    format!("{}/{}", caps[1].to_lowercase(), &caps[2])
}

static YOUTUBE_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![
        PathRule::new(
            r"^/(?:shorts|embed|v|live)/([A-Za-z0-9_-]{11})/?$",
            ContentType::Video,
            first,
        ),
        PathRule::new(r"^/post/([A-Za-z0-9_-]+)/?$", ContentType::Post, first),
        PathRule::new(r"^/hashtag/([^/]+)/?$", ContentType::Hashtag, first_lower),
        PathRule::new(
            r"^/channel/(UC[A-Za-z0-9_-]{22})(?:/[a-z]+)?/?$",
            ContentType::Profile,
            first,
        ),
        PathRule::new(
            r"^/@([A-Za-z0-9._-]+)(?:/(?:videos|shorts|streams|featured|about|community|playlists))?/?$",
            ContentType::Profile,
            first_lower,
        ),
        PathRule::new(
            r"^/(?:c|user)/([A-Za-z0-9._-]+)(?:/[a-z]+)?/?$",
            ContentType::Profile,
            first_lower,
        ),
    ]
});

static YOUTU_BE_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![PathRule::new(
        r"^/([A-Za-z0-9_-]{11})/?$",
        ContentType::Video,
        first,
    )]
});

static INSTAGRAM_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![
        PathRule::new(
            r"^/(?:[A-Za-z0-9._]+/)?(?:reel|reels|tv)/([A-Za-z0-9_-]+)/?$",
            ContentType::Video,
            first,
        ),
        PathRule::new(
            r"^/(?:[A-Za-z0-9._]+/)?p/([A-Za-z0-9_-]+)/?$",
            ContentType::Post,
            first,
        ),
        PathRule::new(
            r"^/explore/tags/([^/]+)/?$",
            ContentType::Hashtag,
            first_lower,
        ),
        PathRule::new(
            r"^/([A-Za-z0-9._]{1,30})(?:/(?:reels|tagged|feed))?/?$",
            ContentType::Profile,
            first_lower,
        ),
    ]
});

static TIKTOK_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![
        PathRule::new(
            r"^/@([A-Za-z0-9._]+)/video/(\d+)/?$",
            ContentType::Video,
            user_and_id,
        ),
        PathRule::new(
            r"^/@([A-Za-z0-9._]+)/photo/(\d+)/?$",
            ContentType::Post,
            user_and_id,
        ),
        PathRule::new(r"^/@([A-Za-z0-9._]+)/?$", ContentType::Profile, first_lower),
        PathRule::new(r"^/t/([A-Za-z0-9]+)/?$", ContentType::Video, first),
        PathRule::new(r"^/v/(\d+)(?:\.html)?/?$", ContentType::Video, first),
        PathRule::new(r"^/tag/([^/]+)/?$", ContentType::Hashtag, first_lower),
    ]
});

static TIKTOK_SHORT_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![PathRule::new(
        r"^/([A-Za-z0-9]+)/?$",
        ContentType::Video,
        first,
    )]
});

static TWITTER_RULES: LazyLock<Vec<PathRule>> = LazyLock::new(|| {
    vec![
        PathRule::new(
            r"^/([A-Za-z0-9_]{1,15})/status(?:es)?/(\d+)/video/\d+/?$",
            ContentType::Video,
            user_and_id,
        ),
        PathRule::new(
            r"^/([A-Za-z0-9_]{1,15})/status(?:es)?/(\d+)(?:/photo/\d+)?/?$",
            ContentType::Post,
            user_and_id,
        ),
        PathRule::new(r"^/hashtag/([^/]+)/?$", ContentType::Hashtag, first_lower),
        PathRule::new(
            r"^/([A-Za-z0-9_]{1,15})(?:/(?:media|likes|with_replies))?/?$",
            ContentType::Profile,
            first_lower,
        ),
    ]
});

static YOUTUBE_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id pattern"));

static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@?([A-Za-z0-9._]{1,30})$").expect("handle pattern"));

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(\w{1,100})$").expect("hashtag pattern"));

const INSTAGRAM_RESERVED: &[&str] = &[
    "explore", "accounts", "stories", "direct", "about", "developer", "legal", "p", "reel",
    "reels", "tv", "web", "challenge",
];

const TWITTER_RESERVED: &[&str] = &[
    "i", "home", "explore", "search", "settings", "messages", "notifications", "hashtag",
    "login", "signup", "tos", "privacy", "compose", "intent", "share",
];

/// Classify a URL.
pub fn classify(raw: &str) -> Result<Target, UnrecognizedTarget> {
    classify_with_hint(raw, None)
}

/// Classify a URL, or a bare `@handle` / `#hashtag` when a platform hint is given.
pub fn classify_with_hint(
    raw: &str,
    hint: Option<Platform>,
) -> Result<Target, UnrecognizedTarget> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(UnrecognizedTarget::new(raw, "empty input"));
    }

    if let Some(platform) = hint.filter(|p| *p != Platform::Unknown) {
        if let Some(target) = classify_handle(input, platform) {
            return Ok(target);
        }
    }

    let url = parse_url(input).ok_or_else(|| UnrecognizedTarget::new(raw, "not a URL"))?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
        .ok_or_else(|| UnrecognizedTarget::new(raw, "URL has no host"))?;

    let (platform, rules): (Platform, &[PathRule]) = match host.as_str() {
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            if let Some(target) = youtube_watch(&url, input) {
                return Ok(target);
            }
            (Platform::YouTube, YOUTUBE_RULES.as_slice())
        }
        "youtu.be" => (Platform::YouTube, YOUTU_BE_RULES.as_slice()),
        "instagram.com" | "m.instagram.com" | "instagr.am" => {
            (Platform::Instagram, INSTAGRAM_RULES.as_slice())
        }
        "tiktok.com" | "m.tiktok.com" => (Platform::TikTok, TIKTOK_RULES.as_slice()),
        "vm.tiktok.com" | "vt.tiktok.com" => (Platform::TikTok, TIKTOK_SHORT_RULES.as_slice()),
        "twitter.com" | "mobile.twitter.com" | "x.com" | "mobile.x.com" => {
            (Platform::Twitter, TWITTER_RULES.as_slice())
        }
        other => {
            return Err(UnrecognizedTarget::new(
                raw,
                format!("unsupported host '{}'", other),
            ))
        }
    };

    let path = url.path();
    for rule in rules {
        let Some(caps) = rule.pattern.captures(path) else {
            continue;
        };
        if rule.content_type == ContentType::Profile && is_reserved(platform, &caps[1]) {
            continue;
        }
        return Ok(Target::new(
            platform,
            rule.content_type,
            (rule.id)(&caps),
            input,
        ));
    }

    Err(UnrecognizedTarget::new(
        raw,
        format!("unsupported {} path '{}'", platform.display_name(), path),
    ))
}

fn parse_url(input: &str) -> Option<Url> {
    if input.chars().any(char::is_whitespace) {
        return None;
    }

    let candidate = if input.contains("://") {
        input.to_string()
    } else if input.contains('.') && !input.starts_with('@') && !input.starts_with('#') {
        format!("https://{}", input)
    } else {
        return None;
    };

    let url = Url::parse(&candidate).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn youtube_watch(url: &Url, input: &str) -> Option<Target> {
    if url.path().trim_end_matches('/') != "/watch" {
        return None;
    }
    let id = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())?;
    YOUTUBE_VIDEO_ID
        .is_match(&id)
        .then(|| Target::new(Platform::YouTube, ContentType::Video, id, input))
}

fn classify_handle(input: &str, platform: Platform) -> Option<Target> {
    if let Some(caps) = HASHTAG.captures(input) {
        return Some(Target::new(
            platform,
            ContentType::Hashtag,
            caps[1].to_lowercase(),
            input,
        ));
    }

    // Bare dotted tokens are hostnames; dotted handles need the `@`.
    if !input.starts_with('@') && input.contains('.') {
        return None;
    }
    let caps = HANDLE.captures(input)?;
    let username = caps[1].to_lowercase();
    if is_reserved(platform, &username) {
        return None;
    }
    Some(Target::new(platform, ContentType::Profile, username, input))
}

fn is_reserved(platform: Platform, segment: &str) -> bool {
    let segment = segment.to_ascii_lowercase();
    match platform {
        Platform::Instagram => INSTAGRAM_RESERVED.contains(&segment.as_str()),
        Platform::Twitter => TWITTER_RESERVED.contains(&segment.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> (Platform, ContentType, String) {
        let t = classify(raw).unwrap_or_else(|e| panic!("{}: {}", raw, e));
        (t.platform(), t.content_type(), t.canonical_id().to_string())
    }

    #[test]
    fn test_category_table() {
        use ContentType::*;
        use Platform::*;

        let cases: &[(&str, Platform, ContentType, &str)] = &[
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", YouTube, Video, "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ", YouTube, Video, "dQw4w9WgXcQ"),
            ("https://www.youtube.com/shorts/abc123defgh", YouTube, Video, "abc123defgh"),
            ("https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42s", YouTube, Video, "dQw4w9WgXcQ"),
            ("https://www.youtube.com/@MrBeast", YouTube, Profile, "mrbeast"),
            ("https://www.youtube.com/@MrBeast/videos", YouTube, Profile, "mrbeast"),
            (
                "https://www.youtube.com/channel/UCX6OQ3DkcsbYNE6H8uQQuVA",
                YouTube,
                Profile,
                "UCX6OQ3DkcsbYNE6H8uQQuVA",
            ),
            ("https://www.youtube.com/hashtag/Shorts", YouTube, Hashtag, "shorts"),
            ("https://www.instagram.com/reel/C1a2B3c4D5e/", Instagram, Video, "C1a2B3c4D5e"),
            ("https://www.instagram.com/p/CxYz123/", Instagram, Post, "CxYz123"),
            ("https://www.instagram.com/natgeo/", Instagram, Profile, "natgeo"),
            ("https://www.instagram.com/explore/tags/Sunset/", Instagram, Hashtag, "sunset"),
            (
                "https://www.tiktok.com/@scout2015/video/6718335390845095173",
                TikTok,
                Video,
                "scout2015/6718335390845095173",
            ),
            ("https://www.tiktok.com/@scout2015", TikTok, Profile, "scout2015"),
            ("https://www.tiktok.com/tag/dance", TikTok, Hashtag, "dance"),
            ("https://vm.tiktok.com/ZMabc123/", TikTok, Video, "ZMabc123"),
            ("https://x.com/jack/status/20", Twitter, Post, "jack/20"),
            ("https://twitter.com/NASA/status/1234567890/video/1", Twitter, Video, "nasa/1234567890"),
            ("https://twitter.com/NASA", Twitter, Profile, "nasa"),
            ("https://x.com/hashtag/RustLang", Twitter, Hashtag, "rustlang"),
        ];

        for (raw, platform, ct, id) in cases {
            assert_eq!(kind(raw), (*platform, *ct, id.to_string()), "{}", raw);
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        for raw in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.tiktok.com/@scout2015/video/6718335390845095173",
            "instagram.com/natgeo",
        ] {
            assert_eq!(classify(raw), classify(raw));
        }
    }

    #[test]
    fn test_channel_video_not_read_as_profile() {
        let (_, ct, _) = kind("https://www.tiktok.com/@someone/video/123");
        assert_eq!(ct, ContentType::Video);
        let (_, ct, _) = kind("https://x.com/someone/status/99/video/1");
        assert_eq!(ct, ContentType::Video);
    }

    #[test]
    fn test_scheme_is_optional() {
        let (platform, ct, id) = kind("www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!((platform, ct, id.as_str()), (Platform::YouTube, ContentType::Video, "dQw4w9WgXcQ"));
    }

    #[test]
    fn test_not_a_url() {
        let err = classify("not a url").unwrap_err();
        assert_eq!(err.input, "not a url");
    }

    #[test]
    fn test_unknown_host_rejected() {
        assert!(classify("https://vimeo.com/12345").is_err());
        assert!(classify("ftp://youtube.com/watch?v=dQw4w9WgXcQ").is_err());
    }

    #[test]
    fn test_malformed_paths_rejected() {
        assert!(classify("https://www.youtube.com/watch?v=short").is_err());
        assert!(classify("https://www.youtube.com/playlist?list=PL123").is_err());
        assert!(classify("https://www.instagram.com/explore/").is_err());
        assert!(classify("https://x.com/i/flow/login").is_err());
    }

    #[test]
    fn test_handles_need_a_hint() {
        assert!(classify("@natgeo").is_err());

        let t = classify_with_hint("@NatGeo", Some(Platform::Instagram)).unwrap();
        assert_eq!(t.content_type(), ContentType::Profile);
        assert_eq!(t.canonical_id(), "natgeo");

        let t = classify_with_hint("#Travel", Some(Platform::TikTok)).unwrap();
        assert_eq!(t.content_type(), ContentType::Hashtag);
        assert_eq!(t.canonical_id(), "travel");
    }

    #[test]
    fn test_hint_never_turns_hostnames_into_profiles() {
        for input in ["youtube.com", "a.b", "www.tiktok.com"] {
            assert!(
                classify_with_hint(input, Some(Platform::Instagram)).is_err(),
                "{} should be rejected",
                input
            );
        }

        let t = classify_with_hint("natgeo", Some(Platform::Instagram)).unwrap();
        assert_eq!(t.canonical_id(), "natgeo");
        let t = classify_with_hint("@nat.geo", Some(Platform::Instagram)).unwrap();
        assert_eq!(t.canonical_id(), "nat.geo");
    }

    #[test]
    fn test_hint_does_not_override_url_host() {
        let t = classify_with_hint(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            Some(Platform::TikTok),
        )
        .unwrap();
        assert_eq!(t.platform(), Platform::YouTube);
    }
}
