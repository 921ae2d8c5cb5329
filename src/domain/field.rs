use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ContentType, Platform};

/// A named piece of metadata an executor can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Description,
    ViewCount,
    LikeCount,
    CommentCount,
    ShareCount,
    Duration,
    UploadDate,
    CreatorUsername,
    CreatorProfileUrl,
    CreatorFollowerCount,
    ThumbnailUrl,
}

/// How a raw value for a field must parse to count as a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Count,
    Duration,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Title,
        Field::Description,
        Field::ViewCount,
        Field::LikeCount,
        Field::CommentCount,
        Field::ShareCount,
        Field::Duration,
        Field::UploadDate,
        Field::CreatorUsername,
        Field::CreatorProfileUrl,
        Field::CreatorFollowerCount,
        Field::ThumbnailUrl,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::ViewCount => "view_count",
            Field::LikeCount => "like_count",
            Field::CommentCount => "comment_count",
            Field::ShareCount => "share_count",
            Field::Duration => "duration",
            Field::UploadDate => "upload_date",
            Field::CreatorUsername => "creator_username",
            Field::CreatorProfileUrl => "creator_profile_url",
            Field::CreatorFollowerCount => "creator_follower_count",
            Field::ThumbnailUrl => "thumbnail_url",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::ViewCount
            | Field::LikeCount
            | Field::CommentCount
            | Field::ShareCount
            | Field::CreatorFollowerCount => FieldKind::Count,
            Field::Duration => FieldKind::Duration,
            _ => FieldKind::Text,
        }
    }

    /// Engagement metrics; one of them plus a title is the minimum for a partial result
    pub fn is_engagement(&self) -> bool {
        self.kind() == FieldKind::Count
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fields that must resolve for an attempt to count as a full success.
///
/// Completeness is measured against this set, so every strategy of a
/// platform shares it.
pub fn required_fields(platform: Platform, content_type: ContentType) -> &'static [Field] {
    use ContentType::*;
    use Field::*;

    match (platform, content_type) {
        (_, Profile) => &[Title, CreatorUsername, CreatorFollowerCount],

        (Platform::YouTube, Video) => &[Title, ViewCount, LikeCount, UploadDate, CreatorUsername],
        (Platform::YouTube, Hashtag) => &[Title, ViewCount],
        (Platform::YouTube, Post) => &[Title, LikeCount, CreatorUsername],

        (Platform::Instagram, Video | Post) => &[Title, LikeCount, CommentCount, CreatorUsername],
        (Platform::Instagram, Hashtag) => &[Title, ViewCount],

        (Platform::TikTok, Video) => &[Title, ViewCount, LikeCount, CommentCount, CreatorUsername],
        (Platform::TikTok, Hashtag) => &[Title, ViewCount],
        (Platform::TikTok, Post) => &[Title, LikeCount, CreatorUsername],

        (Platform::Twitter, Video) => &[Title, LikeCount, ViewCount, CreatorUsername],
        (Platform::Twitter, Hashtag) => &[Title],
        (Platform::Twitter, Post) => &[Title, LikeCount, CreatorUsername],

        (Platform::Unknown, _) => &[Title],
    }
}
