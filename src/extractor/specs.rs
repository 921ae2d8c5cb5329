//! Per-platform field tables.
//!
//! Locators are ordered most specific first. `required` comes from the
//! platform's required-field table so every strategy of one platform
//! agrees on what a complete result is.

use crate::domain::{required_fields, ContentType, Field, Platform, Target};
use crate::extractor::{FieldSpec, Locator};

type Entry = (Field, Vec<Locator>);

fn build(target: &Target, entries: Vec<Entry>) -> Vec<FieldSpec> {
    let required = required_fields(target.platform(), target.content_type());
    entries
        .into_iter()
        .filter(|(field, locators)| {
            !locators.is_empty()
                && (*field != Field::Duration || target.content_type().has_duration())
        })
        .map(|(field, locators)| FieldSpec::new(field, locators, required.contains(&field)))
        .collect()
}

/// Specs for a page rendered in a real browser: live DOM selectors first,
/// then everything the raw page source offers
pub fn browser_specs(target: &Target) -> Vec<FieldSpec> {
    let rendered = rendered_locators(target.platform(), target.content_type());
    let source = source_locators(target.platform(), target.content_type());

    let entries = Field::ALL
        .iter()
        .map(|field| {
            let mut locators = locators_for(&rendered, *field);
            locators.extend(locators_for(&source, *field));
            (*field, locators)
        })
        .collect();
    build(target, entries)
}

/// Specs for raw page source fetched without JavaScript
pub fn html_specs(target: &Target) -> Vec<FieldSpec> {
    build(
        target,
        source_locators(target.platform(), target.content_type()),
    )
}

/// Specs for a dataset item returned by the authenticated scraping actor
pub fn actor_specs(target: &Target) -> Vec<FieldSpec> {
    let entries = match (target.platform(), target.content_type()) {
        (Platform::Instagram, ContentType::Profile) => vec![
            (Field::Title, json(&["fullName", "username"])),
            (Field::Description, json(&["biography"])),
            (Field::CreatorUsername, json(&["username"])),
            (Field::CreatorFollowerCount, json(&["followersCount"])),
            (Field::ThumbnailUrl, json(&["profilePicUrlHD", "profilePicUrl"])),
        ],
        (Platform::Instagram, _) => vec![
            (Field::Title, json(&["caption", "alt"])),
            (Field::ViewCount, json(&["videoPlayCount", "videoViewCount"])),
            (Field::LikeCount, json(&["likesCount"])),
            (Field::CommentCount, json(&["commentsCount"])),
            (Field::Duration, json(&["videoDuration"])),
            (Field::UploadDate, json(&["timestamp"])),
            (Field::CreatorUsername, json(&["ownerUsername"])),
            (Field::ThumbnailUrl, json(&["displayUrl"])),
        ],
        (Platform::TikTok, ContentType::Profile) => vec![
            (Field::Title, json(&["authorMeta.nickName", "authorMeta.name"])),
            (Field::Description, json(&["authorMeta.signature"])),
            (Field::CreatorUsername, json(&["authorMeta.name"])),
            (Field::CreatorFollowerCount, json(&["authorMeta.fans"])),
            (Field::ThumbnailUrl, json(&["authorMeta.avatar"])),
        ],
        (Platform::TikTok, _) => vec![
            (Field::Title, json(&["text"])),
            (Field::ViewCount, json(&["playCount"])),
            (Field::LikeCount, json(&["diggCount"])),
            (Field::CommentCount, json(&["commentCount"])),
            (Field::ShareCount, json(&["shareCount"])),
            (Field::Duration, json(&["videoMeta.duration"])),
            (Field::UploadDate, json(&["createTimeISO", "createTime"])),
            (Field::CreatorUsername, json(&["authorMeta.name"])),
            (Field::CreatorFollowerCount, json(&["authorMeta.fans"])),
            (Field::ThumbnailUrl, json(&["videoMeta.coverUrl"])),
        ],
        (Platform::Twitter, ContentType::Profile) => vec![
            (Field::Title, json(&["author.name", "name"])),
            (Field::Description, json(&["author.description", "description"])),
            (Field::CreatorUsername, json(&["author.userName", "userName"])),
            (Field::CreatorFollowerCount, json(&["author.followers", "followers"])),
            (Field::ThumbnailUrl, json(&["author.profilePicture"])),
        ],
        (Platform::Twitter, _) => vec![
            (Field::Title, json(&["text", "fullText"])),
            (Field::ViewCount, json(&["viewCount"])),
            (Field::LikeCount, json(&["likeCount"])),
            (Field::CommentCount, json(&["replyCount"])),
            (Field::ShareCount, json(&["retweetCount"])),
            (Field::UploadDate, json(&["createdAt"])),
            (Field::CreatorUsername, json(&["author.userName"])),
            (Field::CreatorFollowerCount, json(&["author.followers"])),
        ],
        _ => Vec::new(),
    };
    build(target, entries)
}

/// YouTube Data API v3 `videos` / `channels` list responses
pub fn youtube_api_specs(target: &Target) -> Vec<FieldSpec> {
    let entries = match target.content_type() {
        ContentType::Profile => vec![
            (Field::Title, json(&["items.0.snippet.title"])),
            (Field::Description, json(&["items.0.snippet.description"])),
            (
                Field::CreatorUsername,
                json(&["items.0.snippet.customUrl", "items.0.snippet.title"]),
            ),
            (
                Field::CreatorFollowerCount,
                json(&["items.0.statistics.subscriberCount"]),
            ),
            (
                Field::ThumbnailUrl,
                json(&["items.0.snippet.thumbnails.high.url"]),
            ),
        ],
        _ => vec![
            (Field::Title, json(&["items.0.snippet.title"])),
            (Field::Description, json(&["items.0.snippet.description"])),
            (Field::ViewCount, json(&["items.0.statistics.viewCount"])),
            (Field::LikeCount, json(&["items.0.statistics.likeCount"])),
            (Field::CommentCount, json(&["items.0.statistics.commentCount"])),
            (Field::Duration, json(&["items.0.contentDetails.duration"])),
            (Field::UploadDate, json(&["items.0.snippet.publishedAt"])),
            (Field::CreatorUsername, json(&["items.0.snippet.channelTitle"])),
            (
                Field::ThumbnailUrl,
                json(&[
                    "items.0.snippet.thumbnails.maxres.url",
                    "items.0.snippet.thumbnails.high.url",
                ]),
            ),
        ],
    };
    build(target, entries)
}

/// oEmbed responses (TikTok, Instagram Graph)
pub fn oembed_specs(target: &Target) -> Vec<FieldSpec> {
    build(
        target,
        vec![
            (Field::Title, json(&["title"])),
            (
                Field::CreatorUsername,
                json(&["author_unique_id", "author_name"]),
            ),
            (Field::CreatorProfileUrl, json(&["author_url"])),
            (Field::ThumbnailUrl, json(&["thumbnail_url"])),
        ],
    )
}

/// Twitter syndication `tweet-result` document
pub fn tweet_result_specs(target: &Target) -> Vec<FieldSpec> {
    build(
        target,
        vec![
            (Field::Title, json(&["text"])),
            (Field::LikeCount, json(&["favorite_count"])),
            (Field::CommentCount, json(&["conversation_count"])),
            (Field::ViewCount, json(&["views_count", "video.viewCount"])),
            (Field::UploadDate, json(&["created_at"])),
            (Field::CreatorUsername, json(&["user.screen_name"])),
            (Field::CreatorFollowerCount, json(&["user.followers_count"])),
            (
                Field::ThumbnailUrl,
                json(&["mediaDetails.0.media_url_https", "photos.0.url"]),
            ),
        ],
    )
}

/// Flat `{ "<field key>": value }` documents
pub fn flat_specs(target: &Target) -> Vec<FieldSpec> {
    let entries = Field::ALL
        .iter()
        .map(|field| (*field, vec![Locator::json(field.key())]))
        .collect();
    build(target, entries)
}

fn json(paths: &[&str]) -> Vec<Locator> {
    paths.iter().map(|p| Locator::json(p)).collect()
}

fn locators_for(entries: &[Entry], field: Field) -> Vec<Locator> {
    entries
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, l)| l.clone())
        .unwrap_or_default()
}

fn rendered_locators(platform: Platform, content_type: ContentType) -> Vec<Entry> {
    use ContentType::*;

    match (platform, content_type) {
        (Platform::YouTube, Profile) => vec![
            (
                Field::Title,
                vec![
                    Locator::css("yt-dynamic-text-view-model h1"),
                    Locator::css("#channel-name #text"),
                ],
            ),
            (
                Field::CreatorFollowerCount,
                vec![
                    Locator::css("#subscriber-count"),
                    Locator::aria("yt-content-metadata-view-model span", "subscribers"),
                ],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::css("#channel-handle")],
            ),
        ],
        (Platform::YouTube, _) => vec![
            (
                Field::Title,
                vec![
                    Locator::css("h1.ytd-watch-metadata yt-formatted-string"),
                    Locator::css("h1.ytd-video-primary-info-renderer"),
                    Locator::css("#video-title"),
                ],
            ),
            (
                Field::Description,
                vec![
                    Locator::css("#description-inline-expander yt-attributed-string"),
                    Locator::css("yt-formatted-string#description"),
                ],
            ),
            (
                Field::ViewCount,
                vec![
                    Locator::css("span.view-count"),
                    Locator::css("#info span.bold"),
                    Locator::aria("span", "views"),
                ],
            ),
            (
                Field::LikeCount,
                vec![
                    Locator::aria("like-button-view-model button", "like"),
                    Locator::aria("button", "like this video"),
                    Locator::css("#top-level-buttons-computed button:first-child span"),
                ],
            ),
            (
                Field::CommentCount,
                vec![
                    Locator::css("h2#count span"),
                    Locator::css("yt-formatted-string.count-text"),
                ],
            ),
            (Field::Duration, vec![Locator::css(".ytp-time-duration")]),
            (
                Field::UploadDate,
                vec![Locator::css("#info-strings yt-formatted-string")],
            ),
            (
                Field::CreatorUsername,
                vec![
                    Locator::css("ytd-channel-name a"),
                    Locator::css("#owner #channel-name a"),
                ],
            ),
            (
                Field::CreatorProfileUrl,
                vec![Locator::css_attr("ytd-channel-name a", "href")],
            ),
            (
                Field::CreatorFollowerCount,
                vec![Locator::css("#owner-sub-count")],
            ),
        ],
        (Platform::Instagram, Profile) => vec![
            (Field::Title, vec![Locator::css("header h2"), Locator::css("header h1")]),
            (
                Field::CreatorFollowerCount,
                vec![
                    Locator::css_attr(r#"a[href$="/followers/"] span[title]"#, "title"),
                    Locator::css(r#"a[href$="/followers/"] span"#),
                ],
            ),
        ],
        (Platform::Instagram, _) => vec![
            (
                Field::Title,
                vec![Locator::css("article h1"), Locator::css("div._a9zs span")],
            ),
            (
                Field::LikeCount,
                vec![
                    Locator::css(r#"section a[href$="/liked_by/"] span"#),
                    Locator::aria("section span", "like"),
                ],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::css("header a[role=\"link\"]")],
            ),
            (
                Field::UploadDate,
                vec![Locator::css_attr("time[datetime]", "datetime")],
            ),
        ],
        (Platform::TikTok, Profile) => vec![
            (Field::Title, vec![Locator::css(r#"[data-e2e="user-subtitle"]"#)]),
            (
                Field::CreatorUsername,
                vec![Locator::css(r#"[data-e2e="user-title"]"#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![Locator::css(r#"[data-e2e="followers-count"]"#)],
            ),
        ],
        (Platform::TikTok, _) => vec![
            (
                Field::Title,
                vec![Locator::css(r#"[data-e2e="browse-video-desc"]"#)],
            ),
            (
                Field::LikeCount,
                vec![Locator::css(r#"[data-e2e="like-count"]"#)],
            ),
            (
                Field::CommentCount,
                vec![Locator::css(r#"[data-e2e="comment-count"]"#)],
            ),
            (
                Field::ShareCount,
                vec![Locator::css(r#"[data-e2e="share-count"]"#)],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::css(r#"[data-e2e="browse-username"]"#)],
            ),
        ],
        (Platform::Twitter, Profile) => vec![
            (
                Field::Title,
                vec![Locator::css(r#"[data-testid="UserName"] span"#)],
            ),
            (
                Field::Description,
                vec![Locator::css(r#"[data-testid="UserDescription"]"#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![Locator::css(r#"a[href$="/verified_followers"] span"#)],
            ),
        ],
        (Platform::Twitter, _) => vec![
            (
                Field::Title,
                vec![Locator::css(r#"article [data-testid="tweetText"]"#)],
            ),
            (
                Field::LikeCount,
                vec![Locator::aria(r#"[data-testid="like"]"#, "like")],
            ),
            (
                Field::CommentCount,
                vec![Locator::aria(r#"[data-testid="reply"]"#, "repl")],
            ),
            (
                Field::ShareCount,
                vec![Locator::aria(r#"[data-testid="retweet"]"#, "repost")],
            ),
            (
                Field::ViewCount,
                vec![Locator::aria(r#"a[href$="/analytics"]"#, "view")],
            ),
            (
                Field::UploadDate,
                vec![Locator::css_attr("article time", "datetime")],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::css(r#"article [data-testid="User-Name"] a[tabindex="-1"]"#)],
            ),
        ],
        (Platform::Unknown, _) => Vec::new(),
    }
}

fn source_locators(platform: Platform, content_type: ContentType) -> Vec<Entry> {
    use ContentType::*;

    // Hashtag pages carry a post/view total in their description.
    if content_type == Hashtag {
        return vec![
            (
                Field::Title,
                vec![Locator::meta("og:title"), Locator::css("h1")],
            ),
            (
                Field::ViewCount,
                vec![
                    Locator::pattern(r#"([\d.,]+[KMB]?) (?:posts|videos|views)"#),
                    Locator::pattern(r#""viewCount":"?(\d+)"#),
                ],
            ),
            (Field::Description, vec![Locator::meta("og:description")]),
        ];
    }

    match (platform, content_type) {
        (Platform::YouTube, Profile) => vec![
            (
                Field::Title,
                vec![Locator::meta("og:title"), Locator::meta("name")],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::pattern(r#""canonicalBaseUrl":"/@([^"]+)""#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![
                    Locator::pattern(r#""subscriberCountText":\{"simpleText":"([^"]+)""#),
                    Locator::pattern(r#"([\d.,]+[KMB]?) subscribers"#),
                ],
            ),
        ],
        (Platform::YouTube, _) => vec![
            (
                Field::Title,
                vec![
                    Locator::meta("og:title"),
                    Locator::meta("title"),
                    Locator::json_ld("name"),
                ],
            ),
            (
                Field::Description,
                vec![
                    Locator::pattern(r#""shortDescription":"((?:[^"\\]|\\.)*)""#),
                    Locator::meta("og:description"),
                ],
            ),
            (
                Field::ViewCount,
                vec![
                    Locator::meta("interactionCount"),
                    Locator::pattern(r#""viewCount":"(\d+)""#),
                    Locator::json_ld("interactionCount"),
                ],
            ),
            (
                Field::LikeCount,
                vec![
                    Locator::pattern(r#"like this video along with ([\d,]+) other"#),
                    Locator::pattern(r#""likeCount":"?(\d+)"#),
                ],
            ),
            (
                Field::Duration,
                vec![
                    Locator::meta("duration"),
                    Locator::pattern(r#""lengthSeconds":"(\d+)""#),
                ],
            ),
            (
                Field::UploadDate,
                vec![
                    Locator::meta("uploadDate"),
                    Locator::meta("datePublished"),
                    Locator::pattern(r#""publishDate":"([^"]+)""#),
                ],
            ),
            (
                Field::CreatorUsername,
                vec![
                    Locator::pattern(r#""ownerChannelName":"((?:[^"\\]|\\.)*)""#),
                    Locator::pattern(r#""author":"((?:[^"\\]|\\.)*)""#),
                ],
            ),
            (
                Field::CreatorProfileUrl,
                vec![Locator::pattern(r#""ownerProfileUrl":"([^"]+)""#)],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::Instagram, Profile) => vec![
            (Field::Title, vec![Locator::meta("og:title")]),
            (Field::Description, vec![Locator::meta("description")]),
            (
                Field::CreatorUsername,
                vec![Locator::pattern(r#""username":"([A-Za-z0-9_.]+)""#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![
                    Locator::pattern(r#""edge_followed_by":\{"count":(\d+)"#),
                    Locator::pattern(r#"([\d.,]+[KMB]?) Followers"#),
                ],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::Instagram, _) => vec![
            (
                Field::Title,
                vec![
                    Locator::pattern(r#""caption":\{[^}]*?"text":"((?:[^"\\]|\\.)*)""#),
                    Locator::meta("og:title"),
                ],
            ),
            (
                Field::ViewCount,
                vec![
                    Locator::pattern(r#""play_count":(\d+)"#),
                    Locator::pattern(r#""video_view_count":(\d+)"#),
                ],
            ),
            (
                Field::LikeCount,
                vec![
                    Locator::pattern(r#""like_count":(\d+)"#),
                    Locator::pattern(r#"([\d.,]+[KMB]?) likes"#),
                ],
            ),
            (
                Field::CommentCount,
                vec![
                    Locator::pattern(r#""comment_count":(\d+)"#),
                    Locator::pattern(r#"([\d.,]+[KMB]?) comments"#),
                ],
            ),
            (
                Field::Duration,
                vec![Locator::pattern(r#""video_duration":([\d.]+)"#)],
            ),
            (
                Field::UploadDate,
                vec![Locator::pattern(r#""taken_at":(\d{10})"#)],
            ),
            (
                Field::CreatorUsername,
                vec![
                    Locator::pattern(r#""owner":\{[^}]*?"username":"([A-Za-z0-9_.]+)""#),
                    Locator::pattern(r#"- ([A-Za-z0-9_.]+) on "#),
                ],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::TikTok, Profile) => vec![
            (
                Field::Title,
                vec![
                    Locator::pattern(r#""nickname":"((?:[^"\\]|\\.)*)""#),
                    Locator::meta("og:title"),
                ],
            ),
            (
                Field::Description,
                vec![Locator::pattern(r#""signature":"((?:[^"\\]|\\.)*)""#)],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::pattern(r#""uniqueId":"([^"]+)""#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![Locator::pattern(r#""followerCount":(\d+)"#)],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::TikTok, _) => vec![
            (
                Field::Title,
                vec![
                    Locator::pattern(r#""desc":"((?:[^"\\]|\\.)*)""#),
                    Locator::meta("og:description"),
                    Locator::meta("og:title"),
                ],
            ),
            (
                Field::ViewCount,
                vec![Locator::pattern(r#""playCount":(\d+)"#)],
            ),
            (
                Field::LikeCount,
                vec![Locator::pattern(r#""diggCount":(\d+)"#)],
            ),
            (
                Field::CommentCount,
                vec![Locator::pattern(r#""commentCount":(\d+)"#)],
            ),
            (
                Field::ShareCount,
                vec![Locator::pattern(r#""shareCount":(\d+)"#)],
            ),
            (
                Field::Duration,
                vec![Locator::pattern(r#""duration":(\d+)"#)],
            ),
            (
                Field::UploadDate,
                vec![Locator::pattern(r#""createTime":"?(\d{10})"#)],
            ),
            (
                Field::CreatorUsername,
                vec![Locator::pattern(r#""uniqueId":"([^"]+)""#)],
            ),
            (
                Field::CreatorFollowerCount,
                vec![Locator::pattern(r#""followerCount":(\d+)"#)],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::Twitter, Profile) => vec![
            (Field::Title, vec![Locator::meta("og:title")]),
            (Field::Description, vec![Locator::meta("og:description")]),
            (
                Field::CreatorFollowerCount,
                vec![Locator::pattern(r#""followers_count":(\d+)"#)],
            ),
        ],
        (Platform::Twitter, _) => vec![
            (
                Field::Title,
                vec![Locator::meta("og:description"), Locator::meta("twitter:description")],
            ),
            (
                Field::LikeCount,
                vec![Locator::pattern(r#""favorite_count":(\d+)"#)],
            ),
            (
                Field::CommentCount,
                vec![Locator::pattern(r#""reply_count":(\d+)"#)],
            ),
            (
                Field::ShareCount,
                vec![Locator::pattern(r#""retweet_count":(\d+)"#)],
            ),
            (
                Field::ViewCount,
                vec![Locator::pattern(r#""views":\{"count":"(\d+)""#)],
            ),
            (Field::ThumbnailUrl, vec![Locator::meta("og:image")]),
        ],
        (Platform::Unknown, _) => vec![
            (Field::Title, vec![Locator::meta("og:title")]),
            (Field::Description, vec![Locator::meta("og:description")]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    #[test]
    fn test_required_flags_follow_platform_table() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let specs = html_specs(&target);

        let mut got: Vec<Field> = specs
            .iter()
            .filter(|s| s.required)
            .map(|s| s.field)
            .collect();
        let mut expected = required_fields(target.platform(), target.content_type()).to_vec();
        expected.sort();
        got.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_browser_specs_put_rendered_selectors_first() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let specs = browser_specs(&target);
        let title = specs.iter().find(|s| s.field == Field::Title).unwrap();

        assert!(matches!(title.locators.first(), Some(Locator::Css { .. })));
        assert!(title.locators.contains(&Locator::meta("og:title")));
    }

    #[test]
    fn test_profile_specs_have_no_duration() {
        let target = classify("https://www.tiktok.com/@scout2015").unwrap();
        assert!(flat_specs(&target)
            .iter()
            .all(|s| s.field != Field::Duration));
    }

    #[test]
    fn test_flat_specs_cover_every_field_key() {
        let target = classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        let specs = flat_specs(&target);
        assert_eq!(specs.len(), Field::ALL.len());
        assert!(specs
            .iter()
            .any(|s| s.locators == vec![Locator::json("view_count")]));
    }
}
