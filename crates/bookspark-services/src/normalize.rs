//! Turns a fetched post into the store's write model.

use std::collections::HashMap;

use uuid::Uuid;

use bookspark_db::NewBookmark;
use bookspark_types::models::{ContentType, Media, MediaKind};

use crate::twitter::{Author, MediaItem, Post};

/// video > image > link > tweet.
pub fn derive_content_type(media: &[Media], has_urls: bool) -> ContentType {
    if media.iter().any(|m| m.kind.is_video()) {
        ContentType::Video
    } else if media.iter().any(|m| m.kind == MediaKind::Photo) {
        ContentType::Image
    } else if has_urls {
        ContentType::Link
    } else {
        ContentType::Tweet
    }
}

/// Remove `[start, end)` character spans from `text` and trim the result.
///
/// Spans are applied from the highest start offset down so earlier offsets
/// stay valid. Out-of-range ends are clamped to the text length; a span that
/// overlaps an already removed one is clipped to what is left.
pub fn clean_text(text: &str, spans: &[(usize, usize)]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut ordered = spans.to_vec();
    ordered.sort_by(|a, b| b.0.cmp(&a.0));

    let mut floor = chars.len();
    for (start, end) in ordered {
        let end = end.min(floor);
        if start >= end {
            continue;
        }
        chars.drain(start..end);
        floor = start;
    }

    chars.into_iter().collect::<String>().trim().to_string()
}

pub fn high_res_avatar(url: &str) -> String {
    url.replace("_normal", "_400x400")
}

pub fn normalize_post(
    user_id: Uuid,
    post: &Post,
    authors: &HashMap<&str, &Author>,
    media_index: &HashMap<&str, &MediaItem>,
) -> NewBookmark {
    let author = post.author_id.as_deref().and_then(|id| authors.get(id).copied());

    let media: Vec<Media> = post
        .attachments
        .iter()
        .flat_map(|a| a.media_keys.iter())
        .filter_map(|key| media_index.get(key.as_str()))
        .map(|m| Media {
            media_key: m.media_key.clone(),
            kind: m.kind,
            url: m.url.clone().or_else(|| m.preview_image_url.clone()),
        })
        .collect();

    let urls = post.entities.as_ref().map(|e| e.urls.as_slice()).unwrap_or_default();
    let spans: Vec<(usize, usize)> = urls.iter().map(|u| (u.start, u.end)).collect();
    let expanded_urls: Vec<String> = urls
        .iter()
        .map(|u| u.expanded_url.clone().unwrap_or_else(|| u.url.clone()))
        .collect();

    NewBookmark {
        user_id,
        external_id: post.id.clone(),
        content: post.text.clone(),
        cleaned_content: clean_text(&post.text, &spans),
        author_name: author.and_then(|a| a.name.clone()),
        author_username: author.and_then(|a| a.username.clone()),
        author_avatar_url: author
            .and_then(|a| a.profile_image_url.as_deref())
            .map(high_res_avatar),
        author_verified: author.is_some_and(|a| a.verified),
        url: expanded_urls.first().cloned(),
        content_type: derive_content_type(&media, !urls.is_empty()),
        expanded_urls,
        media,
        metrics: post.public_metrics.clone().unwrap_or_default(),
        posted_at: post.created_at,
    }
}
