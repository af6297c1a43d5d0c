//! Music link extraction from chat messages
//!
//! Scans message text for URL-shaped substrings, strips query strings
//! (share links carry tracking parameters), and keeps only links
//! hosted on the Spotify web player domain, grouped per author.

use crate::services::discord::Message;
use crate::services::spotify::SPOTIFY_WEB_DOMAIN;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// A URL-shaped substring runs to the next whitespace or angle
/// bracket; two URLs pasted together stay one opaque token.
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>]+").expect("URL pattern is valid"));

/// Links grouped by contributor, plus the id -> display-name map
#[derive(Debug, Default)]
pub struct ExtractedLinks {
    /// Contributor id -> links in encounter order, query strings
    /// stripped, repeats retained
    pub links_by_contributor: BTreeMap<String, Vec<String>>,
    /// Contributor id -> first username seen for that id
    pub display_names: HashMap<String, String>,
}

/// Extract recognized music links from a batch of messages.
///
/// Messages from bot authors contribute nothing, not even a
/// display-name entry.
pub fn extract_music_links(messages: &[Message]) -> ExtractedLinks {
    let mut extracted = ExtractedLinks::default();

    for message in messages {
        if message.author.bot {
            continue;
        }

        let links = extracted
            .links_by_contributor
            .entry(message.author.id.clone())
            .or_default();

        for found in URL_PATTERN.find_iter(&message.content) {
            let stripped = strip_query(found.as_str());
            if is_music_link(stripped) {
                links.push(stripped.to_string());
            }
        }

        extracted
            .display_names
            .entry(message.author.id.clone())
            .or_insert_with(|| message.author.username.clone());
    }

    extracted
}

/// Drop everything from the first `?` onward
fn strip_query(link: &str) -> &str {
    match link.find('?') {
        Some(index) => &link[..index],
        None => link,
    }
}

fn is_music_link(link: &str) -> bool {
    Url::parse(link)
        .ok()
        .is_some_and(|url| url.host_str() == Some(SPOTIFY_WEB_DOMAIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::discord::{message_type, MessageAuthor};
    use chrono::{TimeZone, Utc};

    fn message(author_id: &str, username: &str, bot: bool, content: &str) -> Message {
        Message {
            id: "1".to_string(),
            kind: message_type::DEFAULT,
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 8, 18, 12, 0, 0).unwrap(),
            author: MessageAuthor {
                id: author_id.to_string(),
                username: username.to_string(),
                bot,
            },
            message_reference: None,
        }
    }

    #[test]
    fn bot_messages_contribute_nothing() {
        let messages = vec![message(
            "b1",
            "botty",
            true,
            "https://open.spotify.com/track/abc",
        )];
        let extracted = extract_music_links(&messages);
        assert!(extracted.links_by_contributor.is_empty());
        assert!(extracted.display_names.is_empty());
    }

    #[test]
    fn query_strings_are_stripped() {
        let messages = vec![message(
            "u1",
            "sam",
            false,
            "check https://open.spotify.com/track/abc?si=xyz&utm_source=share out",
        )];
        let extracted = extract_music_links(&messages);
        let links = &extracted.links_by_contributor["u1"];
        assert_eq!(links, &vec!["https://open.spotify.com/track/abc".to_string()]);
        assert!(links.iter().all(|l| !l.contains('?')));
    }

    #[test]
    fn foreign_hosts_are_dropped() {
        let messages = vec![message(
            "u1",
            "sam",
            false,
            "https://example.com/track/abc and https://music.apple.com/album/1",
        )];
        let extracted = extract_music_links(&messages);
        assert!(extracted.links_by_contributor["u1"].is_empty());
    }

    #[test]
    fn multiple_links_in_one_message_all_extracted() {
        let messages = vec![message(
            "u1",
            "sam",
            false,
            "https://open.spotify.com/track/a https://open.spotify.com/album/b",
        )];
        let extracted = extract_music_links(&messages);
        assert_eq!(extracted.links_by_contributor["u1"].len(), 2);
    }

    #[test]
    fn concatenated_urls_stay_one_token() {
        // A malformed paste with no separator scans as a single URL on
        // the Spotify host and is kept as one opaque link, not split
        let messages = vec![message(
            "u1",
            "sam",
            false,
            "https://open.spotify.com/track/ahttps://open.spotify.com/track/b",
        )];
        let extracted = extract_music_links(&messages);
        assert_eq!(extracted.links_by_contributor["u1"].len(), 1);
    }

    #[test]
    fn repeats_across_messages_are_kept() {
        let messages = vec![
            message("u1", "sam", false, "https://open.spotify.com/track/abc"),
            message("u1", "sam", false, "https://open.spotify.com/track/abc"),
        ];
        let extracted = extract_music_links(&messages);
        assert_eq!(extracted.links_by_contributor["u1"].len(), 2);
    }

    #[test]
    fn first_username_wins() {
        let messages = vec![
            message("u1", "old-name", false, "hi"),
            message("u1", "new-name", false, "hello"),
        ];
        let extracted = extract_music_links(&messages);
        assert_eq!(extracted.display_names["u1"], "old-name");
    }
}
