//! Chat-bot adapter helpers.
//!
//! Everything a Telegram-style front end needs around the renderer, kept
//! free of any HTTP or bot-API client so it can be tested in isolation:
//! command parsing, reply texts, artifact URLs and inline-query results.

use crate::artifact::Artifact;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Reply to `/help` and to anything that is not a usable `/render`.
pub const USAGE: &str = "/render <formula> - Render a formula in TeX format, without $. Example: `/render E = mc^2`
/help - Print this message

The bot works in inline mode too.
";

/// Path prefix under which artifacts are served.
pub const ARTIFACT_ROUTE: &str = "/pop/";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/render <formula>` with a non-empty, trimmed formula.
    Render(String),
    /// Anything else: answered with [`USAGE`].
    Help,
}

// `/render`, `/render@SomeBot`, then optional arguments.
static RE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").unwrap());

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let Some(caps) = RE_COMMAND.captures(text.trim()) else {
            return BotCommand::Help;
        };
        if &caps[1] != "render" {
            return BotCommand::Help;
        }
        let formula = caps.get(2).map_or("", |m| m.as_str()).trim();
        if formula.is_empty() {
            BotCommand::Help
        } else {
            BotCommand::Render(formula.to_string())
        }
    }
}

/// Markdown body for a chat reply: the error in a code block, or the usage
/// text when there is no error to show.
pub fn error_reply(message: Option<&str>) -> String {
    match message {
        Some(msg) => format!("Error:\n```\n{msg}\n```"),
        None => USAGE.to_string(),
    }
}

/// Public URL of an artifact file: `{base}/pop/{escaped name}`.
pub fn artifact_url(base_url: &str, file_name: &str) -> String {
    format!(
        "{}{}{}",
        base_url.trim_end_matches('/'),
        ARTIFACT_ROUTE,
        urlencoding::encode(file_name)
    )
}

/// Thumbnail URL; a distinct query string keeps caches from merging the two.
pub fn thumb_url(photo_url: &str) -> String {
    format!("{photo_url}?t=1")
}

/// One inline-query answer, serialised the way the Bot API expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InlineResult {
    Photo {
        id: String,
        photo_url: String,
        thumb_url: String,
        photo_width: u32,
        photo_height: u32,
    },
    Article {
        id: String,
        title: String,
        description: String,
        input_message_content: InputMessageContent,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputMessageContent {
    pub message_text: String,
}

impl InlineResult {
    /// Photo answer pointing at a persisted artifact.
    pub fn photo(query_id: &str, base_url: &str, artifact: &Artifact) -> Self {
        let photo_url = artifact_url(base_url, artifact.file_name());
        InlineResult::Photo {
            id: query_id.to_string(),
            thumb_url: thumb_url(&photo_url),
            photo_url,
            photo_width: artifact.width(),
            photo_height: artifact.height(),
        }
    }

    /// Error answer: titled "Error", classified message as description,
    /// and the original query as the text sent if the user picks it.
    pub fn error(query_id: &str, query: &str, message: &str) -> Self {
        InlineResult::Article {
            id: query_id.to_string(),
            title: "Error".to_string(),
            description: message.to_string(),
            input_message_content: InputMessageContent {
                message_text: query.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_render_command() {
        assert_eq!(
            BotCommand::parse("/render E = mc^2"),
            BotCommand::Render("E = mc^2".into())
        );
        assert_eq!(
            BotCommand::parse("/render@Math2ImgBot   \\frac{a}{b}  "),
            BotCommand::Render("\\frac{a}{b}".into())
        );
    }

    #[test]
    fn parse_multiline_formula() {
        assert_eq!(
            BotCommand::parse("/render a \\\\\n b"),
            BotCommand::Render("a \\\\\n b".into())
        );
    }

    #[test]
    fn parse_falls_back_to_help() {
        for text in ["/help", "/render", "/render    ", "hello", "/start foo", "/rendering x"] {
            assert_eq!(BotCommand::parse(text), BotCommand::Help, "text: {text:?}");
        }
    }

    #[test]
    fn error_reply_wraps_in_code_block() {
        assert_eq!(
            error_reply(Some("Missing close brace")),
            "Error:\n```\nMissing close brace\n```"
        );
        assert_eq!(error_reply(None), USAGE);
    }

    #[test]
    fn artifact_url_escapes_name() {
        assert_eq!(
            artifact_url("https://bot.example/", "a b.jpg"),
            "https://bot.example/pop/a%20b.jpg"
        );
        assert_eq!(
            thumb_url("https://bot.example/pop/1.jpg"),
            "https://bot.example/pop/1.jpg?t=1"
        );
    }

    #[tokio::test]
    async fn photo_result_uses_artifact_dimensions() {
        use crate::artifact::ArtifactStore;
        use image::{DynamicImage, Rgba, RgbaImage};
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let store = ArtifactStore::temporary(Duration::from_secs(60)).unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 7, Rgba([0, 0, 0, 255])));
        let artifact = store
            .persist("99", &img, &CancellationToken::new())
            .await
            .unwrap();

        let v = serde_json::to_value(InlineResult::photo("99", "https://bot.example", &artifact))
            .unwrap();
        assert_eq!(v["type"], "photo");
        assert_eq!(v["photo_url"], "https://bot.example/pop/99.jpg");
        assert_eq!(v["thumb_url"], "https://bot.example/pop/99.jpg?t=1");
        assert_eq!(v["photo_width"], 12);
        assert_eq!(v["photo_height"], 7);
    }

    #[test]
    fn error_result_json_shape() {
        let r = InlineResult::error("q1", "\\frac{", "Missing close brace");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "article");
        assert_eq!(v["title"], "Error");
        assert_eq!(v["description"], "Missing close brace");
        assert_eq!(v["input_message_content"]["message_text"], "\\frac{");
    }
}
