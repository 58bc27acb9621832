use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::gmail::client::{MessageBody, MessagePart, MessagePayload};

pub const NO_TEXT_CONTENT: &str = "No text content found";
pub const UNPARSEABLE_REPLY: &str = "Reply content could not be parsed";

// Anything after the earliest of these is treated as quoted thread history
const REPLY_MARKERS: [&str; 8] = ["On ", "From:", "Sent:", "To:", "Subject:", "wrote:", "<", "@"];

const MAX_REPLY_CHARS: usize = 100;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<style[^>]*>.*?</style>").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<script[^>]*>.*?</script>").unwrap());
static HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<head[^>]*>.*?</head>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One decoded section of a provider message body. Payloads are decoded into
/// this once at the boundary; everything downstream pattern-matches on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    PlainText(String),
    Html(String),
    Multipart(Vec<Part>),
    Other,
}

/// Decodes a raw provider payload into the Part tree.
pub fn decode_payload(payload: &MessagePayload) -> Part {
    let transfer_encoding = payload
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("Content-Transfer-Encoding"))
        .map(|h| h.value.clone())
        .unwrap_or_else(|| "7bit".to_string());

    if let Some(parts) = &payload.parts {
        let children = parts
            .iter()
            .map(|p| decode_part(p, &transfer_encoding))
            .collect();
        return Part::Multipart(children);
    }

    match decode_body(&payload.body, &transfer_encoding) {
        Some(text) if payload.mime_type.to_lowercase().contains("text/html") => Part::Html(text),
        Some(text) => Part::PlainText(text),
        None => Part::Other,
    }
}

fn decode_part(part: &MessagePart, transfer_encoding: &str) -> Part {
    if let Some(children) = &part.parts {
        return Part::Multipart(
            children
                .iter()
                .map(|p| decode_part(p, transfer_encoding))
                .collect(),
        );
    }

    let mime = part.mime_type.to_lowercase();
    match decode_body(&part.body, transfer_encoding) {
        Some(text) if mime.contains("text/plain") => Part::PlainText(text),
        Some(text) if mime.contains("text/html") => Part::Html(text),
        _ => Part::Other,
    }
}

// Gmail bodies are URL-safe base64; transfer encoding may add quoted-printable
fn decode_body(body: &Option<MessageBody>, transfer_encoding: &str) -> Option<String> {
    let data = body.as_ref()?.data.as_ref()?;
    let decoded = URL_SAFE
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')))
        .ok()?;
    let text = String::from_utf8_lossy(&decoded).into_owned();

    if transfer_encoding.eq_ignore_ascii_case("quoted-printable") {
        quoted_printable::decode(text.as_bytes(), quoted_printable::ParseMode::Robust)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Some(text)
    }
}

fn first_plain_text(part: &Part) -> Option<&str> {
    match part {
        Part::PlainText(text) => Some(text),
        Part::Multipart(children) => children.iter().find_map(first_plain_text),
        _ => None,
    }
}

fn first_html(part: &Part) -> Option<&str> {
    match part {
        Part::Html(html) => Some(html),
        Part::Multipart(children) => children.iter().find_map(first_html),
        _ => None,
    }
}

/// Strips tags, replaces common entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut text = STYLE_RE.replace_all(html, "").to_string();
    text = SCRIPT_RE.replace_all(&text, "").to_string();
    text = HEAD_RE.replace_all(&text, "").to_string();

    for element in ["</div>", "</p>", "</tr>", "</li>", "<br>", "<br/>", "<br />", "</h1>", "</h2>", "</h3>"] {
        text = text.replace(element, "\n");
    }

    text = TAG_RE.replace_all(&text, "").to_string();

    let entities = [
        ("&nbsp;", " "), ("&amp;", "&"), ("&lt;", "<"),
        ("&gt;", ">"), ("&quot;", "\""), ("&#39;", "'"),
    ];
    for (entity, replacement) in entities.iter() {
        text = text.replace(entity, replacement);
    }

    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Plain text body of a message, preferring text/plain parts and falling back
/// to stripped HTML. Returns the sentinel when nothing decodes.
pub fn body_text(payload: &MessagePayload) -> String {
    let decoded = decode_payload(payload);

    if let Some(text) = first_plain_text(&decoded) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(html) = first_html(&decoded) {
        let stripped = html_to_text(html);
        if !stripped.is_empty() {
            return stripped;
        }
    }
    NO_TEXT_CONTENT.to_string()
}

/// Trims a decoded body down to the human-authored reply, discarding the
/// quoted thread history providers append below it.
pub fn trim_reply(text: &str) -> String {
    // 1. collapse all whitespace runs to single spaces
    let collapsed = WHITESPACE_RE.replace_all(text, " ").trim().to_string();

    // 2. truncate at the earliest quote marker, if any occurs past the start
    let mut reply = collapsed.clone();
    if let Some(idx) = REPLY_MARKERS.iter().filter_map(|m| collapsed.find(m)).min() {
        if idx > 0 {
            reply = collapsed[..idx].trim_end().to_string();
        }
    }

    // 3. long replies are cut to the first sentence when it is a sane length
    if reply.chars().count() > MAX_REPLY_CHARS {
        let sentence_end = reply
            .char_indices()
            .find(|(_, c)| matches!(c, '.' | '!' | '?'))
            .map(|(i, c)| i + c.len_utf8());
        match sentence_end {
            Some(end) => {
                let sentence = reply[..end].trim();
                let len = sentence.chars().count();
                if (10..=200).contains(&len) {
                    reply = sentence.to_string();
                } else {
                    reply = hard_truncate(&reply);
                }
            }
            None => reply = hard_truncate(&reply),
        }
    }

    if reply.is_empty() {
        UNPARSEABLE_REPLY.to_string()
    } else {
        reply
    }
}

fn hard_truncate(text: &str) -> String {
    let cut: String = text.chars().take(MAX_REPLY_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Full extraction pipeline: decode the payload, then trim to the reply.
pub fn extract_reply_text(payload: &MessagePayload) -> String {
    let text = body_text(payload);
    if text == NO_TEXT_CONTENT {
        return text;
    }
    trim_reply(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::client::{MessageBody, MessageHeader, MessagePart, MessagePayload};

    fn encoded(text: &str) -> String {
        URL_SAFE.encode(text.as_bytes())
    }

    fn plain_payload(text: &str) -> MessagePayload {
        MessagePayload {
            headers: vec![],
            body: Some(MessageBody { data: Some(encoded(text)), size: None }),
            parts: None,
            mime_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn truncates_before_quoted_thread() {
        let input = "Hello, thanks! On Mon, Jan 1 John <john@x.com> wrote: ...";
        assert_eq!(trim_reply(input), "Hello, thanks!");
    }

    #[test]
    fn marker_at_start_is_ignored() {
        // A marker at index 0 must not wipe the whole reply
        let input = "On my way, see you soon";
        assert_eq!(trim_reply(input), "On my way, see you soon");
    }

    #[test]
    fn collapses_newlines_to_spaces() {
        let input = "Sounds good.\n\nBest,\nJane";
        assert_eq!(trim_reply(input), "Sounds good. Best, Jane");
    }

    #[test]
    fn long_reply_cut_to_first_sentence() {
        let first = "I would love to hear more about this role.";
        let filler = "x".repeat(120);
        let input = format!("{} {}", first, filler);
        assert_eq!(trim_reply(&input), first);
    }

    #[test]
    fn long_reply_without_sentence_end_is_hard_truncated() {
        let input = "y".repeat(150);
        let trimmed = trim_reply(&input);
        assert!(trimmed.ends_with("..."));
        assert_eq!(trimmed.chars().count(), MAX_REPLY_CHARS + 3);
    }

    #[test]
    fn oversized_first_sentence_is_hard_truncated() {
        let input = format!("{}.", "z".repeat(250));
        let trimmed = trim_reply(&input);
        assert!(trimmed.ends_with("..."));
    }

    #[test]
    fn empty_input_returns_sentinel() {
        assert_eq!(trim_reply("   "), UNPARSEABLE_REPLY);
    }

    #[test]
    fn extracts_plain_text_body() {
        let payload = plain_payload("Yes, I am interested!");
        assert_eq!(extract_reply_text(&payload), "Yes, I am interested!");
    }

    #[test]
    fn missing_body_returns_sentinel() {
        let payload = MessagePayload {
            headers: vec![],
            body: None,
            parts: None,
            mime_type: "text/plain".to_string(),
        };
        assert_eq!(extract_reply_text(&payload), NO_TEXT_CONTENT);
    }

    #[test]
    fn multipart_prefers_plain_text_over_html() {
        let payload = MessagePayload {
            headers: vec![],
            body: None,
            parts: Some(vec![
                MessagePart {
                    body: Some(MessageBody { data: Some(encoded("<p>HTML version</p>")), size: None }),
                    parts: None,
                    mime_type: "text/html".to_string(),
                },
                MessagePart {
                    body: Some(MessageBody { data: Some(encoded("Plain version")), size: None }),
                    parts: None,
                    mime_type: "text/plain".to_string(),
                },
            ]),
            mime_type: "multipart/alternative".to_string(),
        };
        assert_eq!(body_text(&payload), "Plain version");
    }

    #[test]
    fn html_fallback_strips_tags() {
        let payload = MessagePayload {
            headers: vec![],
            body: None,
            parts: Some(vec![MessagePart {
                body: Some(MessageBody { data: Some(encoded("<div>Happy to chat</div>")), size: None }),
                parts: None,
                mime_type: "text/html".to_string(),
            }]),
            mime_type: "multipart/alternative".to_string(),
        };
        assert_eq!(body_text(&payload), "Happy to chat");
    }

    #[test]
    fn nested_multipart_is_searched() {
        let payload = MessagePayload {
            headers: vec![],
            body: None,
            parts: Some(vec![MessagePart {
                body: None,
                parts: Some(vec![MessagePart {
                    body: Some(MessageBody { data: Some(encoded("Nested reply")), size: None }),
                    parts: None,
                    mime_type: "text/plain".to_string(),
                }]),
                mime_type: "multipart/alternative".to_string(),
            }]),
            mime_type: "multipart/mixed".to_string(),
        };
        assert_eq!(body_text(&payload), "Nested reply");
    }

    #[test]
    fn quoted_printable_transfer_encoding_is_decoded() {
        let payload = MessagePayload {
            headers: vec![MessageHeader {
                name: "Content-Transfer-Encoding".to_string(),
                value: "quoted-printable".to_string(),
            }],
            body: Some(MessageBody { data: Some(encoded("Sure=2C works for me")), size: None }),
            parts: None,
            mime_type: "text/plain".to_string(),
        };
        assert_eq!(body_text(&payload), "Sure, works for me");
    }
}
