use html2text::render::RichAnnotation;
use log::warn;

use crate::domain::email::{
    ExtractedBody, MAX_BODY_CHARS, ParsedMessage, Part, PartKind, Structure, TRUNCATION_MARKER,
};
use crate::error::{Error, Result};
use crate::mail::decoders::decode_charset;

/// Wrap width handed to the HTML renderer.
const HTML_WIDTH: usize = 100;

pub fn extract_body(message: &ParsedMessage) -> ExtractedBody {
    let text = match &message.structure {
        Structure::Single(part) => {
            let as_html = part.content_type == "text/html";
            match part_text(part, as_html) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("could not decode message body: {e}");
                    None
                }
            }
        }
        Structure::Multipart(parts) => multipart_text(parts),
    };

    bound_body(text.as_deref().unwrap_or_default())
}

fn multipart_text(parts: &[Part]) -> Option<String> {
    let mut html_body: Option<String> = None;

    for part in parts {
        let as_html = match part.kind {
            PartKind::Attachment | PartKind::Other => continue,
            PartKind::PlainText => false,
            // first HTML part with text sticks
            PartKind::Html if html_body.is_some() => continue,
            PartKind::Html => true,
        };

        match part_text(part, as_html) {
            Ok(text) if !as_html => return Some(text),
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => html_body = Some(text),
            Err(e) => warn!("skipping {} part: {e}", part.content_type),
        }
    }

    html_body
}

fn part_text(part: &Part, as_html: bool) -> Result<String> {
    let bytes = part.payload.as_ref().map_err(|e| Error::Decode(e.clone()))?;
    let text = decode_charset(bytes, part.charset.as_deref()).into_string();
    if as_html { html_to_text(&text) } else { Ok(text) }
}

/// Trim, cap at [`MAX_BODY_CHARS`] characters, and map blank text to
/// [`ExtractedBody::Empty`].
pub fn bound_body(text: &str) -> ExtractedBody {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ExtractedBody::Empty;
    }

    match trimmed.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => ExtractedBody::Text(format!("{}{TRUNCATION_MARKER}", &trimmed[..cut])),
        None => ExtractedBody::Text(trimmed.to_string()),
    }
}

/// Render HTML as plain text.
///
/// Link targets stay inline as `[text](url)`; images are dropped.
pub fn html_to_text(html: &str) -> Result<String> {
    let lines = html2text::from_read_rich(html.as_bytes(), HTML_WIDTH)
        .map_err(|e| Error::Html(e.to_string()))?;

    let mut out = String::with_capacity(html.len() / 2);
    for line in &lines {
        let mut rendered = String::new();
        let mut open_link: Option<&str> = None;

        for piece in line.tagged_strings() {
            if piece.tag.iter().any(|a| matches!(a, RichAnnotation::Image(_))) {
                continue;
            }
            let link = piece.tag.iter().find_map(|a| match a {
                RichAnnotation::Link(url) => Some(url.as_str()),
                _ => None,
            });

            if link != open_link {
                if let Some(url) = open_link {
                    rendered.push_str(&format!("]({url})"));
                }
                if link.is_some() {
                    rendered.push('[');
                }
                open_link = link;
            }
            rendered.push_str(&piece.s);
        }
        if let Some(url) = open_link {
            rendered.push_str(&format!("]({url})"));
        }

        out.push_str(rendered.trim_end());
        out.push('\n');
    }

    Ok(out)
}
