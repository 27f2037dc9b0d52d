use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::domain::email::{
    ParsedMessage, Part, PartKind, RawMessage, Structure, UNKNOWN_HEADER,
};
use crate::error::{Error, Result};
use crate::mail::decoders::{decode_sender, decode_subject};

pub fn parse_message(raw: &RawMessage) -> Result<ParsedMessage> {
    let parsed = mailparse::parse_mail(&raw.bytes).map_err(|e| Error::Fetch {
        id: raw.id,
        reason: format!("unparseable message: {e}"),
    })?;

    let subject = decode_subject(raw_header(&parsed, "Subject"));
    let sender = decode_sender(raw_header(&parsed, "From"));
    let date = raw_header(&parsed, "Date")
        .map(|d| String::from_utf8_lossy(d).trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| UNKNOWN_HEADER.to_string());

    let structure = if is_multipart(&parsed) {
        let mut parts = Vec::new();
        collect_leaves(&parsed, &mut parts);
        Structure::Multipart(parts)
    } else {
        Structure::Single(to_part(&parsed))
    };

    Ok(ParsedMessage {
        subject,
        sender,
        date,
        structure,
    })
}

fn raw_header<'m>(mail: &'m ParsedMail<'_>, name: &str) -> Option<&'m [u8]> {
    mail.headers.get_first_header(name).map(|h| h.get_value_raw())
}

fn is_multipart(mail: &ParsedMail) -> bool {
    mail.ctype
        .mimetype
        .to_ascii_lowercase()
        .starts_with("multipart/")
}

/// Depth-first walk; nested multipart containers contribute their children.
fn collect_leaves(mail: &ParsedMail, out: &mut Vec<Part>) {
    for sub in &mail.subparts {
        if is_multipart(sub) {
            collect_leaves(sub, out);
        } else {
            out.push(to_part(sub));
        }
    }
}

fn to_part(mail: &ParsedMail) -> Part {
    let content_type = mail.ctype.mimetype.to_ascii_lowercase();
    let is_attachment =
        mail.get_content_disposition().disposition == DispositionType::Attachment;

    let kind = if is_attachment {
        PartKind::Attachment
    } else {
        match content_type.as_str() {
            "text/plain" => PartKind::PlainText,
            "text/html" => PartKind::Html,
            _ => PartKind::Other,
        }
    };

    Part {
        content_type,
        kind,
        charset: mail.ctype.params.get("charset").cloned(),
        payload: mail.get_body_raw().map_err(|e| e.to_string()),
    }
}
