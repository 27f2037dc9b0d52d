use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::{Encoding, WINDOWS_1252};
use log::debug;

use crate::domain::email::{NO_SUBJECT, UNKNOWN_HEADER};

// Some mailers drop the trailing '=' padding inside encoded words.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Text produced by a best-effort decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Clean(String),
    /// Declared charset unknown or input malformed; text is lossy.
    Degraded(String),
}

impl Decoded {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Clean(s) | Self::Degraded(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Clean(s) | Self::Degraded(s) => s,
        }
    }
}

/// Decode `bytes` with the declared charset, UTF-8 when none is declared.
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> Decoded {
    let label = charset
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("utf-8");

    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                Decoded::Degraded(text.into_owned())
            } else {
                Decoded::Clean(text.into_owned())
            }
        }
        None => {
            debug!("unsupported charset '{label}', decoding as UTF-8");
            Decoded::Degraded(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Decode a raw subject header. Absent or blank subjects become "No Subject".
pub fn decode_subject(raw: Option<&[u8]>) -> String {
    decode_or(raw, NO_SUBJECT)
}

/// Decode a raw address header such as `From`.
pub fn decode_sender(raw: Option<&[u8]>) -> String {
    decode_or(raw, UNKNOWN_HEADER)
}

fn decode_or(raw: Option<&[u8]>, fallback: &str) -> String {
    let Some(raw) = raw else {
        return fallback.to_string();
    };

    let decoded = decode_header_value(raw);
    if decoded.is_degraded() {
        debug!("header decoded with substitutions: {:?}", decoded.as_str());
    }

    let text = decoded.as_str().trim();
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

/// Unfold a raw header value and resolve its encoded words.
pub fn decode_header_value(raw: &[u8]) -> Decoded {
    let text = match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => WINDOWS_1252.decode(raw).0.into_owned(),
    };
    let unfolded: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    decode_encoded_words(&unfolded)
}

/// Resolve RFC 2047 encoded words in an already unfolded header value.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Whitespace between two adjacent encoded words is dropped, and adjacent
/// words in the same charset are decoded as one byte run, so a character
/// split across words survives. All other text is kept as is, including
/// malformed encoded words.
pub fn decode_encoded_words(input: &str) -> Decoded {
    let mut out = String::with_capacity(input.len());
    let mut degraded = false;
    let mut rest = input;
    let mut last_was_encoded = false;
    let mut pending: Option<(&str, Vec<u8>)> = None;

    while let Some(start) = rest.find("=?") {
        let gap = &rest[..start];
        match EncodedWord::parse(&rest[start..]) {
            Some(word) => {
                if !(last_was_encoded && gap.trim().is_empty()) {
                    flush_run(&mut pending, &mut out, &mut degraded);
                    out.push_str(gap);
                }
                match word.payload() {
                    Some(bytes) => {
                        let continues_run = matches!(
                            &pending,
                            Some((charset, _)) if charset.eq_ignore_ascii_case(word.charset)
                        );
                        match pending.as_mut() {
                            Some((_, run)) if continues_run => run.extend_from_slice(&bytes),
                            _ => {
                                flush_run(&mut pending, &mut out, &mut degraded);
                                pending = Some((word.charset, bytes));
                            }
                        }
                    }
                    None => {
                        flush_run(&mut pending, &mut out, &mut degraded);
                        degraded = true;
                        out.push_str(word.text);
                    }
                }
                rest = &rest[start + word.len..];
                last_was_encoded = true;
            }
            None => {
                flush_run(&mut pending, &mut out, &mut degraded);
                out.push_str(gap);
                out.push_str("=?");
                rest = &rest[start + 2..];
                last_was_encoded = false;
            }
        }
    }
    flush_run(&mut pending, &mut out, &mut degraded);
    out.push_str(rest);

    if degraded {
        Decoded::Degraded(out)
    } else {
        Decoded::Clean(out)
    }
}

fn flush_run(pending: &mut Option<(&str, Vec<u8>)>, out: &mut String, degraded: &mut bool) {
    if let Some((charset, bytes)) = pending.take() {
        let decoded = decode_charset(&bytes, Some(charset));
        *degraded |= decoded.is_degraded();
        out.push_str(decoded.as_str());
    }
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
    /// Length of the whole `=?...?=` token.
    len: usize,
}

impl<'a> EncodedWord<'a> {
    /// Parse `=?charset?encoding?text?=` at the start of `s`.
    fn parse(s: &'a str) -> Option<Self> {
        let body = s.strip_prefix("=?")?;
        let (charset, rest) = body.split_once('?')?;
        let (encoding, rest) = rest.split_once('?')?;
        let end = rest.find("?=")?;
        let text = &rest[..end];

        if charset.is_empty()
            || charset.contains(char::is_whitespace)
            || text.contains(char::is_whitespace)
        {
            return None;
        }
        if !matches!(encoding, "B" | "b" | "Q" | "q") {
            return None;
        }

        Some(Self {
            // RFC 2231 language suffix: "utf-8*en"
            charset: charset.split('*').next().unwrap_or(charset),
            encoding,
            text,
            len: 2 + charset.len() + 1 + encoding.len() + 1 + end + 2,
        })
    }

    /// Raw bytes of the word, still in its declared charset. `None` for bad base64.
    fn payload(&self) -> Option<Vec<u8>> {
        if self.encoding.eq_ignore_ascii_case("b") {
            LENIENT_BASE64
                .decode(self.text)
                .map_err(|e| debug!("bad base64 in encoded word: {e}"))
                .ok()
        } else {
            Some(decode_q(self.text))
        }
    }
}

/// RFC 2047 "Q" encoding: `_` is a space, `=XX` a hex byte.
fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                match hex_pair(bytes[i + 1], bytes[i + 2]) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'='),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Collapse text onto one line and cap it at `max_chars`, for console previews.
pub fn normalize_snippet(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}
