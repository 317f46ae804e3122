//! Structural parsing of MIME mail documents using mailparse.
//!
//! Only used when piped input is a real MIME document (multipart, or a body
//! in base64/quoted-printable). Plain cron output never gets here.

use mailparse::{addrparse, parse_mail, MailAddr, MailHeaderMap, ParsedMail};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::parse::header_block::HeaderBlock;

/// Fields extracted from a MIME document.
#[derive(Debug, Default)]
pub struct MimeMail {
    /// All top-level headers as (name, decoded value)
    pub headers: Vec<(String, String)>,
    /// Sender addresses, comma-separated
    pub from: Option<String>,
    /// Recipient addresses, comma-separated
    pub to: Option<String>,
    /// Subject header value
    pub subject: Option<String>,
    /// Date header value, unparsed
    pub date: Option<String>,
    /// Concatenated text/plain parts
    pub text: String,
}

/// Whether a header block announces a body that needs MIME decoding.
///
/// Plain cron output has neither header and goes through the header block
/// path untouched.
///
/// # Returns
///
/// `true` when `Content-Type` is `multipart/*`, or when
/// `Content-Transfer-Encoding` is `base64` or `quoted-printable`.
pub fn is_mime_document(block: &HeaderBlock) -> bool {
    let multipart = block
        .get("Content-Type")
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false);

    let encoded = block
        .get("Content-Transfer-Encoding")
        .map(|value| {
            let value = value.trim().to_ascii_lowercase();
            value == "base64" || value == "quoted-printable"
        })
        .unwrap_or(false);

    multipart || encoded
}

/// Parse a raw MIME document.
///
/// Addresses come from the parsed address list; when that is empty or
/// unparseable the raw header value is kept, since cron happily writes
/// things like `root (Cron Daemon)` that are not valid addresses.
///
/// # Arguments
///
/// * `raw` - Complete document text (headers, blank line, body)
///
/// # Returns
///
/// A `MimeMail` with the decoded top-level headers, the From/To/Subject/Date
/// values, and every `text/plain` part joined with `\n`. `text` is empty when
/// the document has no plain text part.
///
/// # Errors
///
/// `IngestError::Parse` when mailparse rejects the document structure.
pub fn parse_mime(raw: &str) -> Result<MimeMail, IngestError> {
    info!(raw_length = raw.len(), "mime_parse_start");

    let mail = parse_mail(raw.as_bytes())?;

    let headers = mail
        .headers
        .iter()
        .map(|header| (header.get_key(), header.get_value()))
        .collect();

    let from = mail.headers.get_first_value("From").map(|raw| address_list(&raw));
    let to = mail.headers.get_first_value("To").map(|raw| address_list(&raw));
    let subject = mail.headers.get_first_value("Subject");
    let date = mail.headers.get_first_value("Date");

    let text = extract_text_body(&mail).unwrap_or_default();

    debug!(
        content_type = %mail.ctype.mimetype,
        subparts_count = mail.subparts.len(),
        text_length = text.len(),
        "mime_parse_complete"
    );

    Ok(MimeMail {
        headers,
        from,
        to,
        subject,
        date,
        text,
    })
}

/// Render an address header as a comma-separated list, falling back to the
/// raw value.
fn address_list(raw: &str) -> String {
    let parsed = match addrparse(raw) {
        Ok(list) => list,
        Err(e) => {
            debug!(error = %e, value = %raw, "mime_address_unparseable");
            return raw.trim().to_string();
        }
    };

    let mut addresses = Vec::new();
    for entry in parsed.iter() {
        match entry {
            MailAddr::Single(info) => addresses.push(format_single(&info.display_name, &info.addr)),
            MailAddr::Group(group) => addresses.extend(
                group
                    .addrs
                    .iter()
                    .map(|info| format_single(&info.display_name, &info.addr)),
            ),
        }
    }

    if addresses.is_empty() {
        raw.trim().to_string()
    } else {
        addresses.join(", ")
    }
}

fn format_single(display_name: &Option<String>, addr: &str) -> String {
    match display_name {
        Some(name) if !name.is_empty() => format!("{name} <{addr}>"),
        _ => addr.to_string(),
    }
}

/// Extract the plain text body from a parsed mail.
///
/// - text/plain is used directly
/// - multipart/* is searched recursively, text/plain parts are joined
fn extract_text_body(mail: &ParsedMail) -> Option<String> {
    let content_type = mail.ctype.mimetype.as_str();

    if content_type == "text/plain" {
        return extract_body_text(mail);
    }

    if content_type.starts_with("multipart/") {
        return find_text_in_parts(&mail.subparts);
    }

    warn!(content_type = content_type, "mime_no_text_body");
    None
}

/// Collect text/plain content from multipart subparts, depth first.
///
/// Attachments and HTML alternatives are skipped.
fn find_text_in_parts(parts: &[ParsedMail]) -> Option<String> {
    let mut text_parts: Vec<String> = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        let part_type = part.ctype.mimetype.as_str();

        info!(
            part_index = index,
            part_type = part_type,
            subparts_count = part.subparts.len(),
            "mime_examining_part"
        );

        if part_type == "text/plain" {
            if let Some(text) = extract_body_text(part) {
                info!(
                    part_index = index,
                    text_length = text.len(),
                    "mime_text_part_found"
                );
                text_parts.push(text);
            }
        } else if part_type.starts_with("multipart/") {
            // Nested alternative/related/mixed
            if let Some(text) = find_text_in_parts(&part.subparts) {
                text_parts.push(text);
            }
        }
    }

    if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join("\n"))
    }
}

/// Decode a part's body, normalizing line endings and trailing newlines.
fn extract_body_text(mail: &ParsedMail) -> Option<String> {
    match mail.get_body() {
        Ok(body) => {
            let body = body.replace("\r\n", "\n");
            let body = body.trim_end_matches('\n');
            if body.trim().is_empty() {
                None
            } else {
                Some(body.to_string())
            }
        }
        Err(e) => {
            warn!(error = %e, "mime_body_extraction_failed");
            None
        }
    }
}
