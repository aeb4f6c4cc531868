//! Parses a raw RFC822/`.eml` message into the `(MessageContext,
//! CanonicalDocument)` pair every source converges on, regardless of
//! whether it came from IMAP, a local mail archive walk, or an on-device
//! message store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mailparse::{parse_mail, MailHeaderMap};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CollectorError;
use crate::filter::MessageContext;
use crate::types::{CanonicalDocument, ContentTimestampType, ImageAttachment};

pub struct ParsedMessage {
    pub context: MessageContext,
    pub document: CanonicalDocument,
}

/// `source_type` is e.g. `email_imap`, `email_local`; `folder` is the
/// mailbox or archive-relative path; `fallback_timestamp` is used (as
/// `ContentTimestampType::FileModified`) when the message has no `Date`
/// header.
pub fn parse_message(
    raw: &[u8],
    source_type: &str,
    external_id: &str,
    folder: &str,
    fallback_timestamp: DateTime<Utc>,
) -> Result<ParsedMessage, CollectorError> {
    let mail = parse_mail(raw).map_err(|err| CollectorError::Parse(err.to_string()))?;
    let headers = &mail.headers;

    let subject = headers.get_first_value("Subject").unwrap_or_default();
    let from = headers.get_first_value("From").unwrap_or_default();
    let to = headers.get_first_value("To").unwrap_or_default();
    let cc = headers.get_first_value("Cc").unwrap_or_default();
    let bcc = headers.get_first_value("Bcc").unwrap_or_default();
    let list_unsubscribe = headers.get_first_value("List-Unsubscribe").is_some();

    let (content_timestamp, content_timestamp_type) = headers
        .get_first_value("Date")
        .and_then(|raw_date| mailparse::dateparse(&raw_date).ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .map(|dt| (dt, ContentTimestampType::SourceDate))
        .unwrap_or((fallback_timestamp, ContentTimestampType::FileModified));

    let mut body = String::new();
    let mut body_html = String::new();
    let mut images = Vec::new();
    let mut attachment_mimes = Vec::new();
    let mut has_attachment = false;

    collect_parts(&mail, &mut body, &mut body_html, &mut images, &mut attachment_mimes, &mut has_attachment)?;

    let mut headers_map = std::collections::HashMap::new();
    for header in headers.iter() {
        headers_map.insert(header.get_key(), header.get_value());
    }

    let context = MessageContext {
        subject: subject.clone(),
        body: body.clone(),
        body_html: body_html.clone(),
        from: from.clone(),
        to: to.clone(),
        cc: cc.clone(),
        bcc: bcc.clone(),
        folder: folder.to_string(),
        headers: headers_map,
        has_attachment,
        attachment_mimes,
        vip: false,
        list_unsubscribe,
        date: Some(content_timestamp),
        now: Utc::now(),
    };

    let mut metadata = BTreeMap::new();
    let content_hash = hex::encode(Sha256::digest(body.as_bytes()));
    metadata.insert("content_hash".to_string(), Value::String(content_hash));

    let document = CanonicalDocument {
        source_type: source_type.to_string(),
        external_id: external_id.to_string(),
        title: if subject.is_empty() { None } else { Some(subject) },
        canonical_uri: None,
        content: body,
        content_mime: "text/plain".to_string(),
        content_timestamp,
        content_timestamp_type,
        metadata,
        images,
    };

    Ok(ParsedMessage { context, document })
}

fn collect_parts(
    part: &mailparse::ParsedMail,
    body: &mut String,
    body_html: &mut String,
    images: &mut Vec<ImageAttachment>,
    attachment_mimes: &mut Vec<String>,
    has_attachment: &mut bool,
) -> Result<(), CollectorError> {
    if part.subparts.is_empty() {
        let mime = part.ctype.mimetype.clone();
        let disposition = part.get_content_disposition();
        let is_attachment = matches!(disposition.disposition, mailparse::DispositionType::Attachment);

        if mime == "text/plain" && !is_attachment {
            if let Ok(text) = part.get_body() {
                body.push_str(&text);
            }
        } else if mime == "text/html" && !is_attachment {
            if let Ok(text) = part.get_body() {
                body_html.push_str(&text);
            }
        } else if mime.starts_with("image/") {
            *has_attachment = true;
            attachment_mimes.push(mime.clone());
            if let Ok(bytes) = part.get_body_raw() {
                let hash = hex::encode(Sha256::digest(&bytes));
                let mut attachment = ImageAttachment::new(hash, mime);
                attachment.bytes_ref = Some(std::sync::Arc::new(bytes));
                images.push(attachment);
            }
        } else if is_attachment {
            *has_attachment = true;
            attachment_mimes.push(mime);
        }
        return Ok(());
    }

    for subpart in &part.subparts {
        collect_parts(subpart, body, body_html, images, attachment_mimes, has_attachment)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Hello there\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\nContent-Type: text/plain\r\n\r\nHello, world!\r\n";

    #[test]
    fn parses_headers_and_body() {
        let parsed = parse_message(SAMPLE.as_bytes(), "email_local", "msg-1", "Inbox", Utc::now()).unwrap();
        assert_eq!(parsed.context.subject, "Hello there");
        assert!(parsed.context.body.contains("Hello, world!"));
        assert_eq!(parsed.document.content_timestamp_type, ContentTimestampType::SourceDate);
    }

    #[test]
    fn falls_back_to_file_modified_when_no_date_header() {
        let no_date = "From: alice@example.com\r\nSubject: No date\r\nContent-Type: text/plain\r\n\r\nBody\r\n";
        let fallback = Utc::now();
        let parsed = parse_message(no_date.as_bytes(), "email_local", "msg-2", "Inbox", fallback).unwrap();
        assert_eq!(parsed.document.content_timestamp_type, ContentTimestampType::FileModified);
        assert_eq!(parsed.document.content_timestamp, fallback);
    }
}
