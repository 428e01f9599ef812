//! Inbound media handling: downloads Telegram media via `get_file` +
//! `download_file`, base64-encodes it, and wraps it as a `memoh_core::Attachment`.

use base64::Engine;
use memoh_core::{Attachment, AttachmentType};
use teloxide::net::Download;
use teloxide::prelude::*;
use tracing::warn;

const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// Extract media from a Telegram message. Returns an empty vec for text-only
/// messages or when every attached file exceeds the size limit.
pub async fn extract_attachments(bot: &Bot, msg: &Message) -> Vec<Attachment> {
    if let Some(photos) = msg.photo() {
        if let Some(photo) = photos.last() {
            if let Some(a) = download_as_attachment(bot, &photo.file.id, AttachmentType::Image, "image/jpeg").await {
                return vec![a];
            }
        }
        return vec![];
    }

    if let Some(doc) = msg.document() {
        let mime = doc.mime_type.as_ref().map(|m| m.as_ref()).unwrap_or("application/octet-stream").to_string();
        return download_as_attachment(bot, &doc.file.id, AttachmentType::File, &mime).await.into_iter().collect();
    }

    if let Some(video) = msg.video() {
        let mime = video.mime_type.as_ref().map(|m| m.as_ref()).unwrap_or("video/mp4").to_string();
        return download_as_attachment(bot, &video.file.id, AttachmentType::Video, &mime).await.into_iter().collect();
    }

    if let Some(audio) = msg.audio() {
        let mime = audio.mime_type.as_ref().map(|m| m.as_ref()).unwrap_or("audio/mpeg").to_string();
        return download_as_attachment(bot, &audio.file.id, AttachmentType::Audio, &mime).await.into_iter().collect();
    }

    if let Some(voice) = msg.voice() {
        let mime = voice.mime_type.as_ref().map(|m| m.as_ref()).unwrap_or("audio/ogg").to_string();
        return download_as_attachment(bot, &voice.file.id, AttachmentType::Audio, &mime).await.into_iter().collect();
    }

    if let Some(sticker) = msg.sticker() {
        return download_as_attachment(bot, &sticker.file.id, AttachmentType::Image, "image/webp").await.into_iter().collect();
    }

    vec![]
}

async fn download_as_attachment(bot: &Bot, file_id: &str, kind: AttachmentType, mime: &str) -> Option<Attachment> {
    let file = match bot.get_file(file_id).await {
        Ok(f) => f,
        Err(e) => {
            warn!(file_id, error = %e, "telegram: get_file failed");
            return None;
        }
    };

    if u64::from(file.size) > MAX_ATTACHMENT_BYTES {
        warn!(file_id, size = file.size, limit = MAX_ATTACHMENT_BYTES, "telegram: file exceeds size limit, skipping");
        return None;
    }

    let mut buf: Vec<u8> = Vec::new();
    if let Err(e) = bot.download_file(&file.path, &mut buf).await {
        warn!(file_id, error = %e, "telegram: download_file failed");
        return None;
    }

    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Some(Attachment {
        kind,
        base64: Some(b64),
        path: None,
        url: None,
        content_hash: Some(content_hash(&buf)),
        mime: Some(mime.to_string()),
        name: None,
        metadata: None,
    })
}

fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }
}
