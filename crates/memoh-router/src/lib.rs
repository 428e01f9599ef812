use memoh_core::{Attachment, AttachmentType, Modality};

/// An attachment's classification against a model's declared modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Native,
    Fallback,
}

/// Classifies a single attachment: native when its type's modality is in
/// `modalities`, fallback otherwise (including unknown/unsupported types).
///
/// Grounded in the media-kind-to-wire-block-type dispatch of
/// `skynet-telegram/src/attach.rs::extract_media`, generalized from "always
/// native" to a capability check against the selected model.
pub fn classify(modalities: &[Modality], attachment: &Attachment) -> Class {
    if modalities.contains(&attachment.kind.modality()) {
        Class::Native
    } else {
        Class::Fallback
    }
}

/// Splits attachments into native/fallback groups preserving input order
/// within each group (property 5: router output is `native ⊕ fallback`).
pub fn split(modalities: &[Modality], attachments: &[Attachment]) -> (Vec<Attachment>, Vec<Attachment>) {
    let mut native = Vec::new();
    let mut fallback = Vec::new();
    for a in attachments {
        match classify(modalities, a) {
            Class::Native => native.push(a.clone()),
            Class::Fallback => fallback.push(a.clone()),
        }
    }
    (native, fallback)
}

/// Applies the C4 post-processing rules to a fallback group and folds any
/// re-promoted attachments back into `native`:
/// - a fallback attachment with a container `Path` becomes a `file`
///   reference and is kept in the fallback group;
/// - a fallback attachment with only inline `Base64`/`ContentHash` and no
///   path is dropped, unless that inline encoding is itself native for the
///   model (an attachment type misclassified only because of a stale
///   modality list) — then it is promoted back to native.
fn postprocess(modalities: &[Modality], native: &mut Vec<Attachment>, fallback: Vec<Attachment>) -> Vec<Attachment> {
    let mut kept_fallback = Vec::new();
    for mut a in fallback {
        if a.path.is_some() {
            a.kind = AttachmentType::File;
            kept_fallback.push(a);
            continue;
        }
        if modalities.contains(&a.kind.modality()) {
            native.push(a);
            continue;
        }
        // inline-only with no usable path and no native support: dropped.
    }
    kept_fallback
}

/// Full C2+post-processing pipeline: classify, post-process, and concatenate
/// native-first. This is what C4's resolve step (§4.2) invokes.
pub fn route(modalities: &[Modality], attachments: &[Attachment]) -> Vec<Attachment> {
    let (mut native, fallback) = split(modalities, attachments);
    let fallback = postprocess(modalities, &mut native, fallback);
    native.extend(fallback);
    native
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(kind: AttachmentType, base64: Option<&str>, path: Option<&str>) -> Attachment {
        Attachment {
            kind,
            base64: base64.map(String::from),
            path: path.map(String::from),
            url: None,
            content_hash: None,
            mime: None,
            name: None,
            metadata: None,
        }
    }

    #[test]
    fn native_when_modality_supported() {
        let a = attachment(AttachmentType::Image, Some("xx"), None);
        assert_eq!(classify(&[Modality::Text, Modality::Image], &a), Class::Native);
    }

    #[test]
    fn fallback_when_modality_unsupported() {
        let a = attachment(AttachmentType::Image, Some("xx"), None);
        assert_eq!(classify(&[Modality::Text], &a), Class::Fallback);
    }

    #[test]
    fn s4_image_to_text_only_model_is_dropped_entirely() {
        let modalities = [Modality::Text];
        let attachments = vec![attachment(AttachmentType::Image, Some("xx"), None)];
        let routed = route(&modalities, &attachments);
        assert!(routed.is_empty());
    }

    #[test]
    fn fallback_with_path_becomes_file_reference() {
        let modalities = [Modality::Text];
        let attachments = vec![attachment(AttachmentType::Image, None, Some("/tmp/a.png"))];
        let routed = route(&modalities, &attachments);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].kind, AttachmentType::File);
        assert_eq!(routed[0].path.as_deref(), Some("/tmp/a.png"));
    }

    #[test]
    fn order_preserved_native_then_fallback() {
        let modalities = [Modality::Text, Modality::Image];
        let attachments = vec![
            attachment(AttachmentType::File, None, Some("/tmp/f1")),
            attachment(AttachmentType::Image, Some("a"), None),
            attachment(AttachmentType::File, None, Some("/tmp/f2")),
            attachment(AttachmentType::Image, Some("b"), None),
        ];
        let routed = route(&modalities, &attachments);
        // both images are native (order preserved), both files are fallback-with-path (order preserved)
        assert_eq!(routed[0].base64.as_deref(), Some("a"));
        assert_eq!(routed[1].base64.as_deref(), Some("b"));
        assert_eq!(routed[2].path.as_deref(), Some("/tmp/f1"));
        assert_eq!(routed[3].path.as_deref(), Some("/tmp/f2"));
    }
}
