use crate::collapse::bubble_body;
use crate::config::{EngineConfig, MESSAGE_ID_ATTRIBUTE};
use crate::detect::Bubble;
use crate::dom::HostDom;
use crate::hash::hash_units;

/// Persistence key of a bubble.
///
/// A native message id wins. Otherwise the key is synthesized from role, scan
/// position and a fingerprint of the leading text, so it shifts if messages
/// are reordered or their opening characters are edited.
pub fn bubble_key<D: HostDom>(
    dom: &D,
    bubble: &Bubble<D::Node>,
    index: usize,
    config: &EngineConfig,
) -> String {
    let native_id = dom
        .attribute(&bubble.container, MESSAGE_ID_ATTRIBUTE)
        .or_else(|| dom.attribute(&bubble.role_marker, MESSAGE_ID_ATTRIBUTE))
        .filter(|id| !id.is_empty());
    if let Some(id) = native_id {
        return id;
    }

    let body = bubble_body(dom, &bubble.container);
    let text = dom.text_content(&body);
    let fingerprint = hash_units(
        text.trim()
            .encode_utf16()
            .take(config.text_fingerprint_len),
    );
    format!("{}-{}-{}", bubble.role.as_str(), index, fingerprint)
}
