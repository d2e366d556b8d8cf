//! Namespaced chat identifiers.
//!
//! Every chat the bus knows about is addressed by a jid of the form
//! `<namespace>:<platform id>`, e.g. `slack:C0123ABCD`. The namespace picks
//! the channel implementation that owns the chat.

/// Splits a jid into `(namespace, platform_id)`.
///
/// Returns `None` when the separator is missing or either side is empty.
pub fn split_jid(jid: &str) -> Option<(&str, &str)> {
    let (namespace, platform_id) = jid.split_once(':')?;
    if namespace.is_empty() || platform_id.is_empty() {
        return None;
    }
    Some((namespace, platform_id))
}

pub fn has_namespace(jid: &str, namespace: &str) -> bool {
    matches!(split_jid(jid), Some((found, _)) if found == namespace)
}
