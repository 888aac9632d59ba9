//! Context Index: operating conditions → context id.
//!
//! A context is an arbitrary string-keyed description of the conditions a
//! place is visited under (tool, temperature, process step, material, ...).
//! Entries are rendered as `key=json(value)`, sorted, joined and hashed, so
//! two descriptions with the same entries always map to the same id no
//! matter how they were built.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// External context description.
pub type Context = HashMap<String, serde_json::Value>;

/// Identifier of a context, in `[0, num_contexts)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// Maps context descriptions to context ids.
#[derive(Clone, Debug)]
pub struct ContextIndex {
    num_contexts: u64,
}

impl ContextIndex {
    pub fn new(num_contexts: u64) -> Self {
        Self { num_contexts }
    }

    pub fn num_contexts(&self) -> u64 {
        self.num_contexts
    }

    /// Context id of a set of entries. Independent of entry order.
    ///
    /// Accepts anything that iterates `(key, value)` pairs: a [`Context`],
    /// a `BTreeMap`, or a plain slice of tuples.
    ///
    /// ```rust
    /// use grid_memory::kernel::ContextIndex;
    /// use serde_json::json;
    ///
    /// let idx = ContextIndex::new(10_000);
    /// let a = idx.context_id(vec![("tool", &json!("A")), ("temp", &json!(20.0))]);
    /// let b = idx.context_id(vec![("temp", &json!(20.0)), ("tool", &json!("A"))]);
    /// assert_eq!(a, b);
    /// ```
    pub fn context_id<'a, I, K>(&self, entries: I) -> ContextId
    where
        I: IntoIterator<Item = (K, &'a serde_json::Value)>,
        K: AsRef<str>,
    {
        let canonical = canonical_form(entries);
        let hash = Sha256::digest(canonical.as_bytes());

        let mut head = [0u8; 8];
        head.copy_from_slice(&hash[0..8]);
        ContextId(u64::from_le_bytes(head) % self.num_contexts)
    }

    /// Context id of a [`Context`], or `None` when it is empty.
    ///
    /// An empty description means "no context": such observations only
    /// teach the place-level memory.
    pub fn resolve(&self, context: &Context) -> Option<ContextId> {
        if context.is_empty() {
            None
        } else {
            Some(self.context_id(context))
        }
    }
}

/// Sorted `key=value` rendering used as hash input.
///
/// `serde_json` objects keep their keys ordered, so nested values render
/// canonically as well.
pub fn canonical_form<'a, I, K>(entries: I) -> String
where
    I: IntoIterator<Item = (K, &'a serde_json::Value)>,
    K: AsRef<str>,
{
    let mut rendered: Vec<String> = entries
        .into_iter()
        .map(|(k, v)| format!("{}={}", escape_key(k.as_ref()), v))
        .collect();
    rendered.sort();
    rendered.join("\u{1f}")
}

fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('=', "\\=")
}
