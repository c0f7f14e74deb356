//! Message rendering.
//!
//! Walks a definition's body set and produces one JSON object per message:
//! `{` followed by one member per variable in cache order, then `}` and a
//! newline. Values that already look like JSON (bracketed) embed verbatim;
//! everything else is quoted with JSON string escaping.

use crate::cache::VarCache;
use crate::error::EngineError;
use crate::store::{VarInfo, VarStore};

/// Determine whether a textual value is itself a JSON value.
///
/// The first and last non-whitespace characters must form a matching
/// bracket pair (`[`…`]` or `{`…`}`). Empty and all-whitespace values are
/// never JSON.
#[must_use]
pub fn is_json(value: &str) -> bool {
    let mut chars = value.trim().chars();
    // A single-character value yields None on the second cursor, so a lone
    // bracket can never classify as JSON.
    matches!(
        (chars.next(), chars.next_back()),
        (Some('['), Some(']')) | (Some('{'), Some('}'))
    )
}

/// Renderer for message bodies.
///
/// Owns the process-wide scratch buffer used to stringify one value at a
/// time: cleared, written by the store, read back, cleared again. The
/// buffer is shared across every render, so value fetches are strictly
/// sequential.
#[derive(Debug, Default)]
pub struct Renderer {
    scratch: Vec<u8>,
}

impl Renderer {
    /// Create a renderer with an empty scratch buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a body set into a complete wire message.
    ///
    /// Any per-variable fetch failure fails the whole render; no member is
    /// skipped.
    ///
    /// # Errors
    /// `Fetch` on store failures, `ValueNotText` for non-UTF-8 value text,
    /// `Encode` if member encoding fails.
    pub fn render(
        &mut self,
        store: &dyn VarStore,
        body: &VarCache,
    ) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::with_capacity(128);
        out.push(b'{');

        for (index, handle) in body.iter().enumerate() {
            let info = store.info(handle)?;

            self.scratch.clear();
            store.print_value(handle, &mut self.scratch)?;
            let text = std::str::from_utf8(&self.scratch)?;

            if index == 0 {
                out.push(b' ');
            } else {
                out.extend_from_slice(b", ");
            }
            write_member(&mut out, &info, text)?;
        }
        self.scratch.clear();

        out.extend_from_slice(b"}\n");
        Ok(out)
    }
}

/// Write one `"key":value` member.
///
/// Keys with a nonzero instance id render as `[<id>]<name>`. Keys and
/// opaque values go through JSON string escaping; JSON-shaped values embed
/// verbatim.
fn write_member(out: &mut Vec<u8>, info: &VarInfo, value: &str) -> Result<(), EngineError> {
    if info.instance_id == 0 {
        serde_json::to_writer(&mut *out, &info.name)?;
    } else {
        let key = format!("[{}]{}", info.instance_id, info.name);
        serde_json::to_writer(&mut *out, &key)?;
    }
    out.push(b':');

    if is_json(value) {
        out.extend_from_slice(value.as_bytes());
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }

    Ok(())
}
