//! Script extraction: pulls script blocks out of generated markup so they
//! can be delivered as structured client directives instead of embedded
//! tags. Rendered markup therefore never contains raw `<script>` elements.
//!
//! This is a syntactic, best-effort scan tuned to the markup the generators
//! emit; pathological or malformed markup may under- or over-match. That is
//! an accepted limitation, not a defect.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
  /// An external script the client should load by URL.
  Reference,
  /// Inline script source for the client to execute.
  Code,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
  pub kind: ScriptKind,
  pub value: String,
}

/// Strip every script block from `markup`, returning the cleaned markup and
/// the extracted entries in scan order.
///
/// A block with an empty body and a `src` attribute becomes a single
/// reference entry. Any other block first yields a reference entry when its
/// body injects an external script through a document.write pattern, then
/// always yields a code entry for the full body.
pub fn extract(markup: &str) -> (String, Vec<ScriptEntry>) {
  let block_re = Regex::new(r"(?s)<script([^>]*)>(.*?)</script>").expect("script block pattern");
  let src_re = Regex::new(r#"src="(.*?)""#).expect("src attribute pattern");
  let docwrite_re =
    Regex::new(r#"document\.write.*?script.*?src="(.*?)""#).expect("document.write pattern");

  let mut scripts = Vec::new();
  for caps in block_re.captures_iter(markup) {
    let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let src = src_re.captures(attrs);
    if body.trim().is_empty() && src.is_some() {
      scripts.push(ScriptEntry {
        kind: ScriptKind::Reference,
        value: src.expect("checked above")[1].to_string(),
      });
    } else {
      if let Some(sub) = docwrite_re.captures(body) {
        scripts.push(ScriptEntry {
          kind: ScriptKind::Reference,
          value: sub[1].to_string(),
        });
      }
      scripts.push(ScriptEntry {
        kind: ScriptKind::Code,
        value: body.to_string(),
      });
    }
  }

  let stripped = block_re.replace_all(markup, "").into_owned();
  (stripped, scripts)
}
