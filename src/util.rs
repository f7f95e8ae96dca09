//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Escape a string for use inside a double-quoted HTML attribute.
pub fn escape_attr(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      _ => out.push(ch),
    }
  }
  out
}

/// Percent-encode a string for embedding a URL inside another URL's query
/// string. Unreserved characters pass through untouched.
pub fn encode_uri_component(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for b in s.bytes() {
    match b {
      b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
      _ => out.push_str(&format!("%{:02X}", b)),
    }
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let cut = s
    .char_indices()
    .take_while(|(i, _)| *i <= max)
    .last()
    .map(|(i, _)| i)
    .unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("{a} + {a} = {b}", &[("a", "2"), ("b", "4")]);
    assert_eq!(out, "2 + 2 = 4");
  }

  #[test]
  fn fill_template_leaves_unknown_keys() {
    assert_eq!(fill_template("{x}?", &[("a", "1")]), "{x}?");
  }

  #[test]
  fn escape_attr_covers_quotes_and_angles() {
    assert_eq!(escape_attr(r#"a<"b">&c"#), "a&lt;&quot;b&quot;&gt;&amp;c");
  }

  #[test]
  fn trunc_for_log_never_splits_multibyte() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.contains("bytes total"));
  }
}
