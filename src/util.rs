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

const STOPWORDS: &[&str] = &[
  "about", "after", "also", "and", "basics", "from", "have", "into", "introduction", "that", "the", "their", "them",
  "then", "there", "these", "this", "those", "what", "when", "which", "with", "your",
];

/// Lowercased content words (4+ letters, no stopwords), first occurrence order, deduplicated.
/// Used as the default keyword set for local grading.
pub fn content_words(s: &str, max: usize) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for raw in s.split(|c: char| !c.is_alphanumeric()) {
    let w = raw.to_lowercase();
    if w.chars().count() < 4 || STOPWORDS.contains(&w.as_str()) || out.contains(&w) {
      continue;
    }
    out.push(w);
    if out.len() == max { break; }
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
