#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Code fence delimiter.
const FENCE: &str = "```";

/// Isolates the part of a completion that should hold the JSON object.
///
/// The interior of a fenced block is preferred when one exists; then
/// everything before the first `{` is dropped, since completions often lead
/// with commentary. Text without any `{` is returned unchanged so that
/// parsing fails downstream.
pub fn extract_json_candidate(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = fenced_block(trimmed).unwrap_or(trimmed);

    match body.find('{') {
        Some(start) => body[start..].to_owned(),
        None => raw.to_owned(),
    }
}

/// Returns the trimmed interior of the first closed code fence, skipping an
/// optional `json` language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let mut rest = &text[open + FENCE.len()..];
    if rest
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        rest = &rest[4..];
    }
    let close = rest.find(FENCE)?;
    Some(rest[..close].trim())
}
