//! Text cleanup for rendering collaborators: card HTML is not displayed
//! verbatim, it is stripped of sound markers, images and links first.

use std::sync::OnceLock;

use regex::Regex;

fn sound_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[sound:[^\]]+\]").expect("valid pattern"))
}

fn img_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img[^>]*>").expect("valid pattern"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid pattern"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<[^>]+>").expect("valid pattern"))
}

fn break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<br\s*/?>|</div>|</p>").expect("valid pattern"))
}

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<img[^>]*src\s*=\s*"([^"]+)""#).expect("valid pattern"))
}

/// Displayed text is the rich variant when non-empty, else the plain fallback.
pub fn display_text<'a>(rich: &'a str, plain: &'a str) -> &'a str {
    if !rich.trim().is_empty() {
        rich
    } else {
        plain
    }
}

/// Strips provider markup down to renderable text: sound markers, inline
/// images, bare URLs and remaining HTML go away, whitespace collapses, and
/// the result is ellipsized to `max_chars` characters.
pub fn sanitize_text(rich: &str, plain: &str, max_chars: usize) -> String {
    let source = display_text(rich, plain);
    let text = sound_re().replace_all(source, "");
    let text = img_re().replace_all(&text, " ");
    let text = url_re().replace_all(&text, "");
    let text = break_re().replace_all(&text, "\n");
    let text = tag_re().replace_all(&text, "");
    let text = decode_entities(&text);

    let mut normalized = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut pending_newline = false;
    for ch in text.replace('\r', "\n").chars() {
        match ch {
            '\n' => {
                pending_newline = true;
                pending_space = false;
            }
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_newline && !normalized.is_empty() {
                    normalized.push('\n');
                } else if pending_space && !normalized.is_empty() {
                    normalized.push(' ');
                }
                pending_newline = false;
                pending_space = false;
                normalized.push(c);
            }
        }
    }

    ellipsize(&normalized, max_chars)
}

/// Image filenames referenced by a card's HTML, innermost path segment only.
pub fn extract_image_sources(html: &str) -> Vec<String> {
    img_src_re()
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .map(|src| src.as_str().rsplit('/').next().unwrap_or(src.as_str()).to_string())
        .filter(|name| is_image_file(name))
        .collect()
}

pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".png")
        || lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".webp")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}…", truncated.trim_end())
}
