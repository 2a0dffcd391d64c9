//! Channel-specific text rendering. Each channel has a fixed character limit
//! and a fixed policy for how an item's link is carried.

use crate::model::Item;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderProfile {
    pub max_chars: usize,
    pub link: LinkStyle,
    pub include_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStyle {
    /// Link appended on its own line, counted against the limit.
    Appended,
    /// Channel cannot render clickable links; a fixed marker is appended instead.
    Marker(&'static str),
    /// Link is not carried in the text.
    Omitted,
}

/// Render an item for one channel. The text portion is truncated so that the
/// appended link or marker always survives intact within `max_chars`.
pub fn render(item: &Item, profile: &RenderProfile) -> String {
    let mut text = format!("{}\n\n{}", item.topic, item.summary);
    if profile.include_body {
        if let Some(body) = item.body.as_deref().filter(|b| !b.is_empty()) {
            text.push_str("\n\n");
            text.push_str(body);
        }
    }

    let link = item.link.as_deref().filter(|l| !l.is_empty());
    match (&profile.link, link) {
        (LinkStyle::Appended, Some(link)) => {
            let budget = profile.max_chars.saturating_sub(link.chars().count() + 1);
            let mut out = truncate_chars(&text, budget);
            out.push('\n');
            out.push_str(link);
            out
        }
        (LinkStyle::Marker(marker), Some(_)) => {
            let budget = profile
                .max_chars
                .saturating_sub(marker.chars().count() + 2);
            let mut out = truncate_chars(&text, budget);
            out.push_str("\n\n");
            out.push_str(marker);
            out
        }
        _ => truncate_chars(&text, profile.max_chars),
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with "...".
/// Operates on characters, never on raw byte offsets.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let cut: String = text.chars().take(max_chars - 3).collect();
    format!("{cut}...")
}
