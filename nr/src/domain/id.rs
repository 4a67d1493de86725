//! Identifier generation
//!
//! Goal IDs use the format `{6-char-hex}-goal-{slug}`, for example
//! `3f9a1c-goal-get-an-a-in-chemistry`. Chat message IDs are
//! `{prefix}-{uuid}` so they never collide within a transcript.

/// Generate a domain ID from a kind and a human title
pub fn generate_id(kind: &str, title: &str) -> String {
    // The leading hex of a v7 UUID is its timestamp; take the random tail
    let simple = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &simple[simple.len() - 6..];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}-{}", hex_prefix, kind)
    } else {
        format!("{}-{}-{}", hex_prefix, kind, slug)
    }
}

/// Generate a chat message ID, e.g. `assist-0193...`
pub fn message_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::now_v7().simple())
}

/// Slugify a title for use in IDs, capped at eight words
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(8)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Get an A in Chemistry!"), "get-an-a-in-chemistry");
        assert_eq!(slugify("Newton's Laws"), "newtons-laws");
        assert_eq!(slugify("  "), "");
        assert_eq!(slugify("one two three four five six seven eight nine"), "one-two-three-four-five-six-seven-eight");
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("goal", "Pass IGCSE Physics");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1], "goal");
        assert_eq!(parts[2], "pass-igcse-physics");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = message_id("msg");
        let b = message_id("msg");
        assert!(a.starts_with("msg-"));
        assert_ne!(a, b);
    }
}
