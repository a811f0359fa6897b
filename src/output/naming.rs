//! File and folder naming for persisted artifacts
//!
//! Titles arrive with characters that are illegal in filenames on one
//! platform or another. Those are mapped to fullwidth equivalents instead
//! of being stripped, which keeps names readable and stable across runs.
//! Stability matters because folder existence is the resume marker.

/// Maps filesystem-hostile characters to fullwidth equivalents, trims, and
/// truncates to `max_chars`.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    text.chars()
        .map(|c| match c {
            '/' => '／',
            '\\' => '＼',
            '?' => '？',
            ':' => '：',
            '<' => '〈',
            '>' => '〉',
            '|' => '｜',
            '"' => '＂',
            '*' => '＊',
            other => other,
        })
        .collect::<String>()
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

/// Folder that holds everything downloaded for one video.
///
/// The title portion is capped so the id always fits within one path
/// component.
pub fn video_folder_name(title: &str, bvid: &str) -> String {
    format!("{}_{}", sanitize(title, 240), bvid)
}

/// Folder for one user's downloads.
pub fn user_folder_name(username: &str, uid: u64) -> String {
    format!("{}_{}", sanitize(username, 100), uid)
}

/// Folder for one collection's downloads.
pub fn collection_folder_name(name: &str, collection_id: u64) -> String {
    format!("{}_{}", sanitize(name, 50), collection_id)
}

/// Final media file for one numbered sub-part.
pub fn part_file_name(part_number: u32, part_title: &str) -> String {
    format!("P{:02}_{}.mp4", part_number, sanitize(part_title, 200))
}

/// Dialogue-overlay sidecar for one numbered sub-part.
pub fn danmaku_file_name(part_number: u32, part_title: &str) -> String {
    format!("P{:02}_{}_danmaku.jsonl", part_number, sanitize(part_title, 200))
}

/// Per-moment artifact file.
pub fn moment_file_name(moment_id: &str) -> String {
    format!("dynamic_{}.json", moment_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_maps_hostile_characters() {
        assert_eq!(sanitize("a/b:c?", 100), "a／b：c？");
        assert_eq!(sanitize("<x>|*\"\\", 100), "〈x〉｜＊＂＼");
    }

    #[test]
    fn test_sanitize_trims_and_truncates() {
        assert_eq!(sanitize("  padded  ", 100), "padded");
        assert_eq!(sanitize("abcdef", 3), "abc");
    }

    #[test]
    fn test_sanitize_truncates_by_chars_not_bytes() {
        // Multi-byte titles must not be cut mid-character
        assert_eq!(sanitize("你好世界", 2), "你好");
    }

    #[test]
    fn test_video_folder_name() {
        assert_eq!(
            video_folder_name("Title: Part 1/2", "BV1xx411c7mD"),
            "Title： Part 1／2_BV1xx411c7mD"
        );
    }

    #[test]
    fn test_part_and_danmaku_names_align() {
        assert_eq!(part_file_name(3, "intro"), "P03_intro.mp4");
        assert_eq!(danmaku_file_name(3, "intro"), "P03_intro_danmaku.jsonl");
    }

    #[test]
    fn test_moment_file_name() {
        assert_eq!(moment_file_name("7581"), "dynamic_7581.json");
    }
}
