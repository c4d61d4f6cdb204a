//! Byte budgeting for prompts.
//!
//! Prompt templates mark their sections with
//! `<!-- section:KEY required|droppable -->`. Templates are split on those
//! markers before anything is substituted, so text pasted into a section
//! (the target file, build output) is never mistaken for a marker.
//!
//! When a budget is set, droppable sections go first (in [`DROP_ORDER`]),
//! then the build output or plan is cut down and tagged with
//! [`TRUNCATED_MARKER`]. The code section is only cut when the prompt has
//! nothing else to cut.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// Appended to a section that had to be cut to fit the budget.
pub const TRUNCATED_MARKER: &str = "\n[truncated]";

/// Placed between rendered sections.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 1] = ["directory"];

/// Sections that may be shortened, most expendable first.
const TRUNCATE_ORDER: [&str; 2] = ["build_output", "plan"];

/// Shortened only when no section in [`TRUNCATE_ORDER`] is present. The
/// refactor and fix answers replace the whole file, so their prompts must
/// carry it intact.
const LAST_RESORT: &str = "code";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

/// One section of a template source, not yet rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTemplate<'a> {
    pub key: &'a str,
    pub required: bool,
    /// Template source between this marker and the next.
    pub body: &'a str,
}

/// A rendered section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section identifier (e.g. "preamble", "code").
    pub key: String,
    /// Required sections are never dropped, only truncated.
    pub required: bool,
    pub content: String,
}

/// Split a template source on its section markers.
///
/// Text before the first marker is discarded.
pub fn split_template(source: &str) -> Vec<SectionTemplate<'_>> {
    let matches: Vec<_> = SECTION_RE.captures_iter(source).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(source.len(), |m| m.start());
        sections.push(SectionTemplate {
            key: key.as_str(),
            required: kind.as_str() == "required",
            body: &source[whole.end()..end],
        });
    }

    sections
}

/// Join sections back into one prompt.
pub fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// Length of [`render_sections`] output, separators included.
pub fn rendered_len(sections: &[Section]) -> usize {
    let (count, bytes) = sections
        .iter()
        .filter(|s| !s.content.is_empty())
        .fold((0usize, 0usize), |(n, b), s| (n + 1, b + s.content.len()));
    bytes + SECTION_SEPARATOR.len() * count.saturating_sub(1)
}

/// Shrink `sections` until the rendered prompt fits in `budget` bytes.
///
/// Returns `true` when anything was dropped or truncated. The result can
/// still exceed the budget when the protected sections alone are too large.
pub fn apply_budget(sections: &mut Vec<Section>, budget: usize) -> bool {
    if rendered_len(sections) <= budget {
        return false;
    }

    for key in DROP_ORDER {
        if rendered_len(sections) <= budget {
            return true;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let position = |key: &str| sections.iter().position(|s| s.key == key);
    let mut targets: Vec<usize> = TRUNCATE_ORDER.iter().filter_map(|&k| position(k)).collect();
    if targets.is_empty() {
        targets.extend(position(LAST_RESORT));
    }

    for idx in targets {
        let total = rendered_len(sections);
        if total <= budget {
            return true;
        }
        truncate_section(&mut sections[idx], total - budget);
    }

    let total = rendered_len(sections);
    if total > budget {
        warn!(
            budget,
            bytes = total,
            "prompt still over budget, protected sections kept whole"
        );
    }
    true
}

/// Cut `excess` bytes (plus room for the marker) off the end of `section`.
fn truncate_section(section: &mut Section, excess: usize) {
    let before_len = section.content.len();
    if before_len <= TRUNCATED_MARKER.len() {
        return;
    }
    let keep = before_len.saturating_sub(excess + TRUNCATED_MARKER.len());
    truncate_at_char_boundary(&mut section.content, keep);
    let marker = if section.content.is_empty() {
        TRUNCATED_MARKER.trim_start()
    } else {
        TRUNCATED_MARKER
    };
    section.content.push_str(marker);
    debug!(
        section = %section.key,
        before_len,
        after_len = section.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(key: &str, required: bool, content: &str) -> Section {
        Section {
            key: key.to_string(),
            required,
            content: content.to_string(),
        }
    }

    #[test]
    fn splits_template_on_markers() {
        let source = "ignored\n<!-- section:preamble required -->\nYou are\n\
                      <!-- section:directory droppable -->\n{{ directory }}\n\
                      <!-- section:code required -->\n{{ code }}\n";
        let sections = split_template(source);
        let keys: Vec<&str> = sections.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["preamble", "directory", "code"]);
        assert!(!sections[1].required);
        assert_eq!(sections[2].body, "\n{{ code }}\n");
    }

    #[test]
    fn rendered_len_counts_separators() {
        let sections = vec![
            section("preamble", true, "abc"),
            section("directory", false, ""),
            section("code", true, "def"),
        ];
        assert_eq!(rendered_len(&sections), render_sections(&sections).len());
        assert_eq!(rendered_len(&sections), 8);
    }

    #[test]
    fn within_budget_is_untouched() {
        let mut sections = vec![section("preamble", true, "abc"), section("code", true, "def")];
        assert!(!apply_budget(&mut sections, 8));
        assert_eq!(render_sections(&sections), "abc\n\ndef");
    }

    #[test]
    fn drops_directory_before_truncating() {
        let mut sections = vec![
            section("preamble", true, "p"),
            section("directory", false, &"d".repeat(50)),
            section("code", true, &"c".repeat(20)),
        ];
        assert!(apply_budget(&mut sections, 30));
        assert!(sections.iter().all(|s| s.key != "directory"));
        assert_eq!(sections[1].content, "c".repeat(20));
    }

    #[test]
    fn truncates_build_output_and_keeps_code() {
        let mut sections = vec![
            section("preamble", true, &"p".repeat(10)),
            section("code", true, &"c".repeat(300)),
            section("build_output", true, &"e".repeat(200)),
        ];
        assert!(apply_budget(&mut sections, 400));
        assert_eq!(render_sections(&sections).len(), 400);
        assert_eq!(sections[1].content, "c".repeat(300));
        assert!(sections[2].content.starts_with("eee"));
        assert!(sections[2].content.ends_with(TRUNCATED_MARKER));
    }

    #[test]
    fn code_is_kept_whole_when_plan_cannot_absorb_excess() {
        let mut sections = vec![
            section("code", true, &"c".repeat(300)),
            section("plan", true, &"s".repeat(40)),
            section("answer", true, "Your code:"),
        ];
        assert!(apply_budget(&mut sections, 100));
        assert_eq!(sections[0].content, "c".repeat(300));
        assert_eq!(sections[1].content, "[truncated]");
        assert_eq!(sections[2].content, "Your code:");
    }

    #[test]
    fn code_is_cut_when_nothing_else_can_be() {
        let mut sections = vec![
            section("task", true, "plan this"),
            section("code", true, &"c".repeat(300)),
        ];
        assert!(apply_budget(&mut sections, 100));
        assert!(rendered_len(&sections) <= 100);
        assert!(sections[1].content.ends_with(TRUNCATED_MARKER));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut sections = vec![section("code", true, &"é".repeat(40))];
        apply_budget(&mut sections, 31);
        assert!(sections[0].content.ends_with(TRUNCATED_MARKER));
        assert!(rendered_len(&sections) <= 31);
    }
}
