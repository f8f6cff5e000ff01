//! Slack Block Kit builders for remediation reports.

use slack_morphism::prelude::{SlackBlock, SlackBlockText, SlackSectionBlock};

/// Slack limits a section's text to 3000 characters.
const MAX_SECTION_CHARS: usize = 2900;

/// Build a severity-formatted section block.
#[must_use]
pub fn severity_section(level: &str, message: &str) -> SlackBlock {
    let prefix = match level {
        "success" => "\u{2705}",
        "warning" => "\u{26a0}\u{fe0f}",
        "error" => "\u{274c}",
        _ => "\u{2139}\u{fe0f}",
    };
    text_section(&format!("{prefix} {message}"))
}

/// Build a plain Markdown section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build a code-formatted section, truncated to fit a single block.
#[must_use]
pub fn code_section(content: &str) -> SlackBlock {
    let clipped = truncate_chars(content, MAX_SECTION_CHARS);
    text_section(&format!("```\n{clipped}\n```"))
}

/// Severity level implied by a report subject.
#[must_use]
pub fn severity_for_subject(subject: &str) -> &'static str {
    if subject.ends_with("debugging incomplete") {
        "error"
    } else if subject.ends_with("restart issued") {
        "warning"
    } else if subject.ends_with("self-corrected") || subject.ends_with("resolved") {
        "success"
    } else {
        "info"
    }
}

/// Blocks for a remediation report: severity header, then the body.
#[must_use]
pub fn report_blocks(subject: &str, body: &str) -> Vec<SlackBlock> {
    vec![
        severity_section(severity_for_subject(subject), &format!("*{subject}*")),
        code_section(body),
    ]
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
