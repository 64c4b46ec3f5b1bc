//! FAQ file parsing
//!
//! Plain-text FAQ format: a `<Section>` line opens a section, a line ending
//! in `?` starts a question, and following non-empty lines accumulate into
//! its answer. Questions that never receive an answer line are dropped.
//!
//! ```text
//! <Billing>
//! How do refunds work?
//! Refunds are issued to the original payment method
//! within 5 business days.
//! ```

/// One parsed FAQ entry
#[derive(Debug, Clone, PartialEq)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    pub section: Option<String>,
}

/// Parse FAQ content into entries
pub fn parse_faq(content: &str) -> Vec<FaqEntry> {
    let mut entries = Vec::new();
    let mut current_section: Option<String> = None;
    let mut current_question = String::new();
    let mut answer_lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(name) = section_marker(line) {
            flush(
                &mut entries,
                &mut current_question,
                &mut answer_lines,
                &current_section,
            );
            current_section = Some(name.to_string());
            continue;
        }

        if line.ends_with('?') {
            flush(
                &mut entries,
                &mut current_question,
                &mut answer_lines,
                &current_section,
            );
            current_question = line.to_string();
            continue;
        }

        // Answer lines only count once a question is open; leading prose
        // before the first question is ignored
        if !current_question.is_empty() {
            answer_lines.push(line);
        }
    }

    flush(
        &mut entries,
        &mut current_question,
        &mut answer_lines,
        &current_section,
    );

    entries
}

/// Save the pending question/answer pair if both parts exist
fn flush(
    entries: &mut Vec<FaqEntry>,
    question: &mut String,
    answer_lines: &mut Vec<&str>,
    section: &Option<String>,
) {
    if !question.is_empty() && !answer_lines.is_empty() {
        entries.push(FaqEntry {
            question: std::mem::take(question),
            answer: answer_lines.join("\n").trim().to_string(),
            section: section.clone(),
        });
    } else {
        question.clear();
    }
    answer_lines.clear();
}

/// Match `<Section>` or `<Section></Section>`, returning the section name
fn section_marker(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('<')?;
    let (name, tail) = rest.split_once('>')?;
    if name.is_empty() {
        return None;
    }
    if tail.is_empty() {
        return Some(name);
    }
    let close = tail.strip_prefix("</")?.strip_suffix('>')?;
    if close == name {
        Some(name)
    } else {
        None
    }
}
