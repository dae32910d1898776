use std::fmt::Write;

use chrono::NaiveDate;

use crate::error::ConvertError;
use crate::importer::{ContentItem, Conversation, Message};
use crate::linearize::linearize;
use crate::naming::{self, FilenameDescriptor};
use crate::renderer::{self, DELIMITER, single_line};
use crate::utils::{Zone, calendar_date, format_datetime};

/// One rendered conversation.
///
/// Holds the Markdown text together with the title and creation date the
/// filename is derived from. Never changes after assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    title: String,
    create_date: Option<NaiveDate>,
}

impl Document {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn create_date(&self) -> Option<NaiveDate> {
        self.create_date
    }

    pub fn descriptor(&self) -> FilenameDescriptor {
        naming::canonicalize(&self.title, self.create_date)
    }
}

/// Render a conversation and its already ordered messages as Markdown.
///
/// ```text
/// ---
/// title: <title>
/// create_time: <YYYY-MM-DD HH:MM:SS>
/// update_time: <YYYY-MM-DD HH:MM:SS>
/// conversation_id: <id>
/// ---
///
/// # <title>
///
/// Creation Time: <YYYY-MM-DD HH:MM:SS>
///
/// Update Time: <YYYY-MM-DD HH:MM:SS>
///
/// ## User
///
/// ...
/// ```
pub fn assemble<'a>(
    conversation: &Conversation,
    messages: impl IntoIterator<Item = &'a Message>,
    zone: Zone,
) -> Document {
    let title = single_line(&conversation.title);
    let created = format_datetime(&conversation.create_time, zone);
    let updated = format_datetime(&conversation.update_time, zone);

    let mut text = String::new();
    // fmt::Write into a String is infallible; results are ignored below.
    let _ = write!(
        text,
        "---\ntitle: {title}\ncreate_time: {created}\nupdate_time: {updated}\nconversation_id: {id}\n---\n\n",
        id = single_line(&conversation.id),
    );
    let _ = write!(
        text,
        "# {title}\n\nCreation Time: {created}\n\nUpdate Time: {updated}\n\n"
    );

    for message in messages {
        let _ = write!(text, "## {}", message.role.label());
        let model = message.model.as_deref().map(single_line).unwrap_or_default();
        if !model.is_empty() {
            let _ = write!(text, " ({model})");
        }
        text.push_str("\n\n");

        for item in &message.content {
            if let ContentItem::Unsupported { kind } = item {
                tracing::warn!(conversation = %title, kind = %kind, "skipping unsupported content");
            }
            let _ = renderer::render_item(&mut text, item);
        }
    }

    Document {
        text,
        create_date: calendar_date(&conversation.create_time, zone),
        title,
    }
}

/// Linearize and assemble in one step.
pub fn convert(conversation: &Conversation, zone: Zone) -> Result<Document, ConvertError> {
    let messages = linearize(conversation)?;
    Ok(assemble(conversation, &messages, zone))
}

/// Append a document followed by the bundle delimiter.
///
/// Documents end in a blank line, so the delimiter always sits on its own line
/// with a blank line on each side.
pub fn append_to_bundle(bundle: &mut String, doc: &Document) {
    bundle.push_str(&doc.text);
    if !doc.text.ends_with("\n\n") {
        bundle.push_str(if doc.text.ends_with('\n') { "\n" } else { "\n\n" });
    }
    bundle.push_str(DELIMITER);
    bundle.push_str("\n\n");
}

pub fn assemble_bundle<'a>(docs: impl IntoIterator<Item = &'a Document>) -> String {
    let mut bundle = String::new();
    for doc in docs {
        append_to_bundle(&mut bundle, doc);
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::parse_conversation;
    use serde_json::json;

    fn hi_there() -> Conversation {
        parse_conversation(json!({
            "title": "Hi There",
            "create_time": 1704067200,
            "messages": [{"role": "user", "content": ["Hello"]}]
        }))
        .unwrap()
    }

    #[test]
    fn flat_scenario_renders_expected_document() {
        let doc = convert(&hi_there(), Zone::Utc).unwrap();
        assert_eq!(
            doc.text(),
            "---\n\
             title: Hi There\n\
             create_time: 2024-01-01 00:00:00\n\
             update_time: \n\
             conversation_id: \n\
             ---\n\
             \n\
             # Hi There\n\
             \n\
             Creation Time: 2024-01-01 00:00:00\n\
             \n\
             Update Time: \n\
             \n\
             ## User\n\
             \n\
             Hello\n\
             \n"
        );
        assert_eq!(doc.descriptor().file_name(), "Hi_There_2024_0101.md");
    }

    #[test]
    fn model_is_appended_to_the_role_heading() {
        let conv = parse_conversation(json!({
            "title": "Models",
            "messages": [
                {"role": "User", "content": ["q"]},
                {"role": "assistant", "content": ["a"], "model": "gpt-4o"},
                {"role": "tool", "content": ["t"], "model": ""}
            ]
        }))
        .unwrap();
        let doc = convert(&conv, Zone::Utc).unwrap();
        assert!(doc.text().contains("## User\n\nq\n\n"));
        assert!(doc.text().contains("## Assistant (gpt-4o)\n\na\n\n"));
        assert!(doc.text().contains("## Assistant\n\nt\n\n"));
    }

    #[test]
    fn unknown_content_does_not_abort_assembly() {
        let conv = parse_conversation(json!({
            "title": "Mixed",
            "messages": [{
                "role": "assistant",
                "content": ["before", {"content_type": "hologram"}, "after"]
            }]
        }))
        .unwrap();
        let doc = convert(&conv, Zone::Utc).unwrap();
        assert!(doc.text().ends_with("## Assistant\n\nbefore\n\nafter\n\n"));
    }

    #[test]
    fn conversation_without_renderable_messages_keeps_its_header() {
        let conv = parse_conversation(json!({
            "title": "Empty",
            "conversation_id": "c-1",
            "mapping": {"root": {"id": "root", "parent": null, "children": [], "message": null}}
        }))
        .unwrap();
        let doc = convert(&conv, Zone::Utc).unwrap();
        assert!(doc.text().starts_with("---\ntitle: Empty\n"));
        assert!(doc.text().contains("conversation_id: c-1\n"));
        assert!(doc.text().ends_with("Update Time: \n\n"));
        assert!(!doc.text().contains("## "));
        assert_eq!(doc.descriptor().file_name(), "Empty.md");
    }

    #[test]
    fn multi_line_titles_are_flattened() {
        let conv = parse_conversation(json!({
            "title": "First\nSecond",
            "messages": [{"role": "user", "content": ["x"]}]
        }))
        .unwrap();
        let doc = convert(&conv, Zone::Utc).unwrap();
        assert!(doc.text().contains("\n# First Second\n"));
        assert_eq!(doc.title(), "First Second");
    }

    #[test]
    fn line_breaks_in_metadata_cannot_forge_lines() {
        let conv = parse_conversation(json!({
            "title": "Real",
            "create_time": 1704067200,
            "conversation_id": "abc\n# Fake",
            "messages": [
                {"role": "assistant", "content": ["a"], "model": "m)\n\n* * *\n\n# Evil ("}
            ]
        }))
        .unwrap();
        let doc = convert(&conv, Zone::Utc).unwrap();
        assert!(doc.text().contains("conversation_id: abc # Fake\n"));
        assert!(doc.text().contains("## Assistant (m) * * * # Evil ()\n\na\n\n"));
        assert!(!doc.text().lines().any(|line| line == DELIMITER));
        assert_eq!(
            doc.text().lines().filter(|line| line.starts_with("# ")).collect::<Vec<_>>(),
            ["# Real"]
        );
    }

    #[test]
    fn bundle_separates_documents_with_delimiter_lines() {
        let doc = convert(&hi_there(), Zone::Utc).unwrap();
        let bundle = assemble_bundle([&doc, &doc]);
        assert_eq!(bundle.matches("\n\n* * *\n\n").count(), 2);
        assert!(bundle.starts_with(doc.text()));
    }
}
