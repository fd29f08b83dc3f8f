//! Reassembly of split turns into single logical messages.

use std::collections::HashMap;

use crate::types::Message;

/// Collapse every turn group back into one message.
///
/// Ungrouped messages pass through unchanged. Each group is emitted at the
/// position of its first fragment, with fragments ordered by
/// `message_index` and their text joined by a single space. Role, name,
/// reasoning and timestamp come from the first fragment; tool calls and
/// compliance results from the last.
pub fn reconstruct_grouped(messages: &[Message]) -> Vec<Message> {
    enum Slot<'a> {
        Single(&'a Message),
        Group(String),
    }

    let mut slots: Vec<Slot<'_>> = Vec::with_capacity(messages.len());
    let mut groups: HashMap<String, Vec<&Message>> = HashMap::new();

    for message in messages {
        match &message.group_id {
            Some(group_id) => {
                let fragments = groups.entry(group_id.clone()).or_default();
                if fragments.is_empty() {
                    slots.push(Slot::Group(group_id.clone()));
                }
                fragments.push(message);
            }
            None => slots.push(Slot::Single(message)),
        }
    }

    slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Single(message) => Some(message.clone()),
            Slot::Group(group_id) => groups.remove(&group_id).and_then(merge_fragments),
        })
        .collect()
}

fn merge_fragments(mut fragments: Vec<&Message>) -> Option<Message> {
    fragments.sort_by_key(|m| m.message_index.unwrap_or(0));
    let first = *fragments.first()?;
    let last = *fragments.last()?;

    let text = fragments
        .iter()
        .map(|m| m.text().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut merged = first.clone();
    merged.tool_calls = last.tool_calls.clone();
    merged.compliance_violations = last.compliance_violations.clone();
    merged.content = if text.is_empty() && merged.has_tool_calls() {
        None
    } else {
        Some(text)
    };
    merged.group_id = None;
    merged.message_index = None;
    merged.total_in_group = None;
    Some(merged)
}
