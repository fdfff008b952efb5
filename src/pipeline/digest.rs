//! Digest rendering for a drained batch.
//!
//! Groups messages by sender in first-seen order. Bodies are included
//! verbatim, never summarized.

use std::fmt::Write;

use crate::pipeline::batch::BatchedMessage;

/// Render drained messages as one plain-text digest. `None` when there is nothing to send.
pub fn render_digest(messages: &[BatchedMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let mut groups: Vec<(&str, Vec<&BatchedMessage>)> = Vec::new();
    for message in messages {
        match groups.iter_mut().find(|(sender, _)| *sender == message.sender) {
            Some((_, group)) => group.push(message),
            None => groups.push((message.sender.as_str(), vec![message])),
        }
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} batched message{} from {} contact{}",
        messages.len(),
        plural(messages.len()),
        groups.len(),
        plural(groups.len()),
    );

    for (sender, group) in &groups {
        let name = group
            .iter()
            .find_map(|m| m.sender_name.as_deref())
            .unwrap_or(*sender);
        out.push('\n');
        if name == *sender {
            let _ = writeln!(out, "{sender}:");
        } else {
            let _ = writeln!(out, "{name} ({sender}):");
        }
        for message in group {
            let _ = writeln!(
                out,
                "[{} via {}]",
                message.received_at.format("%Y-%m-%d %H:%M UTC"),
                message.provider
            );
            let _ = writeln!(out, "{}", message.body);
        }
    }

    Some(out)
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
