//! Text the worker posts and the prompt it sends.
//!
//! Every comment the worker authors ends with [`LOOP_MARKER_TAG`] so the
//! loop guard recognizes it if it is ever re-ingested. Failure notices name
//! the error category only.

use std::time::Duration;

use domain::{ErrorCategory, EventEnvelope, EventMetadata, UserLogin, LOOP_MARKER_TAG};

fn signed(body: String) -> String {
    format!("{body}\n{LOOP_MARKER_TAG}")
}

fn quote(text: &str) -> String {
    text.lines().map(|line| format!("> {line}")).collect::<Vec<_>>().join("\n")
}

fn sender(envelope: &EventEnvelope) -> String {
    match envelope.metadata() {
        EventMetadata::GitHub(meta) => format!("@{}", meta.author),
        EventMetadata::Telegram(meta) => format!("{} (chat `{}`)", meta.display_name(), meta.chat_id),
    }
}

/// Model prompt framing the user's text.
pub fn prompt(envelope: &EventEnvelope) -> String {
    let label = match envelope.metadata() {
        EventMetadata::GitHub(_) => "User comment",
        EventMetadata::Telegram(_) => "User message",
    };
    format!(
        "{label}: {}\n\nPlease provide a helpful, concise response.",
        envelope.text()
    )
}

/// Acknowledgment posted before the model is called.
pub fn intake(envelope: &EventEnvelope) -> String {
    let mut body = format!(
        "✅ Worker received `{}`\n📥 From: {} via `{}`\n🕐 Admitted: `{}`\n",
        envelope.correlation_id(),
        sender(envelope),
        envelope.source(),
        envelope.received_at(),
    );
    // Chat text is not visible on the issue otherwise.
    if let EventMetadata::Telegram(_) = envelope.metadata() {
        body.push('\n');
        body.push_str(&quote(envelope.text()));
        body.push('\n');
    }
    body.push_str("\n_Processing with LLM..._");
    signed(body)
}

/// The model's answer as posted on the tracking issue.
pub fn response(envelope: &EventEnvelope, answer: &str, latency: Duration) -> String {
    let heading = match envelope.metadata() {
        EventMetadata::GitHub(_) => String::new(),
        EventMetadata::Telegram(meta) => format!("🤖 Response for chat user `{}`\n\n", meta.display_name()),
    };
    signed(format!(
        "{heading}{answer}\n\n---\n📊 Correlation ID: `{}` · Source: `{}` · Latency: `{} ms`",
        envelope.correlation_id(),
        envelope.source(),
        latency.as_millis(),
    ))
}

/// Posted when the chat reply could not be delivered.
pub fn reply_failed(envelope: &EventEnvelope, category: ErrorCategory) -> String {
    signed(format!(
        "⚠️ The response could not be delivered to the chat ({category}). Correlation ID: `{}`",
        envelope.correlation_id()
    ))
}

/// Confirmation after labels were added.
pub fn labels_added(labels: &[String]) -> String {
    let list = labels.iter().map(|l| format!("`{l}`")).collect::<Vec<_>>().join(", ");
    signed(format!("✅ Added label(s): {list}"))
}

/// Confirmation after assignees were added.
pub fn assignees_added(assignees: &[String]) -> String {
    let list = assignees.iter().map(|a| format!("@{a}")).collect::<Vec<_>>().join(", ");
    signed(format!("✅ Assigned: {list}"))
}

/// Reply to a recognized verb given without arguments.
pub fn usage(verb: &str, usage: &str) -> String {
    signed(format!("ℹ️ `/{verb}` needs arguments. Usage: `{usage}`"))
}

/// Reply to an unrecognized verb.
pub fn unknown_command(verb: &str) -> String {
    signed(format!(
        "❓ Unknown command `/{verb}`. Supported commands: `/label`, `/assign`."
    ))
}

/// Reply to a command from someone other than the owner.
pub fn unauthorized(verb: &str, author: &UserLogin) -> String {
    signed(format!(
        "🚫 @{author} is not authorized to run `/{verb}`. Only the repository owner can run commands."
    ))
}

/// Reply when the mutating call failed.
pub fn command_failed(verb: &str, category: ErrorCategory) -> String {
    signed(format!("❌ `/{verb}` failed ({category})."))
}
