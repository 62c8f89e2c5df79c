//! Prompt construction for the decision, repair, and synthesis round-trips.
//!
//! Everything the model sees is assembled here from a session snapshot, so
//! the planner, recovery controller, and synthesizer stay free of string
//! plumbing and the prompts can be unit-tested as plain data.

use loopwright_core::message::Message;
use loopwright_core::session::{Observation, Outcome, SessionSnapshot};

const PLANNING_SYSTEM_PROMPT: &str = "\
You are an assistant that completes the user's request by calling the \
available tools, one call at a time. Inspect the progress log before \
deciding. When the request is fully satisfied, reply with plain text \
instead of calling a tool — that final text is your closing remark, not \
the answer shown to the user.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
The tool phase is over. Using the conversation and the progress log below, \
write the final reply to the user. Be direct and concrete; cite the actual \
results the tools produced.";

/// Messages for the initial plan-drafting round-trip.
///
/// Unconstrained: the model answers with a short numbered plan, one line
/// per intended tool call.
pub fn plan_messages(snapshot: &SessionSnapshot<'_>, tool_names: &[&str]) -> Vec<Message> {
    let mut messages = vec![Message::system(format!(
        "Before doing anything, write a short numbered plan for the user's \
         request: one line per intended tool call, nothing else. Available \
         tools: {}. Keep it to the fewest steps that satisfy the request.",
        tool_names.join(", ")
    ))];
    messages.extend(snapshot.conversation.messages.iter().cloned());
    messages
}

/// Split a drafted plan into step lines, dropping list markers.
pub fn parse_plan(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')', '-', '*'])
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render the drafted plan for the planning prompt.
pub fn plan_summary(plan: &[String]) -> String {
    let mut out = String::from("Initial plan:\n");
    for (i, step) in plan.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }
    out
}

/// Render the scratchpad as a progress log the model can read.
pub fn scratchpad_summary(scratchpad: &[Observation]) -> String {
    if scratchpad.is_empty() {
        return "No tools have been invoked yet.".into();
    }

    let mut out = String::from("Progress log (oldest first):\n");
    for (i, obs) in scratchpad.iter().enumerate() {
        let line = match &obs.outcome {
            Outcome::Success { value } => format!(
                "{}. {}({}) -> ok: {}",
                i + 1,
                obs.step.tool_name,
                obs.step.arguments,
                value
            ),
            Outcome::Failure { kind, message } => format!(
                "{}. {}({}) -> failed ({:?}): {}",
                i + 1,
                obs.step.tool_name,
                obs.step.arguments,
                kind,
                message
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Messages for a planning decision round-trip.
pub fn planning_messages(snapshot: &SessionSnapshot<'_>) -> Vec<Message> {
    let mut messages = vec![Message::system(PLANNING_SYSTEM_PROMPT)];
    messages.extend(snapshot.conversation.messages.iter().cloned());
    if let Some(plan) = snapshot.plan
        && !plan.is_empty()
    {
        messages.push(Message::system(plan_summary(plan)));
    }
    if !snapshot.scratchpad.is_empty() {
        messages.push(Message::system(scratchpad_summary(snapshot.scratchpad)));
    }
    messages
}

/// Messages for a repair round-trip after a failed step.
///
/// The model is asked for a corrected tool call, or plain text declaring
/// the action unrecoverable.
pub fn repair_messages(
    snapshot: &SessionSnapshot<'_>,
    failed: &Observation,
    attempt: u32,
    budget: u32,
) -> Vec<Message> {
    let error = match &failed.outcome {
        Outcome::Failure { message, .. } => message.clone(),
        Outcome::Success { .. } => String::new(),
    };

    let mut messages = planning_messages(snapshot);
    messages.push(Message::system(format!(
        "The last tool call failed.\n\
         Step: {}({})\n\
         Error: {}\n\
         This is repair attempt {} of {}. Either call a corrected tool \
         (fix the arguments or pick a different tool), or reply with plain \
         text explaining why the action is unrecoverable.",
        failed.step.tool_name, failed.step.arguments, error, attempt, budget
    )));
    messages
}

/// Messages for the final unconstrained synthesis pass.
pub fn synthesis_messages(snapshot: &SessionSnapshot<'_>) -> Vec<Message> {
    let mut messages = vec![Message::system(SYNTHESIS_SYSTEM_PROMPT)];
    messages.extend(snapshot.conversation.messages.iter().cloned());
    messages.push(Message::system(scratchpad_summary(snapshot.scratchpad)));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopwright_core::session::{FailureKind, PlanStep, SessionState};

    fn session_with_observation() -> SessionState {
        let mut session = SessionState::seed("list my files");
        session.record_observation(
            PlanStep::new("list_files", serde_json::json!({"path": "."}), ""),
            Outcome::Success {
                value: serde_json::json!(["a.txt", "b.txt"]),
            },
        );
        session
    }

    #[test]
    fn empty_scratchpad_summary() {
        assert!(scratchpad_summary(&[]).contains("No tools"));
    }

    #[test]
    fn summary_lists_outcomes_in_order() {
        let mut session = session_with_observation();
        session.record_observation(
            PlanStep::new("file_read", serde_json::json!({"path": "x"}), ""),
            Outcome::Failure {
                kind: FailureKind::Tool,
                message: "no such file".into(),
            },
        );

        let summary = scratchpad_summary(session.scratchpad());
        let ok_pos = summary.find("list_files").unwrap();
        let fail_pos = summary.find("file_read").unwrap();
        assert!(ok_pos < fail_pos);
        assert!(summary.contains("no such file"));
    }

    #[test]
    fn planning_messages_start_with_system() {
        let session = session_with_observation();
        let messages = planning_messages(&session.snapshot());
        assert_eq!(messages[0].role, loopwright_core::message::Role::System);
        // system + user + progress log
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn planning_messages_include_the_plan() {
        let mut session = session_with_observation();
        session.set_plan(vec!["call list_files".into(), "read a.txt".into()]);

        let messages = planning_messages(&session.snapshot());
        // system + user + plan + progress log
        assert_eq!(messages.len(), 4);
        assert!(messages[2].content.contains("1. call list_files"));
        assert!(messages[2].content.contains("2. read a.txt"));
    }

    #[test]
    fn parse_plan_strips_list_markers() {
        let steps = parse_plan("1. First step\n2) Second step\n- Third step\n\n");
        assert_eq!(steps, vec!["First step", "Second step", "Third step"]);
    }

    #[test]
    fn repair_messages_carry_step_and_error() {
        let session = session_with_observation();
        let failed = Observation::new(
            PlanStep::new("file_read", serde_json::json!({"path": "x"}), ""),
            Outcome::Failure {
                kind: FailureKind::Timeout,
                message: "timed out after 60s".into(),
            },
        );

        let messages = repair_messages(&session.snapshot(), &failed, 1, 3);
        let last = &messages[messages.len() - 1].content;
        assert!(last.contains("file_read"));
        assert!(last.contains("timed out after 60s"));
        assert!(last.contains("attempt 1 of 3"));
    }
}
