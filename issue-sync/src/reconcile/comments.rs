//! Mirroring upstream comments onto a ticket.

use crate::intermediary::Comment;
use crate::tracker::TicketComment;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::LazyLock;

/// Upstream comments created before this instant were mirrored in the legacy
/// format and may carry no id token.
static CUTOVER: LazyLock<DateTime<Utc>> = LazyLock::new(|| {
    NaiveDate::from_ymd_opt(2019, 7, 9)
        .and_then(|d| d.and_hms_micro_opt(18, 18, 36, 480_291))
        .expect("valid cutover timestamp")
        .and_utc()
});

/// What to do for one upstream comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommentAction {
    Add(String),
    Edit { id: String, body: String },
}

/// Current mirrored format. Starts with the `[<id>]` token used to find the
/// comment again.
pub(crate) fn format_comment(comment: &Comment) -> String {
    format!(
        "[{}] Upstream, {} wrote [{}]:\n\n{{quote}}\n{}\n{{quote}}",
        comment.id,
        comment.author,
        comment.date_created.format("%a %b %d"),
        comment.body
    )
}

fn format_legacy(comment: &Comment) -> String {
    format!(
        "Upstream, {} wrote:\n\n{{quote}}\n{}\n{{quote}}",
        comment.name, comment.body
    )
}

/// Works out which upstream comments must be added or edited downstream.
///
/// A comment is already represented when a downstream body equals its legacy
/// rendering or starts with its id token; an id-token match with a stale body
/// is edited. Comments older than the cutover are left alone once the ticket
/// has any comment at all.
pub(crate) fn plan(upstream: &[Comment], downstream: &[TicketComment]) -> Vec<CommentAction> {
    let mut actions = Vec::new();

    for comment in upstream {
        if comment.date_created < *CUTOVER && !downstream.is_empty() {
            continue;
        }

        let formatted = format_comment(comment);
        let legacy = format_legacy(comment);
        let token = format!("[{}]", comment.id);

        let existing = downstream
            .iter()
            .find(|d| d.body == legacy || d.body.starts_with(&token));

        match existing {
            Some(d) if d.body == legacy || d.body == formatted => {}
            Some(d) => actions.push(CommentAction::Edit {
                id: d.id.clone(),
                body: formatted,
            }),
            None => actions.push(CommentAction::Add(formatted)),
        }
    }

    actions
}
