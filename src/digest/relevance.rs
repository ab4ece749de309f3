use std::collections::HashSet;

use crate::models::event::meta;
use crate::models::{Action, ActivityEvent};

/// Keep the events that matter to `identity_id`.
///
/// First pass collects the files the identity edited and the comments it
/// wrote. Second pass keeps: its own edits, its own comments, any comment on
/// a file it edited, and direct replies to its comments. Order is preserved.
pub fn filter_relevant(events: Vec<ActivityEvent>, identity_id: &str) -> Vec<ActivityEvent> {
    let mut edited_files: HashSet<String> = HashSet::new();
    let mut own_comments: HashSet<String> = HashSet::new();

    for event in events.iter().filter(|e| is_by(e, identity_id)) {
        match event.action {
            Action::Edit => {
                edited_files.insert(event.file_key.clone());
            }
            Action::Comment => {
                if let Some(id) = event.meta(meta::COMMENT_ID) {
                    own_comments.insert(id.to_string());
                }
            }
            _ => {}
        }
    }

    events
        .into_iter()
        .filter(|event| match event.action {
            Action::Edit => is_by(event, identity_id),
            Action::Comment => {
                is_by(event, identity_id)
                    || edited_files.contains(&event.file_key)
                    || event
                        .meta(meta::PARENT_ID)
                        .is_some_and(|parent| own_comments.contains(parent))
            }
            _ => false,
        })
        .collect()
}

fn is_by(event: &ActivityEvent, identity_id: &str) -> bool {
    !identity_id.is_empty() && event.user_id.as_deref() == Some(identity_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn event(action: Action, file: &str, user: Option<&str>, meta: &[(&str, &str)]) -> ActivityEvent {
        ActivityEvent {
            ts: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap(),
            account: "work".into(),
            project_id: "p1".into(),
            project_name: "Web".into(),
            file_key: file.into(),
            file_name: file.to_uppercase(),
            user_id: user.map(String::from),
            user_name: None,
            user_email: None,
            action,
            url: String::new(),
            metadata: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_own_edits_kept_unrelated_dropped() {
        let events = vec![
            event(Action::Edit, "f1", Some("me"), &[]),
            event(Action::Edit, "f2", Some("other"), &[]),
            event(Action::Comment, "f3", Some("other"), &[(meta::COMMENT_ID, "c1")]),
        ];
        let kept = filter_relevant(events, "me");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].file_key, "f1");
    }

    #[test]
    fn test_comments_on_edited_file_and_replies() {
        let events = vec![
            // comment appears before the edit that makes it relevant
            event(Action::Comment, "f1", Some("other"), &[(meta::COMMENT_ID, "c0")]),
            event(Action::Edit, "f1", Some("me"), &[]),
            event(Action::Comment, "f2", Some("me"), &[(meta::COMMENT_ID, "c1")]),
            event(
                Action::Comment,
                "f2",
                Some("other"),
                &[(meta::COMMENT_ID, "c2"), (meta::PARENT_ID, "c1")],
            ),
            // reply to a reply is not followed
            event(
                Action::Comment,
                "f2",
                Some("third"),
                &[(meta::COMMENT_ID, "c3"), (meta::PARENT_ID, "c2")],
            ),
            event(Action::Comment, "f9", None, &[(meta::COMMENT_ID, "c4")]),
        ];

        let kept: Vec<_> = filter_relevant(events, "me")
            .into_iter()
            .map(|e| e.meta(meta::COMMENT_ID).unwrap_or("edit").to_string())
            .collect();
        assert_eq!(kept, vec!["c0", "edit", "c1", "c2"]);
    }

    #[test]
    fn test_other_actions_and_empty_identity() {
        let events = vec![
            event(Action::Publish, "f1", Some("me"), &[]),
            event(Action::Edit, "f1", None, &[]),
        ];
        assert!(filter_relevant(events.clone(), "me").is_empty());
        assert!(filter_relevant(events, "").is_empty());
    }
}
