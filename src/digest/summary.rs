//! Renders events into chat-ready text.
//!
//! Two shapes: one line per event, or a daily recap grouped by user,
//! project and account.

use std::collections::HashMap;

use crate::models::{Action, ActivityEvent};

pub const UNKNOWN_USER: &str = "Unknown User";

/// Dimension for [`group_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    User,
    Project,
    Account,
}

#[derive(Debug, Clone)]
pub struct SummaryGenerator {
    source_label: String,
}

impl SummaryGenerator {
    pub fn new(source_label: &str) -> Self {
        Self {
            source_label: source_label.to_string(),
        }
    }

    /// `[SOURCE][account] YYYY-MM-DD HH:MM – project • user – action "file" <link>`
    pub fn generate_per_event_summaries(&self, events: &[ActivityEvent]) -> Vec<String> {
        events.iter().map(|e| self.event_line(e)).collect()
    }

    pub fn event_line(&self, event: &ActivityEvent) -> String {
        format!(
            "[{}][{}] {} – {} • {} – {} \"{}\" <{}>",
            self.source_label,
            event.account,
            event.ts.format("%Y-%m-%d %H:%M"),
            event.project_name,
            user_label(event),
            action_phrase(&event.action),
            event.file_name,
            event.url,
        )
    }

    pub fn generate_daily_recap(&self, events: &[ActivityEvent], date_label: &str) -> String {
        if events.is_empty() {
            return format!("[{}] Daily recap for {}: no activity.", self.source_label, date_label);
        }

        let by_account = group_events(events, GroupBy::Account);
        let mut out = format!(
            "[{}] Daily recap for {}\n{} {} across {} {}\n",
            self.source_label,
            date_label,
            events.len(),
            if events.len() == 1 { "event" } else { "events" },
            by_account.len(),
            if by_account.len() == 1 { "account" } else { "accounts" },
        );

        out.push_str("\nBy user:\n");
        for (user, group) in group_events(events, GroupBy::User) {
            out.push_str(&format!(
                "• {}: {} ({})\n",
                user,
                group.len(),
                action_breakdown(&group)
            ));
        }

        out.push_str("\nBy project:\n");
        for (project, group) in group_events(events, GroupBy::Project) {
            out.push_str(&format!("• {}: {}\n", project, group.len()));
        }

        out.push_str("\nBy account:\n");
        for (account, group) in by_account {
            out.push_str(&format!("• {}: {}\n", account, group.len()));
        }

        out.trim_end().to_string()
    }
}

/// Stable multi-map keyed by `by`, sorted by descending group size. Ties
/// keep the order in which their key was first seen.
pub fn group_events(events: &[ActivityEvent], by: GroupBy) -> Vec<(String, Vec<&ActivityEvent>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&ActivityEvent>)> = Vec::new();

    for event in events {
        let key = match by {
            GroupBy::User => user_label(event).to_string(),
            GroupBy::Project => event.project_name.clone(),
            GroupBy::Account => event.account.clone(),
        };
        match index.get(&key) {
            Some(&i) => groups[i].1.push(event),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![event]));
            }
        }
    }

    // sort_by is stable
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}

/// Human phrase for an action; unmapped actions render raw.
pub fn action_phrase(action: &Action) -> &str {
    match action {
        Action::Edit => "edited",
        Action::Comment => "commented on",
        Action::Publish => "published",
        Action::Delete => "deleted",
        Action::Other(raw) => raw,
    }
}

/// `2 versions`, `1 comment`, ... Unmapped kinds use the lowercased name.
pub fn pluralize(action: &Action, count: usize) -> String {
    let (one, many) = match action {
        Action::Edit => ("version", "versions"),
        Action::Comment => ("comment", "comments"),
        Action::Publish => ("publish", "publishes"),
        Action::Delete => ("deletion", "deletions"),
        Action::Other(raw) => return format!("{} {}", count, raw.to_lowercase()),
    };
    format!("{} {}", count, if count == 1 { one } else { many })
}

fn action_breakdown(group: &[&ActivityEvent]) -> String {
    let mut counts: Vec<(&Action, usize)> = Vec::new();
    for event in group {
        match counts.iter().position(|(a, _)| **a == event.action) {
            Some(i) => counts[i].1 += 1,
            None => counts.push((&event.action, 1)),
        }
    }
    counts
        .into_iter()
        .map(|(action, n)| pluralize(action, n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn user_label(event: &ActivityEvent) -> &str {
    event
        .user_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_USER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn event(account: &str, project: &str, user: Option<&str>, action: Action, ts: &str) -> ActivityEvent {
        ActivityEvent {
            ts: DateTime::parse_from_rfc3339(ts).unwrap(),
            account: account.into(),
            project_id: project.to_lowercase(),
            project_name: project.into(),
            file_key: "k1".into(),
            file_name: "Landing".into(),
            user_id: user.map(|u| u.to_lowercase()),
            user_name: user.map(String::from),
            user_email: None,
            action,
            url: "https://www.figma.com/file/k1".into(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_event_line_uses_local_calendar_fields() {
        let gen = SummaryGenerator::new("FIGMA");
        let e = event("work", "Website", Some("Ada"), Action::Edit, "2024-05-01T23:30:00-05:00");
        assert_eq!(
            gen.event_line(&e),
            "[FIGMA][work] 2024-05-01 23:30 – Website • Ada – edited \"Landing\" <https://www.figma.com/file/k1>"
        );
    }

    #[test]
    fn test_unknown_user_and_raw_action() {
        let gen = SummaryGenerator::new("FIGMA");
        let e = event("work", "Website", None, Action::Other("FILE_RENAMED".into()), "2024-05-01T10:00:00Z");
        let lines = gen.generate_per_event_summaries(&[e]);
        assert!(lines[0].contains("• Unknown User – FILE_RENAMED \"Landing\""));
    }

    #[test]
    fn test_group_events_sorted_by_count_ties_stable() {
        let ts = "2024-05-01T10:00:00Z";
        let events = vec![
            event("a", "Alpha", Some("Bo"), Action::Edit, ts),
            event("a", "Beta", Some("Ada"), Action::Edit, ts),
            event("b", "Beta", Some("Ada"), Action::Comment, ts),
            event("b", "Gamma", None, Action::Comment, ts),
        ];

        let users: Vec<(String, usize)> = group_events(&events, GroupBy::User)
            .into_iter()
            .map(|(k, g)| (k, g.len()))
            .collect();
        assert_eq!(
            users,
            vec![
                (String::from("Ada"), 2),
                (String::from("Bo"), 1),
                (String::from(UNKNOWN_USER), 1)
            ]
        );

        let projects: Vec<String> = group_events(&events, GroupBy::Project)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(projects, vec!["Beta", "Alpha", "Gamma"]);
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(&Action::Edit, 1), "1 version");
        assert_eq!(pluralize(&Action::Edit, 2), "2 versions");
        assert_eq!(pluralize(&Action::Comment, 3), "3 comments");
        assert_eq!(pluralize(&Action::Publish, 2), "2 publishes");
        assert_eq!(pluralize(&Action::Delete, 1), "1 deletion");
        assert_eq!(pluralize(&Action::Other("BRANCH_MERGE".into()), 4), "4 branch_merge");
    }

    #[test]
    fn test_daily_recap_sections() {
        let gen = SummaryGenerator::new("FIGMA");
        let ts = "2024-05-01T10:00:00Z";
        let events = vec![
            event("work", "Website", Some("Ada"), Action::Edit, ts),
            event("work", "Website", Some("Ada"), Action::Edit, ts),
            event("side", "App", Some("Ada"), Action::Comment, ts),
        ];
        let recap = gen.generate_daily_recap(&events, "2024-05-01");
        assert!(recap.starts_with("[FIGMA] Daily recap for 2024-05-01\n3 events across 2 accounts"));
        assert!(recap.contains("• Ada: 3 (2 versions, 1 comment)"));
        assert!(recap.contains("By project:\n• Website: 2\n• App: 1"));
        assert!(recap.contains("By account:\n• work: 2\n• side: 1"));

        let empty = gen.generate_daily_recap(&[], "2024-05-01");
        assert!(empty.contains("no activity"));
    }
}
