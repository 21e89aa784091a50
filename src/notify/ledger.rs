use crate::models::ticket::JiraTicket;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Remembers recently notified assignments.
///
/// Each poll looks further back than the poll interval, so one assignment
/// shows up in consecutive polls; the webhook may report it as well.
#[derive(Debug)]
pub struct NotificationLedger {
    ttl: Duration,
    seen: HashMap<String, DateTime<Utc>>,
}

impl NotificationLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Long enough to cover every poll window an assignment can appear in.
    pub fn for_polling(interval_minutes: u64, lookback_minutes: u64) -> Self {
        let minutes = (interval_minutes + lookback_minutes).max(10);
        Self::new(Duration::minutes(minutes as i64))
    }

    /// Returns `true` if `key` was not seen within the TTL, and marks it seen.
    pub fn record(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        self.prune(now);
        if self.seen.contains_key(key) {
            return false;
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    /// Drops `key` so a failed delivery is retried on the next poll.
    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.seen.retain(|_, at| now - *at < ttl);
    }
}

/// Identity of an assignment: the ticket plus who it went to.
pub fn assignment_key(ticket: &JiraTicket) -> Option<String> {
    let assignee = ticket.fields.assignee.as_ref()?;
    let who = if assignee.account_id.is_empty() {
        assignee.email_address.as_deref()?
    } else {
        assignee.account_id.as_str()
    };
    Some(format!("{}:{}", ticket.key, who))
}
