//! Process-wide cache of the Slack user group whose members may perform privileged actions.

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::slack::{SlackClient, SlackError};

/// Members of one Slack user group, fetched lazily and replaced wholesale on refresh.
///
/// The cache never expires on its own; call [`AdminCache::refresh`] to pick up changes.
#[derive(Debug)]
pub struct AdminCache {
    group_id: String,
    members: RwLock<Vec<String>>,
}

impl AdminCache {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            members: RwLock::new(Vec::new()),
        }
    }

    /// Reports whether `user_id` belongs to the admin group.
    ///
    /// An empty cache is filled first. When that fetch fails the failure is logged and the answer
    /// is `false`.
    pub async fn is_member(&self, slack: &dyn SlackClient, user_id: &str) -> bool {
        {
            let members = self.members.read().await;
            if !members.is_empty() {
                return members.iter().any(|m| m == user_id);
            }
        }

        let mut members = self.members.write().await;
        // another caller may have filled the cache while we waited for the write lock
        if members.is_empty() {
            match slack.user_group_members(&self.group_id).await {
                Ok(fetched) => *members = fetched,
                Err(err) => {
                    warn!(error = %err, group_id = %self.group_id, "failed to refresh admin group");
                    return false;
                }
            }
        }
        members.iter().any(|m| m == user_id)
    }

    /// Fetches the group and replaces the cached list. On failure the previous list is kept.
    pub async fn refresh(&self, slack: &dyn SlackClient) -> Result<usize, SlackError> {
        let fetched = slack.user_group_members(&self.group_id).await?;
        let count = fetched.len();
        *self.members.write().await = fetched;
        debug!(group_id = %self.group_id, count, "admin group refreshed");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testkit::RecordingSlackClient;

    #[tokio::test]
    async fn fresh_cache_refreshes_once_then_answers_from_memory() {
        let slack = RecordingSlackClient::new().with_group("S1", &["user1", "user2", "user3"]);
        let cache = AdminCache::new("S1");

        assert!(cache.is_member(&slack, "user2").await);
        assert!(!cache.is_member(&slack, "other").await);
        assert!(cache.is_member(&slack, "user3").await);
        assert_eq!(slack.count("usergroups.users.list"), 1);
    }

    #[tokio::test]
    async fn failing_refresh_fails_closed() {
        let slack = RecordingSlackClient::new().with_group("S1", &["user1"]);
        slack.fail("usergroups.users.list", "no_such_subteam");
        let cache = AdminCache::new("S1");

        assert!(!cache.is_member(&slack, "user1").await);
        assert_eq!(slack.count("usergroups.users.list"), 1);

        slack.recover("usergroups.users.list");
        assert!(cache.is_member(&slack, "user1").await);
        assert_eq!(slack.count("usergroups.users.list"), 2);
    }

    #[tokio::test]
    async fn refresh_replaces_list_wholesale() {
        let slack = RecordingSlackClient::new().with_group("S1", &["user1", "user2"]);
        let cache = AdminCache::new("S1");
        assert_eq!(cache.refresh(&slack).await.unwrap(), 2);
        assert!(cache.is_member(&slack, "user2").await);

        let slack = RecordingSlackClient::new().with_group("S1", &["user9"]);
        assert_eq!(cache.refresh(&slack).await.unwrap(), 1);
        assert!(cache.is_member(&slack, "user9").await);
        assert!(!cache.is_member(&slack, "user1").await);
        assert_eq!(slack.count("usergroups.users.list"), 1);
    }

    #[tokio::test]
    async fn failed_explicit_refresh_keeps_previous_members() {
        let slack = RecordingSlackClient::new().with_group("S1", &["user1"]);
        let cache = AdminCache::new("S1");
        cache.refresh(&slack).await.unwrap();

        slack.fail("usergroups.users.list", "ratelimited");
        assert!(cache.refresh(&slack).await.is_err());
        assert!(cache.is_member(&slack, "user1").await);
    }

    #[tokio::test]
    async fn concurrent_checks_on_empty_cache_share_one_refresh() {
        let slack = Arc::new(RecordingSlackClient::new().with_group("S1", &["user1"]));
        let cache = Arc::new(AdminCache::new("S1"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let slack = Arc::clone(&slack);
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.is_member(slack.as_ref(), "user1").await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(slack.count("usergroups.users.list"), 1);
    }
}
