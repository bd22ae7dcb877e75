//! Whether one user may message another.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use twinchat_common::{AppError, AppResult};

/// Relationship lookups the permission check depends on.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Whether either user blocks the other.
    async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> AppResult<bool>;

    /// The user's `allow_non_friend_messages` flag, `None` if the user
    /// does not exist.
    async fn allows_non_friend_messages(&self, user_id: &str) -> AppResult<Option<bool>>;

    /// Whether an accepted contact exists in either direction.
    async fn are_friends(&self, user_a: &str, user_b: &str) -> AppResult<bool>;
}

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Blocked,
    NotAContact,
    TargetNotFound,
}

impl DenyReason {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::NotAContact => "not a contact",
            Self::TargetNotFound => "target not found",
        }
    }
}

/// Result of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl PermissionDecision {
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    #[must_use]
    pub const fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }

    /// Turn a denial into [`AppError::PermissionDenied`].
    pub fn into_result(self) -> AppResult<()> {
        match self.reason {
            Some(reason) if !self.allowed => {
                Err(AppError::PermissionDenied(reason.message().to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Evaluates block state, then the target's privacy flag.
#[derive(Clone)]
pub struct ChatPermissionEngine {
    graph: Arc<dyn SocialGraph>,
}

impl ChatPermissionEngine {
    #[must_use]
    pub fn new(graph: Arc<dyn SocialGraph>) -> Self {
        Self { graph }
    }

    /// Decide whether `sender_id` may message `target_id`.
    ///
    /// A block in either direction always denies. Otherwise, a target that
    /// disallows non-friend messages only accepts accepted contacts. Lookup
    /// failures are returned as errors, never as an allow.
    pub async fn check(
        &self,
        sender_id: &str,
        target_id: &str,
        workspace_id: Option<&str>,
    ) -> AppResult<PermissionDecision> {
        let decision = self.evaluate(sender_id, target_id).await?;
        debug!(
            sender_id,
            target_id,
            workspace_id,
            allowed = decision.allowed,
            reason = decision.reason.map(DenyReason::message),
            "Chat permission evaluated"
        );
        Ok(decision)
    }

    async fn evaluate(&self, sender_id: &str, target_id: &str) -> AppResult<PermissionDecision> {
        if self.graph.is_blocked_between(sender_id, target_id).await? {
            return Ok(PermissionDecision::deny(DenyReason::Blocked));
        }

        match self.graph.allows_non_friend_messages(target_id).await? {
            None => Ok(PermissionDecision::deny(DenyReason::TargetNotFound)),
            Some(true) => Ok(PermissionDecision::allow()),
            Some(false) => {
                if self.graph.are_friends(sender_id, target_id).await? {
                    Ok(PermissionDecision::allow())
                } else {
                    Ok(PermissionDecision::deny(DenyReason::NotAContact))
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct Graph {
        blocks: HashSet<(String, String)>,
        friends: HashSet<(String, String)>,
        privacy: HashMap<String, bool>,
        broken: bool,
    }

    impl Graph {
        fn user(mut self, id: &str, allow_non_friends: bool) -> Self {
            self.privacy.insert(id.to_string(), allow_non_friends);
            self
        }

        fn block(mut self, blocker: &str, blocked: &str) -> Self {
            self.blocks.insert((blocker.to_string(), blocked.to_string()));
            self
        }

        fn friends(mut self, a: &str, b: &str) -> Self {
            self.friends.insert((a.to_string(), b.to_string()));
            self
        }
    }

    #[async_trait]
    impl SocialGraph for Graph {
        async fn is_blocked_between(&self, a: &str, b: &str) -> AppResult<bool> {
            if self.broken {
                return Err(AppError::Storage("unreachable".to_string()));
            }
            Ok(self.blocks.contains(&(a.to_string(), b.to_string()))
                || self.blocks.contains(&(b.to_string(), a.to_string())))
        }

        async fn allows_non_friend_messages(&self, user_id: &str) -> AppResult<Option<bool>> {
            Ok(self.privacy.get(user_id).copied())
        }

        async fn are_friends(&self, a: &str, b: &str) -> AppResult<bool> {
            Ok(self.friends.contains(&(a.to_string(), b.to_string()))
                || self.friends.contains(&(b.to_string(), a.to_string())))
        }
    }

    fn engine(graph: Graph) -> ChatPermissionEngine {
        ChatPermissionEngine::new(Arc::new(graph))
    }

    #[tokio::test]
    async fn test_block_denies_both_directions() {
        let engine = engine(Graph::default().user("a", true).user("b", true).block("a", "b"));

        let forward = engine.check("a", "b", None).await.unwrap();
        let backward = engine.check("b", "a", Some("ws1")).await.unwrap();
        assert_eq!(forward, PermissionDecision::deny(DenyReason::Blocked));
        assert_eq!(backward, PermissionDecision::deny(DenyReason::Blocked));
    }

    #[tokio::test]
    async fn test_block_overrides_friendship_and_privacy() {
        let engine = engine(
            Graph::default()
                .user("a", true)
                .user("b", true)
                .friends("a", "b")
                .block("b", "a"),
        );
        let decision = engine.check("a", "b", None).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::Blocked));
    }

    #[tokio::test]
    async fn test_private_target_requires_contact() {
        let engine = engine(Graph::default().user("a", true).user("b", false).user("c", true));

        let decision = engine.check("a", "b", None).await.unwrap();
        assert_eq!(decision, PermissionDecision::deny(DenyReason::NotAContact));
        assert_eq!(
            decision.into_result().unwrap_err().to_string(),
            AppError::PermissionDenied("not a contact".to_string()).to_string()
        );

        // the sender's own setting is irrelevant
        assert!(engine.check("b", "c", None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_private_target_accepts_friends_either_direction() {
        let engine = engine(Graph::default().user("a", true).user("b", false).friends("b", "a"));
        assert_eq!(engine.check("a", "b", None).await.unwrap(), PermissionDecision::allow());
    }

    #[tokio::test]
    async fn test_unknown_target_is_denied() {
        let engine = engine(Graph::default().user("a", true));
        let decision = engine.check("a", "ghost", None).await.unwrap();
        assert_eq!(decision.reason, Some(DenyReason::TargetNotFound));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error() {
        let engine = engine(Graph {
            broken: true,
            ..Graph::default()
        });
        assert!(engine.check("a", "b", None).await.is_err());
    }
}
