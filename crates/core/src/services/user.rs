//! User, privacy, blocking, contacts and reports.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use twinchat_common::{AppError, AppResult, BestEffort, IdGenerator, Region, now_millis};
use twinchat_store::models::{
    BlockRelation, ContactRelation, ContactStatus, Record, Report, ReportStatus, ReportType,
    User, UserStatus,
};
use twinchat_store::{DocumentStore, Query, Repository, patch};

use super::permission::SocialGraph;
use super::verification::normalize_email;

/// Maximum length of a report reason.
pub const MAX_REPORT_REASON_LEN: usize = 2000;

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Input for updating a profile. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Per-user privacy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub allow_non_friend_messages: bool,
}

/// Input for filing a report.
#[derive(Debug, Clone)]
pub struct CreateReportInput {
    pub reported_user_id: String,
    pub report_type: ReportType,
    pub reason: String,
}

/// Input for an admin report update.
#[derive(Debug, Clone)]
pub struct UpdateReportInput {
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
}

/// Result of a status change. The home-region write is authoritative; the
/// mirror to the other region is best-effort.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub user: User,
    pub mirror: BestEffort,
}

/// User-facing account and relationship operations.
#[async_trait]
pub trait UserService: SocialGraph {
    /// Region this service writes to.
    fn region(&self) -> Region;

    /// Create a user. Emails are unique per region.
    async fn create_user(&self, input: CreateUserInput) -> AppResult<User>;

    /// Get a user by ID.
    async fn get_user(&self, user_id: &str) -> AppResult<User>;

    /// Find a user by (normalized) email.
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Update profile fields.
    async fn update_profile(&self, user_id: &str, input: UpdateProfileInput) -> AppResult<User>;

    /// Set presence status.
    async fn update_status(&self, user_id: &str, status: UserStatus) -> AppResult<StatusChange>;

    /// Record that the user is active.
    async fn heartbeat(&self, user_id: &str) -> AppResult<()>;

    async fn get_privacy_settings(&self, user_id: &str) -> AppResult<PrivacySettings>;

    async fn update_privacy_settings(
        &self,
        user_id: &str,
        settings: PrivacySettings,
    ) -> AppResult<PrivacySettings>;

    /// Block a user. Blocking twice returns the existing relation.
    /// Contact edges are kept; the block only gates permission checks and
    /// new contact requests while it exists.
    async fn block_user(
        &self,
        blocker_id: &str,
        blocked_id: &str,
        reason: Option<String>,
    ) -> AppResult<BlockRelation>;

    /// Remove a block. Returns whether one existed.
    async fn unblock_user(&self, blocker_id: &str, blocked_id: &str) -> AppResult<bool>;

    /// Blocks created by the user, newest first.
    async fn get_blocked_users(&self, user_id: &str) -> AppResult<Vec<BlockRelation>>;

    async fn create_report(&self, reporter_id: &str, input: CreateReportInput) -> AppResult<Report>;

    /// All reports, optionally filtered by status. Admins only.
    async fn get_all_reports(
        &self,
        admin_id: &str,
        status: Option<ReportStatus>,
    ) -> AppResult<Vec<Report>>;

    /// Resolve or dismiss a report. Admins only; `Pending` is rejected.
    async fn update_report(
        &self,
        admin_id: &str,
        report_id: &str,
        input: UpdateReportInput,
    ) -> AppResult<Report>;

    /// Send a contact request. A pending request in the other direction is
    /// accepted instead.
    async fn send_friend_request(
        &self,
        requester_id: &str,
        addressee_id: &str,
    ) -> AppResult<ContactRelation>;

    /// Accept a pending request from `requester_id`.
    async fn accept_friend_request(
        &self,
        user_id: &str,
        requester_id: &str,
    ) -> AppResult<ContactRelation>;

    /// Drop the contact edge in both directions. Returns whether one existed.
    async fn remove_friend(&self, user_id: &str, other_id: &str) -> AppResult<bool>;

    /// Accepted contacts, most recently accepted first.
    async fn get_friends(&self, user_id: &str) -> AppResult<Vec<ContactRelation>>;

    /// Pending requests addressed to the user.
    async fn get_pending_requests(&self, user_id: &str) -> AppResult<Vec<ContactRelation>>;

    /// Whether the users are accepted contacts.
    async fn check_friend_relation(&self, user_a: &str, user_b: &str) -> AppResult<bool>;
}

/// [`UserService`] over a region's document store.
#[derive(Clone)]
pub struct StoreUserService {
    users: Repository<User>,
    blocks: Repository<BlockRelation>,
    contacts: Repository<ContactRelation>,
    reports: Repository<Report>,
    /// The other region's store, for status mirroring.
    mirror: Option<Arc<dyn DocumentStore>>,
    id_gen: IdGenerator,
}

impl StoreUserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, mirror: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            users: Repository::new(Arc::clone(&store)),
            blocks: Repository::new(Arc::clone(&store)),
            contacts: Repository::new(Arc::clone(&store)),
            reports: Repository::new(store),
            mirror,
            id_gen: IdGenerator::new(),
        }
    }

    async fn require_user(&self, user_id: &str) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn require_admin(&self, admin_id: &str) -> AppResult<User> {
        let admin = self.require_user(admin_id).await?;
        if !admin.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(admin)
    }

    async fn contact_edge(&self, from: &str, to: &str) -> AppResult<Option<ContactRelation>> {
        self.contacts.find_by_id(&self.id_gen.pair_id(from, to)).await
    }

    async fn accept_edge(&self, edge: ContactRelation) -> AppResult<ContactRelation> {
        if edge.status == ContactStatus::Accepted {
            return Ok(edge);
        }
        let accepted = self
            .contacts
            .update(
                &edge.id,
                patch(json!({ "status": ContactStatus::Accepted, "accepted_at": now_millis() })),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;
        info!(requester_id = %accepted.requester_id, addressee_id = %accepted.addressee_id, "Contact request accepted");
        Ok(accepted)
    }

    async fn mirror_status(&self, user_id: &str, status: UserStatus, at: i64) -> BestEffort {
        let Some(mirror) = &self.mirror else {
            return BestEffort::Skipped("no peer region configured".to_string());
        };

        match mirror
            .update(
                User::COLLECTION,
                user_id,
                patch(json!({ "status": status, "last_seen_at": at })),
            )
            .await
        {
            Ok(Some(_)) => BestEffort::Applied,
            Ok(None) => BestEffort::Skipped(format!("user not present in {}", mirror.region())),
            Err(e) => BestEffort::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl SocialGraph for StoreUserService {
    async fn is_blocked_between(&self, user_a: &str, user_b: &str) -> AppResult<bool> {
        if self
            .blocks
            .find_by_id(&self.id_gen.pair_id(user_a, user_b))
            .await?
            .is_some()
        {
            return Ok(true);
        }
        Ok(self
            .blocks
            .find_by_id(&self.id_gen.pair_id(user_b, user_a))
            .await?
            .is_some())
    }

    async fn allows_non_friend_messages(&self, user_id: &str) -> AppResult<Option<bool>> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .map(|u| u.allow_non_friend_messages))
    }

    async fn are_friends(&self, user_a: &str, user_b: &str) -> AppResult<bool> {
        for (from, to) in [(user_a, user_b), (user_b, user_a)] {
            if self
                .contact_edge(from, to)
                .await?
                .is_some_and(|e| e.status == ContactStatus::Accepted)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl UserService for StoreUserService {
    fn region(&self) -> Region {
        self.users.region()
    }

    async fn create_user(&self, input: CreateUserInput) -> AppResult<User> {
        let email = normalize_email(&input.email)?;
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }

        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let user = User {
            id: self.id_gen.generate(),
            email,
            username,
            full_name: input.full_name,
            avatar_url: input.avatar_url,
            status: UserStatus::Offline,
            last_seen_at: None,
            region: self.region(),
            allow_non_friend_messages: true,
            is_admin: false,
            created_at: now_millis(),
            updated_at: None,
        };

        let user = self.users.create(&user).await?;
        info!(user_id = %user.id, region = %user.region, "User created");
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> AppResult<User> {
        self.require_user(user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = normalize_email(email)?;
        self.users.find_one(Query::new().eq("email", email)).await
    }

    async fn update_profile(&self, user_id: &str, input: UpdateProfileInput) -> AppResult<User> {
        let mut changes = json!({ "updated_at": now_millis() });
        if let Some(username) = input.username {
            let username = username.trim().to_string();
            if username.is_empty() {
                return Err(AppError::Validation("Username cannot be empty".to_string()));
            }
            changes["username"] = json!(username);
        }
        if let Some(full_name) = input.full_name {
            changes["full_name"] = json!(full_name);
        }
        if let Some(avatar_url) = input.avatar_url {
            changes["avatar_url"] = json!(avatar_url);
        }

        self.users
            .update(user_id, patch(changes))
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn update_status(&self, user_id: &str, status: UserStatus) -> AppResult<StatusChange> {
        let now = now_millis();
        let user = self
            .users
            .update(
                user_id,
                patch(json!({ "status": status, "last_seen_at": now, "updated_at": now })),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let mirror = self.mirror_status(user_id, status, now).await;
        mirror.log("user.status.mirror");

        Ok(StatusChange { user, mirror })
    }

    async fn heartbeat(&self, user_id: &str) -> AppResult<()> {
        self.users
            .update(user_id, patch(json!({ "last_seen_at": now_millis() })))
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn get_privacy_settings(&self, user_id: &str) -> AppResult<PrivacySettings> {
        let user = self.require_user(user_id).await?;
        Ok(PrivacySettings {
            allow_non_friend_messages: user.allow_non_friend_messages,
        })
    }

    async fn update_privacy_settings(
        &self,
        user_id: &str,
        settings: PrivacySettings,
    ) -> AppResult<PrivacySettings> {
        let user = self
            .users
            .update(
                user_id,
                patch(json!({
                    "allow_non_friend_messages": settings.allow_non_friend_messages,
                    "updated_at": now_millis(),
                })),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        debug!(user_id, allow = user.allow_non_friend_messages, "Privacy settings updated");
        Ok(PrivacySettings {
            allow_non_friend_messages: user.allow_non_friend_messages,
        })
    }

    async fn block_user(
        &self,
        blocker_id: &str,
        blocked_id: &str,
        reason: Option<String>,
    ) -> AppResult<BlockRelation> {
        // Cannot block yourself
        if blocker_id == blocked_id {
            return Err(AppError::BadRequest("Cannot block yourself".to_string()));
        }
        self.require_user(blocked_id).await?;

        let id = self.id_gen.pair_id(blocker_id, blocked_id);
        if let Some(existing) = self.blocks.find_by_id(&id).await? {
            return Ok(existing);
        }

        let relation = BlockRelation {
            id: id.clone(),
            blocker_id: blocker_id.to_string(),
            blocked_id: blocked_id.to_string(),
            reason: reason.filter(|r| !r.trim().is_empty()),
            created_at: now_millis(),
        };

        let relation = match self.blocks.create(&relation).await {
            Ok(created) => created,
            // Lost a race with an identical request
            Err(AppError::Conflict(_)) => self
                .blocks
                .find_by_id(&id)
                .await?
                .ok_or_else(|| AppError::Storage("block vanished after conflict".to_string()))?,
            Err(e) => return Err(e),
        };

        info!(blocker_id, blocked_id, "User blocked");
        Ok(relation)
    }

    async fn unblock_user(&self, blocker_id: &str, blocked_id: &str) -> AppResult<bool> {
        let removed = self
            .blocks
            .delete(&self.id_gen.pair_id(blocker_id, blocked_id))
            .await?;
        if removed {
            info!(blocker_id, blocked_id, "User unblocked");
        }
        Ok(removed)
    }

    async fn get_blocked_users(&self, user_id: &str) -> AppResult<Vec<BlockRelation>> {
        self.blocks
            .find(
                &Query::new()
                    .eq("blocker_id", user_id)
                    .order_desc("created_at"),
            )
            .await
    }

    async fn create_report(&self, reporter_id: &str, input: CreateReportInput) -> AppResult<Report> {
        if reporter_id == input.reported_user_id {
            return Err(AppError::BadRequest("Cannot report yourself".to_string()));
        }
        let reason = input.reason.trim().to_string();
        if reason.is_empty() || reason.chars().count() > MAX_REPORT_REASON_LEN {
            return Err(AppError::Validation(format!(
                "Reason must be 1-{MAX_REPORT_REASON_LEN} characters"
            )));
        }
        self.require_user(&input.reported_user_id).await?;

        let report = Report {
            id: self.id_gen.generate(),
            reporter_id: reporter_id.to_string(),
            reported_user_id: input.reported_user_id,
            report_type: input.report_type,
            reason,
            status: ReportStatus::Pending,
            admin_notes: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now_millis(),
            updated_at: None,
        };

        let report = self.reports.create(&report).await?;
        info!(report_id = %report.id, reporter_id, "Report filed");
        Ok(report)
    }

    async fn get_all_reports(
        &self,
        admin_id: &str,
        status: Option<ReportStatus>,
    ) -> AppResult<Vec<Report>> {
        self.require_admin(admin_id).await?;

        let mut query = Query::new();
        if let Some(status) = status {
            query = query.eq("status", status.as_str());
        }
        self.reports.find(&query.order_desc("created_at")).await
    }

    async fn update_report(
        &self,
        admin_id: &str,
        report_id: &str,
        input: UpdateReportInput,
    ) -> AppResult<Report> {
        self.require_admin(admin_id).await?;

        if input.status == ReportStatus::Pending {
            return Err(AppError::Validation(
                "Report status must be resolved or dismissed".to_string(),
            ));
        }

        let now = now_millis();
        let mut changes = json!({
            "status": input.status,
            "updated_at": now,
            "resolved_by": admin_id,
            "resolved_at": now,
        });
        if let Some(notes) = input.admin_notes {
            changes["admin_notes"] = json!(notes);
        }

        let report = self
            .reports
            .update(report_id, patch(changes))
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;

        info!(report_id, admin_id, status = report.status.as_str(), "Report updated");
        Ok(report)
    }

    async fn send_friend_request(
        &self,
        requester_id: &str,
        addressee_id: &str,
    ) -> AppResult<ContactRelation> {
        if requester_id == addressee_id {
            return Err(AppError::BadRequest(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }
        self.require_user(addressee_id).await?;

        if self.is_blocked_between(requester_id, addressee_id).await? {
            return Err(AppError::PermissionDenied("blocked".to_string()));
        }

        if let Some(existing) = self.contact_edge(requester_id, addressee_id).await? {
            return Ok(existing);
        }
        if let Some(reverse) = self.contact_edge(addressee_id, requester_id).await? {
            return self.accept_edge(reverse).await;
        }

        let edge = ContactRelation {
            id: self.id_gen.pair_id(requester_id, addressee_id),
            requester_id: requester_id.to_string(),
            addressee_id: addressee_id.to_string(),
            status: ContactStatus::Pending,
            created_at: now_millis(),
            accepted_at: None,
        };

        match self.contacts.create(&edge).await {
            Ok(created) => {
                info!(requester_id, addressee_id, "Contact request sent");
                Ok(created)
            }
            Err(AppError::Conflict(_)) => self
                .contacts
                .find_by_id(&edge.id)
                .await?
                .ok_or_else(|| AppError::Storage("contact vanished after conflict".to_string())),
            Err(e) => Err(e),
        }
    }

    async fn accept_friend_request(
        &self,
        user_id: &str,
        requester_id: &str,
    ) -> AppResult<ContactRelation> {
        let edge = self
            .contact_edge(requester_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;
        if edge.status == ContactStatus::Pending
            && self.is_blocked_between(user_id, requester_id).await?
        {
            return Err(AppError::PermissionDenied("blocked".to_string()));
        }
        self.accept_edge(edge).await
    }

    async fn remove_friend(&self, user_id: &str, other_id: &str) -> AppResult<bool> {
        let mut removed = false;
        for (from, to) in [(user_id, other_id), (other_id, user_id)] {
            removed |= self.contacts.delete(&self.id_gen.pair_id(from, to)).await?;
        }
        Ok(removed)
    }

    async fn get_friends(&self, user_id: &str) -> AppResult<Vec<ContactRelation>> {
        let mut friends = self
            .contacts
            .find(
                &Query::new()
                    .eq("requester_id", user_id)
                    .eq("status", "accepted"),
            )
            .await?;
        friends.extend(
            self.contacts
                .find(
                    &Query::new()
                        .eq("addressee_id", user_id)
                        .eq("status", "accepted"),
                )
                .await?,
        );
        friends.sort_by(|a, b| b.accepted_at.cmp(&a.accepted_at));
        Ok(friends)
    }

    async fn get_pending_requests(&self, user_id: &str) -> AppResult<Vec<ContactRelation>> {
        self.contacts
            .find(
                &Query::new()
                    .eq("addressee_id", user_id)
                    .eq("status", "pending")
                    .order_desc("created_at"),
            )
            .await
    }

    async fn check_friend_relation(&self, user_a: &str, user_b: &str) -> AppResult<bool> {
        self.are_friends(user_a, user_b).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub mod testing {
    //! Seeding helpers shared by service tests.

    use super::*;

    pub async fn seed_user(users: &dyn UserService, name: &str) -> User {
        users
            .create_user(CreateUserInput {
                email: format!("{name}@example.com"),
                username: name.to_string(),
                full_name: None,
                avatar_url: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_admin(store: &Arc<dyn DocumentStore>, users: &dyn UserService) -> User {
        let admin = seed_user(users, "admin").await;
        store
            .update(User::COLLECTION, &admin.id, patch(json!({ "is_admin": true })))
            .await
            .unwrap();
        users.get_user(&admin.id).await.unwrap()
    }
}
