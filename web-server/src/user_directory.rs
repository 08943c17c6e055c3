// web-server/src/user_directory.rs
use actix::{Actor, Context, Handler, Message, MessageResult};
use chrono::{DateTime, Utc};
use common::{Identity, IdentityId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// User record held by the realtime platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: IdentityId,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformUser {
    pub fn from_identity(identity: &Identity) -> Self {
        let now = Utc::now();
        Self {
            id: identity.id.clone(),
            name: identity.display_name.clone(),
            image: identity.avatar_url.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Channel record with its membership
#[derive(Debug, Clone)]
struct Channel {
    discoverable: bool,
    members: BTreeSet<IdentityId>,
}

/// Actor message: Insert or update a user record
#[derive(Message)]
#[rtype(result = "PlatformUser")]
pub struct UpsertUser {
    pub identity: Identity,
}

/// Actor message: Remove a user and its channel memberships
#[derive(Message)]
#[rtype(result = "bool")]
pub struct DeleteUser {
    pub id: IdentityId,
}

/// Actor message: Add a user to every discoverable channel.
/// Returns the ids of channels the user was newly added to, or `None` for
/// an unknown user.
#[derive(Message)]
#[rtype(result = "Option<Vec<String>>")]
pub struct AddToPublicChannels {
    pub user_id: IdentityId,
}

/// Actor message: Get directory metrics
#[derive(Message)]
#[rtype(result = "DirectoryMetrics")]
pub struct GetDirectoryMetrics;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryMetrics {
    pub users: usize,
    pub channels: usize,
    pub upserts: usize,
    pub deletions: usize,
}

/// Actor owning the platform's user and channel records.
///
/// One record per identity id; upserting the same id again updates the
/// existing record in place.
#[derive(Default)]
pub struct UserDirectoryActor {
    users: HashMap<IdentityId, PlatformUser>,
    channels: HashMap<String, Channel>,
    metrics: DirectoryMetrics,
}

impl UserDirectoryActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a channel; existing channels are left alone
    pub fn with_channel(mut self, id: impl Into<String>, discoverable: bool) -> Self {
        self.channels.entry(id.into()).or_insert_with(|| Channel {
            discoverable,
            members: BTreeSet::new(),
        });
        self
    }

    /// Seed discoverable channels
    pub fn with_public_channels<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().fold(self, |directory, id| directory.with_channel(id, true))
    }

    fn refresh_metrics(&mut self) {
        self.metrics.users = self.users.len();
        self.metrics.channels = self.channels.len();
    }
}

impl Actor for UserDirectoryActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("UserDirectoryActor started with {} channels", self.channels.len());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            "UserDirectoryActor stopped. {} users, {} upserts during lifetime",
            self.users.len(),
            self.metrics.upserts
        );
    }
}

impl Handler<UpsertUser> for UserDirectoryActor {
    type Result = MessageResult<UpsertUser>;

    fn handle(&mut self, msg: UpsertUser, _ctx: &mut Self::Context) -> Self::Result {
        let incoming = PlatformUser::from_identity(&msg.identity);

        let user = match self.users.get_mut(&incoming.id) {
            Some(existing) => {
                existing.name = incoming.name;
                existing.image = incoming.image;
                existing.updated_at = incoming.updated_at;
                tracing::debug!("Updated platform user: {}", existing.id);
                existing.clone()
            },
            None => {
                self.users.insert(incoming.id.clone(), incoming.clone());
                tracing::info!("Platform user created: {}", incoming.id);
                incoming
            }
        };

        self.metrics.upserts += 1;
        self.refresh_metrics();
        MessageResult(user)
    }
}

impl Handler<DeleteUser> for UserDirectoryActor {
    type Result = bool;

    fn handle(&mut self, msg: DeleteUser, _ctx: &mut Self::Context) -> Self::Result {
        let removed = self.users.remove(&msg.id).is_some();
        if removed {
            for channel in self.channels.values_mut() {
                channel.members.remove(&msg.id);
            }
            self.metrics.deletions += 1;
            tracing::info!("Platform user deleted: {}", msg.id);
        }
        self.refresh_metrics();
        removed
    }
}

impl Handler<AddToPublicChannels> for UserDirectoryActor {
    type Result = MessageResult<AddToPublicChannels>;

    fn handle(&mut self, msg: AddToPublicChannels, _ctx: &mut Self::Context) -> Self::Result {
        if !self.users.contains_key(&msg.user_id) {
            return MessageResult(None);
        }

        let mut joined: Vec<String> = self
            .channels
            .iter_mut()
            .filter(|(_, channel)| channel.discoverable)
            .filter_map(|(id, channel)| channel.members.insert(msg.user_id.clone()).then(|| id.clone()))
            .collect();
        joined.sort();

        tracing::debug!("User {} joined {} public channels", msg.user_id, joined.len());
        MessageResult(Some(joined))
    }
}

impl Handler<GetDirectoryMetrics> for UserDirectoryActor {
    type Result = MessageResult<GetDirectoryMetrics>;

    fn handle(&mut self, _msg: GetDirectoryMetrics, _ctx: &mut Self::Context) -> Self::Result {
        self.refresh_metrics();
        MessageResult(self.metrics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_upsert_is_idempotent() {
        let directory = UserDirectoryActor::new().start();
        let identity = Identity::new("user_1").with_display_name("First");

        let first = directory.send(UpsertUser { identity: identity.clone() }).await.unwrap();
        let second = directory
            .send(UpsertUser { identity: identity.with_display_name("Renamed") })
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.name, "Renamed");

        let metrics = directory.send(GetDirectoryMetrics).await.unwrap();
        assert_eq!(metrics.users, 1);
        assert_eq!(metrics.upserts, 2);
    }

    #[actix_web::test]
    async fn test_public_channel_join_skips_private_channels() {
        let directory = UserDirectoryActor::new()
            .with_public_channels(["general", "random"])
            .with_channel("staff", false)
            .start();

        let user_id = IdentityId::new("user_1");
        assert_eq!(
            directory.send(AddToPublicChannels { user_id: user_id.clone() }).await.unwrap(),
            None
        );

        directory.send(UpsertUser { identity: Identity::new("user_1") }).await.unwrap();
        let joined = directory
            .send(AddToPublicChannels { user_id: user_id.clone() })
            .await
            .unwrap();
        assert_eq!(joined, Some(vec!["general".to_string(), "random".to_string()]));

        // Joining again adds nothing
        let joined = directory
            .send(AddToPublicChannels { user_id: user_id.clone() })
            .await
            .unwrap();
        assert_eq!(joined, Some(vec![]));

        let metrics = directory.send(GetDirectoryMetrics).await.unwrap();
        assert_eq!(metrics.channels, 3);
    }

    #[actix_web::test]
    async fn test_delete_removes_memberships() {
        let directory = UserDirectoryActor::new().with_public_channels(["general"]).start();
        let user_id = IdentityId::new("user_1");

        directory.send(UpsertUser { identity: Identity::new("user_1") }).await.unwrap();
        directory.send(AddToPublicChannels { user_id: user_id.clone() }).await.unwrap();

        assert!(directory.send(DeleteUser { id: user_id.clone() }).await.unwrap());
        assert!(!directory.send(DeleteUser { id: user_id.clone() }).await.unwrap());
        assert_eq!(
            directory.send(AddToPublicChannels { user_id: user_id.clone() }).await.unwrap(),
            None
        );

        // A returning user joins again, so the old membership was dropped
        directory.send(UpsertUser { identity: Identity::new("user_1") }).await.unwrap();
        let joined = directory.send(AddToPublicChannels { user_id }).await.unwrap();
        assert_eq!(joined, Some(vec!["general".to_string()]));
    }
}
