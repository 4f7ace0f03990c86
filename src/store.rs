//! In-process relational store.
//!
//! Every public read or write is one round-trip: it is logged and pays the
//! configured latency. Test builds also keep a log of the calls. The store knows nothing about
//! batching; that is the job of the request-scoped loaders.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(test)]
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::datamodel::{
    DEMO_AUTHORS, DEMO_POSTS, MEMBER_TYPES, MemberType, MemberTypeId, Post, Profile, Subscription,
    User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is unavailable, `{table}` could not be reached")]
    Unavailable { table: &'static str },
    #[error("`{table}` did not answer within {timeout:?}")]
    Timeout {
        table: &'static str,
        timeout: Duration,
    },
    #[error("no row in `{table}` with id `{id}`")]
    NotFound { table: &'static str, id: String },
    #[error("`{table}` already has a row for `{key}`")]
    Conflict { table: &'static str, key: String },
    #[error("`{column}` references missing `{table}` row `{key}`")]
    ForeignKey {
        table: &'static str,
        column: &'static str,
        key: String,
    },
}

#[derive(Default)]
pub struct Tables {
    users: Vec<User>,
    posts: Vec<Post>,
    profiles: Vec<Profile>,
    member_types: Vec<MemberType>,
    subscriptions: Vec<Subscription>,
}

/// A row type stored in one of the [`Tables`].
pub trait Record: Clone + Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// Foreign-key columns that can be used in a [`Filter::ForeignKeyIn`].
    type Column: Copy + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
    fn foreign_key(&self, column: Self::Column) -> Uuid;

    fn rows(tables: &Tables) -> &Vec<Self>;
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self>;

    /// Checks foreign keys and unique columns against the current tables.
    fn check(&self, _tables: &Tables) -> Result<(), StoreError> {
        Ok(())
    }

    /// Removes dependent rows once `self` has been deleted.
    fn cascade(&self, _tables: &mut Tables) {}
}

#[derive(Debug, Clone)]
pub enum Filter<R: Record> {
    All,
    IdIn(Vec<R::Id>),
    ForeignKeyIn(R::Column, Vec<Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostColumn {
    AuthorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileColumn {
    UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionColumn {
    SubscriberId,
    AuthorId,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub table: &'static str,
    pub op: &'static str,
    pub filter: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub latency: Duration,
    pub timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }
}

struct DbInner {
    tables: RwLock<Tables>,
    options: StoreOptions,
    unavailable: AtomicBool,
    /// Round-trips recorded for tests. The running service only logs them.
    #[cfg(test)]
    calls: Mutex<Vec<StoreCall>>,
}

#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /// Creates a store holding only the membership tiers.
    pub fn new(options: StoreOptions) -> Self {
        let tables = Tables {
            member_types: MEMBER_TYPES.to_vec(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(DbInner {
                tables: RwLock::new(tables),
                options,
                unavailable: AtomicBool::new(false),
                #[cfg(test)]
                calls: Default::default(),
            }),
        }
    }

    /// Makes every following round-trip fail with [`StoreError::Unavailable`].
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.call_log().clone()
    }

    #[cfg(test)]
    pub fn reset_calls(&self) {
        self.call_log().clear();
    }

    #[cfg(test)]
    fn call_log(&self) -> std::sync::MutexGuard<'_, Vec<StoreCall>> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn roundtrip(
        &self,
        table: &'static str,
        op: &'static str,
        filter: String,
    ) -> Result<(), StoreError> {
        tracing::debug!(table, op, %filter, "store call");
        #[cfg(test)]
        self.call_log().push(StoreCall { table, op, filter });

        let StoreOptions { latency, timeout } = self.inner.options;
        if !latency.is_zero()
            && tokio::time::timeout(timeout, tokio::time::sleep(latency))
                .await
                .is_err()
        {
            tracing::warn!(table, op, ?timeout, "store call timed out");
            return Err(StoreError::Timeout { table, timeout });
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            tracing::warn!(table, op, "store unavailable");
            return Err(StoreError::Unavailable { table });
        }
        Ok(())
    }

    /// Returns the matching rows in table order.
    pub async fn find_many<R: Record>(&self, filter: Filter<R>) -> Result<Vec<R>, StoreError> {
        self.roundtrip(R::TABLE, "findMany", format!("{filter:?}"))
            .await?;

        let tables = self.inner.tables.read().await;
        let rows = R::rows(&tables).iter();
        let found = match filter {
            Filter::All => rows.cloned().collect(),
            Filter::IdIn(ids) => {
                let ids: HashSet<_> = ids.into_iter().collect();
                rows.filter(|row| ids.contains(&row.id())).cloned().collect()
            }
            Filter::ForeignKeyIn(column, keys) => {
                let keys: HashSet<_> = keys.into_iter().collect();
                rows.filter(|row| keys.contains(&row.foreign_key(column)))
                    .cloned()
                    .collect()
            }
        };
        Ok(found)
    }

    #[cfg(test)]
    pub async fn find_unique<R: Record>(&self, id: &R::Id) -> Result<Option<R>, StoreError> {
        self.roundtrip(R::TABLE, "findUnique", format!("{id:?}"))
            .await?;

        let tables = self.inner.tables.read().await;
        Ok(R::rows(&tables).iter().find(|row| row.id() == *id).cloned())
    }

    pub async fn create<R: Record>(&self, row: R) -> Result<R, StoreError> {
        self.roundtrip(R::TABLE, "create", format!("{:?}", row.id()))
            .await?;

        let mut tables = self.inner.tables.write().await;
        if contains::<R>(&tables, &row.id()) {
            return Err(StoreError::Conflict {
                table: R::TABLE,
                key: format!("{:?}", row.id()),
            });
        }
        row.check(&tables)?;
        R::rows_mut(&mut tables).push(row.clone());
        Ok(row)
    }

    pub async fn update<R: Record>(
        &self,
        id: &R::Id,
        change: impl FnOnce(&mut R),
    ) -> Result<R, StoreError> {
        self.roundtrip(R::TABLE, "update", format!("{id:?}"))
            .await?;

        let mut tables = self.inner.tables.write().await;
        let Some(position) = R::rows(&tables).iter().position(|row| row.id() == *id) else {
            return Err(not_found::<R>(id));
        };
        let mut row = R::rows(&tables)[position].clone();
        change(&mut row);
        row.check(&tables)?;
        R::rows_mut(&mut tables)[position] = row.clone();
        Ok(row)
    }

    pub async fn delete<R: Record>(&self, id: &R::Id) -> Result<R, StoreError> {
        self.roundtrip(R::TABLE, "delete", format!("{id:?}"))
            .await?;

        let mut tables = self.inner.tables.write().await;
        let Some(position) = R::rows(&tables).iter().position(|row| row.id() == *id) else {
            return Err(not_found::<R>(id));
        };
        let row = R::rows_mut(&mut tables).remove(position);
        row.cascade(&mut tables);
        Ok(row)
    }

    /// Inserts rows without constraint checks and without a round-trip.
    pub async fn import<R: Record>(&self, rows: impl IntoIterator<Item = R>) {
        let mut tables = self.inner.tables.write().await;
        R::rows_mut(&mut tables).extend(rows);
    }

    pub async fn seed_demo(&self) {
        let users: Vec<_> = DEMO_AUTHORS
            .iter()
            .map(|author| User {
                id: Uuid::new_v4(),
                name: author.name.into(),
                balance: 100.0,
            })
            .collect();
        let user_id = |name: &str| {
            users
                .iter()
                .find(|user| user.name == name)
                .map(|user| user.id)
        };

        let posts: Vec<_> = DEMO_POSTS
            .iter()
            .filter_map(|demo| {
                Some(Post {
                    id: Uuid::new_v4(),
                    title: demo.title.into(),
                    content: format!("{} by {}", demo.title, demo.author),
                    author_id: user_id(demo.author)?,
                })
            })
            .collect();

        let mut profiles = Vec::new();
        let mut subscriptions = Vec::new();
        for (author, user) in DEMO_AUTHORS.iter().zip(&users) {
            profiles.push(Profile {
                id: Uuid::new_v4(),
                is_male: true,
                year_of_birth: author.born,
                user_id: user.id,
                member_type_id: author.member_type,
            });
            subscriptions.extend(author.follows.iter().filter_map(|followed| {
                Some(Subscription {
                    subscriber_id: user.id,
                    author_id: user_id(followed)?,
                })
            }));
        }

        tracing::info!(
            users = users.len(),
            posts = posts.len(),
            subscriptions = subscriptions.len(),
            "seeding demo data"
        );
        self.import(users).await;
        self.import(posts).await;
        self.import(profiles).await;
        self.import(subscriptions).await;
    }
}

fn contains<R: Record>(tables: &Tables, id: &R::Id) -> bool {
    R::rows(tables).iter().any(|row| row.id() == *id)
}

fn not_found<R: Record>(id: &R::Id) -> StoreError {
    StoreError::NotFound {
        table: R::TABLE,
        id: format!("{id:?}"),
    }
}

fn require<R: Record>(tables: &Tables, column: &'static str, id: &R::Id) -> Result<(), StoreError> {
    if contains::<R>(tables, id) {
        Ok(())
    } else {
        Err(StoreError::ForeignKey {
            table: R::TABLE,
            column,
            key: format!("{id:?}"),
        })
    }
}

impl Record for User {
    const TABLE: &'static str = "users";
    type Id = Uuid;
    type Column = Infallible;

    fn id(&self) -> Uuid {
        self.id
    }
    fn foreign_key(&self, column: Infallible) -> Uuid {
        match column {}
    }
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.users
    }
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.users
    }

    fn cascade(&self, tables: &mut Tables) {
        tables.posts.retain(|post| post.author_id != self.id);
        tables.profiles.retain(|profile| profile.user_id != self.id);
        tables
            .subscriptions
            .retain(|sub| sub.subscriber_id != self.id && sub.author_id != self.id);
    }
}

impl Record for Post {
    const TABLE: &'static str = "posts";
    type Id = Uuid;
    type Column = PostColumn;

    fn id(&self) -> Uuid {
        self.id
    }
    fn foreign_key(&self, column: PostColumn) -> Uuid {
        match column {
            PostColumn::AuthorId => self.author_id,
        }
    }
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.posts
    }
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.posts
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        require::<User>(tables, "authorId", &self.author_id)
    }
}

impl Record for Profile {
    const TABLE: &'static str = "profiles";
    type Id = Uuid;
    type Column = ProfileColumn;

    fn id(&self) -> Uuid {
        self.id
    }
    fn foreign_key(&self, column: ProfileColumn) -> Uuid {
        match column {
            ProfileColumn::UserId => self.user_id,
        }
    }
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.profiles
    }
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.profiles
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        require::<User>(tables, "userId", &self.user_id)?;
        require::<MemberType>(tables, "memberTypeId", &self.member_type_id)?;
        let taken = tables
            .profiles
            .iter()
            .any(|profile| profile.user_id == self.user_id && profile.id != self.id);
        if taken {
            return Err(StoreError::Conflict {
                table: Self::TABLE,
                key: format!("userId {}", self.user_id),
            });
        }
        Ok(())
    }
}

impl Record for MemberType {
    const TABLE: &'static str = "member_types";
    type Id = MemberTypeId;
    type Column = Infallible;

    fn id(&self) -> MemberTypeId {
        self.id
    }
    fn foreign_key(&self, column: Infallible) -> Uuid {
        match column {}
    }
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.member_types
    }
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.member_types
    }
}

impl Record for Subscription {
    const TABLE: &'static str = "subscribers_on_authors";
    type Id = (Uuid, Uuid);
    type Column = SubscriptionColumn;

    fn id(&self) -> (Uuid, Uuid) {
        (self.subscriber_id, self.author_id)
    }
    fn foreign_key(&self, column: SubscriptionColumn) -> Uuid {
        match column {
            SubscriptionColumn::SubscriberId => self.subscriber_id,
            SubscriptionColumn::AuthorId => self.author_id,
        }
    }
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.subscriptions
    }
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.subscriptions
    }

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        require::<User>(tables, "subscriberId", &self.subscriber_id)?;
        require::<User>(tables, "authorId", &self.author_id)
    }
}
