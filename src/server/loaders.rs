use std::collections::HashMap;
use std::marker::PhantomData;

use async_graphql::{Context, Result};
use uuid::Uuid;

use crate::datamodel::{MemberType, MemberTypeId, Post, Profile, Subscription, User};
use crate::store::{Db, Filter, PostColumn, ProfileColumn, Record, SubscriptionColumn};

use super::dataloader::{self, BatchLoader, DataLoader, Dispatch, LoadError};

/// At most one row per primary key.
///
/// A key matching several rows fails the whole window with
/// [`LoadError::KeyShapeMismatch`], so every key loaded alongside it gets the
/// same error. Duplicate primary keys mean the store is corrupt and no row of
/// that batch is trusted.
pub struct ById<R> {
    db: Db,
    _record: PhantomData<R>,
}

impl<R> ById<R> {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }
}

impl<R: Record> BatchLoader for ById<R> {
    type K = R::Id;
    type V = Option<R>;

    fn load_batch(
        &self,
        keys: Vec<Self::K>,
    ) -> impl Future<Output = Result<HashMap<Self::K, Self::V>, LoadError>> + Send + 'static {
        let db = self.db.clone();
        async move {
            let rows = db.find_many(Filter::<R>::IdIn(keys)).await?;

            let mut found = HashMap::with_capacity(rows.len());
            for (id, mut rows) in group_by(rows, |row| row.id()) {
                if rows.len() > 1 {
                    return Err(LoadError::KeyShapeMismatch {
                        table: R::TABLE,
                        key: format!("{id:?}"),
                        rows: rows.len(),
                    });
                }
                found.insert(id, rows.pop());
            }
            Ok(found)
        }
    }
}

/// Every row whose primary key is one of the keys. Nothing is collapsed, so
/// overlapping or duplicated ids come back as they are stored.
pub struct RowsById<R> {
    db: Db,
    _record: PhantomData<R>,
}

impl<R> RowsById<R> {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }
}

impl<R: Record> BatchLoader for RowsById<R> {
    type K = R::Id;
    type V = Vec<R>;

    fn load_batch(
        &self,
        keys: Vec<Self::K>,
    ) -> impl Future<Output = Result<HashMap<Self::K, Self::V>, LoadError>> + Send + 'static {
        let db = self.db.clone();
        async move {
            let rows = db.find_many(Filter::<R>::IdIn(keys)).await?;
            Ok(group_by(rows, |row| row.id()))
        }
    }
}

/// The children of each owner key, grouped by a foreign-key column.
pub struct ByForeignKey<R: Record> {
    db: Db,
    column: R::Column,
}

impl<R: Record> ByForeignKey<R> {
    pub fn new(db: Db, column: R::Column) -> Self {
        Self { db, column }
    }
}

impl<R: Record> BatchLoader for ByForeignKey<R> {
    type K = Uuid;
    type V = Vec<R>;

    fn load_batch(
        &self,
        keys: Vec<Uuid>,
    ) -> impl Future<Output = Result<HashMap<Uuid, Vec<R>>, LoadError>> + Send + 'static {
        let db = self.db.clone();
        let column = self.column;
        async move {
            let rows = db.find_many(Filter::<R>::ForeignKeyIn(column, keys)).await?;
            Ok(group_by(rows, |row| row.foreign_key(column)))
        }
    }
}

/// Walks a join table from the `from` column to the `to` column.
pub struct Join<R: Record> {
    db: Db,
    from: R::Column,
    to: R::Column,
}

impl<R: Record> Join<R> {
    pub fn new(db: Db, from: R::Column, to: R::Column) -> Self {
        Self { db, from, to }
    }
}

impl<R: Record> BatchLoader for Join<R> {
    type K = Uuid;
    type V = Vec<Uuid>;

    fn load_batch(
        &self,
        keys: Vec<Uuid>,
    ) -> impl Future<Output = Result<HashMap<Uuid, Vec<Uuid>>, LoadError>> + Send + 'static {
        let db = self.db.clone();
        let (from, to) = (self.from, self.to);
        async move {
            let edges = db.find_many(Filter::<R>::ForeignKeyIn(from, keys)).await?;

            let mut targets: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
            for edge in edges {
                targets
                    .entry(edge.foreign_key(from))
                    .or_default()
                    .push(edge.foreign_key(to));
            }
            Ok(targets)
        }
    }
}

fn group_by<K, R>(rows: Vec<R>, key: impl Fn(&R) -> K) -> HashMap<K, Vec<R>>
where
    K: std::hash::Hash + Eq,
{
    let mut grouped: HashMap<K, Vec<R>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

/// The loaders of one query execution.
///
/// A fresh set is built for every request and dropped with its response, so
/// no cached row or open window is ever shared between requests.
#[derive(Clone)]
pub struct Loaders {
    pub users: DataLoader<ById<User>>,
    pub posts: DataLoader<ById<Post>>,
    pub profiles: DataLoader<ById<Profile>>,
    pub member_types: DataLoader<ById<MemberType>>,
    pub member_type_rows: DataLoader<RowsById<MemberType>>,
    pub posts_by_author: DataLoader<ByForeignKey<Post>>,
    pub profiles_by_user: DataLoader<ByForeignKey<Profile>>,
    /// subscriber -> authors
    pub subscribed_to: DataLoader<Join<Subscription>>,
    /// author -> subscribers
    pub subscribers: DataLoader<Join<Subscription>>,
}

impl Loaders {
    pub fn new(db: &Db) -> Self {
        Self {
            users: DataLoader::new(ById::new(db.clone())),
            posts: DataLoader::new(ById::new(db.clone())),
            profiles: DataLoader::new(ById::new(db.clone())),
            member_types: DataLoader::new(ById::new(db.clone())),
            member_type_rows: DataLoader::new(RowsById::new(db.clone())),
            posts_by_author: DataLoader::new(ByForeignKey::new(db.clone(), PostColumn::AuthorId)),
            profiles_by_user: DataLoader::new(ByForeignKey::new(
                db.clone(),
                ProfileColumn::UserId,
            )),
            subscribed_to: DataLoader::new(Join::new(
                db.clone(),
                SubscriptionColumn::SubscriberId,
                SubscriptionColumn::AuthorId,
            )),
            subscribers: DataLoader::new(Join::new(
                db.clone(),
                SubscriptionColumn::AuthorId,
                SubscriptionColumn::SubscriberId,
            )),
        }
    }

    fn all(&self) -> [&dyn Dispatch; 9] {
        [
            &self.users,
            &self.posts,
            &self.profiles,
            &self.member_types,
            &self.member_type_rows,
            &self.posts_by_author,
            &self.profiles_by_user,
            &self.subscribed_to,
            &self.subscribers,
        ]
    }

    /// Runs `fut`, batching whatever it loads through these loaders.
    pub async fn wrap<O>(&self, fut: impl Future<Output = O>) -> O {
        dataloader::wrap(&self.all(), fut).await
    }
}

pub trait LoadersExt {
    async fn load_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn load_users(&self, ids: Vec<Uuid>) -> Result<Vec<User>>;
    async fn load_post(&self, id: Uuid) -> Result<Option<Post>>;
    async fn load_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>>;
    async fn load_profile(&self, id: Uuid) -> Result<Option<Profile>>;
    async fn load_profile_of(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn load_member_type(&self, id: MemberTypeId) -> Result<Option<MemberType>>;
    async fn load_member_type_rows(&self, ids: Vec<MemberTypeId>) -> Result<Vec<MemberType>>;
    async fn load_subscribed_to(&self, subscriber_id: Uuid) -> Result<Vec<User>>;
    async fn load_subscribers(&self, author_id: Uuid) -> Result<Vec<User>>;
}

impl LoadersExt for Context<'_> {
    async fn load_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.data::<Loaders>()?.users.load(id).await?)
    }

    async fn load_users(&self, ids: Vec<Uuid>) -> Result<Vec<User>> {
        let users = self.data::<Loaders>()?.users.load_many(ids).await?;
        // Edges can outlive a user for the length of one request.
        Ok(users.into_iter().flatten().collect())
    }

    async fn load_post(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.data::<Loaders>()?.posts.load(id).await?)
    }

    async fn load_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>> {
        Ok(self
            .data::<Loaders>()?
            .posts_by_author
            .load(author_id)
            .await?)
    }

    async fn load_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.data::<Loaders>()?.profiles.load(id).await?)
    }

    async fn load_profile_of(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let profiles = self
            .data::<Loaders>()?
            .profiles_by_user
            .load(user_id)
            .await?;
        // `profiles.userId` is unique.
        Ok(profiles.into_iter().next())
    }

    async fn load_member_type(&self, id: MemberTypeId) -> Result<Option<MemberType>> {
        Ok(self.data::<Loaders>()?.member_types.load(id).await?)
    }

    async fn load_member_type_rows(&self, ids: Vec<MemberTypeId>) -> Result<Vec<MemberType>> {
        let rows = self
            .data::<Loaders>()?
            .member_type_rows
            .load_many(ids)
            .await?;
        Ok(rows.into_iter().flatten().collect())
    }

    async fn load_subscribed_to(&self, subscriber_id: Uuid) -> Result<Vec<User>> {
        let authors = self
            .data::<Loaders>()?
            .subscribed_to
            .load(subscriber_id)
            .await?;
        self.load_users(authors).await
    }

    async fn load_subscribers(&self, author_id: Uuid) -> Result<Vec<User>> {
        let subscribers = self
            .data::<Loaders>()?
            .subscribers
            .load(author_id)
            .await?;
        self.load_users(subscribers).await
    }
}
