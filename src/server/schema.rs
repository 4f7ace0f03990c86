use async_graphql::{ComplexObject, Context, InputObject, Object, Result};
use uuid::Uuid;

use crate::datamodel::{MemberType, MemberTypeId, Post, Profile, Subscription, User};
use crate::store::{Db, Filter};

use super::loaders::LoadersExt;

#[ComplexObject]
impl User {
    async fn profile(&self, ctx: &Context<'_>) -> Result<Option<Profile>> {
        ctx.load_profile_of(self.id).await
    }

    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        ctx.load_posts_by_author(self.id).await
    }

    /// Authors this user is subscribed to.
    async fn user_subscribed_to(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        ctx.load_subscribed_to(self.id).await
    }

    /// Users subscribed to this author.
    async fn subscribed_to_user(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        ctx.load_subscribers(self.id).await
    }
}

#[ComplexObject]
impl Profile {
    async fn member_type(&self, ctx: &Context<'_>) -> Result<Option<MemberType>> {
        ctx.load_member_type(self.member_type_id).await
    }
}

pub struct Query;

#[Object]
impl Query {
    /// All membership tiers, or every stored row for the given ids.
    async fn member_types(
        &self,
        ctx: &Context<'_>,
        ids: Option<Vec<MemberTypeId>>,
    ) -> Result<Vec<MemberType>> {
        match ids {
            Some(ids) => ctx.load_member_type_rows(ids).await,
            None => Ok(ctx.data::<Db>()?.find_many::<MemberType>(Filter::All).await?),
        }
    }

    async fn member_type(&self, ctx: &Context<'_>, id: MemberTypeId) -> Result<Option<MemberType>> {
        ctx.load_member_type(id).await
    }

    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        Ok(ctx.data::<Db>()?.find_many::<Post>(Filter::All).await?)
    }

    async fn post(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Post>> {
        ctx.load_post(id).await
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        Ok(ctx.data::<Db>()?.find_many::<User>(Filter::All).await?)
    }

    async fn user(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<User>> {
        ctx.load_user(id).await
    }

    async fn profiles(&self, ctx: &Context<'_>) -> Result<Vec<Profile>> {
        Ok(ctx.data::<Db>()?.find_many::<Profile>(Filter::All).await?)
    }

    async fn profile(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Profile>> {
        ctx.load_profile(id).await
    }
}

#[derive(InputObject)]
pub struct CreateUserInput {
    name: String,
    balance: f64,
}

#[derive(InputObject)]
pub struct ChangeUserInput {
    name: Option<String>,
    balance: Option<f64>,
}

#[derive(InputObject)]
pub struct CreatePostInput {
    title: String,
    content: String,
    author_id: Uuid,
}

#[derive(InputObject)]
pub struct ChangePostInput {
    title: Option<String>,
    content: Option<String>,
}

#[derive(InputObject)]
pub struct CreateProfileInput {
    is_male: bool,
    year_of_birth: i32,
    user_id: Uuid,
    member_type_id: MemberTypeId,
}

#[derive(InputObject)]
pub struct ChangeProfileInput {
    is_male: Option<bool>,
    year_of_birth: Option<i32>,
    user_id: Option<Uuid>,
    member_type_id: Option<MemberTypeId>,
}

/// Writes go straight to the store. Loaders of the running request are not
/// invalidated.
pub struct Mutation;

#[Object]
impl Mutation {
    async fn create_user(&self, ctx: &Context<'_>, dto: CreateUserInput) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: dto.name,
            balance: dto.balance,
        };
        Ok(ctx.data::<Db>()?.create(user).await?)
    }

    async fn change_user(&self, ctx: &Context<'_>, id: Uuid, dto: ChangeUserInput) -> Result<User> {
        let change = |user: &mut User| {
            if let Some(name) = dto.name {
                user.name = name;
            }
            if let Some(balance) = dto.balance {
                user.balance = balance;
            }
        };
        Ok(ctx.data::<Db>()?.update::<User>(&id, change).await?)
    }

    async fn delete_user(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        ctx.data::<Db>()?.delete::<User>(&id).await?;
        Ok(true)
    }

    async fn create_post(&self, ctx: &Context<'_>, dto: CreatePostInput) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            title: dto.title,
            content: dto.content,
            author_id: dto.author_id,
        };
        Ok(ctx.data::<Db>()?.create(post).await?)
    }

    async fn change_post(&self, ctx: &Context<'_>, id: Uuid, dto: ChangePostInput) -> Result<Post> {
        let change = |post: &mut Post| {
            if let Some(title) = dto.title {
                post.title = title;
            }
            if let Some(content) = dto.content {
                post.content = content;
            }
        };
        Ok(ctx.data::<Db>()?.update::<Post>(&id, change).await?)
    }

    async fn delete_post(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        ctx.data::<Db>()?.delete::<Post>(&id).await?;
        Ok(true)
    }

    async fn create_profile(&self, ctx: &Context<'_>, dto: CreateProfileInput) -> Result<Profile> {
        let profile = Profile {
            id: Uuid::new_v4(),
            is_male: dto.is_male,
            year_of_birth: dto.year_of_birth,
            user_id: dto.user_id,
            member_type_id: dto.member_type_id,
        };
        Ok(ctx.data::<Db>()?.create(profile).await?)
    }

    async fn change_profile(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        dto: ChangeProfileInput,
    ) -> Result<Profile> {
        let change = |profile: &mut Profile| {
            if let Some(is_male) = dto.is_male {
                profile.is_male = is_male;
            }
            if let Some(year_of_birth) = dto.year_of_birth {
                profile.year_of_birth = year_of_birth;
            }
            if let Some(user_id) = dto.user_id {
                profile.user_id = user_id;
            }
            if let Some(member_type_id) = dto.member_type_id {
                profile.member_type_id = member_type_id;
            }
        };
        Ok(ctx.data::<Db>()?.update::<Profile>(&id, change).await?)
    }

    async fn delete_profile(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        ctx.data::<Db>()?.delete::<Profile>(&id).await?;
        Ok(true)
    }

    async fn subscribe_to(&self, ctx: &Context<'_>, user_id: Uuid, author_id: Uuid) -> Result<bool> {
        let edge = Subscription {
            subscriber_id: user_id,
            author_id,
        };
        ctx.data::<Db>()?.create(edge).await?;
        Ok(true)
    }

    async fn unsubscribe_from(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        author_id: Uuid,
    ) -> Result<bool> {
        ctx.data::<Db>()?
            .delete::<Subscription>(&(user_id, author_id))
            .await?;
        Ok(true)
    }
}
