use cynic::http::ReqwestExt;
use cynic::serde;
use reqwest::Url;
use uuid::Uuid;

pub struct Client {
    client: reqwest::Client,
    url: Url,
}

impl Client {
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub async fn run<Op, Input>(
        &self,
        op: cynic::Operation<Op, Input>,
    ) -> cynic::GraphQlResponse<Op>
    where
        Input: serde::Serialize,
        Op: serde::de::DeserializeOwned + 'static,
    {
        self.client
            .post(self.url.clone())
            .run_graphql(op)
            .await
            .unwrap()
    }
}

#[cynic::schema("socialgraph")]
mod schema {}

cynic::impl_scalar!(Uuid, schema::UUID);

#[derive(cynic::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberTypeId {
    Basic,
    Business,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "Query")]
pub struct UsersWithPosts {
    pub users: Vec<UserWithPosts>,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "User")]
pub struct UserWithPosts {
    pub id: Uuid,
    pub name: String,
    pub posts: Vec<Post>,
}

#[derive(cynic::QueryFragment, Debug)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
}

#[derive(cynic::QueryVariables, Debug)]
pub struct UserVariables {
    pub id: Uuid,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "Query", variables = "UserVariables")]
pub struct UserById {
    #[arguments(id: $id)]
    pub user: Option<UserWithProfile>,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "User")]
pub struct UserWithProfile {
    pub id: Uuid,
    pub name: String,
    pub profile: Option<Profile>,
    pub user_subscribed_to: Vec<UserName>,
    pub subscribed_to_user: Vec<UserName>,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "User")]
pub struct UserName {
    pub name: String,
}

#[derive(cynic::QueryFragment, Debug)]
pub struct Profile {
    pub year_of_birth: i32,
    pub member_type: Option<MemberType>,
}

#[derive(cynic::QueryFragment, Debug)]
pub struct MemberType {
    pub id: MemberTypeId,
    pub posts_limit_per_month: i32,
}

#[derive(cynic::InputObject, Debug)]
pub struct CreateUserInput {
    pub name: String,
    pub balance: f64,
}

#[derive(cynic::QueryVariables, Debug)]
pub struct CreateUserVariables {
    pub dto: CreateUserInput,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "Mutation", variables = "CreateUserVariables")]
pub struct CreateUser {
    #[arguments(dto: $dto)]
    pub create_user: UserName,
}

#[derive(cynic::QueryVariables, Debug)]
pub struct SubscribeVariables {
    pub user_id: Uuid,
    pub author_id: Uuid,
}

#[derive(cynic::QueryFragment, Debug)]
#[cynic(graphql_type = "Mutation", variables = "SubscribeVariables")]
pub struct SubscribeTo {
    #[arguments(userId: $user_id, authorId: $author_id)]
    pub subscribe_to: bool,
}
