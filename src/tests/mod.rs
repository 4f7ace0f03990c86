use cynic::{MutationBuilder as _, QueryBuilder as _};
use uuid::Uuid;

use crate::client::{
    Client, CreateUser, CreateUserInput, CreateUserVariables, MemberTypeId, SubscribeTo,
    SubscribeVariables, UserById, UserVariables, UsersWithPosts,
};
use crate::datamodel::{self, Post, Profile, Subscription, User};
use crate::server::make_app;
use crate::store::{Db, StoreOptions};

mod dataloader;

pub fn user(name: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.into(),
        balance: 10.0,
    }
}

pub fn post(author: &User, title: &str) -> Post {
    Post {
        id: Uuid::new_v4(),
        title: title.into(),
        content: format!("{title} by {}", author.name),
        author_id: author.id,
    }
}

pub fn profile(user: &User, member_type_id: datamodel::MemberTypeId) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        is_male: false,
        year_of_birth: 1990,
        user_id: user.id,
        member_type_id,
    }
}

pub fn subscription(subscriber: &User, author: &User) -> Subscription {
    Subscription {
        subscriber_id: subscriber.id,
        author_id: author.id,
    }
}

/// Three users with two posts each; `u1` and `u2` share the BASIC tier.
pub struct Fixture {
    pub db: Db,
    pub users: Vec<User>,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = Db::new(StoreOptions::default());
        let users = vec![user("u1"), user("u2"), user("u3")];

        let posts = users
            .iter()
            .flat_map(|u| [post(u, "first"), post(u, "second")]);
        db.import(posts).await;
        db.import([
            profile(&users[0], datamodel::MemberTypeId::Basic),
            profile(&users[1], datamodel::MemberTypeId::Basic),
            profile(&users[2], datamodel::MemberTypeId::Business),
        ])
        .await;
        db.import([
            subscription(&users[0], &users[1]),
            subscription(&users[0], &users[2]),
            subscription(&users[1], &users[2]),
        ])
        .await;
        db.import(users.clone()).await;

        Self { db, users }
    }
}

#[tokio::test]
async fn test_request() {
    let fixture = Fixture::new().await;
    let app = make_app(fixture.db.clone(), 5);
    let server = testserver::Server::start(app).await;
    let client = Client::new(server.url("/"));

    fixture.db.reset_calls();
    let res = client.run(UsersWithPosts::build(())).await;
    let users = res.data.unwrap().users;

    assert_eq!(users.len(), 3);
    for u in &users {
        assert_eq!(u.posts.len(), 2, "posts of {}", u.name);
    }
    let tables: Vec<_> = fixture.db.calls().iter().map(|c| c.table).collect();
    assert_eq!(tables, ["users", "posts"]);
}

#[tokio::test]
async fn test_user_by_id_over_http() {
    let fixture = Fixture::new().await;
    let server = testserver::Server::start(make_app(fixture.db.clone(), 5)).await;
    let client = Client::new(server.url("/"));

    let u1 = &fixture.users[0];
    let res = client
        .run(UserById::build(UserVariables { id: u1.id }))
        .await;
    let user = res.data.unwrap().user.unwrap();

    assert_eq!(user.name, "u1");
    let member_type = user.profile.unwrap().member_type.unwrap();
    assert_eq!(member_type.id, MemberTypeId::Basic);
    assert_eq!(member_type.posts_limit_per_month, 20);

    let mut followed: Vec<_> = user.user_subscribed_to.iter().map(|u| &u.name).collect();
    followed.sort();
    assert_eq!(followed, ["u2", "u3"]);
    assert!(user.subscribed_to_user.is_empty());

    let res = client
        .run(UserById::build(UserVariables { id: Uuid::new_v4() }))
        .await;
    assert!(res.errors.is_none());
    assert!(res.data.unwrap().user.is_none());
}

#[tokio::test]
async fn test_mutations_over_http() {
    let fixture = Fixture::new().await;
    let server = testserver::Server::start(make_app(fixture.db.clone(), 5)).await;
    let client = Client::new(server.url("/"));

    let res = client
        .run(CreateUser::build(CreateUserVariables {
            dto: CreateUserInput {
                name: "u4".into(),
                balance: 1.5,
            },
        }))
        .await;
    assert_eq!(res.data.unwrap().create_user.name, "u4");

    let u4 = fixture
        .db
        .find_many::<User>(crate::store::Filter::All)
        .await
        .unwrap()
        .into_iter()
        .find(|u| u.name == "u4")
        .unwrap();
    let res = client
        .run(SubscribeTo::build(SubscribeVariables {
            user_id: u4.id,
            author_id: fixture.users[0].id,
        }))
        .await;
    assert!(res.data.unwrap().subscribe_to);

    let res = client
        .run(UserById::build(UserVariables {
            id: fixture.users[0].id,
        }))
        .await;
    let subscribers: Vec<_> = res
        .data
        .unwrap()
        .user
        .unwrap()
        .subscribed_to_user
        .into_iter()
        .map(|u| u.name)
        .collect();
    assert_eq!(subscribers, ["u4"]);
}
