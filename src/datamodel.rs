use async_graphql::{Enum, SimpleObject};
use uuid::Uuid;

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberTypeId {
    Basic,
    Business,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct MemberType {
    pub id: MemberTypeId,
    pub discount: f64,
    pub posts_limit_per_month: i32,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub balance: f64,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Profile {
    pub id: Uuid,
    pub is_male: bool,
    pub year_of_birth: i32,
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
}

/// One edge of the `subscriber -> author` relation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub subscriber_id: Uuid,
    pub author_id: Uuid,
}

pub static MEMBER_TYPES: &[MemberType] = &[
    MemberType {
        id: MemberTypeId::Basic,
        discount: 2.3,
        posts_limit_per_month: 20,
    },
    MemberType {
        id: MemberTypeId::Business,
        discount: 5.9,
        posts_limit_per_month: 100,
    },
];

pub struct DemoAuthor {
    pub name: &'static str,
    pub born: i32,
    pub member_type: MemberTypeId,
    pub follows: &'static [&'static str],
}

pub struct DemoPost {
    pub title: &'static str,
    pub author: &'static str,
}

pub static DEMO_AUTHORS: &[DemoAuthor] = &[
    DemoAuthor {
        name: "Hermann Hesse",
        born: 1877,
        member_type: MemberTypeId::Business,
        follows: &["Thomas Mann"],
    },
    DemoAuthor {
        name: "Thomas Mann",
        born: 1875,
        member_type: MemberTypeId::Basic,
        follows: &["Hermann Hesse", "Rainer Maria Rilke"],
    },
    DemoAuthor {
        name: "Rainer Maria Rilke",
        born: 1875,
        member_type: MemberTypeId::Basic,
        follows: &[],
    },
];

pub static DEMO_POSTS: &[DemoPost] = &[
    DemoPost {
        title: "Siddhartha",
        author: "Hermann Hesse",
    },
    DemoPost {
        title: "Das Glasperlenspiel",
        author: "Hermann Hesse",
    },
    DemoPost {
        title: "Zauberberg",
        author: "Thomas Mann",
    },
    DemoPost {
        title: "Duineser Elegien",
        author: "Rainer Maria Rilke",
    },
];
