use serde_derive::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ErrorResponse {
    pub title: String,
    pub message: String,
}

/// Who is acting. The upstream identity layer authenticates requests and
/// forwards the verified identity as `x-user-id` / `x-user-role` headers;
/// this service trusts those headers and never re-verifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Renter(i32),
    Host(i32),
    Admin(i32),
    /// Internal jobs, e.g. the unpaid-booking sweeper.
    System,
}

impl Actor {
    pub fn from_headers(user_id: i32, role: &str) -> Option<Actor> {
        match role {
            "renter" => Some(Actor::Renter(user_id)),
            "host" => Some(Actor::Host(user_id)),
            "admin" => Some(Actor::Admin(user_id)),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        match *self {
            Actor::Renter(id) | Actor::Host(id) | Actor::Admin(id) => Some(id),
            Actor::System => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_) | Actor::System)
    }

    pub fn describe(&self) -> String {
        match *self {
            Actor::Renter(id) => format!("renter {}", id),
            Actor::Host(id) => format!("host {}", id),
            Actor::Admin(id) => format!("admin {}", id),
            Actor::System => String::from("system"),
        }
    }
}
