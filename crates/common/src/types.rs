use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Chat (channel, group or private conversation) identifier.
pub type ChatId = i64;

/// Message identifier, unique within a chat.
pub type MessageId = i32;

/// Identifier of the user who owns a set of routes.
pub type OwnerId = i64;

/// Identity of a route: routes are named uniquely per owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub owner_id: OwnerId,
    pub name: String,
}

impl RouteKey {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_key_display() {
        assert_eq!(RouteKey::new(42, "news").to_string(), "42/news");
    }

    #[test]
    fn route_keys_order_by_owner_then_name() {
        let mut keys = vec![
            RouteKey::new(2, "a"),
            RouteKey::new(1, "b"),
            RouteKey::new(1, "a"),
        ];
        keys.sort();
        assert_eq!(keys, vec![
            RouteKey::new(1, "a"),
            RouteKey::new(1, "b"),
            RouteKey::new(2, "a"),
        ]);
    }

    #[test]
    fn route_key_serde() {
        let key = RouteKey::new(7, "x");
        let json = serde_json::to_string(&key).unwrap_or_default();
        assert_eq!(json, r#"{"owner_id":7,"name":"x"}"#);
    }
}
