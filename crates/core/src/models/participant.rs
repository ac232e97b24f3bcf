//! Ecosystem participants (teams, startups, staff)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of entity that can hold a PEcoin wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Team,
    Startup,
    Staff,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Team, EntityKind::Startup, EntityKind::Staff];

    /// Backing table in the entity store
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Team => "teams",
            EntityKind::Startup => "startups",
            EntityKind::Staff => "staff",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Team => "team",
            EntityKind::Startup => "startup",
            EntityKind::Staff => "staff",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "team" | "teams" => Ok(EntityKind::Team),
            "startup" | "startups" => Ok(EntityKind::Startup),
            "staff" => Ok(EntityKind::Staff),
            other => Err(crate::Error::ValidationError(format!(
                "unknown entity kind: {}",
                other
            ))),
        }
    }
}

/// A wallet-holding participant, as seen by the caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub wallet_address: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
}

/// Full entity record from the entity store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Project to a participant; entities without a wallet are not participants
    pub fn to_participant(&self) -> Option<Participant> {
        let wallet = self.wallet_address.as_deref()?.trim();
        if wallet.is_empty() {
            return None;
        }
        Some(Participant {
            name: self.name.clone(),
            wallet_address: wallet.to_string(),
            kind: self.kind,
        })
    }
}

/// Fields for creating an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    pub name: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("Team".parse::<EntityKind>().unwrap(), EntityKind::Team);
        assert_eq!("startups".parse::<EntityKind>().unwrap(), EntityKind::Startup);
        assert!("investor".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_without_wallet_is_not_participant() {
        let now = Utc::now();
        let mut entity = Entity {
            id: 1,
            kind: EntityKind::Staff,
            name: "Ada".into(),
            wallet_address: Some("   ".into()),
            logo_path: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        assert!(entity.to_participant().is_none());

        entity.wallet_address = Some("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".into());
        let participant = entity.to_participant().unwrap();
        assert_eq!(participant.kind, EntityKind::Staff);
        assert_eq!(participant.name, "Ada");
    }

    #[test]
    fn test_participant_serializes_type_field() {
        let p = Participant {
            name: "Rocket".into(),
            wallet_address: "W1".into(),
            kind: EntityKind::Startup,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "startup");
        assert_eq!(json["walletAddress"], "W1");
    }
}
