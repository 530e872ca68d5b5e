//! Medicine dispenser entity
//!
//! One row per physical dispenser unit. Units are registered by an admin,
//! loaded with a medicine by a pharmacist, and report their own status
//! over HTTP using the device key issued at registration.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(15))")]
pub enum DispenserStatus {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "dispensing")]
    Dispensing,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
}

impl DispenserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Dispensing => "dispensing",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "dispensing" => Some(Self::Dispensing),
            "error" => Some(Self::Error),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

/// Dispenser model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispensers")]
pub struct Model {
    /// Unit name, e.g. "dispenser-ward3-01". Doubles as the identifier
    /// the firmware reports under.
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    /// Medicine currently loaded in the slot
    pub medicine_id: Option<String>,
    pub status: DispenserStatus,
    pub is_active: bool,
    /// SHA-256 of the device key; the clear key is shown once at registration
    pub device_key_hash: String,
    pub firmware_version: Option<String>,
    /// Last time the unit reported in
    pub last_report_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::medicine::Entity",
        from = "Column::MedicineId",
        to = "super::medicine::Column::Id",
        on_delete = "SetNull"
    )]
    Medicine,
}

impl Related<super::medicine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Medicine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
