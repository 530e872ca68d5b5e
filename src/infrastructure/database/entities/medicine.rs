//! Medicine (formulary) entity

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum MedicineForm {
    #[sea_orm(string_value = "tablet")]
    Tablet,
    #[sea_orm(string_value = "capsule")]
    Capsule,
}

/// Medicine model
///
/// Prices are stored in the smallest currency unit (cents) to avoid
/// floating point in billing paths.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "medicines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub strength: Option<String>,
    pub form: MedicineForm,
    pub stock_quantity: i32,
    pub unit_price_cents: i64,
    pub expiry_date: Option<Date>,
    pub batch_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dispenser::Entity")]
    Dispensers,
}

impl Related<super::dispenser::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Dispensers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
