use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub owner_id: i32,

    /// Random key plus the original extension; the public filename.
    #[sea_orm(unique)]
    pub discriminator: String,

    pub created_at: String,

    /// Soft-delete flag; set while the file sits in the archive.
    pub deleted: bool,

    /// When the file entered the archive. Drives the retention purge.
    pub deleted_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
