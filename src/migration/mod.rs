pub use sea_orm_migration::prelude::*;

mod m20260124_000001_create_users_and_catalog;
mod m20260124_000002_create_carts;
mod m20260124_000003_create_audit_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260124_000001_create_users_and_catalog::Migration),
            Box::new(m20260124_000002_create_carts::Migration),
            Box::new(m20260124_000003_create_audit_logs::Migration),
        ]
    }
}
