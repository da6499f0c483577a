//! Control-plane schema, applied through the component schema history.

use sea_orm_migration::MigrationTrait;

mod initial_001;

#[must_use]
pub fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![Box::new(initial_001::Migration)]
}
