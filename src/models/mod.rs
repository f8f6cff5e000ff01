//! Domain model module declarations.

pub mod fleet;
pub mod record;
