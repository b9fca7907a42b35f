// Handlers module - one file per endpoint family

pub mod forward;
pub mod query;
