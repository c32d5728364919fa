//! Record model and page types

pub mod page;
pub mod record;
