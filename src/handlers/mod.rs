//! HTTP handlers for table CRUD.

pub mod record;
