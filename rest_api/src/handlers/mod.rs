// rest_api/src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod doctors;
pub mod emergency;
pub mod laboratories;
pub mod patients;
pub mod records;
pub mod users;
