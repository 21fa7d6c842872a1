pub mod cases;
pub mod error;
pub mod extraction;
pub mod health;
pub mod models;
pub mod openapi;
