pub mod auth;
pub mod whatsapp;
