// Protected handlers: every route here sits behind jwt_auth_middleware,
// which injects an AuthUser extension
pub mod auth;
pub mod whatsapp;
