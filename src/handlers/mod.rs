// Handlers are split by security tier:
// public (no auth) and protected (JWT auth, see middleware::auth)
pub mod protected;
pub mod public;
