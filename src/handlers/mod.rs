//! HTTP surface (§6.1). Each handler deserializes its request, resolves identity via
//! `UserContext` where the endpoint accepts an optional caller, forwards to the matching
//! core engine, and returns the engine's DTO as JSON. `AppError` implements
//! `IntoResponse` so handlers can `?`-propagate directly.

pub mod chat;
pub mod deep_dive;
pub mod email;
pub mod follow_up;
pub mod health;
pub mod photo;
pub mod quick_scan;
pub mod report;
pub mod tracking;
