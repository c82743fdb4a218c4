//! faceauthd — HTTP daemon for face embedding and verification.
//!
//! Exposes two endpoints: `POST /generate-embedding` returns the embedding
//! of an uploaded face image, and `POST /verify-face` compares the upload
//! against every enrolled embedding in Postgres and answers with the first
//! user within the distance threshold.

pub mod api;
pub mod config;
pub mod endpoints;
pub mod engine;
pub mod multipart;
pub mod router;
pub mod store;
