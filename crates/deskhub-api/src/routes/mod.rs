//! # API Route Modules
//!
//! - `auth` — register, login, logout, current user.
//! - `chat` — proxy to the chat completion API.
//! - `files` — project upload, listing, read, write and delete.
//! - `admin` — dashboard statistics and the user list (admin role).

pub mod admin;
pub mod auth;
pub mod chat;
pub mod files;
