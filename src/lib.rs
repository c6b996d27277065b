//! Client core of Trash Tracker, a citizen garbage reporting app.
//!
//!
//!
//! # General Infrastructure
//! - The app is a thin presentation layer over hosted services
//! - Auth, relational storage and object storage come from one Supabase-style
//!   service, reached over its REST surface
//! - Geocoding goes to an OpenStreetMap Nominatim instance, no API key
//! - This crate owns session lifecycle, the submission flow and the
//!   collaborator clients; a host shell renders the state it exposes
//! - No inbound surface, no CLI, no binaries
//!
//!
//!
//! # Session Handling
//!
//! **Goal**: one source of truth for who is signed in, never stuck loading.
//!
//! - One store, started before any protected view, alive for the process
//! - Startup restore failure falls back to signed out rather than blocking
//! - Collaborator notifications replace the session value wholesale, in
//!   arrival order
//! - Protected views check the store and redirect to login when signed out
//!
//!
//!
//! # Notes
//!
//! ## Deadlines
//! Every user-facing remote call races a fixed deadline instead of waiting on
//! the collaborator indefinitely. Sign-up gets 15 seconds, sign-in and report
//! submission get 10. The losing side of the race is abandoned, not
//! cancelled: a write that lands after its timeout already failed the UI is
//! dropped on the floor. The user sees a retry prompt either way, and every
//! retry is a button press, never automatic.
//!
//! ## Search Debounce
//! The location box waits for 500 ms of quiet before asking Nominatim, so a
//! typing burst costs one request instead of one per keystroke. Only the
//! trailing query of a burst is dispatched.
//!
//! ## Offline
//! The host shell feeds an online/offline flag. While offline the submission
//! view is swapped for a retry prompt and a submit attempt fails locally
//! without touching the network.

pub mod app;
pub mod auth;
pub mod config;
pub mod deadline;
pub mod error;
pub mod geocode;
pub mod profile;
pub mod reports;
mod rest;
pub mod session;
pub mod storage;

pub use app::{App, Connectivity, StartupWatchdog};
pub use error::AppError;
pub use session::{Gate, Session, SessionState, SessionStore, route_guard};
