//! # Datacollab
//!
//! A dataset collaboration server: owners publish annotated image and video
//! datasets, collaborators propose changes through pull requests, and
//! maintainers merge them. Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! datacollab = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::path::Path;
//! use std::sync::Arc;
//! use datacollab::config::ServerConfig;
//! use datacollab::events::EventBus;
//! use datacollab::objects::FsObjectStore;
//! use datacollab::server::{AppState, create_router};
//! use datacollab::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::load(Path::new("./data")).unwrap();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let objects = FsObjectStore::new(&config.data_dir, config.base_url(), config.signing_secret().unwrap());
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     Arc::new(objects),
//!     Arc::new(EventBus::default()),
//!     config,
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! The [`engine::Engine`] can also be driven directly, without HTTP.
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `datacollab` binary. Disable with `default-features = false`.

pub mod access;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod objects;
pub mod server;
pub mod store;
pub mod types;
