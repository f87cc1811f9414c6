//! Rotation engine for one actively-written log file.
//!
//! A [`Rotator`] decides *when* to rotate (calendar/interval boundaries via
//! [`Frequency`], or a byte threshold via `max_size`), *how* to rotate (the
//! three [`Behavior`] strategies) and *what to keep* (count- and age-bounded
//! retention over a persisted archive list). The persisted state document
//! lets a restarted process pick up where it left off: no double rotation,
//! no forgotten archives, at most one catch-up rotation per start.
//!
//! # Example
//!
//! ```rust,no_run
//! use logrotor::{Rotator, RotatorConfig, RotatorEvent};
//!
//! # async fn run() -> logrotor::Result<()> {
//! let config: RotatorConfig = serde_json::from_str(
//!     r#"{
//!         "file_path": "/var/log/app.log",
//!         "dir_path": "/var/log/archives",
//!         "state_file_path": "/var/log/archives/logstate.json",
//!         "frequency": "daily",
//!         "max_size": "100m",
//!         "files_limit": 14,
//!         "behavior": "copy_compress_truncate"
//!     }"#,
//! ).expect("valid config");
//!
//! let rotator = Rotator::new(config)?;
//! let mut events = rotator.subscribe();
//! rotator.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let RotatorEvent::Rotate(archive) = event {
//!         println!("rotated into {}", archive.path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod frequency;
pub mod naming;
pub mod state;

mod retention;
mod rotation;
mod rotator;
mod watcher;

pub use config::{Behavior, RotatorConfig, parse_duration, parse_size};
pub use error::{Error, Result};
pub use events::RotatorEvent;
pub use frequency::Frequency;
pub use naming::{NameFormatter, NameParts, default_formatter};
pub use rotator::Rotator;
pub use state::{ArchiveRecord, RotationState, StateStore};
