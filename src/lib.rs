//! deskvoice: realtime voice sessions for the trading-desk AI squad.
//!
//! One duplex session at a time connects the desk to a realtime voice
//! provider (Gemini Live or OpenAI Realtime). Microphone audio streams up,
//! synthesized speech plays back through an interruptible voice bus, and
//! tool calls from the model are answered by the desk backend.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskvoice::prelude::*;
//!
//! # async fn example() -> deskvoice::error::Result<()> {
//! let config = VoiceConfig::load()?;
//! let (desk, mut events) = VoiceDesk::from_config(
//!     config,
//!     ProviderKind::Gemini,
//!     Arc::new(UnavailableMicrophone),
//!     Arc::new(SimulatedPlayback),
//! )?;
//! desk.join_room(RoomId::Journal).await?;
//! desk.send_user_text("Let's review the ES trade").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod backend;
pub mod config;
pub mod desk;
pub mod dispatch;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod room;
pub mod session;
pub mod tools;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
