// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera access
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Workflow Layer                │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌──────────────────────────────────────┐   │
//! │  │  CameraResource (exclusive handles)  │   │
//! │  └──────────────────┬───────────────────┘   │
//! │                     │ CameraPlatform        │
//! │  ┌──────────────────┴───────────────────┐   │
//! │  │           Virtual Camera             │   │
//! │  └──────────────────────────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Platform trait, frame types and the camera resource
//! - [`virtual_camera`]: Platform replaying image files or synthetic frames

pub mod camera;
pub mod virtual_camera;
