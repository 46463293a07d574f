// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - backup pipeline components.

pub mod artifact;
pub mod backup;
pub mod delivery;
pub mod oauth;
pub mod scheduler;
pub mod toodledo;

pub use artifact::{Artifact, ArtifactWriter};
pub use backup::{BackupClients, BackupOrchestrator, BackupReport};
pub use delivery::{CloudDelivery, CommandDelivery, DropboxDelivery};
pub use oauth::{OAuthClient, TokenGrant};
pub use scheduler::{Scheduler, TickSummary};
pub use toodledo::TaskExporter;
