//! Status notification protocol: typed pipeline events and the broadcast bus.
//!
//! Every state transition in the pipeline is published as a [`PipelineEvent`]
//! on a [`StatusBus`]. Observers subscribe without coupling to queue
//! internals. Delivery is broadcast-only: subscribers registered after an
//! event was published never see it, so late subscribers resynchronize
//! through the pull-style [`StatusRegistry::snapshot`](registry::StatusRegistry::snapshot).

mod registry;

pub use registry::{PackageStatus, StatusRegistry};

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::item::PackageId;

/// Capacity of the broadcast channel backing the status bus.
///
/// Slow subscribers past this backlog observe a lag error and should
/// resynchronize from a snapshot.
const BUS_CAPACITY: usize = 256;

/// Stage of a package inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagePhase {
    /// Waiting in the download queue.
    Queued,
    /// A transfer worker is streaming the archive.
    Downloading,
    /// Transfer finished; not yet submitted for install.
    Downloaded,
    /// Waiting in the install queue.
    InstallQueued,
    /// The install worker is extracting and registering the package.
    Installing,
    /// Terminal: extracted and registered with the library.
    Installed,
    /// Terminal: cancelled by the user.
    Cancelled,
    /// Terminal: transfer or install failed.
    Failed,
}

impl PackagePhase {
    /// Whether this phase ends the package's trip through the pipeline.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Cancelled | Self::Failed)
    }

    /// Returns the wire/display string for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::InstallQueued => "install_queued",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PackagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state transition or progress notification broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Admitted to the download queue.
    Queued {
        /// The package the event concerns.
        id: PackageId,
    },
    /// A transfer worker started streaming the archive.
    Downloading {
        /// The package the event concerns.
        id: PackageId,
    },
    /// Transfer progress. Percent values for one package strictly increase
    /// and never repeat.
    Progress {
        /// The package the event concerns.
        id: PackageId,
        /// Whole percent of the transfer completed (0-100).
        percent: u8,
        /// Bytes written so far.
        bytes: u64,
        /// Total expected bytes (content length or declared size).
        total: u64,
    },
    /// Transfer completed; archive is on disk.
    Downloaded {
        /// The package the event concerns.
        id: PackageId,
    },
    /// Handed to the install queue.
    InstallQueued {
        /// The package the event concerns.
        id: PackageId,
    },
    /// The install worker started extracting.
    Installing {
        /// The package the event concerns.
        id: PackageId,
    },
    /// Terminal: installed and registered with the library.
    Installed {
        /// The package the event concerns.
        id: PackageId,
    },
    /// Terminal: cancelled by the user.
    Cancelled {
        /// The package the event concerns.
        id: PackageId,
    },
    /// Terminal: the transfer or install failed.
    Failed {
        /// The package the event concerns.
        id: PackageId,
        /// Human-readable description of the failure.
        error: String,
    },
    /// The package was deleted from the library and is available again.
    Reset {
        /// The package the event concerns.
        id: PackageId,
    },
}

impl PipelineEvent {
    /// The package this event concerns.
    #[must_use]
    pub fn package_id(&self) -> &PackageId {
        match self {
            Self::Queued { id }
            | Self::Downloading { id }
            | Self::Progress { id, .. }
            | Self::Downloaded { id }
            | Self::InstallQueued { id }
            | Self::Installing { id }
            | Self::Installed { id }
            | Self::Cancelled { id }
            | Self::Failed { id, .. }
            | Self::Reset { id } => id,
        }
    }

    /// Phase transition carried by this event, if it is one.
    ///
    /// `Progress` and `Reset` are notifications rather than phase changes
    /// and return `None`.
    #[must_use]
    pub fn phase(&self) -> Option<PackagePhase> {
        match self {
            Self::Queued { .. } => Some(PackagePhase::Queued),
            Self::Downloading { .. } => Some(PackagePhase::Downloading),
            Self::Downloaded { .. } => Some(PackagePhase::Downloaded),
            Self::InstallQueued { .. } => Some(PackagePhase::InstallQueued),
            Self::Installing { .. } => Some(PackagePhase::Installing),
            Self::Installed { .. } => Some(PackagePhase::Installed),
            Self::Cancelled { .. } => Some(PackagePhase::Cancelled),
            Self::Failed { .. } => Some(PackagePhase::Failed),
            Self::Progress { .. } | Self::Reset { .. } => None,
        }
    }

    /// Whether this event ends the package's trip through the pipeline.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase().is_some_and(PackagePhase::is_terminal)
    }
}

/// Broadcast bus for pipeline events.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl StatusBus {
    /// Creates a new bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Registers a new subscriber. Only events published after this call
    /// are delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Publishing never blocks and never fails: with no subscribers the
    /// event is dropped.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(PackagePhase::Installed.is_terminal());
        assert!(PackagePhase::Cancelled.is_terminal());
        assert!(PackagePhase::Failed.is_terminal());
        assert!(!PackagePhase::Queued.is_terminal());
        assert!(!PackagePhase::Downloading.is_terminal());
        assert!(!PackagePhase::Installing.is_terminal());
    }

    #[test]
    fn test_event_phase_mapping() {
        let id = PackageId::new("a");
        assert_eq!(
            PipelineEvent::Queued { id: id.clone() }.phase(),
            Some(PackagePhase::Queued)
        );
        assert_eq!(
            PipelineEvent::Progress {
                id: id.clone(),
                percent: 10,
                bytes: 100,
                total: 1000,
            }
            .phase(),
            None
        );
        assert_eq!(PipelineEvent::Reset { id }.phase(), None);
    }

    #[test]
    fn test_event_is_terminal() {
        let id = PackageId::new("a");
        assert!(PipelineEvent::Installed { id: id.clone() }.is_terminal());
        assert!(
            PipelineEvent::Failed {
                id: id.clone(),
                error: "boom".to_string(),
            }
            .is_terminal()
        );
        assert!(!PipelineEvent::Downloaded { id }.is_terminal());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let bus = StatusBus::new();
        bus.publish(PipelineEvent::Queued {
            id: PackageId::new("a"),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::Queued {
            id: PackageId::new("a"),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.package_id().as_str(), "a");
        assert_eq!(event.phase(), Some(PackagePhase::Queued));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = StatusBus::new();
        bus.publish(PipelineEvent::Queued {
            id: PackageId::new("a"),
        });

        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = PipelineEvent::Failed {
            id: PackageId::new("a"),
            error: "network error".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"failed""#), "got: {json}");
        assert!(json.contains("network error"), "got: {json}");
    }
}
