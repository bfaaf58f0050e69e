//! Mesh configuration.

use std::time::Duration;

use design_sync_core::DEFAULT_MAX_FRAME;

/// How envelopes are fragmented and paced onto a link.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Ceiling on one encoded `chunk-part` frame, in bytes.
    pub max_frame: usize,
    /// Pause after this many fragments of one transfer. Zero disables pacing.
    pub pace_every: usize,
    /// Length of each pause.
    pub pace_delay: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
            pace_every: 8,
            pace_delay: Duration::from_millis(2),
        }
    }
}

/// Configuration for the peer mesh and host election.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub chunk: ChunkConfig,
    /// Claim attempts before host election gives up.
    pub max_election_rounds: u32,
    /// Wait between election rounds.
    pub election_backoff: Duration,
    /// Timeout for dialing the host.
    pub dial_timeout: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            max_election_rounds: 3,
            election_backoff: Duration::from_millis(50),
            dial_timeout: Duration::from_secs(10),
        }
    }
}
