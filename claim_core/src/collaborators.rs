//! Seams to the systems around the claim index.
//!
//! Persistence, event delivery, trust lookups, player positions and owner
//! activity are owned elsewhere; the index only talks to them through these
//! traits. Null and table-backed implementations cover headless use and tests.

use std::collections::HashMap;
use std::fmt;
use std::io;

use bevy::prelude::Resource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use crate::claim::{ClaimId, ClaimRecord, PlayerId};
use crate::geometry::{Location, WorldId};
use crate::siege::SiegeId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("claim storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("claim storage backend rejected {claim}: {reason}")]
    Rejected { claim: ClaimId, reason: String },
}

/// Saves and removes claim records. Called after a change is committed.
pub trait ClaimPersistence: Send + Sync {
    fn save_claim(&self, claim: &ClaimRecord) -> Result<(), PersistenceError>;

    fn remove_claim(&self, world: WorldId, claim: ClaimId) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersistence;

impl ClaimPersistence for NullPersistence {
    fn save_claim(&self, _claim: &ClaimRecord) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn remove_claim(&self, _world: WorldId, _claim: ClaimId) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimEvent {
    Created {
        world: WorldId,
        claim: ClaimId,
    },
    Resized {
        world: WorldId,
        claim: ClaimId,
    },
    Deleted {
        world: WorldId,
        claim: ClaimId,
        owner: Option<PlayerId>,
    },
    SiegeStarted {
        siege: SiegeId,
        attacker: PlayerId,
        defender: PlayerId,
    },
    SiegeEnded {
        siege: SiegeId,
        winner: Option<PlayerId>,
        by_death: bool,
    },
}

/// Best-effort notification sink. Delivery failures are never surfaced.
pub trait ClaimEventSink: Send + Sync {
    fn publish(&self, event: ClaimEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl ClaimEventSink for NullEventSink {
    fn publish(&self, _event: ClaimEvent) {}
}

/// Forwards events over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: Sender<ClaimEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, Receiver<ClaimEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl ClaimEventSink for ChannelEventSink {
    fn publish(&self, event: ClaimEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!(target: "claims::events", "event.dropped=receiver_closed");
        }
    }
}

/// Answers "would this player normally be allowed in this claim?".
pub trait TrustCheck {
    fn has_access(&self, player: PlayerId, claim: &ClaimRecord) -> bool;
}

impl<F> TrustCheck for F
where
    F: Fn(PlayerId, &ClaimRecord) -> bool,
{
    fn has_access(&self, player: PlayerId, claim: &ClaimRecord) -> bool {
        self(player, claim)
    }
}

/// Only the owner is trusted.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerOnlyTrust;

impl TrustCheck for OwnerOnlyTrust {
    fn has_access(&self, player: PlayerId, claim: &ClaimRecord) -> bool {
        claim.owner() == Some(player)
    }
}

/// Where players currently are. `None` means offline.
pub trait PlayerPresence {
    fn position(&self, player: PlayerId) -> Option<Location>;
}

#[derive(Resource, Debug, Default, Clone)]
pub struct PlayerPresenceTable {
    positions: HashMap<PlayerId, Location>,
}

impl PlayerPresenceTable {
    pub fn set(&mut self, player: PlayerId, location: Location) {
        self.positions.insert(player, location);
    }

    pub fn remove(&mut self, player: PlayerId) {
        self.positions.remove(&player);
    }

    pub fn online(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.positions.keys().copied()
    }
}

impl PlayerPresence for PlayerPresenceTable {
    fn position(&self, player: PlayerId) -> Option<Location> {
        self.positions.get(&player).copied()
    }
}

/// When claim owners were last seen, in simulated seconds.
pub trait OwnerActivity {
    fn last_seen_secs(&self, owner: PlayerId) -> Option<u64>;
}

#[derive(Resource, Debug, Default, Clone)]
pub struct OwnerActivityTable {
    last_seen: HashMap<PlayerId, u64>,
}

impl OwnerActivityTable {
    pub fn record(&mut self, owner: PlayerId, now_secs: u64) {
        self.last_seen.insert(owner, now_secs);
    }
}

impl OwnerActivity for OwnerActivityTable {
    fn last_seen_secs(&self, owner: PlayerId) -> Option<u64> {
        self.last_seen.get(&owner).copied()
    }
}

impl fmt::Debug for dyn ClaimPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ClaimPersistence")
    }
}

impl fmt::Debug for dyn ClaimEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ClaimEventSink")
    }
}
