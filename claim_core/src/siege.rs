//! Siege tracking: who is at war over which claims, and the cooldowns that
//! gate the next siege once one resolves.

use std::collections::HashMap;
use std::fmt;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claim::{ClaimId, PlayerId};
use crate::collaborators::{ClaimEvent, PlayerPresence, TrustCheck};
use crate::config::SiegeSettings;
use crate::geometry::WorldId;
use crate::scheduler::{ClaimJob, TaskHandle, TickScheduler};
use crate::store::ClaimWorlds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiegeId(pub u64);

impl fmt::Display for SiegeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "siege#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiegeState {
    Active,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct Siege {
    pub id: SiegeId,
    pub attacker: PlayerId,
    pub defender: PlayerId,
    pub claims: Vec<(WorldId, ClaimId)>,
    pub state: SiegeState,
    pub started_at: u64,
    pub checkup: Option<TaskHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmunityReason {
    AdministrativeClaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiegeError {
    #[error("siege cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },
    #[error("{0} is already at war")]
    AlreadyAtWar(PlayerId),
    #[error("{0} is already under siege")]
    ClaimUnderSiege(ClaimId),
    #[error("target is immune to sieges: {0:?}")]
    Immune(ImmunityReason),
    #[error("a player cannot besiege themselves")]
    SelfSiege,
    #[error("{0} does not exist")]
    ClaimNotFound(ClaimId),
    #[error("{0} is not active")]
    SiegeNotFound(SiegeId),
    #[error("{0} is not in a siege")]
    NotAtWar(PlayerId),
    #[error("defender {defender} has no access to {claim}")]
    NoAccess { defender: PlayerId, claim: ClaimId },
}

/// How a siege ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiegeResolution {
    pub siege: SiegeId,
    pub winner: Option<PlayerId>,
    pub loser: Option<PlayerId>,
    pub by_death: bool,
    /// Claims whose access was opened because the attacker won.
    pub opened_claims: Vec<(WorldId, ClaimId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CooldownKey {
    Pair { attacker: PlayerId, defender: PlayerId },
    Owner { attacker: PlayerId, owner: PlayerId },
}

#[derive(Resource, Debug, Default)]
pub struct SiegeCoordinator {
    settings: SiegeSettings,
    sieges: HashMap<SiegeId, Siege>,
    by_player: HashMap<PlayerId, SiegeId>,
    cooldowns: HashMap<CooldownKey, u64>,
    last_siege_ended: HashMap<PlayerId, u64>,
    next_id: u64,
}

impl SiegeCoordinator {
    pub fn new(settings: SiegeSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SiegeSettings {
        &self.settings
    }

    pub fn siege(&self, id: SiegeId) -> Option<&Siege> {
        self.sieges.get(&id)
    }

    pub fn siege_of(&self, player: PlayerId) -> Option<&Siege> {
        self.by_player.get(&player).and_then(|id| self.sieges.get(id))
    }

    /// Number of sieges still in progress. Resolved sieges stay queryable
    /// through [`SiegeCoordinator::siege`] but are not counted.
    pub fn active_sieges(&self) -> usize {
        self.sieges
            .values()
            .filter(|siege| siege.state == SiegeState::Active)
            .count()
    }

    /// Seconds left before `attacker` may besiege `defender` in a claim owned
    /// by `claim_owner`, or `None` when no cooldown applies.
    pub fn on_cooldown(
        &self,
        now: u64,
        attacker: PlayerId,
        defender: PlayerId,
        claim_owner: Option<PlayerId>,
    ) -> Option<u64> {
        let mut expiries = vec![self.cooldowns.get(&CooldownKey::Pair { attacker, defender })];
        if let Some(owner) = claim_owner {
            expiries.push(self.cooldowns.get(&CooldownKey::Owner { attacker, owner }));
        }
        let grace_end = self
            .last_siege_ended
            .get(&defender)
            .map(|ended| ended.saturating_add(self.settings.defender_grace_secs));

        expiries
            .into_iter()
            .flatten()
            .copied()
            .chain(grace_end)
            .filter(|expiry| *expiry > now)
            .map(|expiry| expiry - now)
            .max()
    }

    /// Open a siege by `attacker` against `defender` over one claim.
    pub fn start(
        &mut self,
        worlds: &mut ClaimWorlds,
        scheduler: &mut TickScheduler,
        now: u64,
        attacker: PlayerId,
        defender: PlayerId,
        world: WorldId,
        claim_id: ClaimId,
    ) -> Result<SiegeId, SiegeError> {
        if attacker == defender {
            return Err(SiegeError::SelfSiege);
        }
        let claim = worlds
            .claim(world, claim_id)
            .ok_or(SiegeError::ClaimNotFound(claim_id))?;
        if claim.is_admin() {
            return Err(SiegeError::Immune(ImmunityReason::AdministrativeClaim));
        }
        for player in [attacker, defender] {
            if self.by_player.contains_key(&player) {
                return Err(SiegeError::AlreadyAtWar(player));
            }
        }
        if claim.siege().is_some() {
            return Err(SiegeError::ClaimUnderSiege(claim_id));
        }
        if let Some(remaining_secs) = self.on_cooldown(now, attacker, defender, claim.owner()) {
            tracing::debug!(
                target: "claims::siege",
                %attacker,
                %defender,
                remaining_secs,
                "siege.rejected=cooldown"
            );
            return Err(SiegeError::CooldownActive { remaining_secs });
        }

        self.next_id += 1;
        let id = SiegeId(self.next_id);
        let checkup = scheduler.run_periodically(
            now,
            self.settings.checkup_interval_secs,
            ClaimJob::SiegeCheckup(id),
        );
        worlds.store_mut(world).set_siege(claim_id, Some(id));
        self.by_player.insert(attacker, id);
        self.by_player.insert(defender, id);
        self.sieges.insert(
            id,
            Siege {
                id,
                attacker,
                defender,
                claims: vec![(world, claim_id)],
                state: SiegeState::Active,
                started_at: now,
                checkup: Some(checkup),
            },
        );
        worlds.hooks().events.publish(ClaimEvent::SiegeStarted {
            siege: id,
            attacker,
            defender,
        });

        tracing::info!(
            target: "claims::siege",
            siege = %id,
            %attacker,
            %defender,
            claim = %claim_id,
            "siege.started"
        );
        Ok(id)
    }

    /// Pull another claim into the siege `player` is part of.
    pub fn extend(
        &mut self,
        worlds: &mut ClaimWorlds,
        player: PlayerId,
        world: WorldId,
        claim_id: ClaimId,
        trust: &dyn TrustCheck,
    ) -> Result<(), SiegeError> {
        let siege_id = *self
            .by_player
            .get(&player)
            .ok_or(SiegeError::NotAtWar(player))?;
        let siege = self
            .sieges
            .get_mut(&siege_id)
            .ok_or(SiegeError::SiegeNotFound(siege_id))?;
        let claim = worlds
            .claim(world, claim_id)
            .ok_or(SiegeError::ClaimNotFound(claim_id))?;

        match claim.siege() {
            Some(existing) if existing == siege_id => return Ok(()),
            Some(_) => return Err(SiegeError::ClaimUnderSiege(claim_id)),
            None => {}
        }
        if claim.is_admin() {
            return Err(SiegeError::Immune(ImmunityReason::AdministrativeClaim));
        }
        if !trust.has_access(siege.defender, claim) {
            return Err(SiegeError::NoAccess {
                defender: siege.defender,
                claim: claim_id,
            });
        }

        siege.claims.push((world, claim_id));
        worlds.store_mut(world).set_siege(claim_id, Some(siege_id));
        tracing::debug!(
            target: "claims::siege",
            siege = %siege_id,
            claim = %claim_id,
            "siege.extended"
        );
        Ok(())
    }

    /// Resolve a siege.
    ///
    /// The siege stays on record as `Resolved`. Unlinks players and claims, opens access to every besieged claim when
    /// the attacker won (reverted later by a scheduled job), starts the
    /// cooldowns and cancels the checkup.
    pub fn end(
        &mut self,
        worlds: &mut ClaimWorlds,
        scheduler: &mut TickScheduler,
        now: u64,
        siege_id: SiegeId,
        winner: Option<PlayerId>,
        loser: Option<PlayerId>,
        by_death: bool,
    ) -> Result<SiegeResolution, SiegeError> {
        let siege = self
            .sieges
            .get_mut(&siege_id)
            .filter(|siege| siege.state == SiegeState::Active)
            .ok_or(SiegeError::SiegeNotFound(siege_id))?;
        siege.state = SiegeState::Resolved;
        let checkup = siege.checkup.take();
        let siege = siege.clone();

        for player in [siege.attacker, siege.defender] {
            if self.by_player.get(&player) == Some(&siege_id) {
                self.by_player.remove(&player);
            }
        }
        if let Some(handle) = checkup {
            scheduler.cancel(handle);
        }

        let attacker_won = winner == Some(siege.attacker);
        let cooldown_until = now.saturating_add(self.settings.cooldown_secs);
        let mut opened_claims = Vec::new();
        for (world, claim_id) in &siege.claims {
            let Some(store) = worlds.existing_store_mut(*world) else {
                continue;
            };
            if let Some(owner) = store.claim(*claim_id).and_then(|claim| claim.owner()) {
                self.cooldowns.insert(
                    CooldownKey::Owner {
                        attacker: siege.attacker,
                        owner,
                    },
                    cooldown_until,
                );
            }
            if !store.set_siege(*claim_id, None) {
                continue;
            }
            if attacker_won {
                store.set_access_override(*claim_id, true);
                scheduler.run_after(
                    now,
                    self.settings.access_open_secs,
                    ClaimJob::CloseAccess {
                        world: *world,
                        claim: *claim_id,
                    },
                );
                opened_claims.push((*world, *claim_id));
            }
        }
        self.cooldowns.insert(
            CooldownKey::Pair {
                attacker: siege.attacker,
                defender: siege.defender,
            },
            cooldown_until,
        );
        self.last_siege_ended.insert(siege.attacker, now);
        self.last_siege_ended.insert(siege.defender, now);

        worlds.hooks().events.publish(ClaimEvent::SiegeEnded {
            siege: siege_id,
            winner,
            by_death,
        });
        tracing::info!(
            target: "claims::siege",
            siege = %siege_id,
            winner = ?winner,
            loser = ?loser,
            by_death,
            opened = opened_claims.len(),
            "siege.ended"
        );

        Ok(SiegeResolution {
            siege: siege_id,
            winner,
            loser,
            by_death,
            opened_claims,
        })
    }

    /// Periodic check on an active siege.
    ///
    /// A participant who left the besieged claims (offline, another world,
    /// or farther than `presence_radius` from every claim) forfeits; the
    /// defender is checked first. Checkups for resolved sieges do nothing.
    pub fn checkup(
        &mut self,
        worlds: &mut ClaimWorlds,
        scheduler: &mut TickScheduler,
        now: u64,
        siege_id: SiegeId,
        presence: &dyn PlayerPresence,
    ) -> Option<SiegeResolution> {
        let Some(siege) = self
            .sieges
            .get(&siege_id)
            .filter(|siege| siege.state == SiegeState::Active)
        else {
            tracing::debug!(target: "claims::siege", siege = %siege_id, "siege.checkup_skipped");
            return None;
        };
        let (attacker, defender) = (siege.attacker, siege.defender);

        let live_claims = siege
            .claims
            .iter()
            .filter(|(world, claim)| worlds.claim(*world, *claim).is_some())
            .count();
        let (winner, loser) = if live_claims == 0 {
            (None, None)
        } else if !self.is_present(worlds, siege, defender, presence) {
            (Some(attacker), Some(defender))
        } else if !self.is_present(worlds, siege, attacker, presence) {
            (Some(defender), Some(attacker))
        } else {
            return None;
        };

        self.end(worlds, scheduler, now, siege_id, winner, loser, false)
            .ok()
    }

    fn is_present(
        &self,
        worlds: &ClaimWorlds,
        siege: &Siege,
        player: PlayerId,
        presence: &dyn PlayerPresence,
    ) -> bool {
        let Some(location) = presence.position(player) else {
            return false;
        };
        siege.claims.iter().any(|(world, claim_id)| {
            *world == location.world
                && worlds.claim(*world, *claim_id).is_some_and(|claim| {
                    claim.bounds().footprint_within(
                        location.pos.x,
                        location.pos.z,
                        self.settings.presence_radius,
                    )
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{OwnerOnlyTrust, PlayerPresenceTable};
    use crate::geometry::Location;
    use crate::lifecycle::NewClaim;

    const WORLD: WorldId = WorldId(0);
    const ATTACKER: PlayerId = PlayerId(1);
    const DEFENDER: PlayerId = PlayerId(2);

    struct Fixture {
        worlds: ClaimWorlds,
        scheduler: TickScheduler,
        sieges: SiegeCoordinator,
        home: ClaimId,
    }

    fn fixture() -> Fixture {
        let mut worlds = ClaimWorlds::default();
        let home = worlds
            .create(NewClaim::basic(
                Location::new(WORLD, 0, 64, 0),
                Location::new(WORLD, 30, 64, 30),
                DEFENDER,
            ))
            .unwrap();
        Fixture {
            worlds,
            scheduler: TickScheduler::new(),
            sieges: SiegeCoordinator::new(SiegeSettings::default()),
            home,
        }
    }

    impl Fixture {
        fn start(&mut self, now: u64) -> Result<SiegeId, SiegeError> {
            self.sieges.start(
                &mut self.worlds,
                &mut self.scheduler,
                now,
                ATTACKER,
                DEFENDER,
                WORLD,
                self.home,
            )
        }
    }

    #[test]
    fn start_links_players_claim_and_checkup() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        assert_eq!(fx.sieges.siege_of(ATTACKER).map(|s| s.id), Some(id));
        assert_eq!(fx.sieges.siege_of(DEFENDER).map(|s| s.id), Some(id));
        assert_eq!(fx.worlds.claim(WORLD, fx.home).unwrap().siege(), Some(id));
        assert_eq!(fx.scheduler.pending(), 1);
    }

    #[test]
    fn start_rejects_busy_players_and_self_sieges() {
        let mut fx = fixture();
        assert_eq!(
            fx.sieges.start(
                &mut fx.worlds,
                &mut fx.scheduler,
                0,
                DEFENDER,
                DEFENDER,
                WORLD,
                fx.home
            ),
            Err(SiegeError::SelfSiege)
        );
        fx.start(0).unwrap();
        assert_eq!(fx.start(0), Err(SiegeError::AlreadyAtWar(ATTACKER)));
    }

    #[test]
    fn admin_claims_are_immune() {
        let mut fx = fixture();
        let admin = fx
            .worlds
            .create(NewClaim::admin(
                Location::new(WORLD, 100, 64, 100),
                Location::new(WORLD, 120, 64, 120),
            ))
            .unwrap();
        assert_eq!(
            fx.sieges
                .start(&mut fx.worlds, &mut fx.scheduler, 0, ATTACKER, DEFENDER, WORLD, admin),
            Err(SiegeError::Immune(ImmunityReason::AdministrativeClaim))
        );
        assert_eq!(fx.sieges.active_sieges(), 0);
    }

    #[test]
    fn end_applies_cooldown_for_an_hour() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        fx.sieges
            .end(
                &mut fx.worlds,
                &mut fx.scheduler,
                100,
                id,
                Some(ATTACKER),
                Some(DEFENDER),
                false,
            )
            .unwrap();

        assert_eq!(
            fx.start(100),
            Err(SiegeError::CooldownActive {
                remaining_secs: 3600
            })
        );
        assert_eq!(
            fx.start(3699),
            Err(SiegeError::CooldownActive { remaining_secs: 1 })
        );
        assert!(fx.start(3700).is_ok());
    }

    #[test]
    fn attacker_win_opens_access_and_schedules_revert() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        let resolution = fx
            .sieges
            .end(
                &mut fx.worlds,
                &mut fx.scheduler,
                50,
                id,
                Some(ATTACKER),
                Some(DEFENDER),
                true,
            )
            .unwrap();
        assert_eq!(resolution.opened_claims, vec![(WORLD, fx.home)]);
        let claim = fx.worlds.claim(WORLD, fx.home).unwrap();
        assert!(claim.access_override());
        assert_eq!(claim.siege(), None);
        assert_eq!(
            fx.scheduler.drain_due(350),
            vec![(
                TaskHandle(2),
                ClaimJob::CloseAccess {
                    world: WORLD,
                    claim: fx.home
                }
            )]
        );
    }

    #[test]
    fn defender_win_keeps_access_closed() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        let resolution = fx
            .sieges
            .end(
                &mut fx.worlds,
                &mut fx.scheduler,
                50,
                id,
                Some(DEFENDER),
                Some(ATTACKER),
                false,
            )
            .unwrap();
        assert!(resolution.opened_claims.is_empty());
        assert!(!fx.worlds.claim(WORLD, fx.home).unwrap().access_override());
        assert_eq!(fx.scheduler.pending(), 0);
    }

    #[test]
    fn ending_twice_is_rejected_without_side_effects() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        fx.sieges
            .end(&mut fx.worlds, &mut fx.scheduler, 10, id, None, None, false)
            .unwrap();
        assert_eq!(
            fx.sieges
                .end(&mut fx.worlds, &mut fx.scheduler, 20, id, None, None, false),
            Err(SiegeError::SiegeNotFound(id))
        );
        // The first end's cooldown is untouched by the rejected second one.
        assert_eq!(
            fx.sieges.on_cooldown(20, ATTACKER, DEFENDER, Some(DEFENDER)),
            Some(3590)
        );
    }

    #[test]
    fn resolved_siege_stays_on_record() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        assert_eq!(fx.sieges.siege(id).map(|s| s.state), Some(SiegeState::Active));
        assert_eq!(fx.sieges.active_sieges(), 1);

        fx.sieges
            .end(
                &mut fx.worlds,
                &mut fx.scheduler,
                40,
                id,
                Some(DEFENDER),
                Some(ATTACKER),
                false,
            )
            .unwrap();

        let siege = fx.sieges.siege(id).unwrap();
        assert_eq!(siege.state, SiegeState::Resolved);
        assert_eq!(siege.checkup, None);
        assert_eq!(siege.claims, vec![(WORLD, fx.home)]);
        assert_eq!(fx.sieges.active_sieges(), 0);
        assert!(fx.sieges.siege_of(ATTACKER).is_none());
        assert!(fx.sieges.siege_of(DEFENDER).is_none());
    }

    #[test]
    fn extend_requires_defender_access() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        let barn = fx
            .worlds
            .create(NewClaim::basic(
                Location::new(WORLD, 40, 64, 0),
                Location::new(WORLD, 60, 64, 20),
                DEFENDER,
            ))
            .unwrap();
        let stranger = fx
            .worlds
            .create(NewClaim::basic(
                Location::new(WORLD, 80, 64, 0),
                Location::new(WORLD, 100, 64, 20),
                PlayerId(9),
            ))
            .unwrap();

        fx.sieges
            .extend(&mut fx.worlds, DEFENDER, WORLD, barn, &OwnerOnlyTrust)
            .unwrap();
        assert_eq!(fx.worlds.claim(WORLD, barn).unwrap().siege(), Some(id));
        assert_eq!(
            fx.sieges
                .extend(&mut fx.worlds, DEFENDER, WORLD, stranger, &OwnerOnlyTrust),
            Err(SiegeError::NoAccess {
                defender: DEFENDER,
                claim: stranger
            })
        );
        assert_eq!(
            fx.sieges
                .extend(&mut fx.worlds, PlayerId(5), WORLD, barn, &OwnerOnlyTrust),
            Err(SiegeError::NotAtWar(PlayerId(5)))
        );
        assert_eq!(fx.sieges.siege(id).unwrap().claims.len(), 2);
    }

    #[test]
    fn checkup_awards_win_when_defender_leaves() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        let mut presence = PlayerPresenceTable::default();
        presence.set(ATTACKER, Location::new(WORLD, 10, 64, 10));
        presence.set(DEFENDER, Location::new(WORLD, 20, 64, 20));

        assert!(fx
            .sieges
            .checkup(&mut fx.worlds, &mut fx.scheduler, 30, id, &presence)
            .is_none());

        presence.set(DEFENDER, Location::new(WORLD, 500, 64, 500));
        let resolution = fx
            .sieges
            .checkup(&mut fx.worlds, &mut fx.scheduler, 60, id, &presence)
            .unwrap();
        assert_eq!(resolution.winner, Some(ATTACKER));
        assert_eq!(resolution.loser, Some(DEFENDER));

        assert!(fx
            .sieges
            .checkup(&mut fx.worlds, &mut fx.scheduler, 90, id, &presence)
            .is_none());
        assert_eq!(fx.sieges.siege(id).map(|s| s.state), Some(SiegeState::Resolved));
    }

    #[test]
    fn checkup_awards_defender_when_attacker_goes_offline() {
        let mut fx = fixture();
        let id = fx.start(0).unwrap();
        let mut presence = PlayerPresenceTable::default();
        presence.set(DEFENDER, Location::new(WORLD, 35, 64, 35));
        let resolution = fx
            .sieges
            .checkup(&mut fx.worlds, &mut fx.scheduler, 30, id, &presence)
            .unwrap();
        assert_eq!(resolution.winner, Some(DEFENDER));
        assert!(resolution.opened_claims.is_empty());
    }
}
