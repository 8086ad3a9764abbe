use std::io::{self, BufRead};
use std::str::{FromStr, SplitWhitespace};
use std::sync::Arc;
use std::thread;

use bevy::prelude::{App, Mut};
use crossbeam_channel::{unbounded, Receiver};
use tracing::{info, warn};

use claim_core::{
    build_headless_app_with, load_claim_config_from_env, run_tick, ChannelEventSink, ClaimClock,
    ClaimEvent, ClaimHooks, ClaimId, ClaimWorlds, Location, NewClaim, NullPersistence, PlayerId,
    PlayerPresenceTable, SiegeCoordinator, TickScheduler, WorldId,
};

/// Flat claims typed at the console are anchored at this height.
const CONSOLE_Y: i32 = 64;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, metadata) = load_claim_config_from_env();
    let (sink, events) = ChannelEventSink::new();
    let hooks = ClaimHooks {
        persistence: Arc::new(NullPersistence),
        events: Arc::new(sink),
    };
    let mut app = build_headless_app_with(config, hooks);
    app.insert_resource(metadata);

    info!(target: "claims::server", "claimd ready; reading commands from stdin");

    let commands = spawn_stdin_reader();
    while let Ok(command) = commands.recv() {
        apply_command(&mut app, command);
        for event in events.try_iter() {
            log_event(&event);
        }
    }
    info!(target: "claims::server", "stdin closed; shutting down");
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Tick(u32),
    Claim {
        world: WorldId,
        x1: i32,
        z1: i32,
        x2: i32,
        z2: i32,
        owner: PlayerId,
    },
    Subdivide {
        world: WorldId,
        parent: ClaimId,
        x1: i32,
        z1: i32,
        x2: i32,
        z2: i32,
    },
    Resize {
        world: WorldId,
        claim: ClaimId,
        x1: i32,
        z1: i32,
        x2: i32,
        z2: i32,
    },
    Delete {
        world: WorldId,
        claim: ClaimId,
    },
    At(Location),
    Move {
        player: PlayerId,
        location: Location,
    },
    Leave(PlayerId),
    Siege {
        attacker: PlayerId,
        defender: PlayerId,
        world: WorldId,
        claim: ClaimId,
    },
    Status,
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (sender, receiver) = unbounded::<Command>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(target: "claims::server", error = %err, "command.read_failed");
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_command(trimmed) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                None => warn!(target: "claims::server", input = trimmed, "command.invalid"),
            }
        }
    });
    receiver
}

fn num<T: FromStr>(parts: &mut SplitWhitespace<'_>) -> Option<T> {
    parts.next()?.parse().ok()
}

fn parse_command(input: &str) -> Option<Command> {
    let mut parts = input.split_whitespace();
    let p = &mut parts;
    let command = match p.next()? {
        "tick" => Command::Tick(p.next().unwrap_or("1").parse().ok()?),
        "claim" => Command::Claim {
            world: WorldId(num(p)?),
            x1: num(p)?,
            z1: num(p)?,
            x2: num(p)?,
            z2: num(p)?,
            owner: PlayerId(num(p)?),
        },
        "subdivide" => Command::Subdivide {
            world: WorldId(num(p)?),
            parent: ClaimId(num(p)?),
            x1: num(p)?,
            z1: num(p)?,
            x2: num(p)?,
            z2: num(p)?,
        },
        "resize" => Command::Resize {
            world: WorldId(num(p)?),
            claim: ClaimId(num(p)?),
            x1: num(p)?,
            z1: num(p)?,
            x2: num(p)?,
            z2: num(p)?,
        },
        "delete" => Command::Delete {
            world: WorldId(num(p)?),
            claim: ClaimId(num(p)?),
        },
        "at" => {
            let world = WorldId(num(p)?);
            Command::At(Location::new(world, num(p)?, num(p)?, num(p)?))
        }
        "move" => {
            let player = PlayerId(num(p)?);
            let world = WorldId(num(p)?);
            Command::Move {
                player,
                location: Location::new(world, num(p)?, num(p)?, num(p)?),
            }
        }
        "leave" => Command::Leave(PlayerId(num(p)?)),
        "siege" => Command::Siege {
            attacker: PlayerId(num(p)?),
            defender: PlayerId(num(p)?),
            world: WorldId(num(p)?),
            claim: ClaimId(num(p)?),
        },
        "status" => Command::Status,
        _ => return None,
    };
    Some(command)
}

fn apply_command(app: &mut App, command: Command) {
    match command {
        Command::Tick(ticks) => {
            for _ in 0..ticks {
                run_tick(app);
            }
            let now = app.world.resource::<ClaimClock>().now_secs;
            info!(target: "claims::server", ticks, now, "clock.advanced");
        }
        Command::Claim {
            world,
            x1,
            z1,
            x2,
            z2,
            owner,
        } => {
            let request = NewClaim::basic(
                Location::new(world, x1, CONSOLE_Y, z1),
                Location::new(world, x2, CONSOLE_Y, z2),
                owner,
            );
            let result = app.world.resource_mut::<ClaimWorlds>().create(request);
            match result {
                Ok(claim) => info!(target: "claims::server", %claim, "command.applied=claim"),
                Err(err) => warn!(target: "claims::server", error = %err, "command.rejected=claim"),
            }
        }
        Command::Subdivide {
            world,
            parent,
            x1,
            z1,
            x2,
            z2,
        } => {
            let request = NewClaim::subdivision(
                Location::new(world, x1, CONSOLE_Y, z1),
                Location::new(world, x2, CONSOLE_Y, z2),
                parent,
            );
            let result = app.world.resource_mut::<ClaimWorlds>().create(request);
            match result {
                Ok(claim) => info!(target: "claims::server", %claim, "command.applied=subdivide"),
                Err(err) => {
                    warn!(target: "claims::server", error = %err, "command.rejected=subdivide")
                }
            }
        }
        Command::Resize {
            world,
            claim,
            x1,
            z1,
            x2,
            z2,
        } => {
            let result = app.world.resource_mut::<ClaimWorlds>().resize(
                world,
                claim,
                Location::new(world, x1, CONSOLE_Y, z1),
                Location::new(world, x2, CONSOLE_Y, z2),
            );
            if let Err(err) = result {
                warn!(target: "claims::server", %claim, error = %err, "command.rejected=resize");
            }
        }
        Command::Delete { world, claim } => {
            let result = app
                .world
                .resource_mut::<ClaimWorlds>()
                .delete(world, claim, true);
            if let Err(err) = result {
                warn!(target: "claims::server", %claim, error = %err, "command.rejected=delete");
            }
        }
        Command::At(location) => {
            let worlds = app.world.resource::<ClaimWorlds>();
            match worlds.claim_at(location, false, None) {
                Some(claim) => info!(
                    target: "claims::server",
                    claim = %claim.id(),
                    kind = claim.kind().as_str(),
                    owner = ?claim.owner(),
                    bounds = %claim.bounds(),
                    "lookup.claimed"
                ),
                None => info!(target: "claims::server", "lookup.wilderness"),
            }
        }
        Command::Move { player, location } => {
            app.world
                .resource_mut::<PlayerPresenceTable>()
                .set(player, location);
        }
        Command::Leave(player) => {
            app.world
                .resource_mut::<PlayerPresenceTable>()
                .remove(player);
        }
        Command::Siege {
            attacker,
            defender,
            world,
            claim,
        } => {
            let now = app.world.resource::<ClaimClock>().now_secs;
            let result = app
                .world
                .resource_scope(|world_ref, mut sieges: Mut<SiegeCoordinator>| {
                    world_ref.resource_scope(|world_ref, mut scheduler: Mut<TickScheduler>| {
                        let mut worlds = world_ref.resource_mut::<ClaimWorlds>();
                        sieges.start(&mut worlds, &mut scheduler, now, attacker, defender, world, claim)
                    })
                });
            if let Err(err) = result {
                warn!(target: "claims::server", error = %err, "command.rejected=siege");
            }
        }
        Command::Status => {
            let worlds = app.world.resource::<ClaimWorlds>();
            for store in worlds.stores() {
                info!(
                    target: "claims::server",
                    world = %store.world(),
                    claims = store.len(),
                    buckets = store.index().bucket_count(),
                    "status.world"
                );
            }
            let sieges = app.world.resource::<SiegeCoordinator>().active_sieges();
            let pending = app.world.resource::<TickScheduler>().pending();
            info!(target: "claims::server", sieges, pending, "status.scheduler");
        }
    }
}

fn log_event(event: &ClaimEvent) {
    info!(target: "claims::events", event = ?event, "event.published");
}
