//! Sightings of other players and the local player's whereabouts.

use regex::Regex;
use std::sync::LazyLock;

use super::capture_text;
use crate::error::{Error, Result};
use crate::nearby::SightingKind;

const CORPSE_ENABLED_MARKER: &str = "IsCorpseEnabled";

static CORPSE_PLAYER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Player\s'([^']+)'\s<remote\sclient>").expect("valid corpse player regex")
});
static STALL_PLAYER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Player:\s*([^,\s]+)").expect("valid stall player regex"));
static SPAWN_RESERVATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Player\s'([^']+)'\s\[\d+\]\s(lost|received)\sreservation\sfor\sspawnpoint\s([^\[]+?)\s\[")
        .expect("valid spawn reservation regex")
});
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Player\[([^\]]+)\].*?Location\[([^\]]+)\]").expect("valid location regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSighting {
    pub name: String,
    pub kind: SightingKind,
}

/// Remote player corpse. Records without the corpse flag, or about the local
/// player, are not sightings.
pub fn parse_corpse_sighting(line: &str, local_user: Option<&str>) -> Option<PlayerSighting> {
    if !line.contains(CORPSE_ENABLED_MARKER) {
        return None;
    }

    let name = capture_text(&CORPSE_PLAYER_RE, line, 1)?;
    if local_user.is_some_and(|user_name| user_name == name) {
        return None;
    }

    Some(PlayerSighting {
        name,
        kind: SightingKind::Corpse,
    })
}

pub fn parse_stall_sighting(line: &str, local_user: Option<&str>) -> Option<PlayerSighting> {
    let name = capture_text(&STALL_PLAYER_RE, line, 1)?;
    if local_user.is_some_and(|user_name| user_name == name) {
        return None;
    }

    Some(PlayerSighting {
        name,
        kind: SightingKind::Stall,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnReservation {
    pub player: String,
    pub received: bool,
    pub spawn_point: String,
}

pub fn parse_spawn_reservation(line: &str) -> Result<SpawnReservation> {
    let captures = SPAWN_RESERVATION_RE
        .captures(line)
        .ok_or_else(|| Error::malformed("spawn flow", "missing spawnpoint reservation"))?;

    Ok(SpawnReservation {
        player: captures[1].trim().to_string(),
        received: &captures[2] == "received",
        spawn_point: captures[3].trim().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationUpdate {
    pub player: String,
    pub location: String,
}

pub fn parse_location(line: &str) -> Result<LocationUpdate> {
    let captures = LOCATION_RE
        .captures(line)
        .ok_or_else(|| Error::malformed("location inventory", "missing player or location"))?;

    Ok(LocationUpdate {
        player: captures[1].trim().to_string(),
        location: captures[2].trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        parse_corpse_sighting, parse_location, parse_spawn_reservation, parse_stall_sighting,
    };
    use crate::nearby::SightingKind;

    const CORPSE_LINE: &str = "<2025-01-01T12:00:00.000Z> [Notice] <[ActorState] Corpse> [ACTOR STATE][SSCActorStateCVars::LogCorpse] Player 'Pilot3' <remote client>: IsCorpseEnabled: Yes, there is no local inventory. [Team_ActorFeatures][Actor]";

    #[test]
    fn corpse_of_remote_player_is_a_sighting() {
        let sighting =
            parse_corpse_sighting(CORPSE_LINE, Some("Pilot1")).expect("Corpse should be sighted");
        assert_eq!(sighting.name, "Pilot3");
        assert_eq!(sighting.kind, SightingKind::Corpse);
    }

    #[test]
    fn own_corpse_and_unflagged_records_are_ignored() {
        assert_eq!(parse_corpse_sighting(CORPSE_LINE, Some("Pilot3")), None);
        assert_eq!(
            parse_corpse_sighting(
                "<[ActorState] Corpse> Player 'Pilot3' <remote client>: Running corpse checks",
                None
            ),
            None
        );
    }

    #[test]
    fn stall_names_the_stalled_player() {
        let sighting = parse_stall_sighting(
            "<2025-01-01T12:00:00.000Z> [Notice] <Actor Stall> Actor stall detected, Player: Pilot4, Type: downstream, Length: 12.4. [Team_ActorTech][Actor]",
            Some("Pilot1"),
        )
        .expect("Stall should be sighted");
        assert_eq!(sighting.name, "Pilot4");
        assert_eq!(sighting.kind, SightingKind::Stall);
    }

    #[test]
    fn spawn_reservations_extract_spawnpoint() {
        let reservation = parse_spawn_reservation(
            "<2025-01-01T12:00:00.000Z> [Notice] <Spawn Flow> CSCPlayerPUSpawningComponent::UnregisterFromExternalSystems: Player 'Pilot1' [201990621234] lost reservation for spawnpoint Bed_Single_Front-001 [3108612379000] at location 0 [Team_ActorFeatures][Actor]",
        )
        .expect("Reservation should parse");
        assert_eq!(reservation.player, "Pilot1");
        assert!(!reservation.received);
        assert_eq!(reservation.spawn_point, "Bed_Single_Front-001");
    }

    #[test]
    fn location_inventory_names_player_and_location() {
        let update = parse_location(
            "<2025-01-01T12:00:00.000Z> [Notice] <RequestLocationInventory> Player[Pilot1] requested inventory for Location[Stanton2_Orison] [Team_CoreGameplayFeatures][Inventory]",
        )
        .expect("Location should parse");
        assert_eq!(update.player, "Pilot1");
        assert_eq!(update.location, "Stanton2_Orison");

        let error = parse_location("<RequestLocationInventory> incomplete")
            .expect_err("Missing fields should fail");
        assert!(error.is_line_local());
    }
}
