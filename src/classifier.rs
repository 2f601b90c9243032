/// Kind of record a game log line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    ActorDeath,
    FatalCollision,
    VehicleDestruction,
    AccountIdentity,
    SpawnFlow,
    ActorStall,
    LocationInventory,
    VehicleControl,
    Corpse,
    EndMission,
    GameVersion,
}

impl LineKind {
    pub fn label(self) -> &'static str {
        match self {
            LineKind::ActorDeath => "actor death",
            LineKind::FatalCollision => "fatal collision",
            LineKind::VehicleDestruction => "vehicle destruction",
            LineKind::AccountIdentity => "account identity",
            LineKind::SpawnFlow => "spawn flow",
            LineKind::ActorStall => "actor stall",
            LineKind::LocationInventory => "location inventory",
            LineKind::VehicleControl => "vehicle control flow",
            LineKind::Corpse => "corpse",
            LineKind::EndMission => "end mission",
            LineKind::GameVersion => "game version",
        }
    }
}

/// Checked top to bottom; the first marker contained in the line wins. New
/// kinds are added here, not in the dispatch code.
const LINE_MARKERS: &[(&str, LineKind)] = &[
    ("<Actor Death>", LineKind::ActorDeath),
    ("<FatalCollision>", LineKind::FatalCollision),
    ("<Vehicle Destruction>", LineKind::VehicleDestruction),
    (
        "<AccountLoginCharacterStatus_Character>",
        LineKind::AccountIdentity,
    ),
    ("<Spawn Flow>", LineKind::SpawnFlow),
    ("<Actor Stall>", LineKind::ActorStall),
    ("<RequestLocationInventory>", LineKind::LocationInventory),
    ("<Vehicle Control Flow>", LineKind::VehicleControl),
    ("<[ActorState] Corpse>", LineKind::Corpse),
    ("<EndMission>", LineKind::EndMission),
    (" Branch: ", LineKind::GameVersion),
];

pub fn classify(line: &str) -> Option<LineKind> {
    LINE_MARKERS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::{classify, LineKind};

    #[test]
    fn classifies_known_markers() {
        let death = "<2025-01-01T12:00:00.000Z> [Notice] <Actor Death> CActor::Kill: 'a' [1] in zone 'z' killed by 'b' [2]";
        assert_eq!(classify(death), Some(LineKind::ActorDeath));

        let corpse = "<2025-01-01T12:00:00.000Z> [Notice] <[ActorState] Corpse> [ACTOR STATE][SSCActorStateCPL::CheckCorpseEnabled] Player 'Pilot3' <remote client>: Running IsCorpseEnabled check";
        assert_eq!(classify(corpse), Some(LineKind::Corpse));

        let version = "<2025-01-01T11:59:58.000Z> Branch: sc-alpha-4.0.2";
        assert_eq!(classify(version), Some(LineKind::GameVersion));
    }

    #[test]
    fn first_marker_in_table_order_wins() {
        let line = "<Vehicle Destruction> CVehicle::OnAdvanceDestroyLevel: Vehicle 'ship' caused by 'x' <Actor Death>";
        assert_eq!(classify(line), Some(LineKind::ActorDeath));
    }

    #[test]
    fn unmarked_lines_are_ignored() {
        assert_eq!(classify("<2025-01-01T12:00:00.000Z> [Notice] <Join PU> joining"), None);
        assert_eq!(classify(""), None);
    }
}
