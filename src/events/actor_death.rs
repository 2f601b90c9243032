use regex::Regex;
use std::sync::LazyLock;

use super::{capture_text, strip_instance_suffix};
use crate::enrichment::{ClassKind, EnrichmentGateway};
use crate::error::{Error, Result};
use crate::identity::UserIdentity;

const DAMAGE_SUICIDE: &str = "Suicide";
const DAMAGE_VEHICLE_DESTRUCTION: &str = "VehicleDestruction";
const GENERIC_WEAPON_CLASS: &str = "unknown";
const MAX_PLAYER_NAME_LENGTH: usize = 20;
const NON_PLAYER_MARKERS: &[&str] = &["SCItem_", "AI_", "PU_", "NPC_"];

static VICTIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CActor::Kill:\s'([^']*)'(?:\s\[(\d+)\])?").expect("valid victim regex")
});
static ZONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in\szone\s'([^']*)'").expect("valid zone regex"));
static KILLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"killed\sby\s'([^']*)'(?:\s\[(\d+)\])?").expect("valid killer regex")
});
static WEAPON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"using\s'([^']*)'(?:\s\[Class\s([^\]]*)\])?").expect("valid weapon regex")
});
static DAMAGE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"with\sdamage\stype\s'([^']*)'").expect("valid damage type regex")
});
/// NPC actors carry an 11-14 digit instance suffix on their class id.
static NPC_ACTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_\d{11,14}$").expect("valid npc actor regex"));
static PLAYER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]{2,20}$").expect("valid player name regex"));
static PLAYER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{9,13}$").expect("valid player id regex"));
/// Manufacturer-prefixed ship ids, e.g. `ORIG_100i`, `AEGS_Vanguard_Sentinel`.
static SHIP_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2,5}_[A-Za-z0-9_]+)").expect("valid ship id regex"));
static SHIP_ID_TWO_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z]{2,5}_[A-Za-z0-9]+_[A-Za-z0-9]+)").expect("valid ship id regex")
});

/// Fields of an `<Actor Death>` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorDeathRecord {
    pub victim: String,
    pub victim_id: Option<String>,
    pub zone: Option<String>,
    pub killer: Option<String>,
    pub killer_id: Option<String>,
    pub weapon_instance: Option<String>,
    pub weapon_class: Option<String>,
    pub damage_type: Option<String>,
}

impl ActorDeathRecord {
    pub fn is_vehicle_destruction(&self) -> bool {
        self.damage_type.as_deref() == Some(DAMAGE_VEHICLE_DESTRUCTION)
    }

    fn is_suicide_damage(&self) -> bool {
        self.damage_type.as_deref() == Some(DAMAGE_SUICIDE)
    }

    fn killed_by(&self, name: &str) -> bool {
        self.killer.as_deref() == Some(name)
    }
}

pub fn parse_actor_death(line: &str) -> Result<ActorDeathRecord> {
    let victim_captures = VICTIM_RE
        .captures(line)
        .ok_or_else(|| Error::malformed("actor death", "missing CActor::Kill subject"))?;
    let victim = victim_captures
        .get(1)
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::malformed("actor death", "empty CActor::Kill subject"))?;
    let victim_id = victim_captures
        .get(2)
        .map(|value| value.as_str().to_string());

    let (killer, killer_id) = match KILLER_RE.captures(line) {
        Some(captures) => (
            captures
                .get(1)
                .map(|value| value.as_str().trim().to_string())
                .filter(|value| !value.is_empty()),
            captures.get(2).map(|value| value.as_str().to_string()),
        ),
        None => (None, None),
    };

    let (weapon_instance, weapon_class) = match WEAPON_RE.captures(line) {
        Some(captures) => (
            captures
                .get(1)
                .map(|value| value.as_str().trim().to_string())
                .filter(|value| !value.is_empty()),
            captures
                .get(2)
                .map(|value| value.as_str().trim().to_string())
                .filter(|value| !value.is_empty()),
        ),
        None => (None, None),
    };

    Ok(ActorDeathRecord {
        victim,
        victim_id,
        zone: capture_text(&ZONE_RE, line, 1),
        killer,
        killer_id,
        weapon_instance,
        weapon_class,
        damage_type: capture_text(&DAMAGE_TYPE_RE, line, 1),
    })
}

/// One side of a kill or death as seen from the local user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Engagement {
    /// NPC class id or player name of the other party.
    pub counterparty: String,
    pub counterparty_ship: Option<String>,
    pub own_ship: Option<String>,
    pub weapon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathOutcome {
    Suicide,
    PveKill(Engagement),
    PvpKill(Engagement),
    PveDeath(Engagement),
    PvpDeath(Engagement),
    /// The record does not involve the local user in a countable way.
    Unattributed(&'static str),
}

/// Classification plus the class ids the catalog could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathClassification {
    pub outcome: DeathOutcome,
    pub unknown_classes: Vec<(ClassKind, String)>,
}

impl DeathClassification {
    fn new(outcome: DeathOutcome) -> Self {
        Self {
            outcome,
            unknown_classes: Vec::new(),
        }
    }
}

/// Decides what an actor death means for the local user. Branches are tested
/// in order and the first match wins: suicide, kill (PVE before PVP), then
/// death (PVE before PVP).
pub fn classify_actor_death(
    record: &ActorDeathRecord,
    identity: &UserIdentity,
    gateway: &dyn EnrichmentGateway,
) -> DeathClassification {
    let Some(user_name) = identity.user_name() else {
        return DeathClassification::new(DeathOutcome::Unattributed("local user not identified"));
    };

    if record.is_suicide_damage() && record.killed_by(user_name) {
        return DeathClassification::new(DeathOutcome::Suicide);
    }

    if record.killed_by(user_name) && record.victim != user_name {
        return classify_kill(record, identity, gateway);
    }

    if record.victim == user_name && !record.is_suicide_damage() && !record.killed_by(user_name) {
        return classify_death(record, identity, gateway);
    }

    DeathClassification::new(DeathOutcome::Unattributed("local user not involved"))
}

fn classify_kill(
    record: &ActorDeathRecord,
    identity: &UserIdentity,
    gateway: &dyn EnrichmentGateway,
) -> DeathClassification {
    let mut unknown_classes = Vec::new();
    let weapon = resolve_weapon_class(record);
    let counterparty_ship = record
        .zone
        .as_deref()
        .and_then(|zone| resolve_ship_class(zone, gateway));
    let own_ship = identity.ship_class().map(str::to_string);

    if let Some(npc_class) = npc_class_of(&record.victim, gateway) {
        if !gateway.is_known(ClassKind::Npc, &npc_class) {
            unknown_classes.push((ClassKind::Npc, npc_class.clone()));
        }
        push_unknown_weapon(&mut unknown_classes, weapon.as_deref(), gateway);

        return DeathClassification {
            outcome: DeathOutcome::PveKill(Engagement {
                counterparty: npc_class,
                counterparty_ship,
                own_ship,
                weapon,
            }),
            unknown_classes,
        };
    }

    if is_plausible_player(&record.victim, record.victim_id.as_deref()) {
        push_unknown_weapon(&mut unknown_classes, weapon.as_deref(), gateway);

        return DeathClassification {
            outcome: DeathOutcome::PvpKill(Engagement {
                counterparty: record.victim.clone(),
                counterparty_ship,
                own_ship,
                weapon,
            }),
            unknown_classes,
        };
    }

    DeathClassification::new(DeathOutcome::Unattributed("victim is neither npc nor player"))
}

fn classify_death(
    record: &ActorDeathRecord,
    identity: &UserIdentity,
    gateway: &dyn EnrichmentGateway,
) -> DeathClassification {
    let mut unknown_classes = Vec::new();
    let weapon = resolve_weapon_class(record);
    let own_ship = identity.ship_class().map(str::to_string);
    push_unknown_weapon(&mut unknown_classes, weapon.as_deref(), gateway);

    let player_killer = record
        .killer
        .as_deref()
        .filter(|killer| !is_non_player_killer(killer, gateway))
        .filter(|killer| is_plausible_player(killer, record.killer_id.as_deref()));

    let Some(killer_name) = player_killer else {
        let npc_class = record
            .killer
            .as_deref()
            .and_then(|killer| npc_class_of(killer, gateway));
        if let Some(npc_class) = npc_class.as_deref() {
            if !gateway.is_known(ClassKind::Npc, npc_class) {
                unknown_classes.push((ClassKind::Npc, npc_class.to_string()));
            }
        }
        let counterparty = npc_class
            .or_else(|| record.killer.clone())
            .unwrap_or_else(|| "unknown".to_string());

        return DeathClassification {
            outcome: DeathOutcome::PveDeath(Engagement {
                counterparty,
                counterparty_ship: None,
                own_ship,
                weapon,
            }),
            unknown_classes,
        };
    };

    // A killer flying a ship logs the ship instance as its weapon. Handheld
    // weapon instances never match the ship catalog.
    let counterparty_ship = record
        .weapon_instance
        .as_deref()
        .and_then(|instance| resolve_ship_class(instance, gateway));

    DeathClassification {
        outcome: DeathOutcome::PvpDeath(Engagement {
            counterparty: killer_name.to_string(),
            counterparty_ship,
            own_ship,
            weapon,
        }),
        unknown_classes,
    }
}

fn push_unknown_weapon(
    unknown_classes: &mut Vec<(ClassKind, String)>,
    weapon: Option<&str>,
    gateway: &dyn EnrichmentGateway,
) {
    if let Some(weapon) = weapon {
        if !gateway.is_known(ClassKind::Weapon, weapon) {
            unknown_classes.push((ClassKind::Weapon, weapon.to_string()));
        }
    }
}

/// NPC class id for an actor name: the instance-suffixed form, or a bare
/// name the NPC catalog already knows.
fn npc_class_of(actor: &str, gateway: &dyn EnrichmentGateway) -> Option<String> {
    if let Some(captures) = NPC_ACTOR_RE.captures(actor) {
        return Some(captures[1].to_string());
    }

    gateway
        .is_known(ClassKind::Npc, actor)
        .then(|| actor.to_string())
}

fn is_non_player_killer(killer: &str, gateway: &dyn EnrichmentGateway) -> bool {
    killer.len() > MAX_PLAYER_NAME_LENGTH
        || killer.eq_ignore_ascii_case("unknown")
        || NON_PLAYER_MARKERS
            .iter()
            .any(|marker| killer.contains(marker))
        || npc_class_of(killer, gateway).is_some()
}

fn is_plausible_player(name: &str, actor_id: Option<&str>) -> bool {
    PLAYER_NAME_RE.is_match(name) && actor_id.is_some_and(|id| PLAYER_ID_RE.is_match(id))
}

/// Ship-mounted weapons often log a generic class; the instance id names the
/// weapon instead. Handheld weapons only trust the class.
pub fn resolve_weapon_class(record: &ActorDeathRecord) -> Option<String> {
    let class = record
        .weapon_class
        .as_deref()
        .filter(|class| *class != GENERIC_WEAPON_CLASS);

    if record.is_vehicle_destruction() {
        return class.map(str::to_string).or_else(|| {
            record
                .weapon_instance
                .as_deref()
                .map(|instance| strip_instance_suffix(instance).to_string())
        });
    }

    class.map(str::to_string)
}

/// Best-effort ship class from a zone or instance string: catalog containment
/// first, then the two structural fallbacks. Unresolved is not an error.
pub fn resolve_ship_class(text: &str, gateway: &dyn EnrichmentGateway) -> Option<String> {
    if let Some(ship_class) = gateway.find_contained(ClassKind::Ship, text) {
        return Some(ship_class);
    }

    let stripped = strip_instance_suffix(text);
    [&*SHIP_ID_RE, &*SHIP_ID_TWO_PART_RE]
        .into_iter()
        .filter_map(|pattern| pattern.captures(stripped))
        .filter_map(|captures| captures.get(1).map(|value| value.as_str()))
        .find(|candidate| gateway.is_known(ClassKind::Ship, candidate))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{
        classify_actor_death, parse_actor_death, resolve_ship_class, resolve_weapon_class,
        DeathOutcome, Engagement,
    };
    use crate::enrichment::{CatalogGateway, ClassKind};
    use crate::identity::UserIdentity;

    fn pilot(ship_class: Option<&str>) -> UserIdentity {
        UserIdentity {
            display_name: Some("Pilot1".to_string()),
            current_ship_class: ship_class.map(str::to_string),
            ..UserIdentity::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn death_line(
        victim: &str,
        victim_id: &str,
        zone: &str,
        killer: &str,
        killer_id: &str,
        weapon: &str,
        weapon_class: &str,
        damage_type: &str,
    ) -> String {
        format!(
            "<2025-01-01T12:00:00.000Z> [Notice] <Actor Death> CActor::Kill: '{victim}' [{victim_id}] in zone '{zone}' killed by '{killer}' [{killer_id}] using '{weapon}' [Class {weapon_class}] with damage type '{damage_type}' from direction x: 0, y: 0, z: 0 [Team_ActorTech][Actor]"
        )
    }

    fn classify(line: &str, identity: &UserIdentity, gateway: &CatalogGateway) -> DeathOutcome {
        let record = parse_actor_death(line).expect("Line should parse");
        classify_actor_death(&record, identity, gateway).outcome
    }

    #[test]
    fn parses_all_fields() {
        let line = death_line(
            "vlk_trooper_123456789012",
            "123456789012",
            "stanton2_orison",
            "Pilot1",
            "201990621234",
            "behr_p8ar_1234567890123",
            "behr_p8ar",
            "Bullet",
        );
        let record = parse_actor_death(&line).expect("Line should parse");

        assert_eq!(record.victim, "vlk_trooper_123456789012");
        assert_eq!(record.zone.as_deref(), Some("stanton2_orison"));
        assert_eq!(record.killer.as_deref(), Some("Pilot1"));
        assert_eq!(record.killer_id.as_deref(), Some("201990621234"));
        assert_eq!(record.weapon_instance.as_deref(), Some("behr_p8ar_1234567890123"));
        assert_eq!(record.weapon_class.as_deref(), Some("behr_p8ar"));
        assert_eq!(record.damage_type.as_deref(), Some("Bullet"));
    }

    #[test]
    fn record_without_subject_is_malformed() {
        let error = parse_actor_death("<Actor Death> something unexpected")
            .expect_err("Missing subject should fail");
        assert!(error.is_line_local());
    }

    #[test]
    fn self_inflicted_death_is_suicide_regardless_of_other_clauses() {
        let line = death_line(
            "Pilot1",
            "201990621234",
            "vlk_trooper_123456789012",
            "Pilot1",
            "201990621234",
            "unknown",
            "unknown",
            "Suicide",
        );
        assert_eq!(
            classify(&line, &pilot(None), &CatalogGateway::new(false)),
            DeathOutcome::Suicide
        );
    }

    #[test]
    fn npc_victim_is_a_pve_kill_with_weapon() {
        let line = death_line(
            "vlk_trooper_123456789012",
            "123456789012",
            "stanton2_orison",
            "Pilot1",
            "201990621234",
            "behr_p8ar_1234567890123",
            "behr_p8ar",
            "Bullet",
        );
        let gateway = CatalogGateway::new(false);
        let record = parse_actor_death(&line).expect("Line should parse");
        let classification = classify_actor_death(&record, &pilot(None), &gateway);

        assert_eq!(
            classification.outcome,
            DeathOutcome::PveKill(Engagement {
                counterparty: "vlk_trooper".to_string(),
                counterparty_ship: None,
                own_ship: None,
                weapon: Some("behr_p8ar".to_string()),
            })
        );
        assert_eq!(
            classification.unknown_classes,
            vec![
                (ClassKind::Npc, "vlk_trooper".to_string()),
                (ClassKind::Weapon, "behr_p8ar".to_string()),
            ]
        );
    }

    #[test]
    fn catalogued_npc_with_player_like_name_stays_pve() {
        let gateway = CatalogGateway::new(false).with_entry(ClassKind::Npc, "Kopion", "Kopion");
        let line = death_line(
            "Kopion",
            "201990621299",
            "stanton2_wilds",
            "Pilot1",
            "201990621234",
            "behr_p4ar_1234567890123",
            "behr_p4ar",
            "Bullet",
        );

        let outcome = classify(&line, &pilot(None), &gateway);
        assert!(
            matches!(outcome, DeathOutcome::PveKill(ref engagement) if engagement.counterparty == "Kopion"),
            "Unexpected outcome {outcome:?}"
        );
    }

    #[test]
    fn player_victim_is_a_pvp_kill_with_zone_ship() {
        let gateway = CatalogGateway::new(false).with_entry(ClassKind::Ship, "ANVL_Arrow", "Arrow");
        let line = death_line(
            "Pilot2",
            "201990621235",
            "ANVL_Arrow_3108612379131",
            "Pilot1",
            "201990621234",
            "KLWE_LaserRepeater_S3_3108612379555",
            "unknown",
            "VehicleDestruction",
        );

        let outcome = classify(&line, &pilot(Some("AEGS_Gladius")), &gateway);
        assert_eq!(
            outcome,
            DeathOutcome::PvpKill(Engagement {
                counterparty: "Pilot2".to_string(),
                counterparty_ship: Some("ANVL_Arrow".to_string()),
                own_ship: Some("AEGS_Gladius".to_string()),
                weapon: Some("KLWE_LaserRepeater_S3".to_string()),
            })
        );
    }

    #[test]
    fn npc_or_debris_killer_is_a_pve_death() {
        let npc_line = death_line(
            "Pilot1",
            "201990621234",
            "stanton2_orison",
            "vlk_trooper_123456789012",
            "123456789012",
            "behr_p8ar_1234567890123",
            "behr_p8ar",
            "Bullet",
        );
        let outcome = classify(&npc_line, &pilot(None), &CatalogGateway::new(false));
        assert!(
            matches!(outcome, DeathOutcome::PveDeath(ref engagement) if engagement.counterparty == "vlk_trooper"),
            "Unexpected outcome {outcome:?}"
        );

        let debris_line = death_line(
            "Pilot1",
            "201990621234",
            "stanton2_orison",
            "SCItem_Debris_Hull",
            "12345",
            "unknown",
            "unknown",
            "Collision",
        );
        let outcome = classify(&debris_line, &pilot(None), &CatalogGateway::new(false));
        assert!(matches!(outcome, DeathOutcome::PveDeath(_)), "Unexpected outcome {outcome:?}");
    }

    #[test]
    fn player_killer_is_a_pvp_death_with_own_ship() {
        let gateway =
            CatalogGateway::new(false).with_entry(ClassKind::Ship, "AEGS_Gladius", "Gladius");
        let line = death_line(
            "Pilot1",
            "201990621234",
            "ANVL_Arrow_3108612379131",
            "Pilot2",
            "201990621235",
            "AEGS_Gladius_3108612379777",
            "unknown",
            "VehicleDestruction",
        );

        let outcome = classify(&line, &pilot(Some("ANVL_Arrow")), &gateway);
        assert_eq!(
            outcome,
            DeathOutcome::PvpDeath(Engagement {
                counterparty: "Pilot2".to_string(),
                counterparty_ship: Some("AEGS_Gladius".to_string()),
                own_ship: Some("ANVL_Arrow".to_string()),
                weapon: Some("AEGS_Gladius".to_string()),
            })
        );
    }

    #[test]
    fn killer_ship_resolves_from_instance_for_any_damage_type() {
        let gateway =
            CatalogGateway::new(false).with_entry(ClassKind::Ship, "AEGS_Gladius", "Gladius");
        let line = death_line(
            "Pilot1",
            "201990621234",
            "stanton2_orison",
            "Pilot2",
            "201990621235",
            "AEGS_Gladius_3108612379777",
            "KLWE_LaserRepeater_S3",
            "Bullet",
        );

        let outcome = classify(&line, &pilot(None), &gateway);
        assert!(
            matches!(outcome, DeathOutcome::PvpDeath(ref engagement) if engagement.counterparty_ship.as_deref() == Some("AEGS_Gladius")),
            "Unexpected outcome {outcome:?}"
        );

        let handheld_line = death_line(
            "Pilot1",
            "201990621234",
            "stanton2_orison",
            "Pilot2",
            "201990621235",
            "klwe_pistol_1234567890123",
            "klwe_pistol",
            "Bullet",
        );
        let outcome = classify(&handheld_line, &pilot(None), &gateway);
        assert!(
            matches!(outcome, DeathOutcome::PvpDeath(ref engagement) if engagement.counterparty_ship.is_none()),
            "Unexpected outcome {outcome:?}"
        );
    }

    #[test]
    fn uncatalogued_npc_killer_is_reported() {
        let line = death_line(
            "Pilot1",
            "201990621234",
            "stanton2_orison",
            "vlk_trooper_123456789012",
            "123456789012",
            "behr_p8ar_1234567890123",
            "behr_p8ar",
            "Bullet",
        );
        let record = parse_actor_death(&line).expect("Line should parse");

        let classification =
            classify_actor_death(&record, &pilot(None), &CatalogGateway::new(false));
        assert!(classification
            .unknown_classes
            .contains(&(ClassKind::Npc, "vlk_trooper".to_string())));

        let gateway =
            CatalogGateway::new(false).with_entry(ClassKind::Npc, "vlk_trooper", "Vlk Trooper");
        let classification = classify_actor_death(&record, &pilot(None), &gateway);
        assert!(!classification
            .unknown_classes
            .iter()
            .any(|(kind, _)| *kind == ClassKind::Npc));
    }

    #[test]
    fn records_between_other_actors_are_unattributed() {
        let line = death_line(
            "Pilot3",
            "201990621236",
            "stanton2_orison",
            "Pilot2",
            "201990621235",
            "klwe_pistol_1234567890123",
            "klwe_pistol",
            "Bullet",
        );
        assert!(matches!(
            classify(&line, &pilot(None), &CatalogGateway::new(false)),
            DeathOutcome::Unattributed(_)
        ));
        assert!(matches!(
            classify(&line, &UserIdentity::default(), &CatalogGateway::new(false)),
            DeathOutcome::Unattributed(_)
        ));
    }

    #[test]
    fn handheld_weapon_ignores_generic_class() {
        let line = death_line(
            "vlk_trooper_123456789012",
            "123456789012",
            "stanton2_orison",
            "Pilot1",
            "201990621234",
            "behr_p8ar_1234567890123",
            "unknown",
            "Bullet",
        );
        let record = parse_actor_death(&line).expect("Line should parse");
        assert_eq!(resolve_weapon_class(&record), None);
    }

    #[test]
    fn ship_fallback_patterns_require_a_catalogued_id() {
        let gateway = CatalogGateway::new(false)
            .with_entry(ClassKind::Ship, "ORIG_100i", "100i");
        assert_eq!(
            resolve_ship_class("ORIG_100i_3108612379131", &gateway).as_deref(),
            Some("ORIG_100i")
        );
        assert_eq!(resolve_ship_class("MISC_Prospector_3108612379131", &gateway), None);
        assert_eq!(resolve_ship_class("stanton2_orison", &gateway), None);
    }
}
