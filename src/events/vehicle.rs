use regex::Regex;
use std::sync::LazyLock;

use super::{capture_text, strip_instance_suffix};
use crate::error::{Error, Result};

static COLLISION_VEHICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vehicle\s([^\s]+)").expect("valid collision vehicle regex"));
static DESTROYED_VEHICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Vehicle\s'([^']+)'").expect("valid destroyed vehicle regex"));
static DRIVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"driven\sby\s'([^']+)'").expect("valid driver regex"));
static DESTROY_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"advanced\sfrom\sdestroy\slevel\s(\d+)\sto\s(\d+)").expect("valid destroy level regex")
});
static CAUSED_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"caused\sby\s'([^']+)'").expect("valid cause regex"));
static DAMAGE_SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\swith\s'([^']+)'").expect("valid damage source regex"));
static CONTROL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(requesting|releasing)\scontrol\stoken\sfor\s'([^']+)'")
        .expect("valid control token regex")
});

/// A `<FatalCollision>` record: the local player crashed a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalCollision {
    pub vehicle_instance: String,
    pub vehicle_class: String,
}

pub fn parse_fatal_collision(line: &str) -> Result<FatalCollision> {
    let vehicle_instance = capture_text(&COLLISION_VEHICLE_RE, line, 1)
        .ok_or_else(|| Error::malformed("fatal collision", "missing vehicle"))?;
    let vehicle_class = strip_instance_suffix(&vehicle_instance).to_string();

    Ok(FatalCollision {
        vehicle_instance,
        vehicle_class,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleDestruction {
    pub vehicle_instance: String,
    pub vehicle_class: String,
    pub driver: Option<String>,
    pub from_level: Option<u32>,
    pub to_level: Option<u32>,
    pub caused_by: Option<String>,
    pub damage_source: Option<String>,
}

pub fn parse_vehicle_destruction(line: &str) -> Result<VehicleDestruction> {
    let vehicle_instance = capture_text(&DESTROYED_VEHICLE_RE, line, 1)
        .ok_or_else(|| Error::malformed("vehicle destruction", "missing vehicle"))?;
    let vehicle_class = strip_instance_suffix(&vehicle_instance).to_string();

    let (from_level, to_level) = match DESTROY_LEVEL_RE.captures(line) {
        Some(captures) => (captures[1].parse().ok(), captures[2].parse().ok()),
        None => (None, None),
    };

    Ok(VehicleDestruction {
        vehicle_instance,
        vehicle_class,
        driver: capture_text(&DRIVER_RE, line, 1).filter(|driver| driver != "unknown"),
        from_level,
        to_level,
        caused_by: capture_text(&CAUSED_BY_RE, line, 1),
        damage_source: capture_text(&DAMAGE_SOURCE_RE, line, 1),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChange {
    Acquired,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleControl {
    pub change: ControlChange,
    pub ship_instance: String,
    pub ship_class: String,
}

/// `<Vehicle Control Flow>` lines that do not request or release a control
/// token carry nothing we track; they yield `None` rather than an error.
pub fn parse_vehicle_control(line: &str) -> Option<VehicleControl> {
    let captures = CONTROL_TOKEN_RE.captures(line)?;
    let change = match &captures[1] {
        "requesting" => ControlChange::Acquired,
        _ => ControlChange::Released,
    };
    let ship_instance = captures[2].trim().to_string();
    let ship_class = strip_instance_suffix(&ship_instance).to_string();

    Some(VehicleControl {
        change,
        ship_instance,
        ship_class,
    })
}
