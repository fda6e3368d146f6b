//! Machine profile definitions.

use extrudo_toolpath::{AntioozeSettings, SpeedSettings};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::emitter::EmitterSettings;
use crate::error::{EmitError, Result};

/// Keys of the built-in profiles.
pub const PROFILE_KEYS: [&str; 4] = ["generic", "ender3", "prusa_mk4", "voron_24"];

/// Machine profile with kinematic limits and retraction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineProfile {
    /// Profile name.
    pub name: String,
    /// Build volume X (mm).
    pub bed_x: f64,
    /// Build volume Y (mm).
    pub bed_y: f64,
    /// Build volume Z (mm).
    pub bed_z: f64,
    /// Number of extruders.
    pub extruder_count: u32,
    /// Nozzle diameter (mm).
    pub nozzle_diameter: f64,
    /// Filament diameter (mm).
    pub filament_diameter: f64,
    /// Maximum feedrate X/Y (mm/s).
    pub max_feedrate_xy: f64,
    /// Maximum feedrate Z (mm/s).
    pub max_feedrate_z: f64,
    /// Maximum feedrate E (mm/s).
    pub max_feedrate_e: f64,
    /// Retraction distance (mm).
    pub retraction_distance: f64,
    /// Retraction speed (mm/s).
    pub retraction_speed: f64,
    /// Z-hop height during retraction (mm).
    pub z_hop: f64,
}

impl Default for MachineProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl MachineProfile {
    /// Generic bed-slinger.
    pub fn generic() -> Self {
        Self {
            name: "Generic".into(),
            bed_x: 220.0,
            bed_y: 220.0,
            bed_z: 250.0,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            max_feedrate_xy: 500.0,
            max_feedrate_z: 10.0,
            max_feedrate_e: 60.0,
            retraction_distance: 5.0,
            retraction_speed: 45.0,
            z_hop: 0.2,
        }
    }

    /// Creality Ender 3 profile.
    pub fn ender3() -> Self {
        Self {
            name: "Creality Ender 3".into(),
            max_feedrate_z: 5.0,
            max_feedrate_e: 25.0,
            ..Self::generic()
        }
    }

    /// Prusa MK4 profile.
    pub fn prusa_mk4() -> Self {
        Self {
            name: "Prusa MK4".into(),
            bed_x: 250.0,
            bed_y: 210.0,
            bed_z: 220.0,
            max_feedrate_xy: 200.0,
            max_feedrate_z: 12.0,
            max_feedrate_e: 120.0,
            retraction_distance: 0.8,
            retraction_speed: 35.0,
            ..Self::generic()
        }
    }

    /// Voron 2.4 profile (350mm).
    pub fn voron_24() -> Self {
        Self {
            name: "Voron 2.4 (350mm)".into(),
            bed_x: 350.0,
            bed_y: 350.0,
            bed_z: 340.0,
            max_feedrate_xy: 300.0,
            max_feedrate_z: 15.0,
            max_feedrate_e: 60.0,
            retraction_distance: 0.5,
            retraction_speed: 30.0,
            ..Self::generic()
        }
    }

    /// Get all built-in profiles, in [`PROFILE_KEYS`] order.
    pub fn all_profiles() -> Vec<Self> {
        vec![Self::generic(), Self::ender3(), Self::prusa_mk4(), Self::voron_24()]
    }

    /// Built-in profile by key.
    pub fn by_key(key: &str) -> Result<Self> {
        match key {
            "generic" => Ok(Self::generic()),
            "ender3" => Ok(Self::ender3()),
            "prusa_mk4" => Ok(Self::prusa_mk4()),
            "voron_24" => Ok(Self::voron_24()),
            other => Err(EmitError::UnknownProfile(other.to_string())),
        }
    }

    /// Check if a position is within build volume.
    pub fn in_bounds(&self, x: f64, y: f64, z: f64) -> bool {
        x >= 0.0 && x <= self.bed_x && y >= 0.0 && y <= self.bed_y && z >= 0.0 && z <= self.bed_z
    }

    /// Emitter limits: requested speeds capped by the machine's feedrates.
    pub fn emitter_settings(&self, speeds: &SpeedSettings) -> EmitterSettings {
        let cap = |requested: f64, what: &str| {
            if requested > self.max_feedrate_xy {
                warn!(requested, limit = self.max_feedrate_xy, "{what} clamped to machine feedrate");
                self.max_feedrate_xy
            } else {
                requested
            }
        };
        let max_speed = cap(speeds.max_print_speed, "max print speed");
        EmitterSettings {
            min_speed: speeds.min_print_speed.min(max_speed),
            max_speed,
            move_speed: cap(speeds.move_speed, "move speed"),
            max_filament_speed: self.max_feedrate_e,
            max_z_speed: self.max_feedrate_z,
        }
    }

    /// Anti-ooze settings seeded from the machine's retraction defaults.
    pub fn antiooze_defaults(&self) -> AntioozeSettings {
        AntioozeSettings {
            amount: self.retraction_distance,
            speed: self.retraction_speed.min(self.max_feedrate_e),
            z_lift: self.z_hop,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_profiles() {
        for profile in MachineProfile::all_profiles() {
            assert!(profile.bed_x > 0.0);
            assert!(profile.bed_y > 0.0);
            assert!(profile.bed_z > 0.0);
            assert!(profile.nozzle_diameter > 0.0);
            assert!(profile.emitter_settings(&SpeedSettings::default()).validate().is_ok());
        }
        for key in PROFILE_KEYS {
            assert!(MachineProfile::by_key(key).is_ok());
        }
        assert!(MachineProfile::by_key("toaster").is_err());
    }

    #[test]
    fn test_in_bounds() {
        let profile = MachineProfile::prusa_mk4();
        assert!(profile.in_bounds(100.0, 100.0, 100.0));
        assert!(!profile.in_bounds(-1.0, 100.0, 100.0));
        assert!(!profile.in_bounds(100.0, 220.0, 100.0));
    }

    #[test]
    fn test_emitter_settings_capped() {
        let speeds = SpeedSettings {
            min_print_speed: 10.0,
            max_print_speed: 250.0,
            move_speed: 400.0,
        };
        let limits = MachineProfile::prusa_mk4().emitter_settings(&speeds);
        assert_eq!(limits.max_speed, 200.0);
        assert_eq!(limits.move_speed, 200.0);
        assert_eq!(limits.max_z_speed, 12.0);
        assert_eq!(limits.max_filament_speed, 120.0);
    }

    #[test]
    fn test_antiooze_defaults() {
        let ao = MachineProfile::ender3().antiooze_defaults();
        assert_eq!(ao.amount, 5.0);
        assert_eq!(ao.speed, 25.0);
        assert_abs_diff_eq!(ao.z_lift, 0.2);
        assert!(!ao.enabled);
    }
}
