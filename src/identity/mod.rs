//! # Identity Profile
//!
//! ## Responsibility
//! Model the zone-based facial biometrics produced by the external extraction
//! step, in a shape the [`compiler`] can pattern-match on.
//!
//! ## Guarantees
//! - Every zone is optional; a profile may be partial
//! - Every descriptor within a zone is optional
//! - Multi-word keys are read in snake_case or in the extraction step's camelCase
//! - Read-only: nothing in this crate mutates a profile after deserialization
//!
//! ## NOT Responsible For
//! - Extracting biometrics from photos (external collaborator)
//! - Producing prompt text (that belongs to [`compiler`])

pub mod compiler;

use serde::{Deserialize, Serialize};

/// A facial zone that can describe itself as `(label, value)` pairs.
///
/// Only descriptors that are present and non-blank are returned, in a fixed
/// order per zone.
pub trait Zone {
    /// Present descriptors as `(label, value)` pairs.
    fn descriptors(&self) -> Vec<(&'static str, &str)>;
}

fn present<'a, const N: usize>(
    pairs: [(&'static str, &'a Option<String>); N],
) -> Vec<(&'static str, &'a str)> {
    pairs
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label, v))
        })
        .collect()
}

/// Ear shape and placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarZone {
    /// Overall outline (e.g. "rounded").
    pub shape: Option<String>,
    /// Relative size.
    pub size: Option<String>,
    /// How far the ears stand out from the head.
    pub protrusion: Option<String>,
    /// Attached or free lobes.
    pub lobe: Option<String>,
}

impl Zone for EarZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("size", &self.size),
            ("protrusion", &self.protrusion),
            ("lobe", &self.lobe),
        ])
    }
}

/// Eye geometry and colour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeZone {
    /// Outline (e.g. "almond").
    pub shape: Option<String>,
    /// Distance between the eyes.
    pub spacing: Option<String>,
    /// Relative size.
    pub size: Option<String>,
    /// Iris colour.
    pub color: Option<String>,
    /// Eyelid type (e.g. "hooded").
    pub eyelid: Option<String>,
}

impl Zone for EyeZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("spacing", &self.spacing),
            ("size", &self.size),
            ("color", &self.color),
            ("eyelids", &self.eyelid),
        ])
    }
}

/// Mouth width and resting expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthZone {
    /// Relative width.
    pub width: Option<String>,
    /// Outline.
    pub shape: Option<String>,
    /// Corner direction at rest.
    pub corners: Option<String>,
}

impl Zone for MouthZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("width", &self.width),
            ("shape", &self.shape),
            ("corners", &self.corners),
        ])
    }
}

/// Nose structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoseZone {
    /// Overall type (e.g. "roman").
    pub shape: Option<String>,
    /// Bridge height/profile.
    pub bridge: Option<String>,
    /// Tip shape.
    pub tip: Option<String>,
    /// Width at the nostrils.
    pub width: Option<String>,
    /// Nostril shape.
    pub nostrils: Option<String>,
}

impl Zone for NoseZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("bridge", &self.bridge),
            ("tip", &self.tip),
            ("width", &self.width),
            ("nostrils", &self.nostrils),
        ])
    }
}

/// Eyebrows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyebrowZone {
    /// Outline.
    pub shape: Option<String>,
    /// Density.
    pub thickness: Option<String>,
    /// Arch height.
    pub arch: Option<String>,
}

impl Zone for EyebrowZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("thickness", &self.thickness),
            ("arch", &self.arch),
        ])
    }
}

/// Cheeks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheekZone {
    /// Cheekbone prominence.
    #[serde(alias = "boneProminence")]
    pub bone_prominence: Option<String>,
    /// Soft-tissue fullness.
    pub fullness: Option<String>,
}

impl Zone for CheekZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("cheekbones", &self.bone_prominence),
            ("fullness", &self.fullness),
        ])
    }
}

/// Dimples. A present zone with no descriptors means "none observed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimpleZone {
    /// Where they appear (e.g. "left cheek").
    pub location: Option<String>,
    /// Depth.
    pub depth: Option<String>,
}

impl Zone for DimpleZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([("location", &self.location), ("depth", &self.depth)])
    }
}

/// Chin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChinZone {
    /// Outline (e.g. "pointed", "cleft").
    pub shape: Option<String>,
    /// Forward projection.
    pub projection: Option<String>,
    /// Relative width.
    pub width: Option<String>,
}

impl Zone for ChinZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("projection", &self.projection),
            ("width", &self.width),
        ])
    }
}

/// Ear-to-nose proportion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarNoseRatio {
    /// Numeric ratio (e.g. "1:1").
    pub ratio: Option<String>,
    /// Free-text note on alignment.
    pub alignment: Option<String>,
}

impl Zone for EarNoseRatio {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([("ratio", &self.ratio), ("alignment", &self.alignment)])
    }
}

/// Lips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipZone {
    /// Upper lip fullness.
    #[serde(alias = "upperFullness")]
    pub upper_fullness: Option<String>,
    /// Lower lip fullness.
    #[serde(alias = "lowerFullness")]
    pub lower_fullness: Option<String>,
    /// Definition of the cupid's bow.
    #[serde(alias = "cupidsBow")]
    pub cupids_bow: Option<String>,
}

impl Zone for LipZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("upper lip", &self.upper_fullness),
            ("lower lip", &self.lower_fullness),
            ("cupid's bow", &self.cupids_bow),
        ])
    }
}

/// Hairline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairlineZone {
    /// Outline (e.g. "widow's peak").
    pub shape: Option<String>,
    /// Height on the forehead.
    pub height: Option<String>,
}

impl Zone for HairlineZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([("shape", &self.shape), ("height", &self.height)])
    }
}

/// Distances between features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterFeatureDistances {
    /// Eye-to-eye distance.
    #[serde(alias = "eyeToEye")]
    pub eye_to_eye: Option<String>,
    /// Nose base to upper lip.
    #[serde(alias = "noseToLip")]
    pub nose_to_lip: Option<String>,
    /// Lower lip to chin.
    #[serde(alias = "lipToChin")]
    pub lip_to_chin: Option<String>,
}

impl Zone for InterFeatureDistances {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("eye-to-eye", &self.eye_to_eye),
            ("nose-to-lip", &self.nose_to_lip),
            ("lip-to-chin", &self.lip_to_chin),
        ])
    }
}

/// Head and face angles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceAngles {
    /// Side profile (e.g. "straight", "convex").
    pub profile: Option<String>,
    /// Gonial angle description.
    #[serde(alias = "jawAngle")]
    pub jaw_angle: Option<String>,
}

impl Zone for FaceAngles {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([("profile", &self.profile), ("jaw angle", &self.jaw_angle)])
    }
}

/// Jaw definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JawZone {
    /// Outline (e.g. "square").
    pub shape: Option<String>,
    /// Relative width.
    pub width: Option<String>,
    /// Sharpness of the jawline.
    pub definition: Option<String>,
}

impl Zone for JawZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("shape", &self.shape),
            ("width", &self.width),
            ("definition", &self.definition),
        ])
    }
}

/// Forehead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeheadZone {
    /// Relative height.
    pub height: Option<String>,
    /// Relative width.
    pub width: Option<String>,
    /// Slope in profile.
    pub slope: Option<String>,
}

impl Zone for ForeheadZone {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("height", &self.height),
            ("width", &self.width),
            ("slope", &self.slope),
        ])
    }
}

/// Skin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinSurface {
    /// Tone.
    pub tone: Option<String>,
    /// Texture.
    pub texture: Option<String>,
    /// Freckles, moles, scars.
    pub marks: Option<String>,
}

impl Zone for SkinSurface {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("tone", &self.tone),
            ("texture", &self.texture),
            ("marks", &self.marks),
        ])
    }
}

/// Hair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HairTexture {
    /// Curl pattern (e.g. "wavy").
    pub pattern: Option<String>,
    /// Colour.
    pub color: Option<String>,
    /// Density.
    pub density: Option<String>,
}

impl Zone for HairTexture {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("pattern", &self.pattern),
            ("color", &self.color),
            ("density", &self.density),
        ])
    }
}

/// Neck-to-jaw transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeckJawArchitecture {
    /// Relative neck width.
    #[serde(alias = "neckWidth")]
    pub neck_width: Option<String>,
    /// Angle where jaw meets neck.
    #[serde(alias = "jawNeckAngle")]
    pub jaw_neck_angle: Option<String>,
    /// Adam's apple prominence.
    #[serde(alias = "adamsApple")]
    pub adams_apple: Option<String>,
}

impl Zone for NeckJawArchitecture {
    fn descriptors(&self) -> Vec<(&'static str, &str)> {
        present([
            ("neck width", &self.neck_width),
            ("jaw-neck angle", &self.jaw_neck_angle),
            ("Adam's apple", &self.adams_apple),
        ])
    }
}

/// The identifiers the extraction step ranked as most distinctive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalIdentityLock {
    /// Most distinctive features, strongest first.
    #[serde(alias = "topIdentifiers")]
    pub top_identifiers: Vec<String>,
    /// Features that must survive any styling.
    #[serde(alias = "mustPreserve")]
    pub must_preserve: Vec<String>,
}

/// Zone-based facial biometrics for one subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProfile {
    /// Ears.
    pub ears: Option<EarZone>,
    /// Eyes.
    pub eyes: Option<EyeZone>,
    /// Mouth.
    pub mouth: Option<MouthZone>,
    /// Nose.
    pub nose: Option<NoseZone>,
    /// Eyebrows.
    pub eyebrows: Option<EyebrowZone>,
    /// Cheeks.
    pub cheeks: Option<CheekZone>,
    /// Dimples.
    pub dimples: Option<DimpleZone>,
    /// Chin.
    pub chin: Option<ChinZone>,
    /// Ear-to-nose proportion.
    #[serde(alias = "earNoseRatio")]
    pub ear_nose_ratio: Option<EarNoseRatio>,
    /// Lips.
    pub lips: Option<LipZone>,
    /// Hairline.
    pub hairline: Option<HairlineZone>,
    /// Distances between features.
    #[serde(alias = "interFeatureDistances")]
    pub inter_feature_distances: Option<InterFeatureDistances>,
    /// Face angles.
    #[serde(alias = "faceAngles")]
    pub face_angles: Option<FaceAngles>,
    /// Jaw definition.
    #[serde(alias = "jawDefinition")]
    pub jaw_definition: Option<JawZone>,
    /// Forehead.
    pub forehead: Option<ForeheadZone>,
    /// Skin surface.
    #[serde(alias = "skinSurface")]
    pub skin_surface: Option<SkinSurface>,
    /// Hair texture.
    #[serde(alias = "hairTexture")]
    pub hair_texture: Option<HairTexture>,
    /// Neck/jaw architecture.
    #[serde(alias = "neckJawArchitecture")]
    pub neck_jaw_architecture: Option<NeckJawArchitecture>,
    /// Ranked identifiers and must-preserve list.
    #[serde(alias = "criticalIdentityLock")]
    pub critical_identity_lock: Option<CriticalIdentityLock>,
}

impl IdentityProfile {
    /// Parse a profile from the extraction step's JSON output.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input. Unknown keys are
    /// ignored; missing keys become absent zones.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Zones with the strongest identity signal, in compile priority order:
    /// chin, jaw, nose, eyes, neck/jaw architecture. Absent zones are skipped.
    pub fn priority_zones(&self) -> Vec<(&'static str, &dyn Zone)> {
        let mut zones: Vec<(&'static str, &dyn Zone)> = Vec::with_capacity(5);
        if let Some(z) = &self.chin {
            zones.push(("Chin", z));
        }
        if let Some(z) = &self.jaw_definition {
            zones.push(("Jaw", z));
        }
        if let Some(z) = &self.nose {
            zones.push(("Nose", z));
        }
        if let Some(z) = &self.eyes {
            zones.push(("Eyes", z));
        }
        if let Some(z) = &self.neck_jaw_architecture {
            zones.push(("Neck/jaw architecture", z));
        }
        zones
    }

    /// Ranked identifiers, or an empty slice without a lock block.
    pub fn top_identifiers(&self) -> &[String] {
        self.critical_identity_lock
            .as_ref()
            .map(|l| l.top_identifiers.as_slice())
            .unwrap_or_default()
    }

    /// Must-preserve list, or an empty slice without a lock block.
    pub fn must_preserve(&self) -> &[String] {
        self.critical_identity_lock
            .as_ref()
            .map(|l| l.must_preserve.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_accepts_partial_profile_and_camel_case_lock() {
        let profile = IdentityProfile::from_json(
            r#"{
                "chin": {"shape": "pointed"},
                "criticalIdentityLock": {"topIdentifiers": ["Jawline"], "mustPreserve": ["mole"]},
                "unknown_zone": {"x": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(profile.chin.as_ref().unwrap().shape.as_deref(), Some("pointed"));
        assert!(profile.eyes.is_none());
        assert_eq!(profile.top_identifiers(), ["Jawline".to_string()]);
        assert_eq!(profile.must_preserve(), ["mole".to_string()]);
    }

    #[test]
    fn test_from_json_accepts_camel_case_zones_and_descriptors() {
        let profile = IdentityProfile::from_json(
            r#"{
                "jawDefinition": {"shape": "square"},
                "neckJawArchitecture": {"neckWidth": "broad", "adamsApple": "prominent"},
                "earNoseRatio": {"ratio": "1:1"},
                "lips": {"cupidsBow": "sharp"},
                "criticalIdentityLock": {"topIdentifiers": ["Jawline"]}
            }"#,
        )
        .unwrap();

        let names: Vec<_> = profile.priority_zones().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Jaw", "Neck/jaw architecture"]);
        assert_eq!(
            profile.neck_jaw_architecture.as_ref().unwrap().descriptors(),
            vec![("neck width", "broad"), ("Adam's apple", "prominent")]
        );
        assert_eq!(profile.ear_nose_ratio.as_ref().unwrap().ratio.as_deref(), Some("1:1"));
        assert_eq!(profile.lips.as_ref().unwrap().cupids_bow.as_deref(), Some("sharp"));

        let directive = compiler::compile(Some(&profile), crate::Tier::Modern);
        assert_eq!(
            directive.clauses(),
            [
                "Jaw: square shape".to_string(),
                "Neck/jaw architecture: broad neck width, prominent Adam's apple".to_string(),
            ]
        );
    }

    #[test]
    fn test_descriptors_skip_missing_and_blank_values() {
        let chin = ChinZone {
            shape: Some("square".into()),
            projection: Some("   ".into()),
            width: None,
        };
        assert_eq!(chin.descriptors(), vec![("shape", "square")]);
    }

    #[test]
    fn test_priority_zones_follow_fixed_order_regardless_of_presence() {
        let profile = IdentityProfile {
            neck_jaw_architecture: Some(NeckJawArchitecture::default()),
            eyes: Some(EyeZone::default()),
            chin: Some(ChinZone::default()),
            ears: Some(EarZone::default()),
            ..IdentityProfile::default()
        };
        let names: Vec<_> = profile.priority_zones().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Chin", "Eyes", "Neck/jaw architecture"]);
    }

    #[test]
    fn test_profile_without_lock_block_has_no_identifiers() {
        let profile = IdentityProfile::default();
        assert!(profile.top_identifiers().is_empty());
        assert!(profile.must_preserve().is_empty());
    }
}
