//! Identity-lock prompt compilation.
//!
//! Turns an optional [`IdentityProfile`] into a [`LockDirective`]: a
//! priority-ordered block of text telling the remote model which facial
//! markers it must not touch. [`tier_directive`] adds the tier-specific
//! styling instruction.
//!
//! Both functions are pure: identical input always yields identical text.

use std::fmt;

use serde::{Serialize, Serializer};

use super::IdentityProfile;
use crate::Tier;

/// Cap on zone clauses and on top identifiers.
pub const MAX_LOCK_ENTRIES: usize = 5;

const GENERIC_LOCK: &str = "IDENTITY LOCK: Preserve the EXACT face from the reference photos. \
Do not alter bone structure, facial proportions or skin tone. \
The costume changes, not the face.";

const BIOMETRIC_HEADER: &str =
    "BIOMETRIC IDENTITY LOCK: these biometric markers must be preserved exactly:";

const RULES_FOOTER: [&str; 3] = [
    "RULES:",
    "- The listed markers are immutable. Do not reshape, idealise or age the face.",
    "- Only clothing, props, hair styling and background may change.",
];

const NO_REGENERATION_RULE: &str =
    "- Do NOT regenerate a different face. Keep the subject's real face under any stylisation.";

/// Compiled identity-lock text plus the pieces it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDirective {
    text: String,
    clauses: Vec<String>,
    identifiers: Vec<String>,
}

impl LockDirective {
    /// Full directive text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Zone clauses, in priority order (empty without a profile).
    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    /// Top identifiers emitted verbatim (at most [`MAX_LOCK_ENTRIES`]).
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// `true` when compiled from an actual profile.
    pub fn is_biometric(&self) -> bool {
        !self.clauses.is_empty() || !self.identifiers.is_empty()
    }

    /// Consume the directive, keeping only the text.
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for LockDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for LockDirective {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// `"Jaw: square shape, narrow width"`, or `None` for an empty zone.
fn zone_clause(name: &str, descriptors: &[(&'static str, &str)]) -> Option<String> {
    if descriptors.is_empty() {
        return None;
    }
    let parts: Vec<String> = descriptors
        .iter()
        .map(|(label, value)| format!("{value} {label}"))
        .collect();
    Some(format!("{name}: {}", parts.join(", ")))
}

/// Compile the identity lock for `profile`.
///
/// Without a profile the generic lock is returned. With one, the text is:
/// header, up to five zone clauses (chin, jaw, nose, eyes, neck/jaw
/// architecture), up to five top identifiers verbatim, the must-preserve
/// list, then the rules footer. Face-drift-prone tiers get an extra
/// no-regeneration rule in both cases.
pub fn compile(profile: Option<&IdentityProfile>, tier: Tier) -> LockDirective {
    let Some(profile) = profile else {
        let mut text = GENERIC_LOCK.to_string();
        if tier.is_face_drift_prone() {
            text.push('\n');
            text.push_str(NO_REGENERATION_RULE);
        }
        return LockDirective {
            text,
            clauses: Vec::new(),
            identifiers: Vec::new(),
        };
    };

    let clauses: Vec<String> = profile
        .priority_zones()
        .into_iter()
        .filter_map(|(name, zone)| zone_clause(name, &zone.descriptors()))
        .take(MAX_LOCK_ENTRIES)
        .collect();

    let identifiers: Vec<String> = profile
        .top_identifiers()
        .iter()
        .take(MAX_LOCK_ENTRIES)
        .cloned()
        .collect();

    let mut lines: Vec<String> = vec![BIOMETRIC_HEADER.to_string()];
    lines.extend(clauses.iter().map(|c| format!("- {c}")));

    if !identifiers.is_empty() {
        lines.push("TOP IDENTIFIERS:".to_string());
        lines.extend(
            identifiers
                .iter()
                .enumerate()
                .map(|(i, id)| format!("{}. {id}", i + 1)),
        );
    }

    let must_preserve = profile.must_preserve();
    if !must_preserve.is_empty() {
        lines.push(format!("MUST PRESERVE: {}", must_preserve.join(", ")));
    }

    lines.extend(RULES_FOOTER.iter().map(|s| s.to_string()));
    if tier.is_face_drift_prone() {
        lines.push(NO_REGENERATION_RULE.to_string());
    }

    LockDirective {
        text: lines.join("\n"),
        clauses,
        identifiers,
    }
}

/// Tier-specific styling instruction for `character_name` from `source`.
///
/// Modern and superhero renders get lighter wording. Fantasy and cartoon
/// renders get the explicit no-regeneration wording, since those tiers most
/// often come back with a different face.
pub fn tier_directive(tier: Tier, character_name: &str, source: &str) -> String {
    match tier {
        Tier::Modern => format!(
            "Dress the person as {character_name} from {source}. \
Apply the costume and styling, keep the natural face exactly as photographed."
        ),
        Tier::Superhero => format!(
            "Transform the person into {character_name} from {source}. \
Apply the suit, emblem and heroic lighting, keep the natural face visible and unchanged."
        ),
        Tier::Fantasy => format!(
            "Render the person as {character_name} from {source} in a fantasy setting. \
Do not regenerate a different face: costume, armour and environment change, \
the person's real facial features stay identical."
        ),
        Tier::Cartoon => format!(
            "Render the person as {character_name} from {source} in that show's art style. \
Do not regenerate a different face: stylise line and colour only, \
keeping the person's real facial proportions recognisable."
        ),
    }
}
