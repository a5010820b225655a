//! First-aid instruction catalog.
//!
//! Every disease the classifier was trained on has a fixed, ordered list of
//! steps. Lookups are by exact label, prefix code included (`FU-ringworm`).

pub const NO_INSTRUCTIONS: &[&str] = &["No instructions available."];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disease {
    Ringworm,
    Cellulitis,
    Impetigo,
    AthleteFoot,
    NailFungus,
    CutaneousLarvaMigrans,
    Chickenpox,
    Shingles,
}

impl Disease {
    pub const ALL: [Disease; 8] = [
        Disease::Ringworm,
        Disease::Cellulitis,
        Disease::Impetigo,
        Disease::AthleteFoot,
        Disease::NailFungus,
        Disease::CutaneousLarvaMigrans,
        Disease::Chickenpox,
        Disease::Shingles,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Disease::Ringworm => "FU-ringworm",
            Disease::Cellulitis => "BA-cellulitis",
            Disease::Impetigo => "BA-impetigo",
            Disease::AthleteFoot => "FU-athlete-foot",
            Disease::NailFungus => "FU-nail-fungus",
            Disease::CutaneousLarvaMigrans => "PA-cutaneous-larva-migrans",
            Disease::Chickenpox => "VI-chickenpox",
            Disease::Shingles => "VI-shingles",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.label() == label)
    }

    pub fn instructions(&self) -> &'static [&'static str] {
        match self {
            Disease::Ringworm => &[
                "Clean the Area",
                "Apply Antifungal Cream",
                "Keep It Dry",
                "Avoid Scratching",
                "Maintain Hygiene",
            ],
            Disease::Cellulitis => &[
                "Clean the Area",
                "Apply Antibiotic Ointment",
                "Elevate the Affected Limb",
                "Seek Medical Attention",
            ],
            Disease::Impetigo => &[
                "Clean the sores",
                "Apply Antibiotic Ointment",
                "Cover the sores",
                "Avoid scratching",
                "Wash hands frequently",
            ],
            Disease::AthleteFoot => &[
                "Keep feet clean and dry",
                "Apply antifungal cream",
                "Wear breathable socks",
                "Change shoes regularly",
            ],
            Disease::NailFungus => &[
                "Trim nails",
                "Apply antifungal cream",
                "Keep feet dry",
                "Wear breathable shoes",
            ],
            Disease::CutaneousLarvaMigrans => &[
                "Apply anti-parasitic cream",
                "Avoid scratching",
                "Seek medical attention",
            ],
            Disease::Chickenpox => &[
                "Keep skin clean",
                "Apply calamine lotion",
                "Trim nails",
                "Use acetaminophen",
                "Avoid close contact",
            ],
            Disease::Shingles => &[
                "Apply cool compress",
                "Use pain relief medications",
                "Wear loose clothing",
            ],
        }
    }
}

/// Instructions for `label`, or the single fallback entry when the label is
/// not in the catalog.
pub fn instructions_for(label: &str) -> &'static [&'static str] {
    Disease::from_label(label)
        .map(|d| d.instructions())
        .unwrap_or(NO_INSTRUCTIONS)
}

/// Labels from a trained label set that have no catalog entry.
pub fn missing_instructions<'a, I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    labels
        .into_iter()
        .filter(|label| Disease::from_label(label).is_none())
        .map(str::to_string)
        .collect()
}
