// ============================================================================
// SIGN CATALOG & COLLECTIONS — premade sign images + per-collection regions
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SignError;

/// The NFT collections the generator knows about. Each carries a fixed
/// contract address and a fixed sign-region polygon on its artwork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    /// Good Hippos Nation — the main collection.
    Ghn,
    /// GHN Companion Club — the companion collection.
    Gcc,
}

impl Collection {
    /// Short id used in filenames, upload paths and the CLI.
    pub fn id(&self) -> &'static str {
        match self {
            Collection::Ghn => "GHN",
            Collection::Gcc => "GCC",
        }
    }

    /// The collection's ERC-721 contract address.
    pub fn contract_address(&self) -> &'static str {
        match self {
            Collection::Ghn => "0x3a9f3147742e51efba1f04ffa68b3ddfc1cb0136",
            Collection::Gcc => "0x91b85d0b853dd5c1e4605deb5f0d46aaa4a7e2a9",
        }
    }

    /// The sign-region polygon in canvas space (2048×2048): the area where
    /// the solid-color sign is painted on this collection's artwork.
    /// Ordered clockwise.
    pub fn sign_polygon(&self) -> &'static [(f32, f32)] {
        match self {
            Collection::Ghn => &[
                (614.0, 1126.0),
                (1434.0, 1126.0),
                (1475.0, 1740.0),
                (573.0, 1740.0),
            ],
            Collection::Gcc => &[
                (696.0, 1208.0),
                (1352.0, 1167.0),
                (1393.0, 1699.0),
                (655.0, 1740.0),
            ],
        }
    }

    /// Parse a CLI / user-supplied collection id (case-insensitive).
    pub fn parse(s: &str) -> Result<Collection, SignError> {
        match s.to_ascii_uppercase().as_str() {
            "GHN" => Ok(Collection::Ghn),
            "GCC" => Ok(Collection::Gcc),
            other => Err(SignError::Validation(format!(
                "unknown collection '{}' (expected GHN or GCC)",
                other
            ))),
        }
    }
}

/// Centroid of a polygon's vertices — the default placement anchor for new
/// overlays on that collection's artwork.
pub fn centroid(points: &[(f32, f32)]) -> (f32, f32) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / points.len() as f32, sy / points.len() as f32)
}

// ---------------------------------------------------------------------------
//  Catalog — JSON document describing the premade sign images
// ---------------------------------------------------------------------------

/// One premade sign image in the catalog.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SignEntry {
    pub name: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// The sign catalog configuration document:
/// `{githubUser, githubRepo, githubBranch, imageBasePath, categories}`.
/// Sign images are served from GitHub raw content.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignCatalog {
    pub github_user: String,
    pub github_repo: String,
    pub github_branch: String,
    pub image_base_path: String,
    pub categories: BTreeMap<String, Vec<SignEntry>>,
}

impl SignCatalog {
    /// Parse a catalog from its JSON text.
    pub fn from_json(json: &str) -> Result<SignCatalog, SignError> {
        let catalog: SignCatalog = serde_json::from_str(json)
            .map_err(|e| SignError::Config(format!("bad sign catalog JSON: {}", e)))?;
        if catalog.categories.is_empty() {
            return Err(SignError::Config("sign catalog has no categories".into()));
        }
        Ok(catalog)
    }

    /// Absolute raw-content URL for one sign image.
    pub fn image_url(&self, entry: &SignEntry) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}/{}",
            self.github_user,
            self.github_repo,
            self.github_branch,
            self.image_base_path.trim_matches('/'),
            entry.file_name
        )
    }

    /// Find a sign by display name across all categories.
    pub fn find(&self, name: &str) -> Option<&SignEntry> {
        self.categories
            .values()
            .flat_map(|entries| entries.iter())
            .find(|e| e.name == name)
    }

    /// All entries, category order, for listings.
    pub fn all(&self) -> impl Iterator<Item = (&str, &SignEntry)> {
        self.categories
            .iter()
            .flat_map(|(cat, entries)| entries.iter().map(move |e| (cat.as_str(), e)))
    }
}

/// Sign images must be PNGs; anything else is rejected before any fetch.
pub fn validate_sign_file(file_name: &str) -> Result<(), SignError> {
    if file_name.to_ascii_lowercase().ends_with(".png") {
        Ok(())
    } else {
        Err(SignError::Validation(format!(
            "sign image '{}' is not a .png file",
            file_name
        )))
    }
}
