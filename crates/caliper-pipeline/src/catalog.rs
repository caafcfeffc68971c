//! The reference-object catalog: known physical sizes used for calibration.
//!
//! A [`ReferenceCatalog`] is built once at startup and never mutated
//! afterwards, so it can be shared across concurrent runs behind an `Arc`
//! without locking. Its iteration order is the declaration order, which
//! is also the order auto-detection tries reference types in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a reference type is located in a photo.
///
/// Only the edge-based quadrilateral search exists today;
/// [`TemplateMatching`](Self::TemplateMatching) is accepted in
/// configuration and runs the same search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Canny edges, external contours, first large quadrilateral.
    #[default]
    EdgeDetection,
    /// Reserved for a template matcher; currently edge-based.
    TemplateMatching,
}

/// Known physical size of one reference object type.
///
/// Units are whatever the caller wants results in (the defaults use
/// centimetres). `width` is the extent that lands on the rectified
/// image's x axis; rectification always puts the long side there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Unique type name, e.g. `credit_card`.
    pub name: String,
    /// Physical length, used when no width is configured.
    #[serde(default)]
    pub length: Option<f64>,
    /// Physical width along the rectified x axis.
    #[serde(default)]
    pub width: Option<f64>,
    /// Locator to use for this type.
    #[serde(default)]
    pub detection_method: DetectionMethod,
    /// Minimum detection confidence this type should be accepted at.
    #[serde(default = "ReferenceSpec::default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl ReferenceSpec {
    const fn default_confidence_threshold() -> f64 {
        0.7
    }

    /// Physical extent the calibrator divides the rectified width by:
    /// `width` if set and positive, else `length` if set and positive.
    #[must_use]
    pub fn calibration_extent(&self) -> Option<f64> {
        self.width
            .filter(|w| *w > 0.0)
            .or_else(|| self.length.filter(|l| *l > 0.0))
    }
}

/// Problems building a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// A reference spec has an empty name.
    #[error("reference object names must not be empty")]
    EmptyName,
    /// The same name is declared twice.
    #[error("reference object '{0}' is declared more than once")]
    DuplicateName(String),
}

/// Ordered, immutable set of [`ReferenceSpec`]s keyed by name.
///
/// Serializes as a plain list so configuration files keep their
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReferenceSpec>", into = "Vec<ReferenceSpec>")]
pub struct ReferenceCatalog {
    specs: IndexMap<String, ReferenceSpec>,
}

impl ReferenceCatalog {
    /// Build a catalog, preserving the order of `specs`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for empty or duplicate names.
    pub fn from_specs(specs: Vec<ReferenceSpec>) -> Result<Self, CatalogError> {
        let mut map = IndexMap::with_capacity(specs.len());
        for spec in specs {
            if spec.name.trim().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if map.contains_key(&spec.name) {
                return Err(CatalogError::DuplicateName(spec.name));
            }
            map.insert(spec.name.clone(), spec);
        }
        Ok(Self { specs: map })
    }

    /// Look up a reference type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ReferenceSpec> {
        self.specs.get(name)
    }

    /// Specs in declaration order (the auto-detection order).
    pub fn iter(&self) -> impl Iterator<Item = &ReferenceSpec> {
        self.specs.values()
    }

    /// Type names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Number of configured reference types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` if no reference types are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ReferenceCatalog {
    /// A credit card (ISO/IEC 7810 ID-1, 85.6 x 53.98 mm) followed by a
    /// 30 cm ruler, in centimetres.
    fn default() -> Self {
        let specs = IndexMap::from([
            (
                "credit_card".to_owned(),
                ReferenceSpec {
                    name: "credit_card".to_owned(),
                    length: Some(5.398),
                    width: Some(8.56),
                    detection_method: DetectionMethod::TemplateMatching,
                    confidence_threshold: 0.8,
                },
            ),
            (
                "ruler".to_owned(),
                ReferenceSpec {
                    name: "ruler".to_owned(),
                    length: Some(30.0),
                    width: None,
                    detection_method: DetectionMethod::EdgeDetection,
                    confidence_threshold: 0.7,
                },
            ),
        ]);
        Self { specs }
    }
}

impl TryFrom<Vec<ReferenceSpec>> for ReferenceCatalog {
    type Error = CatalogError;

    fn try_from(specs: Vec<ReferenceSpec>) -> Result<Self, Self::Error> {
        Self::from_specs(specs)
    }
}

impl From<ReferenceCatalog> for Vec<ReferenceSpec> {
    fn from(catalog: ReferenceCatalog) -> Self {
        catalog.specs.into_values().collect()
    }
}
