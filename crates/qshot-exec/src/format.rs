//! Replacing slot positions with schema labels.

use qshot_profile::EntryPointAttributes;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, instrument};

use crate::aggregate::{ResultSet, ShotError, ShotRecord, ShotValue};
use crate::error::FormatError;

/// A shot record keyed by output label.
#[derive(Debug, Clone, PartialEq)]
pub enum LabeledShot {
    /// `(label, value)` pairs in schema order.
    Fields(Vec<(String, ShotValue)>),
    Error(ShotError),
}

impl LabeledShot {
    pub fn fields(&self) -> Option<&[(String, ShotValue)]> {
        match self {
            Self::Fields(fields) => Some(fields),
            Self::Error(_) => None,
        }
    }

    /// Value recorded under `label`.
    pub fn get(&self, label: &str) -> Option<ShotValue> {
        self.fields()?
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| *value)
    }
}

/// Fields serialize as a JSON object in schema order; errors as
/// `{"error": {...}}`.
impl Serialize for LabeledShot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fields(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (label, value) in fields {
                    map.serialize_entry(label, value)?;
                }
                map.end()
            }
            Self::Error(error) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// Applies the output schema's labels to a [`ResultSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledFormatter;

impl LabeledFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Label every record, preserving shot order.
    ///
    /// Cannot fail for a result set aggregated against the same attributes.
    #[instrument(skip_all, fields(shots = results.len()))]
    pub fn format(
        &self,
        results: &ResultSet,
        attributes: &EntryPointAttributes,
    ) -> Result<Vec<LabeledShot>, FormatError> {
        let schema = attributes.output_schema();
        if let Some(label) = schema.duplicate_label() {
            return Err(FormatError::DuplicateLabel(label));
        }
        let slots = schema.slots();

        let shots = results
            .records
            .iter()
            .enumerate()
            .map(|(shot, record)| match record {
                ShotRecord::Ok(values) => {
                    if values.len() != slots.len() {
                        return Err(FormatError::ShapeMismatch {
                            shot,
                            expected: slots.len(),
                            found: values.len(),
                        });
                    }
                    Ok(LabeledShot::Fields(
                        slots
                            .iter()
                            .zip(values)
                            .map(|(slot, value)| (slot.label.clone(), *value))
                            .collect(),
                    ))
                }
                ShotRecord::Error(error) => Ok(LabeledShot::Error(error.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(fields = slots.len(), "Labeled shot records");
        Ok(shots)
    }
}
