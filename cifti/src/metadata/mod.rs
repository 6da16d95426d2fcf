//! CIFTI metadata extension
//!
//! Holds the XML document verbatim and the per-axis declarations extracted
//! from it. Axis `i` is XML matrix dimension `i`: axis 0 runs along a row
//! (its length is the column count), axis 1 runs along a column.

mod schema;

use crate::error::{CiftiError, Result};
use cifti_core::format::constants::intent;
use cifti_core::format::trim_blob;

/// Metadata schema revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetadataRevision {
    /// Legacy revision; the header stores its first two dims reversed
    Cifti1,
    #[default]
    Cifti2,
}

impl MetadataRevision {
    pub fn version_str(self) -> &'static str {
        match self {
            MetadataRevision::Cifti1 => "1",
            MetadataRevision::Cifti2 => "2",
        }
    }

    pub fn from_version_str(text: &str) -> Result<Self> {
        match text.trim() {
            "1" | "1.0" => Ok(MetadataRevision::Cifti1),
            "2" | "2.0" => Ok(MetadataRevision::Cifti2),
            other => Err(CiftiError::metadata(format!(
                "unsupported CIFTI version {other:?}"
            ))),
        }
    }

    /// Whether the header's first two matrix dims are stored swapped
    pub fn has_reversed_first_dims(self) -> bool {
        self == MetadataRevision::Cifti1
    }
}

/// What an axis indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisKind {
    BrainModels,
    Parcels,
    /// Regularly sampled series (time points in the legacy revision)
    Series,
    Scalars,
    Labels,
    Unknown,
}

impl AxisKind {
    pub fn from_map_type(text: &str) -> Self {
        match text {
            "CIFTI_INDEX_TYPE_BRAIN_MODELS" => AxisKind::BrainModels,
            "CIFTI_INDEX_TYPE_PARCELS" => AxisKind::Parcels,
            "CIFTI_INDEX_TYPE_SERIES" | "CIFTI_INDEX_TYPE_TIME_POINTS" => AxisKind::Series,
            "CIFTI_INDEX_TYPE_SCALARS" => AxisKind::Scalars,
            "CIFTI_INDEX_TYPE_LABELS" => AxisKind::Labels,
            _ => AxisKind::Unknown,
        }
    }

    pub fn map_type(self, revision: MetadataRevision) -> &'static str {
        match (self, revision) {
            (AxisKind::BrainModels, _) => "CIFTI_INDEX_TYPE_BRAIN_MODELS",
            (AxisKind::Parcels, _) => "CIFTI_INDEX_TYPE_PARCELS",
            (AxisKind::Series, MetadataRevision::Cifti1) => "CIFTI_INDEX_TYPE_TIME_POINTS",
            (AxisKind::Series, MetadataRevision::Cifti2) => "CIFTI_INDEX_TYPE_SERIES",
            (AxisKind::Scalars, _) => "CIFTI_INDEX_TYPE_SCALARS",
            (AxisKind::Labels, _) => "CIFTI_INDEX_TYPE_LABELS",
            (AxisKind::Unknown, _) => "CIFTI_INDEX_TYPE_INVALID",
        }
    }
}

/// Unit of a series axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeriesUnit {
    Second,
    Hertz,
    Meter,
    Radian,
}

impl SeriesUnit {
    pub fn cifti2_name(self) -> &'static str {
        match self {
            SeriesUnit::Second => "SECOND",
            SeriesUnit::Hertz => "HERTZ",
            SeriesUnit::Meter => "METER",
            SeriesUnit::Radian => "RADIAN",
        }
    }

    pub fn from_cifti2_name(text: &str) -> Result<Self> {
        match text {
            "SECOND" => Ok(SeriesUnit::Second),
            "HERTZ" => Ok(SeriesUnit::Hertz),
            "METER" => Ok(SeriesUnit::Meter),
            "RADIAN" => Ok(SeriesUnit::Radian),
            other => Err(CiftiError::metadata(format!("unknown SeriesUnit {other:?}"))),
        }
    }

    /// Legacy `TimeStepUnits` name, if the unit has one
    pub fn nifti_units(self) -> Option<&'static str> {
        match self {
            SeriesUnit::Second => Some("NIFTI_UNITS_SEC"),
            SeriesUnit::Hertz => Some("NIFTI_UNITS_HZ"),
            SeriesUnit::Meter | SeriesUnit::Radian => None,
        }
    }

    /// Unit and divisor that converts a legacy value into that unit
    pub fn from_nifti_units(text: &str) -> Result<(Self, f64)> {
        match text {
            "NIFTI_UNITS_SEC" => Ok((SeriesUnit::Second, 1.0)),
            "NIFTI_UNITS_MSEC" => Ok((SeriesUnit::Second, 1e3)),
            "NIFTI_UNITS_USEC" => Ok((SeriesUnit::Second, 1e6)),
            "NIFTI_UNITS_HZ" => Ok((SeriesUnit::Hertz, 1.0)),
            other => Err(CiftiError::metadata(format!(
                "unsupported TimeStepUnits {other:?}"
            ))),
        }
    }
}

/// Declaration of one axis as found in the metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisDecl {
    pub kind: AxisKind,
    /// `None` when the document does not state the length
    pub length: Option<i64>,
}

/// Mapping used to build new metadata
#[derive(Debug, Clone, PartialEq)]
pub enum AxisMapping {
    Series {
        length: i64,
        start: f64,
        step: f64,
        unit: SeriesUnit,
    },
    Scalars {
        names: Vec<String>,
    },
}

impl AxisMapping {
    pub fn series(length: i64, start: f64, step: f64, unit: SeriesUnit) -> Self {
        AxisMapping::Series {
            length,
            start,
            step,
            unit,
        }
    }

    pub fn scalars<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AxisMapping::Scalars {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// The metadata extension of a container
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataExtension {
    text: String,
    revision: MetadataRevision,
    axes: Vec<AxisDecl>,
}

impl MetadataExtension {
    /// Parse an extension blob; trailing NUL padding is ignored
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let trimmed = trim_blob(blob);
        let text = std::str::from_utf8(trimmed)
            .map_err(|e| CiftiError::metadata(format!("metadata is not UTF-8: {e}")))?
            .to_string();
        let (revision, axes) = schema::scan(&text)?;
        Ok(Self {
            text,
            revision,
            axes,
        })
    }

    /// Build metadata for the given axes, axis 0 first
    pub fn new(revision: MetadataRevision, mappings: Vec<AxisMapping>) -> Result<Self> {
        if mappings.is_empty() {
            return Err(CiftiError::metadata("metadata needs at least one axis"));
        }
        let lengths: Vec<Option<i64>> = mappings
            .iter()
            .map(|m| match m {
                AxisMapping::Series { length, .. } => Some(*length),
                AxisMapping::Scalars { names } => Some(names.len() as i64),
            })
            .collect();
        if lengths.iter().any(|l| l.is_some_and(|l| l < 1)) {
            return Err(CiftiError::metadata("axis lengths must be positive"));
        }

        let mut bytes = schema::build(&mappings)?;
        if revision == MetadataRevision::Cifti1 {
            let text = into_text(bytes)?;
            bytes = schema::convert(&text, MetadataRevision::Cifti2, revision, &lengths)?;
        }
        Self::parse(&bytes)
    }

    /// Metadata for a plain `rows x cols` matrix
    ///
    /// Axis 0 (along a row) is a unit-step series of `cols` points; axis 1
    /// names each row.
    pub fn for_matrix(rows: usize, cols: usize) -> Result<Self> {
        Self::new(
            MetadataRevision::Cifti2,
            vec![
                AxisMapping::series(cols as i64, 0.0, 1.0, SeriesUnit::Second),
                AxisMapping::scalars((0..rows).map(|r| format!("row {r}"))),
            ],
        )
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Revision the document was parsed as
    pub fn revision(&self) -> MetadataRevision {
        self.revision
    }

    pub fn axes(&self) -> &[AxisDecl] {
        &self.axes
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Declared length per axis, `None` where unresolved
    pub fn axis_lengths(&self) -> Vec<Option<i64>> {
        self.axes.iter().map(|a| a.length).collect()
    }

    /// Resolve the length of an axis the document left open
    pub fn set_axis_length(&mut self, axis: usize, length: i64) -> Result<()> {
        let count = self.axes.len();
        let decl = self.axes.get_mut(axis).ok_or_else(|| {
            CiftiError::metadata(format!("axis {axis} out of range ({count} axes)"))
        })?;
        if length < 1 {
            return Err(CiftiError::metadata(format!(
                "axis {axis} length must be positive, got {length}"
            )));
        }
        decl.length = Some(length);
        Ok(())
    }

    /// Every axis length, failing if any is unresolved
    pub fn resolved_lengths(&self) -> Result<Vec<i64>> {
        self.axes
            .iter()
            .enumerate()
            .map(|(i, a)| {
                a.length
                    .ok_or_else(|| CiftiError::metadata(format!("axis {i} length is unresolved")))
            })
            .collect()
    }

    /// Encode the document for the target revision
    pub fn serialize(&self, target: MetadataRevision) -> Result<Vec<u8>> {
        schema::convert(&self.text, self.revision, target, &self.axis_lengths())
    }

    /// Set the step of the series on `axis`; `Ok(false)` if it is not a series
    pub fn set_series_step(&mut self, axis: usize, step: f64) -> Result<bool> {
        match schema::set_series_step(&self.text, self.revision, axis, step)? {
            Some(bytes) => {
                self.text = into_text(bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Intent code and name derived from the axis kinds
    pub fn intent(&self) -> (i32, &'static str) {
        let code = match self.axes.as_slice() {
            [along_row, along_column] => intent_code(along_row.kind, along_column.kind),
            _ => intent::CONN_UNKNOWN,
        };
        (code, intent::name(code))
    }
}

fn intent_code(along_row: AxisKind, along_column: AxisKind) -> i32 {
    use AxisKind::*;
    match (along_row, along_column) {
        (BrainModels, BrainModels) => intent::CONN_DENSE,
        (Series, BrainModels) => intent::CONN_DENSE_SERIES,
        (Parcels, Parcels) => intent::CONN_PARCELS,
        (Series, Parcels) => intent::CONN_PARCEL_SERIES,
        (Scalars, BrainModels) => intent::CONN_DENSE_SCALAR,
        (Labels, BrainModels) => intent::CONN_DENSE_LABEL,
        (Scalars, Parcels) => intent::CONN_PARCEL_SCALAR,
        (BrainModels, Parcels) => intent::CONN_PARCEL_DENSE,
        (Parcels, BrainModels) => intent::CONN_DENSE_PARCEL,
        _ => intent::CONN_UNKNOWN,
    }
}

fn into_text(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| CiftiError::metadata(format!("metadata is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_matrix_lengths() {
        let meta = MetadataExtension::for_matrix(3, 4).unwrap();
        assert_eq!(meta.revision(), MetadataRevision::Cifti2);
        assert_eq!(meta.axis_lengths(), vec![Some(4), Some(3)]);
        assert_eq!(meta.axes()[0].kind, AxisKind::Series);
        assert_eq!(meta.axes()[1].kind, AxisKind::Scalars);
        assert_eq!(meta.intent(), (intent::CONN_UNKNOWN, "ConnUnknown"));
    }

    #[test]
    fn test_parse_trims_padding() {
        let meta = MetadataExtension::for_matrix(2, 2).unwrap();
        let mut blob = meta.serialize(MetadataRevision::Cifti2).unwrap();
        blob.extend_from_slice(&[0, 0, 0]);
        let parsed = MetadataExtension::parse(&blob).unwrap();
        assert_eq!(parsed.axis_lengths(), vec![Some(2), Some(2)]);
        assert!(!parsed.text().ends_with('\0'));
    }

    #[test]
    fn test_legacy_new_and_resolve() {
        let mut meta = MetadataExtension::new(
            MetadataRevision::Cifti1,
            vec![
                AxisMapping::scalars(["a", "b"]),
                AxisMapping::series(5, 0.0, 2.0, SeriesUnit::Second),
            ],
        )
        .unwrap();
        assert_eq!(meta.revision(), MetadataRevision::Cifti1);
        assert_eq!(meta.axis_lengths(), vec![Some(2), None]);
        assert!(meta.resolved_lengths().is_err());
        assert!(meta.serialize(MetadataRevision::Cifti2).is_err());

        meta.set_axis_length(1, 5).unwrap();
        let modern = MetadataExtension::parse(&meta.serialize(MetadataRevision::Cifti2).unwrap()).unwrap();
        assert_eq!(modern.axis_lengths(), vec![Some(2), Some(5)]);
        assert!(meta.set_axis_length(2, 1).is_err());
        assert!(meta.set_axis_length(0, 0).is_err());
    }

    #[test]
    fn test_intent_table() {
        use AxisKind::*;
        assert_eq!(intent_code(Series, BrainModels), intent::CONN_DENSE_SERIES);
        assert_eq!(intent_code(Parcels, BrainModels), intent::CONN_DENSE_PARCEL);
        assert_eq!(intent_code(BrainModels, Parcels), intent::CONN_PARCEL_DENSE);
        assert_eq!(intent_code(Series, Series), intent::CONN_UNKNOWN);
        assert_eq!(intent::name(intent::CONN_PARCEL_SERIES), "ConnParcelSries");
    }

    #[test]
    fn test_set_series_step() {
        let mut meta = MetadataExtension::for_matrix(2, 3).unwrap();
        assert!(meta.set_series_step(0, 0.5).unwrap());
        assert!(meta.text().contains(r#"SeriesStep="0.5""#));
        assert!(!meta.set_series_step(1, 0.5).unwrap());
    }

    #[test]
    fn test_revision_strings() {
        assert_eq!(
            MetadataRevision::from_version_str("1.0").unwrap(),
            MetadataRevision::Cifti1
        );
        assert!(MetadataRevision::from_version_str("3").is_err());
        assert!(MetadataRevision::Cifti1.has_reversed_first_dims());
        assert!(!MetadataRevision::Cifti2.has_reversed_first_dims());
    }
}
