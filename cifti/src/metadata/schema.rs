//! CIFTI XML schema handling
//!
//! Only what the container needs: the root `Version`, each
//! `MatrixIndicesMap`'s dimensions and kind, and the declared axis lengths.
//! Rewrites stream every other event through untouched.

use super::{AxisDecl, AxisKind, AxisMapping, MetadataRevision, SeriesUnit};
use crate::error::{CiftiError, Result};
use cifti_core::format::constants::MAX_MATRIX_DIMS;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

const ROOT_TAG: &[u8] = b"CIFTI";
const MAP_TAG: &[u8] = b"MatrixIndicesMap";

const ATTR_VERSION: &str = "Version";
const ATTR_NUM_MATRICES: &str = "NumberOfMatrices";
const ATTR_DIMENSIONS: &str = "AppliesToMatrixDimension";
const ATTR_MAP_TYPE: &str = "IndicesMapToDataType";
const ATTR_SERIES_POINTS: &str = "NumberOfSeriesPoints";
const ATTR_SERIES_EXPONENT: &str = "SeriesExponent";
const ATTR_SERIES_START: &str = "SeriesStart";
const ATTR_SERIES_STEP: &str = "SeriesStep";
const ATTR_SERIES_UNIT: &str = "SeriesUnit";
const ATTR_TIME_START: &str = "TimeStart";
const ATTR_TIME_STEP: &str = "TimeStep";
const ATTR_TIME_UNITS: &str = "TimeStepUnits";
const ATTR_INDEX_COUNT: &str = "IndexCount";

type Attrs = Vec<(String, String)>;

/// Map declaration gathered while scanning
struct MapScan {
    dims: Vec<usize>,
    kind: AxisKind,
    series_points: Option<i64>,
    count: i64,
}

/// Revision and per-axis declarations found in a metadata document
pub(crate) fn scan(text: &str) -> Result<(MetadataRevision, Vec<AxisDecl>)> {
    let mut reader = Reader::from_str(text);
    let mut revision = None;
    let mut maps: Vec<MapScan> = Vec::new();
    let mut open_map: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            CiftiError::metadata(format!(
                "malformed XML near byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        let (e, is_empty) = match event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) if e.name().as_ref() == MAP_TAG => {
                open_map = None;
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match e.name().as_ref() {
            ROOT_TAG => {
                let attrs = attrs_of(&e)?;
                let version = attr(&attrs, ATTR_VERSION)
                    .ok_or_else(|| CiftiError::metadata("CIFTI element has no Version"))?;
                revision = Some(MetadataRevision::from_version_str(version)?);
            }
            MAP_TAG => {
                let attrs = attrs_of(&e)?;
                maps.push(scan_map(&attrs)?);
                open_map = (!is_empty).then_some(maps.len() - 1);
            }
            b"BrainModel" => {
                if let Some(map) = open_map.and_then(|i| maps.get_mut(i)) {
                    let attrs = attrs_of(&e)?;
                    let count = attr(&attrs, ATTR_INDEX_COUNT)
                        .ok_or_else(|| CiftiError::metadata("BrainModel has no IndexCount"))?;
                    map.count += parse_int(ATTR_INDEX_COUNT, count)?;
                }
            }
            b"Parcel" | b"NamedMap" => {
                if let Some(map) = open_map.and_then(|i| maps.get_mut(i)) {
                    map.count += 1;
                }
            }
            _ => {}
        }
    }

    let revision = revision.ok_or_else(|| CiftiError::metadata("missing CIFTI root element"))?;
    let axes = assemble_axes(revision, maps)?;
    Ok((revision, axes))
}

fn scan_map(attrs: &Attrs) -> Result<MapScan> {
    let dims_text = attr(attrs, ATTR_DIMENSIONS)
        .ok_or_else(|| CiftiError::metadata("MatrixIndicesMap has no AppliesToMatrixDimension"))?;
    let dims = parse_dims(dims_text)?;
    let kind = attr(attrs, ATTR_MAP_TYPE)
        .map(AxisKind::from_map_type)
        .ok_or_else(|| CiftiError::metadata("MatrixIndicesMap has no IndicesMapToDataType"))?;
    let series_points = attr(attrs, ATTR_SERIES_POINTS)
        .map(|v| parse_int(ATTR_SERIES_POINTS, v))
        .transpose()?;

    Ok(MapScan {
        dims,
        kind,
        series_points,
        count: 0,
    })
}

fn assemble_axes(revision: MetadataRevision, maps: Vec<MapScan>) -> Result<Vec<AxisDecl>> {
    let axis_count = maps
        .iter()
        .flat_map(|m| m.dims.iter())
        .max()
        .map(|&d| d + 1)
        .ok_or_else(|| CiftiError::metadata("no MatrixIndicesMap elements"))?;

    let mut axes: Vec<Option<AxisDecl>> = vec![None; axis_count];
    for map in &maps {
        let length = match map.kind {
            AxisKind::Series => match revision {
                MetadataRevision::Cifti2 => Some(map.series_points.ok_or_else(|| {
                    CiftiError::metadata("series map has no NumberOfSeriesPoints")
                })?),
                // time points carry no length in the legacy revision
                MetadataRevision::Cifti1 => map.series_points,
            },
            AxisKind::BrainModels | AxisKind::Parcels | AxisKind::Scalars | AxisKind::Labels => {
                Some(map.count)
            }
            AxisKind::Unknown => None,
        };

        for &dim in &map.dims {
            if axes[dim].is_some() {
                return Err(CiftiError::metadata(format!(
                    "dimension {dim} is mapped more than once"
                )));
            }
            axes[dim] = Some(AxisDecl {
                kind: map.kind,
                length,
            });
        }
    }

    axes.into_iter()
        .enumerate()
        .map(|(dim, decl)| {
            decl.ok_or_else(|| CiftiError::metadata(format!("dimension {dim} has no mapping")))
        })
        .collect()
}

/// Re-emit `text` for the `to` revision
///
/// `lengths` are the resolved axis lengths, written into series maps.
pub(crate) fn convert(
    text: &str,
    from: MetadataRevision,
    to: MetadataRevision,
    lengths: &[Option<i64>],
) -> Result<Vec<u8>> {
    rewrite(text, |tag, attrs| match tag {
        TagKind::Root => {
            set_attr(attrs, ATTR_VERSION, to.version_str());
            match to {
                MetadataRevision::Cifti1 => {
                    if attr(attrs, ATTR_NUM_MATRICES).is_none() {
                        set_attr(attrs, ATTR_NUM_MATRICES, "1");
                    }
                }
                MetadataRevision::Cifti2 => remove_attr(attrs, ATTR_NUM_MATRICES),
            }
            Ok(())
        }
        TagKind::Map => {
            let kind = attr(attrs, ATTR_MAP_TYPE).map(AxisKind::from_map_type);
            if kind != Some(AxisKind::Series) {
                return Ok(());
            }
            let dims = attr(attrs, ATTR_DIMENSIONS)
                .map(parse_dims)
                .transpose()?
                .unwrap_or_default();
            let length = dims.first().and_then(|&d| lengths.get(d).copied().flatten());

            match (from, to) {
                (_, MetadataRevision::Cifti2) => series_to_cifti2(attrs, from, length),
                (MetadataRevision::Cifti2, MetadataRevision::Cifti1) => series_to_cifti1(attrs),
                (MetadataRevision::Cifti1, MetadataRevision::Cifti1) => Ok(()),
            }
        }
    })
}

fn series_to_cifti2(attrs: &mut Attrs, from: MetadataRevision, length: Option<i64>) -> Result<()> {
    let length = length.ok_or_else(|| CiftiError::metadata("series length is unresolved"))?;

    if from == MetadataRevision::Cifti1 {
        set_attr(attrs, ATTR_MAP_TYPE, AxisKind::Series.map_type(MetadataRevision::Cifti2));

        let units = take_attr(attrs, ATTR_TIME_UNITS).unwrap_or_else(|| "NIFTI_UNITS_SEC".into());
        let (unit, divisor) = SeriesUnit::from_nifti_units(&units)?;
        let step = take_attr(attrs, ATTR_TIME_STEP)
            .map(|v| parse_float(ATTR_TIME_STEP, &v))
            .transpose()?
            .unwrap_or(1.0);
        let start = take_attr(attrs, ATTR_TIME_START)
            .map(|v| parse_float(ATTR_TIME_START, &v))
            .transpose()?
            .unwrap_or(0.0);

        set_attr(attrs, ATTR_SERIES_EXPONENT, "0");
        set_attr(attrs, ATTR_SERIES_START, &(start / divisor).to_string());
        set_attr(attrs, ATTR_SERIES_STEP, &(step / divisor).to_string());
        set_attr(attrs, ATTR_SERIES_UNIT, unit.cifti2_name());
    }

    set_attr(attrs, ATTR_SERIES_POINTS, &length.to_string());
    Ok(())
}

fn series_to_cifti1(attrs: &mut Attrs) -> Result<()> {
    set_attr(attrs, ATTR_MAP_TYPE, AxisKind::Series.map_type(MetadataRevision::Cifti1));
    remove_attr(attrs, ATTR_SERIES_POINTS);

    let exponent = take_attr(attrs, ATTR_SERIES_EXPONENT)
        .map(|v| parse_int(ATTR_SERIES_EXPONENT, &v))
        .transpose()?
        .unwrap_or(0);

    let unit = take_attr(attrs, ATTR_SERIES_UNIT)
        .map(|v| SeriesUnit::from_cifti2_name(&v))
        .transpose()?
        .unwrap_or(SeriesUnit::Second);
    let units = unit.nifti_units().ok_or_else(|| {
        CiftiError::metadata(format!(
            "series unit {} has no legacy equivalent",
            unit.cifti2_name()
        ))
    })?;
    let step = take_attr(attrs, ATTR_SERIES_STEP)
        .map(|v| parse_float(ATTR_SERIES_STEP, &v))
        .transpose()?
        .unwrap_or(1.0);
    let start = take_attr(attrs, ATTR_SERIES_START)
        .map(|v| parse_float(ATTR_SERIES_START, &v))
        .transpose()?
        .unwrap_or(0.0);

    set_attr(attrs, ATTR_TIME_STEP, &apply_exponent(step, exponent).to_string());
    if start != 0.0 {
        set_attr(attrs, ATTR_TIME_START, &apply_exponent(start, exponent).to_string());
    }
    set_attr(attrs, ATTR_TIME_UNITS, units);
    Ok(())
}

/// Set the step of the series map covering `axis`
///
/// Returns `Ok(None)` when `axis` is not a series axis.
pub(crate) fn set_series_step(
    text: &str,
    revision: MetadataRevision,
    axis: usize,
    step: f64,
) -> Result<Option<Vec<u8>>> {
    let mut touched = false;
    let bytes = rewrite(text, |tag, attrs| {
        if tag != TagKind::Map
            || attr(attrs, ATTR_MAP_TYPE).map(AxisKind::from_map_type) != Some(AxisKind::Series)
        {
            return Ok(());
        }
        let dims = attr(attrs, ATTR_DIMENSIONS)
            .map(parse_dims)
            .transpose()?
            .unwrap_or_default();
        if !dims.contains(&axis) {
            return Ok(());
        }

        match revision {
            MetadataRevision::Cifti1 => set_attr(attrs, ATTR_TIME_STEP, &step.to_string()),
            MetadataRevision::Cifti2 => {
                // stored step is scaled by 10^SeriesExponent
                let exponent = attr(attrs, ATTR_SERIES_EXPONENT)
                    .map(|v| parse_int(ATTR_SERIES_EXPONENT, v))
                    .transpose()?
                    .unwrap_or(0);
                let scaled = apply_exponent(step, -exponent);
                set_attr(attrs, ATTR_SERIES_STEP, &scaled.to_string());
            }
        }
        touched = true;
        Ok(())
    })?;
    Ok(touched.then_some(bytes))
}

/// Build a fresh CIFTI-2 document for the given axis mappings
pub(crate) fn build(mappings: &[AxisMapping]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut root = BytesStart::new("CIFTI");
    root.push_attribute((ATTR_VERSION, MetadataRevision::Cifti2.version_str()));
    writer.write_event(Event::Start(root)).map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("Matrix")))
        .map_err(xml_err)?;

    for (dim, mapping) in mappings.iter().enumerate() {
        let dim_text = dim.to_string();
        let mut map = BytesStart::new("MatrixIndicesMap");
        map.push_attribute((ATTR_DIMENSIONS, dim_text.as_str()));

        match mapping {
            AxisMapping::Series {
                length,
                start,
                step,
                unit,
            } => {
                let length = length.to_string();
                let start = start.to_string();
                let step = step.to_string();
                map.push_attribute((ATTR_MAP_TYPE, AxisKind::Series.map_type(MetadataRevision::Cifti2)));
                map.push_attribute((ATTR_SERIES_POINTS, length.as_str()));
                map.push_attribute((ATTR_SERIES_EXPONENT, "0"));
                map.push_attribute((ATTR_SERIES_START, start.as_str()));
                map.push_attribute((ATTR_SERIES_STEP, step.as_str()));
                map.push_attribute((ATTR_SERIES_UNIT, unit.cifti2_name()));
                writer.write_event(Event::Empty(map)).map_err(xml_err)?;
            }
            AxisMapping::Scalars { names } => {
                map.push_attribute((ATTR_MAP_TYPE, AxisKind::Scalars.map_type(MetadataRevision::Cifti2)));
                writer.write_event(Event::Start(map)).map_err(xml_err)?;
                for name in names {
                    writer
                        .write_event(Event::Start(BytesStart::new("NamedMap")))
                        .map_err(xml_err)?;
                    writer
                        .write_event(Event::Start(BytesStart::new("MapName")))
                        .map_err(xml_err)?;
                    writer
                        .write_event(Event::Text(BytesText::new(name)))
                        .map_err(xml_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new("MapName")))
                        .map_err(xml_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new("NamedMap")))
                        .map_err(xml_err)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new("MatrixIndicesMap")))
                    .map_err(xml_err)?;
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("Matrix")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("CIFTI")))
        .map_err(xml_err)?;
    Ok(writer.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Root,
    Map,
}

/// Stream `text` through a writer, letting `edit` adjust root and map attributes
fn rewrite(text: &str, mut edit: impl FnMut(TagKind, &mut Attrs) -> Result<()>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader.read_event().map_err(|e| {
            CiftiError::metadata(format!(
                "malformed XML near byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(e) => match tag_kind(&e) {
                Some(kind) => {
                    let tag = edited(&e, kind, &mut edit)?;
                    writer.write_event(Event::Start(tag)).map_err(xml_err)?;
                }
                None => writer.write_event(Event::Start(e)).map_err(xml_err)?,
            },
            Event::Empty(e) => match tag_kind(&e) {
                Some(kind) => {
                    let tag = edited(&e, kind, &mut edit)?;
                    writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
                }
                None => writer.write_event(Event::Empty(e)).map_err(xml_err)?,
            },
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }
    Ok(writer.into_inner())
}

fn tag_kind(e: &BytesStart<'_>) -> Option<TagKind> {
    match e.name().as_ref() {
        ROOT_TAG => Some(TagKind::Root),
        MAP_TAG => Some(TagKind::Map),
        _ => None,
    }
}

fn edited(
    e: &BytesStart<'_>,
    kind: TagKind,
    edit: &mut impl FnMut(TagKind, &mut Attrs) -> Result<()>,
) -> Result<BytesStart<'static>> {
    let mut attrs = attrs_of(e)?;
    edit(kind, &mut attrs)?;

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut tag = BytesStart::new(name);
    for (key, value) in &attrs {
        tag.push_attribute((key.as_str(), value.as_str()));
    }
    Ok(tag)
}

fn attrs_of(e: &BytesStart<'_>) -> Result<Attrs> {
    let mut out = Vec::new();
    for a in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a
            .unescape_value()
            .map_err(|err| CiftiError::metadata(format!("bad value for {key}: {err}")))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn attr<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn set_attr(attrs: &mut Attrs, key: &str, value: &str) {
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => attrs.push((key.to_string(), value.to_string())),
    }
}

fn take_attr(attrs: &mut Attrs, key: &str) -> Option<String> {
    let pos = attrs.iter().position(|(k, _)| k == key)?;
    Some(attrs.remove(pos).1)
}

fn remove_attr(attrs: &mut Attrs, key: &str) {
    attrs.retain(|(k, _)| k != key);
}

fn xml_err(e: impl std::fmt::Display) -> CiftiError {
    CiftiError::metadata(format!("XML write failed: {e}"))
}

/// `value * 10^exponent`, dividing for negative exponents to keep decimals exact
fn apply_exponent(value: f64, exponent: i64) -> f64 {
    let magnitude = 10f64.powi(exponent.unsigned_abs().min(300) as i32);
    if exponent >= 0 {
        value * magnitude
    } else {
        value / magnitude
    }
}

fn parse_dims(text: &str) -> Result<Vec<usize>> {
    text.split(',')
        .map(|part| {
            let dim = part.trim().parse::<usize>().map_err(|_| {
                CiftiError::metadata(format!("bad {ATTR_DIMENSIONS} value {text:?}"))
            })?;
            if dim >= MAX_MATRIX_DIMS {
                return Err(CiftiError::metadata(format!(
                    "{ATTR_DIMENSIONS} {dim} is past the last matrix dimension"
                )));
            }
            Ok(dim)
        })
        .collect()
}

fn parse_int(key: &str, text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| CiftiError::metadata(format!("bad {key} value {text:?}")))
}

fn parse_float(key: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| CiftiError::metadata(format!("bad {key} value {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DENSE_SCALAR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CIFTI Version="2">
  <Matrix>
    <MatrixIndicesMap AppliesToMatrixDimension="0" IndicesMapToDataType="CIFTI_INDEX_TYPE_SCALARS">
      <NamedMap><MapName>thickness</MapName></NamedMap>
      <NamedMap><MapName>curvature</MapName></NamedMap>
    </MatrixIndicesMap>
    <MatrixIndicesMap AppliesToMatrixDimension="1" IndicesMapToDataType="CIFTI_INDEX_TYPE_BRAIN_MODELS">
      <BrainModel IndexOffset="0" IndexCount="3" ModelType="CIFTI_MODEL_TYPE_SURFACE" BrainStructure="CIFTI_STRUCTURE_CORTEX_LEFT"/>
      <BrainModel IndexOffset="3" IndexCount="2" ModelType="CIFTI_MODEL_TYPE_SURFACE" BrainStructure="CIFTI_STRUCTURE_CORTEX_RIGHT"/>
    </MatrixIndicesMap>
  </Matrix>
</CIFTI>"#;

    const LEGACY_SERIES: &str = r#"<CIFTI Version="1.0" NumberOfMatrices="1">
  <Matrix>
    <MatrixIndicesMap AppliesToMatrixDimension="1" IndicesMapToDataType="CIFTI_INDEX_TYPE_TIME_POINTS" TimeStep="720" TimeStepUnits="NIFTI_UNITS_MSEC"/>
    <MatrixIndicesMap AppliesToMatrixDimension="0" IndicesMapToDataType="CIFTI_INDEX_TYPE_BRAIN_MODELS">
      <BrainModel IndexOffset="0" IndexCount="4" ModelType="CIFTI_MODEL_TYPE_SURFACE" BrainStructure="CIFTI_STRUCTURE_CORTEX_LEFT"/>
    </MatrixIndicesMap>
  </Matrix>
</CIFTI>"#;

    #[test]
    fn test_scan_dense_scalar() {
        let (revision, axes) = scan(DENSE_SCALAR).unwrap();
        assert_eq!(revision, MetadataRevision::Cifti2);
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[0].kind, AxisKind::Scalars);
        assert_eq!(axes[0].length, Some(2));
        assert_eq!(axes[1].kind, AxisKind::BrainModels);
        assert_eq!(axes[1].length, Some(5));
    }

    #[test]
    fn test_scan_legacy_leaves_series_unresolved() {
        let (revision, axes) = scan(LEGACY_SERIES).unwrap();
        assert_eq!(revision, MetadataRevision::Cifti1);
        assert_eq!(axes[0].kind, AxisKind::BrainModels);
        assert_eq!(axes[0].length, Some(4));
        assert_eq!(axes[1].kind, AxisKind::Series);
        assert_eq!(axes[1].length, None);
    }

    #[test]
    fn test_scan_shared_map() {
        let text = r#"<CIFTI Version="2"><Matrix>
            <MatrixIndicesMap AppliesToMatrixDimension="0,1" IndicesMapToDataType="CIFTI_INDEX_TYPE_PARCELS">
              <Parcel Name="a"/><Parcel Name="b"/><Parcel Name="c"/>
            </MatrixIndicesMap></Matrix></CIFTI>"#;
        let (_, axes) = scan(text).unwrap();
        assert_eq!(axes.len(), 2);
        assert!(axes.iter().all(|a| a.kind == AxisKind::Parcels && a.length == Some(3)));
    }

    #[test]
    fn test_scan_rejects_gaps_and_duplicates() {
        let gap = r#"<CIFTI Version="2"><Matrix>
            <MatrixIndicesMap AppliesToMatrixDimension="1" IndicesMapToDataType="CIFTI_INDEX_TYPE_SCALARS"/>
            </Matrix></CIFTI>"#;
        assert!(scan(gap).is_err());

        let dup = r#"<CIFTI Version="2"><Matrix>
            <MatrixIndicesMap AppliesToMatrixDimension="0" IndicesMapToDataType="CIFTI_INDEX_TYPE_SCALARS"/>
            <MatrixIndicesMap AppliesToMatrixDimension="0" IndicesMapToDataType="CIFTI_INDEX_TYPE_SCALARS"/>
            </Matrix></CIFTI>"#;
        assert!(scan(dup).is_err());

        assert!(scan("<Other/>").is_err());
        assert!(scan(r#"<CIFTI Version="7"><Matrix/></CIFTI>"#).is_err());
    }

    #[test]
    fn test_scan_rejects_out_of_range_dimension() {
        for dim in ["3", "1000000000", "18446744073709551615", "0,99999999999999999999"] {
            let text = format!(
                r#"<CIFTI Version="2"><Matrix>
                <MatrixIndicesMap AppliesToMatrixDimension="{dim}" IndicesMapToDataType="CIFTI_INDEX_TYPE_SCALARS"/>
                </Matrix></CIFTI>"#
            );
            let err = scan(&text).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Format, "dimension {dim}");
        }
    }

    #[test]
    fn test_convert_legacy_to_cifti2() {
        let bytes = convert(
            LEGACY_SERIES,
            MetadataRevision::Cifti1,
            MetadataRevision::Cifti2,
            &[Some(4), Some(10)],
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"Version="2""#));
        assert!(!text.contains("NumberOfMatrices"));
        assert!(text.contains("CIFTI_INDEX_TYPE_SERIES"));
        assert!(text.contains(r#"NumberOfSeriesPoints="10""#));
        assert!(text.contains(r#"SeriesStep="0.72""#));
        assert!(text.contains(r#"SeriesUnit="SECOND""#));
        assert!(!text.contains("TimeStep"));

        let (revision, axes) = scan(&text).unwrap();
        assert_eq!(revision, MetadataRevision::Cifti2);
        assert_eq!(axes[1].length, Some(10));
    }

    #[test]
    fn test_convert_back_to_legacy() {
        let modern = convert(
            LEGACY_SERIES,
            MetadataRevision::Cifti1,
            MetadataRevision::Cifti2,
            &[Some(4), Some(10)],
        )
        .unwrap();
        let legacy = convert(
            std::str::from_utf8(&modern).unwrap(),
            MetadataRevision::Cifti2,
            MetadataRevision::Cifti1,
            &[Some(4), Some(10)],
        )
        .unwrap();
        let text = String::from_utf8(legacy).unwrap();
        assert!(text.contains(r#"Version="1""#));
        assert!(text.contains(r#"NumberOfMatrices="1""#));
        assert!(text.contains("CIFTI_INDEX_TYPE_TIME_POINTS"));
        assert!(text.contains(r#"TimeStep="0.72""#));
        assert!(text.contains(r#"TimeStepUnits="NIFTI_UNITS_SEC""#));
        assert!(!text.contains("NumberOfSeriesPoints"));
    }

    #[test]
    fn test_convert_requires_series_length() {
        assert!(convert(
            LEGACY_SERIES,
            MetadataRevision::Cifti1,
            MetadataRevision::Cifti2,
            &[Some(4), None],
        )
        .is_err());
    }

    #[test]
    fn test_set_series_step() {
        let bytes = build(&[AxisMapping::series(4, 0.0, 1.0, SeriesUnit::Second)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        let updated = set_series_step(&text, MetadataRevision::Cifti2, 0, 2.5)
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(updated).unwrap().contains(r#"SeriesStep="2.5""#));
        assert!(set_series_step(&text, MetadataRevision::Cifti2, 1, 2.5)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_build_escapes_names() {
        let bytes = build(&[
            AxisMapping::series(3, 0.0, 1.0, SeriesUnit::Hertz),
            AxisMapping::scalars(["a<b", "c"]),
        ])
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("a&lt;b"));

        let (_, axes) = scan(&text).unwrap();
        assert_eq!(axes[0].length, Some(3));
        assert_eq!(axes[1].length, Some(2));
    }
}
