#![allow(dead_code)]

use cifti::{ByteOrder, CiftiContainer, ContainerConfig, MetadataExtension, NiftiHeader, NiftiVersion};
use cifti_core::ExtensionLayout;
use std::path::Path;

/// Legacy document: a time series on axis 0 and five brain models on axis 1
pub const LEGACY_DTSERIES: &str = r#"<CIFTI Version="1.0" NumberOfMatrices="1">
  <Matrix>
    <MatrixIndicesMap AppliesToMatrixDimension="0" IndicesMapToDataType="CIFTI_INDEX_TYPE_TIME_POINTS" TimeStep="720" TimeStepUnits="NIFTI_UNITS_MSEC"/>
    <MatrixIndicesMap AppliesToMatrixDimension="1" IndicesMapToDataType="CIFTI_INDEX_TYPE_BRAIN_MODELS">
      <BrainModel IndexOffset="0" IndexCount="3" ModelType="CIFTI_MODEL_TYPE_SURFACE" BrainStructure="CIFTI_STRUCTURE_CORTEX_LEFT"/>
      <BrainModel IndexOffset="3" IndexCount="2" ModelType="CIFTI_MODEL_TYPE_SURFACE" BrainStructure="CIFTI_STRUCTURE_CORTEX_RIGHT"/>
    </MatrixIndicesMap>
  </Matrix>
</CIFTI>"#;

/// Values `1..=rows*cols` in row-major order
pub fn counting(rows: usize, cols: usize) -> Vec<f32> {
    (1..=rows * cols).map(|v| v as f32).collect()
}

/// In-memory container holding `values`
pub fn container_with(rows: usize, cols: usize, values: &[f32], config: ContainerConfig) -> CiftiContainer {
    let metadata = MetadataExtension::for_matrix(rows, cols).unwrap();
    let mut container = CiftiContainer::create(metadata, config).unwrap();
    container.set_matrix(values).unwrap();
    container
}

/// Write a container file byte by byte, with `stored_dims` exactly as given
pub fn write_raw(
    path: &Path,
    version: NiftiVersion,
    order: ByteOrder,
    stored_dims: &[i64],
    xml: &str,
    values: &[f32],
) {
    let mut header = NiftiHeader::new();
    header.set_matrix_dims(stored_dims).unwrap();
    let layout = ExtensionLayout::for_metadata(version.header_size(), xml.len()).unwrap();
    header.vox_offset = layout.vox_offset as i64;

    let mut bytes = header.to_bytes(version, order).unwrap();
    bytes.extend_from_slice(&layout.prefix.to_bytes(order));
    bytes.extend_from_slice(xml.as_bytes());
    bytes.resize(layout.vox_offset as usize, 0);
    for v in values {
        match order {
            ByteOrder::Little => bytes.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => bytes.extend_from_slice(&v.to_be_bytes()),
        }
    }
    std::fs::write(path, bytes).unwrap();
}

/// Payload bytes of a container file
pub fn payload_bytes(path: &Path) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    let header = NiftiHeader::from_bytes(&bytes).unwrap();
    bytes[header.vox_offset as usize..].to_vec()
}

pub fn read_all(container: &CiftiContainer) -> Vec<f32> {
    let (rows, cols) = container.dimensions().unwrap();
    let mut out = vec![0.0; rows * cols];
    container.get_matrix(&mut out).unwrap();
    out
}
