//! cifti-tool: inspect and convert CIFTI containers
//!
//! Run with: `cargo run --features cli --bin cifti-tool -- info matrix.dscalar.nii`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, Level};

use cifti::{
    ByteOrder, CiftiContainer, CiftiError, ContainerConfig, MetadataRevision, NiftiVersion,
};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Inspect, read and convert NIfTI-wrapped CIFTI matrix files")]
struct Cli {
    /// Log container operations
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header and metadata summary
    Info {
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one row
    Row { file: PathBuf, index: usize },
    /// Print one column
    Column { file: PathBuf, index: usize },
    /// Write a container back out, optionally converting its layout
    Resave {
        input: PathBuf,
        output: PathBuf,

        /// CIFTI revision of the written metadata
        #[arg(long, value_enum, default_value = "2")]
        revision: RevisionArg,

        /// NIfTI header version of the written file
        #[arg(long, value_enum, default_value = "2")]
        nifti: NiftiArg,

        /// Write big-endian regardless of the input
        #[arg(long)]
        big_endian: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RevisionArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

#[derive(Clone, Copy, ValueEnum)]
enum NiftiArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.error_code(), "{e}");
            eprintln!("error [{}]: {e}", e.error_code());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), CiftiError> {
    match command {
        Commands::Info { file, json } => handle_info(file, json),
        Commands::Row { file, index } => {
            let container = CiftiContainer::open_path(&file, ContainerConfig::on_disk())?;
            let mut row = vec![0.0; container.column_count()?];
            container.get_row(index, &mut row)?;
            print_values(&row);
            Ok(())
        }
        Commands::Column { file, index } => {
            let container = CiftiContainer::open_path(&file, ContainerConfig::on_disk())?;
            let mut column = vec![0.0; container.row_count()?];
            container.get_column(index, &mut column)?;
            print_values(&column);
            Ok(())
        }
        Commands::Resave {
            input,
            output,
            revision,
            nifti,
            big_endian,
        } => {
            let mut config = ContainerConfig::on_disk()
                .with_writing_revision(match revision {
                    RevisionArg::One => MetadataRevision::Cifti1,
                    RevisionArg::Two => MetadataRevision::Cifti2,
                })
                .with_header_version(match nifti {
                    NiftiArg::One => NiftiVersion::Nifti1,
                    NiftiArg::Two => NiftiVersion::Nifti2,
                });
            if big_endian {
                config = config.with_byte_order(ByteOrder::Big);
            }
            let mut container = CiftiContainer::open_path(&input, config)?;
            container.write(&output)?;
            println!("wrote {}", output.display());
            Ok(())
        }
    }
}

fn handle_info(file: PathBuf, json: bool) -> Result<(), CiftiError> {
    let container = CiftiContainer::open_path(&file, ContainerConfig::on_disk())?;
    let header = container.header();
    let metadata = container.metadata()?;
    let (rows, cols) = container.dimensions()?;
    let kinds = axis_kinds(&container)?;

    if json {
        println!("{:#}", info_summary(&file, &container)?);
        return Ok(());
    }

    println!("File:          {}", file.display());
    println!("NIfTI version: {}", header.version.number());
    println!("Byte order:    {}", header.byte_order);
    println!("CIFTI version: {}", metadata.revision().version_str());
    println!("Matrix:        {rows} rows x {cols} columns");
    println!("Axes:          {}", kinds.join(", "));
    println!("Payload at:    {}", header.vox_offset);
    println!("Intent:        {} ({})", header.intent_code, header.intent_name_str());
    Ok(())
}

fn axis_kinds(container: &CiftiContainer) -> Result<Vec<String>, CiftiError> {
    Ok(container
        .metadata()?
        .axes()
        .iter()
        .map(|a| format!("{:?}", a.kind))
        .collect())
}

fn info_summary(file: &Path, container: &CiftiContainer) -> Result<serde_json::Value, CiftiError> {
    let header = container.header();
    let metadata = container.metadata()?;
    let (rows, cols) = container.dimensions()?;
    Ok(serde_json::json!({
        "path": file.display().to_string(),
        "nifti_version": header.version.number(),
        "byte_order": header.byte_order.to_string(),
        "cifti_version": metadata.revision().version_str(),
        "rows": rows,
        "columns": cols,
        "axis_lengths": container.axis_lengths()?,
        "axis_kinds": axis_kinds(container)?,
        "vox_offset": header.vox_offset,
        "intent_code": header.intent_code,
        "intent_name": header.intent_name_str(),
    }))
}

fn print_values(values: &[f32]) {
    let line: Vec<String> = values.iter().map(f32::to_string).collect();
    println!("{}", line.join(" "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use cifti::MetadataExtension;
    use tempfile::TempDir;

    #[test]
    fn test_info_summary_pretty_prints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.nii");
        let metadata = MetadataExtension::for_matrix(3, 4).unwrap();
        CiftiContainer::create(metadata, ContainerConfig::default())
            .unwrap()
            .write(&path)
            .unwrap();

        let container = CiftiContainer::open_path(&path, ContainerConfig::on_disk()).unwrap();
        let summary = info_summary(&path, &container).unwrap();
        assert_eq!(summary["rows"], 3);
        assert_eq!(summary["columns"], 4);
        assert_eq!(summary["nifti_version"], 2);
        assert_eq!(summary["axis_lengths"], serde_json::json!([4, 3]));

        let printed = format!("{summary:#}");
        assert!(printed.contains('\n'));
        let reparsed: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(reparsed, summary);
    }
}
