//! pixelfuse CLI
//!
//! Embed images into a text container and extract them back into a zip.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pixelfuse::bundle::ARCHIVE_NAME;
use pixelfuse::container::{image_blocks, split_label};
use pixelfuse::{Decoder, DecodeMode, EmbedConfig, EncodingPolicy, Service, ServiceConfig, UploadedFile};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pixelfuse")]
#[command(version)]
#[command(about = "Embed images into a base64 text container and extract them back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed images (files or directories) into a text container
    Embed {
        /// Image files and directories to embed, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Name written in the container header and used for `<name>.txt`
        #[arg(short = 'n', long)]
        name: String,

        /// Directory to write `<name>.txt` into (default: stdout)
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Encoding policy: recompress, raw, lossless, passthrough-heic
        #[arg(short, long, default_value_t = EncodingPolicy::default())]
        policy: EncodingPolicy,

        /// Longer side after downscaling (recompress only)
        #[arg(long, default_value_t = pixelfuse::config::DEFAULT_MAX_DIMENSION)]
        max_dimension: u32,

        /// Maximum number of images per container
        #[arg(long, default_value_t = pixelfuse::config::DEFAULT_MAX_FILES)]
        max_files: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract the images of a container into a zip archive
    Extract {
        /// Container file to read (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Zip file to write (default: ./extracted_images.zip)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Round-trip images through the codec instead of writing them verbatim
        #[arg(long)]
        reencode: bool,

        /// Parent directory for the temporary work area
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the image blocks of a container
    #[command(name = "t", alias = "list")]
    List {
        /// Container file to list (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Embed { verbose, .. } | Commands::Extract { verbose, .. } | Commands::List { verbose, .. } => *verbose,
    };
    init_tracing(verbose);

    match cli.command {
        Commands::Embed { inputs, name, output_dir, policy, max_dimension, max_files, verbose } => {
            let config = EmbedConfig {
                policy,
                max_dimension,
                max_files,
                ..EmbedConfig::default()
            };
            embed_images(inputs, &name, output_dir, config, verbose)?;
        }
        Commands::Extract { input, output, reencode, work_dir, verbose } => {
            let decode_mode = if reencode { DecodeMode::Reencode } else { DecodeMode::Verbatim };
            extract_images(input, output, decode_mode, work_dir, verbose)?;
        }
        Commands::List { input, verbose } => {
            list_container(input, verbose)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn embed_images(
    inputs: Vec<PathBuf>,
    name: &str,
    output_dir: Option<PathBuf>,
    config: EmbedConfig,
    verbose: bool,
) -> Result<()> {
    let mut files = Vec::new();

    for input in &inputs {
        if input.is_dir() {
            add_directory(&mut files, input, verbose)?;
        } else {
            let file = UploadedFile::from_path(input)
                .with_context(|| format!("Failed to read file: {}", input.display()))?;
            if verbose {
                eprintln!("Added: {} ({} bytes)", file.filename, file.data.len());
            }
            files.push(file);
        }
    }

    let service = Service::new(ServiceConfig {
        embed: config,
        ..ServiceConfig::default()
    });

    if let Some(dir) = output_dir {
        let path = service.embed_to_dir(&files, name, &dir)?;
        if verbose {
            eprintln!("Created: {} ({} images)", path.display(), files.len());
        }
    } else {
        print!("{}", service.embed(&files, name)?);
    }

    Ok(())
}

fn add_directory(files: &mut Vec<UploadedFile>, dir: &Path, verbose: bool) -> Result<()> {
    let entries = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect::<Vec<_>>();

    for entry in entries {
        let file = UploadedFile::from_path(entry.path())
            .with_context(|| format!("Failed to read: {}", entry.path().display()))?;
        if verbose {
            eprintln!("Added: {} ({} bytes)", file.filename, file.data.len());
        }
        files.push(file);
    }

    Ok(())
}

fn read_input(input: Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(input_path) = input {
        fs::read(&input_path).with_context(|| format!("Failed to read: {}", input_path.display()))
    } else {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

fn extract_images(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    decode_mode: DecodeMode,
    work_root: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let container = read_input(input)?;

    let service = Service::new(ServiceConfig {
        decode_mode,
        work_root,
        ..ServiceConfig::default()
    });
    let archive = service.extract(&container)?;

    let output_path = output.unwrap_or_else(|| PathBuf::from(ARCHIVE_NAME));
    let mut out = fs::File::create(&output_path)
        .with_context(|| format!("Failed to write: {}", output_path.display()))?;
    out.write_all(&archive)?;

    if verbose {
        eprintln!("Extracted: {} ({} bytes)", output_path.display(), archive.len());
    }

    Ok(())
}

fn list_container(input: Option<PathBuf>, verbose: bool) -> Result<()> {
    let container = read_input(input)?;
    let text = std::str::from_utf8(&container).context("Container is not valid UTF-8")?;

    if verbose {
        let files = Decoder::new().decode(text)?;
        let labels = image_blocks(text).filter_map(|block| split_label(block).map(|(label, _)| label));
        for (file, label) in files.iter().zip(labels) {
            println!("{}  {}  {}  {}", file.index, label, file.extension, file.data.len());
        }
    } else {
        for block in image_blocks(text) {
            let label = split_label(block).map(|(label, _)| label).unwrap_or(block);
            println!("{}", label);
        }
    }

    Ok(())
}
