use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use imgteka::registry::{self, FileType, FormatId};
use imgteka::{DisplayPair, metadata};

#[derive(Parser)]
#[command(name = "imgteka")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Identify disk, cartridge and optical images and show their metadata")]
struct Cli {
    /// Log what the decoders are doing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every known format
    List,

    /// Extract and show the metadata of files claimed to be of one format
    Inspect {
        /// Format id (`0x601`, `1537`) or short name (`PSP`)
        #[arg(short, long)]
        format: String,

        /// Print the stored blob instead of the display pairs
        #[arg(long)]
        json: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print md5, sha1 and size of each file
    Summary {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Decode the icon or cover of a file and save it as PNG
    Icon {
        #[arg(short, long)]
        format: String,

        file: PathBuf,

        #[arg(short, long, alias = "image-out")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List => list(),
        Commands::Inspect {
            format,
            json,
            files,
        } => inspect(parse_format(&format)?.file_type(), json, &files),
        Commands::Summary { files } => summary(&files),
        Commands::Icon { format, file, out } => icon(parse_format(&format)?.file_type(), &file, &out),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "imgteka=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Accepts a numeric id in hex or decimal, or an unambiguous short name.
fn parse_format(text: &str) -> Result<FormatId> {
    let raw = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => Some(u32::from_str_radix(hex, 16).context("Invalid hexadecimal format id")?),
        None => text.parse::<u32>().ok(),
    };
    if let Some(raw) = raw {
        return Ok(registry::get(raw)?.id());
    }

    let matches: Vec<FormatId> = registry::all_ids()
        .iter()
        .copied()
        .filter(|id| id.file_type().short_name().eq_ignore_ascii_case(text))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("Unknown format '{text}', see `imgteka list`"),
        many => {
            let ids: Vec<String> = many.iter().map(|id| format!("{:#05x}", id.raw())).collect();
            bail!("'{text}' names several formats, use one of {}", ids.join(", "))
        }
    }
}

fn list() -> Result<()> {
    println!("{:<7} {:<8} {:<6} NAME", "ID", "SHORT", "IMAGE");
    println!("{}", "-".repeat(60));
    for id in registry::all_ids() {
        let file_type = id.file_type();
        println!(
            "{:<7} {:<8} {:<6} {}",
            format!("{:#05x}", id.raw()),
            file_type.short_name(),
            if file_type.is_image() { "yes" } else { "no" },
            file_type.name()
        );
    }
    Ok(())
}

fn print_pairs(path: &Path, pairs: &[DisplayPair]) {
    println!("== {} ==", path.display());
    let width = pairs.iter().map(|p| p.label.chars().count()).max().unwrap_or(0);
    for pair in pairs {
        let pad = width - pair.label.chars().count();
        println!("{}{} : {}", pair.label, " ".repeat(pad), pair.value);
    }
    println!();
}

/// Runs `work` over every file in parallel and prints the results in order.
fn for_each_file<T: Send>(
    files: &[PathBuf],
    work: impl Fn(&Path) -> Result<T> + Sync,
    print: impl Fn(&Path, T),
) -> Result<()> {
    let results: Vec<Result<T>> = files.par_iter().map(|path| work(path)).collect();
    let mut failed = 0usize;
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(value) => print(path, value),
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err:#}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} files failed", files.len());
    }
    Ok(())
}

fn inspect(file_type: &'static FileType, json: bool, files: &[PathBuf]) -> Result<()> {
    for_each_file(
        files,
        |path| {
            let record = file_type
                .extract(path)
                .with_context(|| format!("Not a valid {} file", file_type.short_name()))?;
            Ok(metadata::encode(&record)?)
        },
        |path, blob| {
            if json {
                println!("{blob}");
            } else {
                print_pairs(path, &file_type.render(&blob));
            }
        },
    )
}

fn summary(files: &[PathBuf]) -> Result<()> {
    for_each_file(
        files,
        |path| registry::file_summary(path).context("Failed to read file"),
        |path, pairs| print_pairs(path, &pairs),
    )
}

fn icon(file_type: &'static FileType, file: &Path, out: &Path) -> Result<()> {
    if !file_type.is_image() {
        bail!("{} files carry no image", file_type.short_name());
    }
    let picture = file_type
        .image(file)
        .with_context(|| format!("Failed to decode image of {:?}", file))?;
    let (width, height) = picture.dimensions();
    picture
        .to_rgba16()
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {:?}", out))?;
    println!("{width}x{height} image written to {:?}", out);
    Ok(())
}
