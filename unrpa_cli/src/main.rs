#![deny(
    rust_2018_idioms,
    unreachable_pub,
    unsafe_code,
    unused_imports,
    unused_mut,
    missing_debug_implementations
)]

use anyhow::Context;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use structopt::StructOpt;
use unrpa::{
    loader::{CommandDecompiler, Decompiler},
    version,
    Extractor, OpenArchive, UnrpaError,
};

/// Extract files from the RPA archive format (from the Ren'Py Visual Novel
/// Engine).
#[derive(StructOpt, Debug)]
#[structopt(name = "unrpa")]
struct Opt {
    /// The RPA files to extract
    #[structopt(required = true, name = "ARCHIVES", parse(from_os_str))]
    files: Vec<PathBuf>,

    /// Explain what is being done, repeat for more detail
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    /// No output
    #[structopt(short, long)]
    silent: bool,

    /// Only list contents, do not extract
    #[structopt(short, long, conflicts_with = "tree")]
    list: bool,

    /// Only list contents as a tree, do not extract
    #[structopt(short, long)]
    tree: bool,

    /// Extract to the given path instead of the current directory
    #[structopt(short, long, parse(from_os_str))]
    path: Option<PathBuf>,

    /// Make any non-existent directories in the extraction path
    #[structopt(short, long)]
    mkdir: bool,

    /// Force an archive version, may result in failure
    #[structopt(short, long = "force")]
    force: Option<String>,

    /// Try to continue extraction when something goes wrong
    #[structopt(long)]
    continue_on_error: bool,

    /// Offset of the index, for archives that are not supported
    #[structopt(short, long, parse(try_from_str = parse_number))]
    offset: Option<u64>,

    /// Key of the index, for archives that are not supported
    #[structopt(short, long, parse(try_from_str = parse_number))]
    key: Option<u64>,

    /// Decompiler used on loader.pyo for ZiX archives
    #[structopt(long, parse(from_os_str), default_value = "uncompyle6")]
    decompiler: PathBuf,
}

fn main() {
    let opt = Opt::from_args();
    init_logger(&opt);

    if let Err(err) = run(&opt) {
        eprintln!("{}", format!("{:#}", err).red());
        if let Some(help) = err
            .chain()
            .find_map(|e| e.downcast_ref::<UnrpaError>())
            .and_then(UnrpaError::help)
        {
            eprintln!("{}", help);
        }
        std::process::exit(1);
    }
}

fn init_logger(opt: &Opt) {
    let level = if opt.silent {
        "off"
    } else {
        match opt.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    )
    .init();
}

fn parse_number(src: &str) -> Result<u64, std::num::ParseIntError> {
    match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => src.parse(),
    }
}

fn validate(opt: &Opt) -> anyhow::Result<()> {
    if opt.offset.is_some() != opt.key.is_some() {
        anyhow::bail!("If you set --key or --offset, you must set both.");
    }
    let listing = opt.list || opt.tree;
    if listing && opt.path.is_some() {
        anyhow::bail!("Option --path: only valid when extracting.");
    }
    if opt.mkdir && opt.path.is_none() {
        anyhow::bail!("Option --mkdir: only valid when --path is set.");
    }
    if let Some(path) = &opt.path {
        if !opt.mkdir && !path.is_dir() {
            anyhow::bail!("No such directory: {:?}. Use --mkdir to create it.", path);
        }
    }
    if listing && opt.silent {
        anyhow::bail!("Option --list: can't be silent while listing data.");
    }
    if let Some(file) = opt.files.iter().find(|file| !file.is_file()) {
        anyhow::bail!("No such file: {:?}.", file);
    }
    Ok(())
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    validate(opt)?;

    let versions = version::get_all_versions();
    let forced = match &opt.force {
        Some(name) => Some(version::find_version(&versions, name).with_context(|| {
            format!(
                "It needs to be one of: {}",
                versions.iter().map(|v| v.get_name()).collect::<Vec<_>>().join(", ")
            )
        })?),
        None => None,
    };
    let decompiler: Arc<dyn Decompiler> =
        Arc::new(CommandDecompiler::new(&opt.decompiler));

    let output_dir = match &opt.path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    if opt.mkdir {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Could not create {:?}", output_dir))?;
    }

    for file in &opt.files {
        // Each archive gets its own version instances
        let mut extractor = Extractor::new(file)
            .with_versions(versions.clone())
            .with_decompiler(Arc::clone(&decompiler));
        if let Some(version) = &forced {
            extractor = extractor.with_version(version.clone());
        }
        if let (Some(offset), Some(key)) = (opt.offset, opt.key) {
            extractor = extractor.with_offset_and_key(offset, key);
        }

        let mut archive = extractor
            .open()
            .with_context(|| format!("Could not read archive {:?}", file))?;
        if opt.list {
            list_files(&archive);
        } else if opt.tree {
            list_tree(&archive);
        } else {
            extract_archive(opt, &mut archive, &output_dir)?;
        }
    }
    Ok(())
}

fn list_files(archive: &OpenArchive) {
    log::info!("Listing files in {:?}", archive.path());
    for path in archive.paths() {
        println!("{}", path);
    }
}

fn list_tree(archive: &OpenArchive) {
    println!("{}", archive.path().display());
    for line in archive.directory().tree_lines() {
        println!("{}", line);
    }
}

fn extract_archive(
    opt: &Opt,
    archive: &mut OpenArchive,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let progress_bar = if opt.silent {
        ProgressBar::hidden()
    } else {
        init_progressbar(
            &format!("Extracting: {:?}", archive.path()),
            archive.index().len() as u64,
        )
    };
    let extracted = archive.extract_all(
        output_dir,
        opt.continue_on_error,
        |number, path| {
            progress_bar.set_position(number as u64);
            progress_bar.set_message(path);
        },
    )?;
    progress_bar.finish_and_clear();
    log::info!(
        "Extracted {} of {} files from {:?}",
        extracted,
        archive.index().len(),
        archive.path()
    );
    Ok(())
}

fn init_progressbar(prefix: &str, size: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(size).with_style(
        ProgressStyle::default_bar().template(
            " {spinner} {prefix} {wide_bar:} {pos:>6}/{len:6} ETA:[{eta}] {msg}",
        ),
    );
    progress_bar.set_prefix(prefix);
    progress_bar
}
