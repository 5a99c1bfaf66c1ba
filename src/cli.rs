//! CLI definitions and command handlers.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressStyle};

use crate::arch::{Arch, WriteStatus};
use crate::disk::{BlockRead, BlockWrite, CaptureSink, Disk, ImageMedium};
use crate::partition::PartitionList;
use crate::probe::ProbeChain;
use crate::reconcile::AlignUnit;
use crate::recover::{
    dmsetup_lines, infer_heads_per_cylinder, interface_recovery, AutoHooks, RecoveryOptions,
};
use crate::report::ScanReport;
use crate::scanner::{
    search_part, ChannelControl, Control, ControlSource, NoControl, ScanOptions, ScanProgress,
};

/// Signature-based partition table recovery for disk images.
///
/// Scans an image sector by sector for filesystem signatures, rebuilds
/// a consistent partition table from what it finds, and can write the
/// table back. The image itself is opened read-only unless --write is
/// given.
#[derive(Parser, Debug)]
#[command(name = "partrescue")]
#[command(version)]
#[command(about = "Signature-based partition table recovery for disk images", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan an image for lost partitions and report them
    Scan(ScanArgs),

    /// Scan, rebuild a partition table and optionally write it back
    Recover(RecoverArgs),

    /// Pretty-print a previously saved scan report
    Show(ShowArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchChoice {
    None,
    I386,
    Gpt,
    Mac,
    Sun,
    Xbox,
    Humax,
}

impl From<ArchChoice> for Arch {
    fn from(choice: ArchChoice) -> Self {
        match choice {
            ArchChoice::None => Arch::None,
            ArchChoice::I386 => Arch::I386,
            ArchChoice::Gpt => Arch::Gpt,
            ArchChoice::Mac => Arch::Mac,
            ArchChoice::Sun => Arch::Sun,
            ArchChoice::Xbox => Arch::Xbox,
            ArchChoice::Humax => Arch::Humax,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlignChoice {
    Auto,
    Sector,
    Head,
    Cylinder,
    Mib,
}

impl From<AlignChoice> for AlignUnit {
    fn from(choice: AlignChoice) -> Self {
        match choice {
            AlignChoice::Auto => AlignUnit::Auto,
            AlignChoice::Sector => AlignUnit::Sector,
            AlignChoice::Head => AlignUnit::Head,
            AlignChoice::Cylinder => AlignUnit::Cylinder,
            AlignChoice::Mib => AlignUnit::Mib,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Disk image to scan
    #[arg(required = true)]
    pub image: PathBuf,

    /// Partition table architecture
    #[arg(long, value_enum, default_value_t = ArchChoice::I386)]
    pub arch: ArchChoice,

    /// Sector size in bytes
    #[arg(long, default_value = "512")]
    pub sector_size: u32,

    /// Heads per cylinder
    #[arg(long, default_value = "255")]
    pub heads: u32,

    /// Sectors per head
    #[arg(long, default_value = "63")]
    pub sectors: u32,

    /// Search depth: 0 skips ahead after each find, 2 probes every
    /// cylinder-start head
    #[arg(long, short, default_value = "1")]
    pub fast_mode: u8,

    /// Write a JSON report to this path
    #[arg(long, short)]
    pub report: Option<PathBuf>,

    /// Disable the interactive scan keys (s=stop, n=next hint,
    /// +=jump ahead, q=quit)
    #[arg(long)]
    pub no_keys: bool,

    /// Print dmsetup-compatible mapping lines for the found partitions
    #[arg(long)]
    pub dmsetup: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RecoverArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Alignment for rebuilt partition boundaries
    #[arg(long, value_enum, default_value_t = AlignChoice::Auto)]
    pub align: AlignChoice,

    /// Use the maximal extended-partition envelope instead of the
    /// minimal one
    #[arg(long)]
    pub max_ext: bool,

    /// Write the rebuilt table into the image (default: simulate only)
    #[arg(long)]
    pub write: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    /// Report file written by a previous scan
    #[arg(required = true)]
    pub report: PathBuf,
}

fn open_disk(args: &ScanArgs) -> Result<(Disk, ImageMedium)> {
    let medium = ImageMedium::open(&args.image)
        .with_context(|| format!("opening image {}", args.image.display()))?;
    let size = medium.len();
    let disk = Disk::new(
        size,
        size,
        args.sector_size,
        args.heads,
        args.sectors,
        args.arch.into(),
    )?;
    tracing::info!(
        image = %args.image.display(),
        size,
        arch = ?disk.arch,
        "image opened"
    );
    Ok((disk, medium))
}

/// Reads scan-control keys from stdin on a separate thread: the scan
/// loop itself never blocks on input.
fn spawn_key_reader(tx: Sender<Control>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let control = match line.trim() {
                "s" => Control::Stop,
                "n" => Control::Skip,
                "+" => Control::SearchMore,
                "q" => Control::Quit,
                _ => continue,
            };
            if tx.send(control).is_err() {
                break;
            }
        }
    });
}

fn make_control(no_keys: bool) -> Box<dyn ControlSource> {
    if no_keys {
        Box::new(NoControl)
    } else {
        let (tx, rx) = crossbeam_channel::unbounded();
        spawn_key_reader(tx);
        Box::new(ChannelControl::new(rx))
    }
}

fn progress_bar(max: u64) -> ProgressBar {
    let bar = ProgressBar::new(max);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}

pub fn run_scan(args: &ScanArgs, verbose: bool) -> Result<()> {
    let (disk, medium) = open_disk(args)?;
    let chain = ProbeChain::default_chain();
    let opts = ScanOptions {
        fast_mode: args.fast_mode,
        verbose,
    };
    let mut control = make_control(args.no_keys);
    let bar = progress_bar(disk.search_location_max());
    let progress = |p: &ScanProgress| {
        bar.set_position(p.cursor);
        bar.set_message(format!("{} found", p.found));
    };

    let start = Instant::now();
    let outcome = search_part(
        &disk,
        &medium,
        &chain,
        &PartitionList::new(),
        &opts,
        control.as_mut(),
        Some(&progress),
    )?;
    bar.finish_and_clear();

    let inferred = infer_heads_per_cylinder(&disk, &outcome.found);
    let report = ScanReport::new(
        &args.image.display().to_string(),
        &disk,
        &outcome.found,
        &outcome.bad,
        args.fast_mode,
        outcome.interrupted,
        inferred,
        start.elapsed().as_millis() as u64,
    );
    report.print_human();
    if args.dmsetup {
        for line in dmsetup_lines(&disk, &args.image.display().to_string(), &outcome.found) {
            println!("{line}");
        }
    }
    if let Some(path) = &args.report {
        report.save(path)?;
        println!("report saved to {}", path.display().to_string().green());
    }
    Ok(())
}

pub fn run_recover(args: &RecoverArgs, verbose: bool) -> Result<()> {
    let (disk, medium) = open_disk(&args.scan)?;
    let opts = RecoveryOptions {
        fast_mode: args.scan.fast_mode,
        align: args.align.into(),
        max_ext: args.max_ext,
        verbose,
    };
    let mut control = make_control(args.scan.no_keys);
    let bar = progress_bar(disk.search_location_max());
    let progress = |p: &ScanProgress| {
        bar.set_position(p.cursor);
        bar.set_message(format!("{} found", p.found));
    };
    let mut hooks = AutoHooks {
        commit: args.write,
    };

    let start = Instant::now();
    let outcome = if args.write {
        let mut sink = OpenOptions::new()
            .write(true)
            .open(&args.scan.image)
            .with_context(|| format!("opening {} for writing", args.scan.image.display()))?;
        run_recovery(&disk, &medium, &opts, control.as_mut(), &progress, &mut hooks, &mut sink)?
    } else {
        let mut sink = CaptureSink::default();
        run_recovery(&disk, &medium, &opts, control.as_mut(), &progress, &mut hooks, &mut sink)?
    };
    bar.finish_and_clear();

    let report = ScanReport::new(
        &args.scan.image.display().to_string(),
        &disk,
        &outcome.table,
        &outcome.bad,
        outcome.fast_mode,
        outcome.interrupted,
        outcome.inferred_heads_per_cylinder,
        start.elapsed().as_millis() as u64,
    );
    report.print_human();
    if args.scan.dmsetup {
        for line in dmsetup_lines(&disk, &args.scan.image.display().to_string(), &outcome.table) {
            println!("{line}");
        }
    }
    match outcome.written {
        Some(WriteStatus::Written) => {
            println!("{}", "partition table written".green().bold());
        }
        Some(WriteStatus::Simulated) => {
            println!(
                "{}",
                "simulation only; re-run with --write to commit".yellow()
            );
        }
        None => println!("{}", "no table written".yellow()),
    }
    if let Some(path) = &args.scan.report {
        report.save(path)?;
    }
    Ok(())
}

fn run_recovery(
    disk: &Disk,
    medium: &dyn BlockRead,
    opts: &RecoveryOptions,
    control: &mut dyn ControlSource,
    progress: &dyn Fn(&ScanProgress),
    hooks: &mut AutoHooks,
    sink: &mut dyn BlockWrite,
) -> Result<crate::recover::RecoveryOutcome> {
    Ok(interface_recovery(
        disk,
        medium,
        &PartitionList::new(),
        opts,
        control,
        Some(progress),
        hooks,
        sink,
    )?)
}

pub fn run_show(args: &ShowArgs) -> Result<()> {
    let report = ScanReport::load(&args.report)
        .with_context(|| format!("loading report {}", args.report.display()))?;
    report.print_human();
    Ok(())
}
