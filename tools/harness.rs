//! dynmap workload harness
//!
//! Drives a device through the reference consumer workloads and prints what
//! each access observed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dynmap_api::{AccessMode, DEVICE_PAGES, DEVICE_SIZE, PAGE_SIZE};
use dynmap_dev::{AddressSpace, DeviceConfig, DeviceFile, DynMapDevice, RemapArgs, DYNMAP_IOC_REMAP};
use dynmap_mm::{FramePool, PoolStats, RangeStatsSnapshot, VirtAddr};
use serde::Serialize;

const REPEAT_PASSES: usize = 3;
const REMAP_PASSES: usize = 3;

/// Workload to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Workload {
    Sequential,
    Repeat,
    Remap,
}

impl Workload {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "sequential" => Ok(Self::Sequential),
            "repeat" => Ok(Self::Repeat),
            "remap" => Ok(Self::Remap),
            other => bail!("unknown workload `{other}`"),
        }
    }
}

/// Command-line arguments
#[derive(Debug, Clone, PartialEq, Eq)]
struct HarnessArgs {
    workload: Workload,
    json: bool,
    pool_frames: usize,
}

impl HarnessArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>> {
        let mut workload = None;
        let mut json = false;
        let mut pool_frames = 4 * DEVICE_PAGES;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--json" => json = true,
                "--pool" => {
                    let value = args.next().context("--pool needs a frame count")?;
                    pool_frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count `{value}`"))?;
                }
                "-h" | "--help" | "help" => return Ok(None),
                name if workload.is_none() => workload = Some(Workload::parse(name)?),
                extra => bail!("unexpected argument `{extra}`"),
            }
        }

        Ok(workload.map(|workload| Self {
            workload,
            json,
            pool_frames,
        }))
    }
}

/// One observed read
#[derive(Debug, Clone, Serialize)]
struct Access {
    pass: usize,
    addr: usize,
    offset: usize,
    value: u8,
}

#[derive(Debug, Clone, Serialize)]
struct PoolReport {
    capacity: usize,
    in_use: usize,
    allocations: u64,
    releases: u64,
    failures: u64,
}

impl From<PoolStats> for PoolReport {
    fn from(stats: PoolStats) -> Self {
        Self {
            capacity: stats.capacity,
            in_use: stats.in_use,
            allocations: stats.allocations,
            releases: stats.releases,
            failures: stats.failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct RangeReport {
    first_faults: u64,
    refaults: u64,
    out_of_range: u64,
    alloc_failures: u64,
    lost_races: u64,
}

impl From<RangeStatsSnapshot> for RangeReport {
    fn from(stats: RangeStatsSnapshot) -> Self {
        Self {
            first_faults: stats.first_faults,
            refaults: stats.refaults,
            out_of_range: stats.out_of_range,
            alloc_failures: stats.alloc_failures,
            lost_races: stats.lost_races,
        }
    }
}

/// Everything a run observed
#[derive(Debug, Clone, Serialize)]
struct Report {
    workload: Workload,
    accesses: Vec<Access>,
    remaps: usize,
    range: Option<RangeReport>,
    /// Pool state after the file was released and the mapping removed
    pool: PoolReport,
}

struct Session {
    space: AddressSpace,
    file: DeviceFile,
    base: VirtAddr,
    accesses: Vec<Access>,
    remaps: usize,
}

impl Session {
    fn read(&mut self, pass: usize, offset: usize) -> Result<u8> {
        let addr = self
            .base
            .checked_add(offset)
            .context("address overflow")?;
        let value = self
            .space
            .read_byte(addr)
            .with_context(|| format!("read at {addr} failed"))?;
        self.accesses.push(Access {
            pass,
            addr: addr.as_usize(),
            offset,
            value,
        });
        Ok(value)
    }

    fn remap(&mut self, offset: usize, distance: usize) -> Result<()> {
        let addr = self.base.as_usize() + offset;
        let args = RemapArgs::new(addr as u64, distance as u64);
        self.file
            .ioctl(&self.space, DYNMAP_IOC_REMAP, &args.to_bytes())
            .with_context(|| format!("remap {addr:#x} by {distance:#x} failed"))?;
        self.remaps += 1;
        Ok(())
    }
}

fn run(args: &HarnessArgs) -> Result<Report> {
    let pool = Arc::new(FramePool::with_capacity(args.pool_frames));
    let device = DynMapDevice::register(DeviceConfig::default(), pool.clone())
        .context("device registration failed")?;
    let space = AddressSpace::new();
    let file = device.open();
    let base = file
        .mmap(&space, DEVICE_SIZE, AccessMode::SHARED_RW)
        .context("mmap failed")?;

    let mut session = Session {
        space,
        file,
        base,
        accesses: Vec::new(),
        remaps: 0,
    };

    match args.workload {
        Workload::Sequential => {
            for page in 0..DEVICE_PAGES {
                session.read(0, page * PAGE_SIZE)?;
            }
        }
        Workload::Repeat => {
            for pass in 0..REPEAT_PASSES {
                for page in 0..DEVICE_PAGES {
                    session.read(pass, page * PAGE_SIZE)?;
                }
            }
        }
        Workload::Remap => {
            let half = DEVICE_PAGES / 2;
            for pass in 0..REMAP_PASSES {
                for page in 0..half {
                    session.read(pass, page * PAGE_SIZE)?;
                    session.remap(page * PAGE_SIZE, half * PAGE_SIZE)?;
                }
            }
        }
    }

    let range = session.file.stats().map(RangeReport::from);
    session
        .space
        .munmap(session.base, DEVICE_SIZE)
        .context("munmap failed")?;
    session.file.release();
    device.unregister();

    Ok(Report {
        workload: args.workload,
        accesses: session.accesses,
        remaps: session.remaps,
        range,
        pool: pool.stats().into(),
    })
}

fn print_text(report: &Report) {
    for access in &report.accesses {
        println!(
            "Ptr {:#x} = Offset {:#x}: value={}",
            access.addr, access.offset, access.value
        );
    }
    if let Some(range) = &report.range {
        println!(
            "faults: first={} refault={} remaps={}",
            range.first_faults, range.refaults, report.remaps
        );
    }
    println!(
        "frames: allocated={} released={} in_use={}",
        report.pool.allocations, report.pool.releases, report.pool.in_use
    );
}

fn print_help() {
    println!(
        "dynmap-harness usage:\n  dynmap-harness <sequential|repeat|remap> [--json] [--pool <frames>]"
    );
}

fn main() -> Result<()> {
    let Some(args) = HarnessArgs::parse(std::env::args().skip(1))? else {
        print_help();
        return Ok(());
    };

    let report = run(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(())
}
