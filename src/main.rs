//! Memory Bandwidth Benchmark CLI
//!
//! Measures sustained read/write/copy bandwidth over a pair of large aligned
//! buffers, once per instruction-set tier the CPU supports.
//!
//! # Output Format
//!
//! A header with the CPU model, optional RAM module listing, and the task
//! size, followed by one table row per tier with Write/Read/Copy throughput
//! in GiB/s ("N/A" for tiers the host cannot run).
//!
//! # Exit Codes
//!
//! - `0`: Success
//! - `1`: Fatal runtime error (allocation failure, checksum mismatch)
//! - `2`: Invalid arguments

use std::process::ExitCode;

use membench_rs::{
    cpu_model, meminfo, pin_current_thread, report, run_session, Engine, HostProbe, TrialConfig,
};

// ============================================================================
// Argument Parsing
// ============================================================================

#[derive(Debug)]
struct Args {
    size_mb: usize,
    iters: usize,
    warmup: bool,
    pin_core: Option<usize>,
    meminfo: bool,
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            size_mb: 1000,
            iters: 30,
            warmup: true,
            pin_core: None,
            meminfo: true,
            help: false,
        }
    }
}

/// Exit with error message.
fn die(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    eprintln!("Run with --help for usage");
    std::process::exit(2);
}

/// Get next argument value or die.
fn next_value(it: &mut impl Iterator<Item = String>, flag: &str) -> String {
    it.next()
        .unwrap_or_else(|| die(&format!("{} requires a value", flag)))
}

/// Parse a numeric argument or die.
fn parse_num<T: std::str::FromStr>(val: &str, flag: &str) -> T {
    val.parse()
        .unwrap_or_else(|_| die(&format!("Invalid {}: '{}'", flag, val)))
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--help" | "-h" => args.help = true,
            "--no-warmup" => args.warmup = false,
            "--no-meminfo" => args.meminfo = false,

            "--size-mb" | "-s" => {
                let val = next_value(&mut it, "--size-mb");
                let n: usize = parse_num(&val, "--size-mb");
                if n == 0 {
                    die("--size-mb must be >= 1");
                }
                args.size_mb = n;
            }

            "--iters" | "-i" => {
                let val = next_value(&mut it, "--iters");
                let n: usize = parse_num(&val, "--iters");
                if n == 0 {
                    die("--iters must be >= 1");
                }
                args.iters = n;
            }

            "--pin-core" => {
                let val = next_value(&mut it, "--pin-core");
                args.pin_core = Some(parse_num(&val, "--pin-core"));
            }

            other => die(&format!("Unknown argument: '{}'", other)),
        }
    }

    args
}

fn print_help() {
    println!(
        r#"membench-rs - sustained main-memory bandwidth benchmark

USAGE:
    membench-rs [OPTIONS]

OPTIONS:
    -s, --size-mb <N>     Size of each working buffer in MiB [default: 1000]
    -i, --iters <N>       Measured repetitions per cell, best kept [default: 30]
        --no-warmup       Skip the discarded warm-up pass before each cell
        --pin-core <N>    Pin the benchmark thread to CPU core N
        --no-meminfo      Skip the installed-RAM listing
    -h, --help            Show this help

The benchmark runs Write, Read, and Copy kernels at each instruction-set
tier the CPU supports (AVX2, AVX, SSE2) and reports best-of-N throughput
in GiB/s. Unsupported tiers show as N/A."#
    );
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = parse_args();
    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    // Pinning failure is a measurement-quality issue, not a fatal one.
    if let Some(core) = args.pin_core {
        if let Err(err) = pin_current_thread(core) {
            eprintln!("warning: could not pin to core {}: {}", core, err);
        }
    }

    println!("Running on {}", cpu_model());

    if args.meminfo {
        match meminfo::query_memory_modules() {
            Ok(modules) if !modules.is_empty() => {
                println!("{}", report::format_ram_modules(&modules));
            }
            _ => println!("RAM module information not available"),
        }
    }

    let mut engine = match Engine::new(args.size_mb) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("Task size: {} MiB (x2)", engine.task_size_mib());

    let config = TrialConfig {
        iters: args.iters,
        warmup: args.warmup,
    };

    match run_session(&mut engine, &HostProbe, &config) {
        Ok(session) => {
            println!("{}", session);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
