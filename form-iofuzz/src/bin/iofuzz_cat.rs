//! Corrupting `cat` for Formation Network I/O fuzzing
//!
//! Reads each input through a [`Tracker`] the way an interception layer
//! would: every read is registered against the resource's logical position
//! and corrupted before it reaches the output.

use clap::Parser;
use form_iofuzz::config::parse_ratio_range;
use form_iofuzz::{FuzzOptions, FuzzingMode, LockTarget, RawHandle, Result, Tracker};
use log::{error, info};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

/// First handle handed out, leaving room for the standard streams
const FIRST_HANDLE: RawHandle = 3;

#[derive(Parser, Debug)]
#[command(name = "iofuzz-cat", about = "Print files with reproducible byte corruption")]
struct Cli {
    /// Files to read; `-` or no file reads standard input
    files: Vec<PathBuf>,

    /// JSON option file; flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(short, long)]
    seed: Option<u32>,

    /// Bit corruption ratio, or a `min:max` range
    #[arg(short, long)]
    ratio: Option<String>,

    /// How mask bits are applied
    #[arg(short, long, value_enum)]
    mode: Option<FuzzingMode>,

    /// Give each input its own seed (seed, seed + 1, ...)
    #[arg(short = 'A', long)]
    autoinc: bool,

    /// Only corrupt these byte offsets, e.g. `0-511,4096-`
    #[arg(short, long)]
    bytes: Option<String>,

    /// Byte values that are never modified, e.g. `\n\x00-\x1f`
    #[arg(short = 'P', long)]
    protect: Option<String>,

    /// Byte values that are never produced
    #[arg(short = 'R', long)]
    refuse: Option<String>,

    /// Only corrupt the inputs with these 1-based ordinals
    #[arg(short, long)]
    list: Option<String>,

    /// Size of each simulated read
    #[arg(long, default_value_t = 4096)]
    read_size: usize,

    /// Bytes of the previous read to present again with each read
    #[arg(long, default_value_t = 0)]
    overlap: usize,
}

impl Cli {
    fn options(&self) -> Result<FuzzOptions> {
        let mut options = match &self.config {
            Some(path) => FuzzOptions::from_json(&fs::read_to_string(path)?)?,
            None => FuzzOptions::from_env()?,
        };

        if let Some(seed) = self.seed {
            options.seed = seed;
        }
        if let Some(ratio) = &self.ratio {
            (options.min_ratio, options.max_ratio) = parse_ratio_range(ratio)?;
        }
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if self.autoinc {
            options.auto_increment = true;
        }
        for (flag, value) in [
            (&self.bytes, &mut options.bytes),
            (&self.protect, &mut options.protect),
            (&self.refuse, &mut options.refuse),
            (&self.list, &mut options.list),
        ] {
            if flag.is_some() {
                value.clone_from(flag);
            }
        }

        Ok(options)
    }
}

/// Totals for one input
#[derive(Debug, Default)]
struct Summary {
    bytes: usize,
    corrupted: usize,
}

fn open(path: &Path) -> Result<Box<dyn Read>> {
    if path == Path::new("-") {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(File::open(path)?))
    }
}

fn cat(
    tracker: &mut Tracker,
    handle: RawHandle,
    input: &mut dyn Read,
    output: &mut dyn Write,
    read_size: usize,
    overlap: usize,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut previous: Vec<u8> = Vec::new();
    let mut fresh = vec![0u8; read_size.max(1)];

    loop {
        let n = input.read(&mut fresh)?;
        if n == 0 {
            break;
        }

        // Hand out the tail of the last read again, like a refilled stdio buffer
        let keep = overlap.min(previous.len());
        let mut window = previous.split_off(previous.len() - keep);
        window.extend_from_slice(&fresh[..n]);
        tracker.add_position(handle, -(keep as i64));

        if tracker.is_locked(handle) == 0 && tracker.is_locked(LockTarget::Global) == 0 {
            tracker.apply(handle, &mut window);
        }
        tracker.add_position(handle, window.len() as i64);

        summary.bytes += n;
        summary.corrupted += window[keep..]
            .iter()
            .zip(&fresh[..n])
            .filter(|(fuzzed, original)| fuzzed != original)
            .count();

        output.write_all(&window[keep..])?;
        previous = window;
    }

    Ok(summary)
}

fn run(cli: Cli) -> Result<()> {
    let mut tracker = Tracker::new(cli.options()?.build());

    let files = if cli.files.is_empty() {
        vec![PathBuf::from("-")]
    } else {
        cli.files.clone()
    };

    let stdout = io::stdout();
    let mut output = stdout.lock();

    for (handle, path) in (FIRST_HANDLE..).zip(&files) {
        let mut input = open(path)?;
        tracker.register(handle);

        let result = cat(&mut tracker, handle, &mut input, &mut output, cli.read_size, cli.overlap);
        tracker.unregister(handle);

        let summary = result?;
        info!(
            "{}: {} bytes read, {} bytes corrupted",
            path.display(),
            summary.bytes,
            summary.corrupted
        );
    }

    output.flush()?;
    Ok(())
}

fn main() {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("iofuzz-cat failed: {}", err);
        eprintln!("iofuzz-cat: {}", err);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_iofuzz::Config;

    fn corrupt(read_size: usize, overlap: usize, input: &[u8]) -> Vec<u8> {
        let mut tracker = Tracker::new(Config::configure(
            42,
            0.01,
            0.01,
            FuzzingMode::Xor,
            false,
            None,
            None,
            None,
            None,
        ));
        tracker.register(FIRST_HANDLE);

        let mut output = Vec::new();
        let mut reader = input;
        cat(&mut tracker, FIRST_HANDLE, &mut reader, &mut output, read_size, overlap).unwrap();
        output
    }

    #[test]
    fn test_output_independent_of_read_pattern() {
        let input: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let reference = corrupt(input.len(), 0, &input);
        assert_eq!(reference.len(), input.len());
        assert_ne!(reference, input);

        for (read_size, overlap) in [(1, 0), (7, 3), (1000, 999), (4096, 100)] {
            assert_eq!(corrupt(read_size, overlap, &input), reference, "read {read_size} overlap {overlap}");
        }
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "iofuzz-cat",
            "--config",
            "/nonexistent/options.json",
            "-s",
            "3",
        ]);
        assert!(cli.options().is_err());

        let cli = Cli::parse_from(["iofuzz-cat", "-s", "3", "-r", "0.01:0.02", "-m", "unset", "-P", "a-z"]);
        assert_eq!(cli.seed, Some(3));
        assert_eq!(cli.mode, Some(FuzzingMode::Unset));
        assert_eq!(cli.protect.as_deref(), Some("a-z"));
    }
}
