// Command-line front end for vcdelta.
//
// Two subcommands stream their input through the library drivers:
//   vcdelta encode --dictionary DICT [INPUT] [OUTPUT]
//   vcdelta decode --dictionary DICT [INPUT] [OUTPUT]
// Input defaults to stdin and output to stdout.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::engine::HashedDictionary;
use crate::vcdiff::decoder::{DEFAULT_MAX_TARGET_SIZE, DecoderOptions, StreamingDecoder};
use crate::vcdiff::encoder::{DEFAULT_MAX_WINDOW_SIZE, EncoderOptions, StreamingEncoder};
use crate::vcdiff::header::FormatFlags;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1usize << 10),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1 << 20),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    let num: usize = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// VCDIFF (RFC 3284) delta encoder/decoder.
#[derive(Parser, Debug)]
#[command(
    name = "vcdelta",
    version,
    about = "VCDIFF delta encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode a target against a dictionary.
    Encode(EncodeArgs),
    /// Rebuild a target from a dictionary and a delta.
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Dictionary file (default: empty dictionary).
    #[arg(long, short = 'd', value_hint = ValueHint::FilePath)]
    dictionary: Option<PathBuf>,

    /// Input file (default: stdin).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "input_pos")]
    input: Option<PathBuf>,

    /// Output file (default: stdout).
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Read buffer size; each encoded buffer becomes a window (K/M/G suffix).
    #[arg(long = "buffer-size", value_parser = parse_byte_size, default_value_t = BUF_SIZE)]
    buffer_size: usize,

    /// Input file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    input_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Use the interleaved layout (requires the extended format).
    #[arg(long)]
    interleaved: bool,

    /// Add an Adler-32 checksum to every window.
    #[arg(long)]
    checksum: bool,

    /// Only copy from the dictionary, never from earlier target data.
    #[arg(long = "no-target-matching")]
    no_target_matching: bool,

    /// Largest target window (K/M/G suffix).
    #[arg(long = "window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_WINDOW_SIZE)]
    window_size: usize,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Largest total target size accepted (K/M/G suffix).
    #[arg(long = "max-target-file-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_SIZE)]
    max_target_file_size: usize,

    /// Largest target window accepted (K/M/G suffix).
    #[arg(long = "max-target-window-size", value_parser = parse_byte_size, default_value_t = DEFAULT_MAX_TARGET_SIZE)]
    max_target_window_size: usize,

    /// Reject windows that copy from earlier target data.
    #[arg(long = "no-vcd-target")]
    no_vcd_target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
}

struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    buffer_size: usize,
    dictionary_file: Option<PathBuf>,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    encoder: EncoderOptions,
    decoder: DecoderOptions,
}

fn resolve_options(cli: Cli) -> Options {
    let quiet = cli.quiet;
    let verbose = cli.verbose.min(2);
    let force = cli.force;

    let (command, io, encoder, decoder) = match cli.command {
        Cmd::Encode(args) => {
            let mut format = FormatFlags::empty();
            format.set(FormatFlags::INTERLEAVED, args.interleaved);
            format.set(FormatFlags::CHECKSUM, args.checksum);
            let encoder = EncoderOptions {
                format,
                target_matching: !args.no_target_matching,
                max_window_size: args.window_size,
            };
            (Command::Encode, args.io, encoder, DecoderOptions::default())
        }
        Cmd::Decode(args) => {
            let decoder = DecoderOptions {
                max_target_file_size: args.max_target_file_size,
                max_target_window_size: args.max_target_window_size,
                allow_vcd_target: !args.no_vcd_target,
                ..Default::default()
            };
            (Command::Decode, args.io, EncoderOptions::default(), decoder)
        }
    };

    Options {
        command,
        use_stdout: io.stdout,
        force,
        quiet,
        verbose,
        buffer_size: io.buffer_size.max(1),
        dictionary_file: io.dictionary,
        input_file: io.input.or(io.input_pos),
        output_file: io.output.or(io.output_pos),
        encoder,
        decoder,
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("vcdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// I/O helpers
// ---------------------------------------------------------------------------

fn read_dictionary(opts: &Options) -> Result<Vec<u8>, String> {
    match &opts.dictionary_file {
        Some(path) => std::fs::read(path)
            .map_err(|e| format!("dictionary file: {}: {e}", path.display())),
        None => Ok(Vec::new()),
    }
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>, String> {
    match path {
        Some(path) => File::open(path)
            .map(|f| Box::new(BufReader::with_capacity(BUF_SIZE, f)) as Box<dyn Read>)
            .map_err(|e| format!("input file: {}: {e}", path.display())),
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn open_output(opts: &Options) -> Result<Box<dyn Write>, String> {
    match (opts.use_stdout, &opts.output_file) {
        (true, _) | (_, None) => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
        (false, Some(path)) => {
            if path.exists() && !opts.force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("output file: {}: {e}", path.display()))
        }
    }
}

/// Fill `buf` as far as the reader allows; returns the bytes read, 0 at EOF.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn cmd_encode(opts: &Options) -> Result<(), String> {
    let dictionary = read_dictionary(opts)?;
    let hashed = HashedDictionary::new(&dictionary).map_err(|e| format!("dictionary: {e}"))?;
    let mut reader = open_input(opts.input_file.as_deref())?;
    let mut writer = open_output(opts)?;

    let mut encoder = StreamingEncoder::new(&hashed, opts.encoder.clone())
        .map_err(|e| format!("encoder: {e}"))?;
    let mut buf = vec![0u8; opts.buffer_size];
    let mut delta = Vec::with_capacity(opts.buffer_size);

    encoder
        .start(&mut delta)
        .map_err(|e| format!("encode error: {e}"))?;
    loop {
        let n = read_full(&mut *reader, &mut buf).map_err(|e| format!("read error: {e}"))?;
        if n == 0 {
            break;
        }
        encoder
            .feed(&buf[..n], &mut delta)
            .map_err(|e| format!("encode error: {e}"))?;
        writer
            .write_all(&delta)
            .map_err(|e| format!("write error: {e}"))?;
        delta.clear();
    }
    encoder
        .finish(&mut delta)
        .map_err(|e| format!("encode error: {e}"))?;
    writer
        .write_all(&delta)
        .and_then(|()| writer.flush())
        .map_err(|e| format!("write flush error: {e}"))?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "vcdelta: encoder: dictionary size: {}, input size: {}, windows: {}",
            dictionary.len(),
            encoder.bytes_encoded(),
            encoder.windows_encoded()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> Result<(), String> {
    let dictionary = read_dictionary(opts)?;
    let mut reader = open_input(opts.input_file.as_deref())?;
    let mut writer = open_output(opts)?;

    let mut decoder = StreamingDecoder::new(opts.decoder.clone());
    decoder.start(&dictionary);
    let mut buf = vec![0u8; opts.buffer_size];
    let mut target = Vec::with_capacity(opts.buffer_size);

    loop {
        let n = read_full(&mut *reader, &mut buf).map_err(|e| format!("read error: {e}"))?;
        if n == 0 {
            break;
        }
        decoder
            .feed(&buf[..n], &mut target)
            .map_err(|e| format!("decode error: {e}"))?;
        writer
            .write_all(&target)
            .map_err(|e| format!("write error: {e}"))?;
        target.clear();
    }
    decoder
        .finish()
        .map_err(|e| format!("decode error: {e}"))?;
    writer
        .flush()
        .map_err(|e| format!("write flush error: {e}"))?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "vcdelta: decoder: output size: {}, windows: {}",
            decoder.bytes_decoded(),
            decoder.windows_decoded()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    // Warn if -c overrides output filename.
    if opts.use_stdout && !opts.quiet {
        if let Some(path) = opts.output_file.take() {
            eprintln!(
                "vcdelta: warning: -c option overrides output filename: {}",
                path.display()
            );
        }
    }

    let result = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Decode => cmd_decode(&opts),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(msg) => {
            eprintln!("vcdelta: {msg}");
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
