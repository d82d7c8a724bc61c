//! spectok - spectral codebook audio codec command-line tool.
//!
//! `build` clusters a corpus into a per-band codebook, `encode` turns
//! audio into token sequences against an existing codebook, and `decode`
//! reconstructs a WAV file from tokens.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use tracing::info;

use spectok::audio::{self, RateFamily};
use spectok::cluster::{self, BuildConfig, ClusterParams};
use spectok::codebook;
use spectok::dataset;
use spectok::encoder::{self, Encoder};
use spectok::spectral::PhaseTransform;
use spectok::{decoder, logging};

#[derive(Parser, Debug)]
#[command(name = "spectok", version, about = "Spectral codebook audio codec")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for per-launch log files (stdout only when omitted)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a codebook from a corpus of WAV/FLAC files
    Build {
        /// Corpus directory, scanned recursively
        corpus: PathBuf,

        /// Output codebook JSON path
        #[arg(short, long)]
        output: PathBuf,

        /// Canonical sample rate of the corpus family (48000 or 44100)
        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,

        /// Quality knob; each step doubles cluster counts
        #[arg(long, default_value_t = 1)]
        quality: u32,

        /// Worker threads (defaults to the machine's cores minus one)
        #[arg(long)]
        workers: Option<usize>,

        /// Override the adaptive corpus chunk count
        #[arg(long)]
        chunks: Option<usize>,

        /// Override the adaptive per-chunk cluster count
        #[arg(long)]
        kmeanz: Option<usize>,

        /// Override the adaptive final codebook size per band
        #[arg(long)]
        masterkmeanz: Option<usize>,

        /// Decimal digits kept when persisting centroids
        #[arg(long, default_value_t = 5)]
        digits: u32,

        /// Discard frames below this key log-energy before clustering
        #[arg(long)]
        silence_threshold: Option<f64>,

        /// Also encode the corpus and write the file -> tokens map here
        #[arg(long)]
        tokens_out: Option<PathBuf>,
    },
    /// Encode a WAV/FLAC file or directory into token sequences
    Encode {
        /// Input audio file or directory
        input: PathBuf,

        /// Codebook JSON path
        #[arg(short, long)]
        codebook: PathBuf,

        /// Output JSON path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a token sequence back to a WAV file
    Decode {
        /// JSON file holding an array of tokens
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Inline token list ("[1, 2, 3]" or "1,2,3")
        #[arg(short = 'r', long)]
        raw: Option<String>,

        /// Codebook JSON path
        #[arg(short, long)]
        codebook: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    if let Err(err) = logging::init(cli.log_dir.as_deref(), filter) {
        eprintln!("warning: logging unavailable: {err}");
    }

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Build {
            corpus,
            output,
            sample_rate,
            quality,
            workers,
            chunks,
            kmeanz,
            masterkmeanz,
            digits,
            silence_threshold,
            tokens_out,
        } => {
            let family = RateFamily::detect(sample_rate)
                .ok_or_else(|| format!("unsupported sample rate {sample_rate} Hz"))?;
            let files = collect_audio_files(&corpus)?;
            if files.is_empty() {
                return Err(format!("no WAV/FLAC files under {}", corpus.display()).into());
            }

            let mut config = BuildConfig {
                quality,
                silence_threshold,
                ..BuildConfig::default()
            };
            if let Some(workers) = workers {
                config.workers = workers.max(1);
            }
            if chunks.is_some() || kmeanz.is_some() || masterkmeanz.is_some() {
                let adapted = cluster::adapt(files.len(), quality);
                config.params = Some(ClusterParams {
                    chunks: chunks.unwrap_or(adapted.chunks),
                    kmeanz: kmeanz.unwrap_or(adapted.kmeanz),
                    masterkmeanz: masterkmeanz.unwrap_or(adapted.masterkmeanz),
                });
            }

            let cancel = AtomicBool::new(false);
            let built = cluster::build_codebook(&files, family, &config, &cancel)?;
            codebook::save_codebook(&built, &output, digits)?;
            info!("codebook written to {}", output.display());

            if let Some(tokens_out) = tokens_out {
                let transform = PhaseTransform::for_family(family);
                let encoder = Encoder::new(&built);
                let map = encoder::encode_corpus(
                    &files,
                    &encoder,
                    family,
                    &transform,
                    config.workers,
                    &cancel,
                );
                encoder::save_token_map(&map, &tokens_out)?;
                info!(
                    "token sequences for {} files written to {}",
                    map.len(),
                    tokens_out.display()
                );
            }
            Ok(())
        }
        Command::Encode {
            input,
            codebook,
            output,
        } => {
            let book = codebook::load_codebook_auto(&codebook)?;
            let family = book.family();
            let transform = PhaseTransform::for_family(family);
            let encoder = Encoder::new(&book);
            let cancel = AtomicBool::new(false);

            if input.is_dir() {
                let files = collect_audio_files(&input)?;
                let map = encoder::encode_corpus(
                    &files,
                    &encoder,
                    family,
                    &transform,
                    dataset::default_worker_count(),
                    &cancel,
                );
                match output {
                    Some(path) => {
                        encoder::save_token_map(&map, &path)?;
                        info!("encoded {} files to {}", map.len(), path.display());
                    }
                    None => println!("{}", serde_json::to_string_pretty(&map)?),
                }
            } else {
                let tokens = encode_file(&input, family, &transform, &encoder)?;
                let json = serde_json::to_string(&tokens)?;
                match output {
                    Some(path) => {
                        fs::write(&path, json)?;
                        info!("encoded {} to {}", input.display(), path.display());
                    }
                    None => println!("{json}"),
                }
            }
            Ok(())
        }
        Command::Decode {
            input,
            raw,
            codebook,
            output,
        } => {
            let tokens = read_tokens(input.as_deref(), raw.as_deref())?;
            let book = codebook::load_codebook_auto(&codebook)?;
            let frames = decoder::decode_tokens(&book, &tokens)?;
            let transform = PhaseTransform::for_family(book.family());
            let samples = transform.from_spectral(&frames)?;
            audio::write_wav(&output, &samples, book.sample_rate())?;
            info!(
                "decoded {} tokens ({} frames) to {}",
                tokens.len(),
                frames.len(),
                output.display()
            );
            Ok(())
        }
    }
}

fn encode_file(
    path: &Path,
    family: RateFamily,
    transform: &PhaseTransform,
    encoder: &Encoder,
) -> Result<Vec<u32>, Box<dyn std::error::Error>> {
    let decoded = audio::load_audio(path)?;
    let normalized = audio::normalize_rate(&decoded.samples, decoded.sample_rate)?;
    if normalized.family != family {
        return Err(format!(
            "{} normalizes to {} Hz but the codebook was built for {} Hz",
            path.display(),
            normalized.family.canonical_rate(),
            family.canonical_rate()
        )
        .into());
    }
    let frames = transform.to_spectral(&normalized.samples);
    Ok(encoder.encode_frames(&frames)?)
}

/// Recursively collect WAV/FLAC paths under a root, sorted for
/// reproducible chunk assignment.
fn collect_audio_files(root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_audio_file(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("flac"))
}

fn read_tokens(input: Option<&Path>, raw: Option<&str>) -> Result<Vec<u32>, Box<dyn std::error::Error>> {
    if let Some(path) = input {
        let data = fs::read(path)?;
        return Ok(serde_json::from_slice(&data)?);
    }
    let Some(raw) = raw else {
        return Err("either --input or --raw is required".into());
    };
    let mut tokens = Vec::new();
    for piece in raw
        .trim_matches(|c: char| c == '[' || c == ']' || c.is_whitespace())
        .split(|c: char| c == ',' || c.is_whitespace())
    {
        if piece.is_empty() {
            continue;
        }
        tokens.push(piece.parse::<u32>()?);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_token_lists_parse_with_mixed_separators() {
        assert_eq!(read_tokens(None, Some("[1, 2, 3]")).unwrap(), vec![1, 2, 3]);
        assert_eq!(read_tokens(None, Some("4,5 6")).unwrap(), vec![4, 5, 6]);
        assert_eq!(read_tokens(None, Some("")).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn missing_token_source_is_an_error() {
        assert!(read_tokens(None, None).is_err());
    }

    #[test]
    fn audio_extension_filter_is_case_insensitive() {
        assert!(is_audio_file(Path::new("a.WAV")));
        assert!(is_audio_file(Path::new("b.flac")));
        assert!(!is_audio_file(Path::new("c.mp3")));
        assert!(!is_audio_file(Path::new("noext")));
    }
}
