mod cli;

use moeplex::{config, dict, extract, probe, recompress};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use moeplex_container::FormatDuration;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "moeplex=trace,moeplex_container=trace".to_string()
        } else {
            "moeplex=info,moeplex_container=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe {
            file,
            seektables,
            packets,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let options = probe::ProbeOptions {
                seek_tables: seektables,
                packets,
            };
            probe_file(&file, options, json, &config)
        }
        Commands::Extract {
            file,
            track,
            out,
            from,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let summary = extract::extract_file(&file, track, from, &out, &config.demux)?;
            match summary.start {
                Some(start) => println!(
                    "Extracted {} packets ({} bytes) of track {} from {} to {}",
                    summary.packets,
                    summary.bytes,
                    track,
                    FormatDuration::from_micros(start),
                    out.display()
                ),
                None => println!("No packets of track {} to extract", track),
            }
            Ok(())
        }
        Commands::Recompress {
            input,
            output,
            mode,
            track,
            dict,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let dictionary = dict
                .map(|path| {
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read dictionary {:?}", path))
                })
                .transpose()?;
            let options = recompress::RecompressOptions {
                mode,
                tracks: track,
                dictionary,
            };
            let summary =
                recompress::recompress_file(&input, &output, &options, config.mux, &config.demux)?;
            println!(
                "Wrote {} packets to {} ({} bytes, packet region {} bytes)",
                summary.packets,
                output.display(),
                summary.total_len,
                summary.packet_region_len
            );
            Ok(())
        }
        Commands::TrainDict {
            file,
            track,
            out,
            size,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let dictionary = dict::train_from_file(&file, track, size, &config.demux)?;
            std::fs::write(&out, &dictionary)
                .with_context(|| format!("Failed to write dictionary {:?}", out))?;
            println!(
                "Wrote {} byte dictionary for track {} to {}",
                dictionary.len(),
                track,
                out.display()
            );
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn probe_file(
    file: &Path,
    options: probe::ProbeOptions,
    json: bool,
    config: &config::Config,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = probe::probe_container(file, options, &config.demux)?;
    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
    } else {
        print!("{}", probe::render(&report));
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Interleave: {}", config.mux.interleave);
    println!("  Queue capacity: {}", config.mux.queue_capacity);
    println!("  Seek interval: {} us", config.mux.seek_interval_us);
    println!("  zstd level: {}", config.mux.compression_level);
    println!(
        "  On decompression error: {:?}",
        config.demux.on_decompression_error
    );
    Ok(())
}
