use std::env;

use anyhow::{Context, Result};
use zipfill_rs::{DataSource, ZipLookup, format_location, normalize_zip};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <zip_codes> [source]", args[0]);
        eprintln!("  zip_codes: comma-separated (e.g., 90210,10001,12345)");
        eprintln!("  source: bundled, https://host/zips.json or a file path (default: bundled)");
        std::process::exit(1);
    }

    // Parse comma-separated codes
    let codes: Vec<String> = args[1]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if codes.is_empty() {
        eprintln!("Error: No ZIP codes provided");
        std::process::exit(1);
    }

    // Parse optional data source
    let source = match args.get(2) {
        Some(raw) => DataSource::parse(raw).unwrap_or_else(|| {
            eprintln!("Warning: Failed to parse source '{}', using bundled data", raw);
            DataSource::Bundled
        }),
        None => DataSource::Bundled,
    };

    let service = ZipLookup::new();
    service
        .load(&source)
        .await
        .context("Failed to load ZIP data")?;

    println!("Looking up {} ZIP code(s)...", codes.len());

    for code in &codes {
        match service.lookup(code) {
            Some(result) => {
                println!("\n{}: {}", result.zip, format_location(&result));
                if result.has_multiple {
                    println!("  ({} locations share this code)", result.locations.len());
                }
            }
            None => match normalize_zip(code) {
                Some(zip) => println!("\n{}: NOT_FOUND", zip),
                None => println!("\n{}: INVALID", code),
            },
        }
    }

    Ok(())
}
