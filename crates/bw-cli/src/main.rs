//! Blockwise CLI
//!
//! CLI tool for compiling filter lists and inspecting compiled indexes.

use std::fs;
use std::io::{BufReader, Write};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;

use bw_compiler::{compile_reader, CompileConfig, ConverterResult};
use bw_core::snapshot::{IndexId, Snapshot};
use bw_core::types::{ContentType, InstallationState};
use bw_core::{CompiledIndex, InstalledSubscription, SubscriptionCollection};

#[derive(Parser)]
#[command(name = "bw-cli")]
#[command(about = "Blockwise filter list compiler and tools")]
struct Cli {
    /// Log debug output (dropped filters, regex fallbacks)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a filter list into an FLX index
    Compile {
        /// Input filter list file
        #[arg(short, long)]
        input: String,

        /// Output index file
        #[arg(short, long, default_value = "index.flx")]
        output: String,

        /// Source URL recorded in the index
        #[arg(long, default_value = "")]
        source_url: String,

        /// Allow snippets, header filters and element modifiers
        #[arg(long)]
        privileged: bool,

        /// Accept lists without an [Adblock Plus] header
        #[arg(long)]
        no_header: bool,
    },

    /// Dump index metadata and sub-index sizes
    Info {
        /// Index file to inspect
        #[arg(short, long)]
        input: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Classify one request against an index
    Check {
        /// Index file to query
        #[arg(short, long)]
        input: String,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Document domain; defaults to the request host
        #[arg(short, long)]
        domain: Option<String>,

        /// Content type option name, e.g. script or image
        #[arg(short = 't', long = "type", default_value = "other")]
        content_type: String,

        /// Sitekey of the document
        #[arg(long, default_value = "")]
        sitekey: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            source_url,
            privileged,
            no_header,
        } => {
            let config = CompileConfig {
                source_url,
                allow_privileged: privileged,
                require_header: !no_header,
            };
            cmd_compile(&input, &output, &config)
        }
        Commands::Info { input, json } => cmd_info(&input, json),
        Commands::Check {
            input,
            url,
            domain,
            content_type,
            sitekey,
        } => cmd_check(&input, &url, domain.as_deref(), &content_type, &sitekey),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn read_index(input: &str) -> Result<Vec<u8>, String> {
    let bytes = fs::read(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    Snapshot::load(&bytes).map_err(|e| format!("Invalid index: {}", e))?;
    Ok(bytes)
}

fn cmd_compile(input: &str, output: &str, config: &CompileConfig) -> Result<(), String> {
    let start = Instant::now();
    let file = fs::File::open(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;

    let bytes = match compile_reader(BufReader::new(file), config) {
        ConverterResult::Index(bytes) => bytes,
        ConverterResult::Redirect(url) => {
            println!("'{}' redirects to {}; nothing written", input, url);
            return Ok(());
        }
        ConverterResult::Error(message) => return Err(message),
    };

    let snapshot = Snapshot::load(&bytes).map_err(|e| format!("Generated index failed validation: {}", e))?;

    let mut file = fs::File::create(output).map_err(|e| format!("Failed to create '{}': {}", output, e))?;
    file.write_all(&bytes)
        .map_err(|e| format!("Failed to write '{}': {}", output, e))?;

    println!("Compiled '{}' to '{}'", input, output);
    println!("  URL filters:     {}", snapshot.url_filter_count());
    println!("  Content filters: {}", snapshot.content_filter_count());
    println!("  Snippets:        {}", snapshot.snippet_filter_count());
    println!("  Size:            {} bytes ({:.1} KB)", bytes.len(), bytes.len() as f64 / 1024.0);
    println!("  Time:            {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

#[derive(Serialize)]
struct IndexInfo<'a> {
    source_url: &'a str,
    title: &'a str,
    version: &'a str,
    homepage: &'a str,
    expires_secs: u64,
    build_id: u32,
    size: usize,
    url_filters: usize,
    content_filters: usize,
    snippet_filters: usize,
    indexes: Vec<SubIndexInfo>,
}

#[derive(Serialize)]
struct SubIndexInfo {
    name: &'static str,
    keys: usize,
}

fn cmd_info(input: &str, json: bool) -> Result<(), String> {
    let bytes = read_index(input)?;
    let snapshot = Snapshot::load(&bytes).map_err(|e| format!("Invalid index: {}", e))?;
    let metadata = snapshot.metadata();

    let info = IndexInfo {
        source_url: metadata.source_url,
        title: metadata.title,
        version: metadata.version,
        homepage: metadata.homepage,
        expires_secs: metadata.expires.as_secs(),
        build_id: snapshot.build_id(),
        size: bytes.len(),
        url_filters: snapshot.url_filter_count(),
        content_filters: snapshot.content_filter_count(),
        snippet_filters: snapshot.snippet_filter_count(),
        indexes: IndexId::ALL
            .iter()
            .map(|&id| SubIndexInfo {
                name: id.name(),
                keys: snapshot.index(id).key_count(),
            })
            .collect(),
    };

    if json {
        let text = serde_json::to_string_pretty(&info).map_err(|e| format!("Failed to encode JSON: {}", e))?;
        println!("{text}");
        return Ok(());
    }

    println!("Index: {}", input);
    println!("  Source:      {}", info.source_url);
    println!("  Title:       {}", info.title);
    println!("  Version:     {}", info.version);
    println!("  Homepage:    {}", info.homepage);
    println!("  Expires:     {}s", info.expires_secs);
    println!("  Build id:    {:#010x}", info.build_id);
    println!("  Total size:  {} bytes ({:.1} KB)", info.size, info.size as f64 / 1024.0);
    println!();
    println!("Filters:");
    println!("  URL:         {}", info.url_filters);
    println!("  Content:     {}", info.content_filters);
    println!("  Snippet:     {}", info.snippet_filters);
    println!();
    println!("Sub-indexes:");
    for index in info.indexes.iter().filter(|index| index.keys > 0) {
        println!("  {:<24} {} keys", index.name, index.keys);
    }

    Ok(())
}

fn cmd_check(input: &str, url: &str, domain: Option<&str>, content_type: &str, sitekey: &str) -> Result<(), String> {
    let content_type =
        ContentType::from_option(content_type).ok_or_else(|| format!("Unknown content type '{}'", content_type))?;
    let index = CompiledIndex::from_bytes(read_index(input)?).map_err(|e| format!("Invalid index: {}", e))?;
    let subscription = InstalledSubscription::new(Arc::new(index), InstallationState::Installed, SystemTime::now());
    let collection = SubscriptionCollection::new(vec![Arc::new(subscription)], "cli");

    let document = domain.map(|domain| format!("https://{domain}/"));
    let hierarchy: Vec<&str> = document.iter().map(String::as_str).collect();
    let result = collection.classify_request(url, &hierarchy, content_type, sitekey);

    let text = serde_json::to_string_pretty(&result).map_err(|e| format!("Failed to encode JSON: {}", e))?;
    println!("{text}");
    Ok(())
}
