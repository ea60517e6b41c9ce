mod cli;

use mediaforge::{config, server};
use mediaforge_av::{ArgBuilder, ChannelRole};
use mediaforge_common::{StreamDescriptor, Strategy};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, StrategyArg};
use std::io::Read;
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Mediaforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    if config.server.api_key.is_none() {
        tracing::warn!("No API key configured; anyone can register streams");
    }

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediaforge=trace,mediaforge_av=trace,tower_http=debug".to_string()
        } else {
            "mediaforge=info,mediaforge_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Args {
            descriptor,
            strategy,
            json,
        } => print_args(&descriptor, strategy, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediaforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn read_descriptor(path: &Path) -> Result<StreamDescriptor> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read descriptor from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read descriptor: {:?}", path))?
    };

    let descriptor: StreamDescriptor =
        serde_json::from_str(&content).context("Failed to parse stream descriptor")?;
    descriptor.validate()?;
    Ok(descriptor)
}

fn print_args(
    path: &Path,
    strategy: Option<StrategyArg>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let descriptor = read_descriptor(path)?;

    let strategy = strategy
        .map(Strategy::from)
        .unwrap_or_else(|| descriptor.strategy());
    if strategy == Strategy::Passthrough {
        anyhow::bail!("Descriptor selects passthrough, which runs no transcoder");
    }

    let quirks = config.quirk_table();
    let presets = config.format_presets();
    let builder = ArgBuilder::new(&quirks, &presets, &config.stream.user_agent);
    let Some(invocation) = builder.for_strategy(&descriptor, strategy) else {
        anyhow::bail!(
            "Descriptor has {} url(s), which does not fit the {} strategy",
            descriptor.urls.len(),
            strategy
        );
    };

    if json {
        let channels: Vec<&str> = invocation
            .channels
            .iter()
            .map(|role| match role {
                ChannelRole::ExtraInput => "input",
                ChannelRole::ExtraOutput => "output",
            })
            .collect();
        let value = serde_json::json!({
            "strategy": strategy.to_string(),
            "format": invocation.format,
            "filename": invocation.filename,
            "channels": channels,
            "args": invocation.args,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Strategy: {}", strategy);
        println!("Format: {}", invocation.format);
        println!("Filename: {}", invocation.filename);
        let quoted: Vec<String> = invocation.args.iter().map(|a| shell_quote(a)).collect();
        println!("ffmpeg {}", quoted.join(" "));
    }

    Ok(())
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.:/=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = mediaforge_av::check_tools(config.tools.ffmpeg_path.as_deref());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Passthrough streams work without them; transcoding needs ffmpeg.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  API key set: {}", config.server.api_key.is_some());
            println!("  Stream lifespan: {}s", config.stream.lifespan_secs);
            println!("  Kill grace: {}s", config.stream.kill_grace_secs);
            println!(
                "  Quirk overrides: {} service(s), {} container(s)",
                config.quirks.services.len(),
                config.quirks.containers.len()
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
