mod cli;

use iptvcheck::catalog::{self, XtreamClient};
use iptvcheck::config::{self, Config};
use iptvcheck::report::{self, Check, StreamChecks};
use iptvcheck::runner::{CheckOptions, Engine, Runner};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ScanArgs, StreamCheckArgs};
use iptv_core::StreamTarget;
use iptv_probe::ToolRegistry;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "iptvcheck=trace,iptv_probe=trace,iptv_core=debug".to_string()
        } else {
            "iptvcheck=info,iptv_probe=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(scan(args, cli.config.as_deref()))
        }
        Commands::Probe { url, checks, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_url(&url, &checks, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("iptvcheck {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Cancel `token` on Ctrl+C so running probes are stopped and reaped.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping running checks");
            token.cancel();
        }
    });
}

fn apply_check_overrides(config: &mut Config, checks: &StreamCheckArgs) -> Result<()> {
    config::apply_check_overrides(config, checks.duration, checks.timeout);
    for warning in config::validate_config(config)? {
        tracing::warn!("{}", warning);
    }
    Ok(())
}

async fn scan(args: ScanArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // CLI flags override the file
    if args.server.is_some() {
        config.catalog.server = args.server.clone();
    }
    if args.user.is_some() {
        config.catalog.username = args.user.clone();
    }
    if args.pw.is_some() {
        config.catalog.password = args.pw.clone();
    }
    if let Some(cachefile) = &args.cachefile {
        config.catalog.cache_file = cachefile.clone();
    }
    if args.nocache {
        config.catalog.use_cache = false;
    }
    if let Some(jobs) = args.jobs {
        config.check.jobs = jobs;
    }
    apply_check_overrides(&mut config, &args.checks)?;

    let client = Arc::new(XtreamClient::from_config(&config.catalog)?);
    let cache = (!args.nocache).then_some(config.catalog.cache_file.as_path());
    let mut channels = catalog::load_channels(&client, cache, config.catalog.use_cache).await?;

    if let Some(category) = &args.category {
        channels = catalog::filter_by_category(channels, category);
    }
    if let Some(search) = &args.search {
        channels = catalog::filter_by_name(channels, search);
    }
    if channels.is_empty() {
        println!("No channels matched.");
        return Ok(());
    }

    let options = CheckOptions {
        info: args.checks.info,
        connection: args.checks.conn,
        quality: args.checks.quality,
        epg: args.epg,
    };
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let engine = Arc::new(Engine::from_config(&config));
    let runner = Runner::new(engine, client, options)
        .jobs(config.check.jobs)
        .epg_limit(config.catalog.epg_limit)
        .with_cancellation(cancel);
    let reports = runner.run(channels).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print!("{}", report::render_table(&reports, options.columns()));
        println!("\n{} channels", reports.len());
    }

    if let Some(path) = &args.save {
        report::save_csv(path, &reports, options.columns())?;
        tracing::info!("Saved results to {:?}", path);
    }

    Ok(())
}

async fn probe_url(
    url: &str,
    checks: &StreamCheckArgs,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    apply_check_overrides(&mut config, checks)?;

    let mut options = CheckOptions {
        info: checks.info,
        connection: checks.conn,
        quality: checks.quality,
        epg: false,
    };
    if !options.info && !options.connection && !options.quality {
        options.connection = true;
        options.quality = true;
    }

    let target = StreamTarget::new(url);
    let engine = Engine::from_config(&config);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let results = tokio::select! {
        results = engine.check_stream(&target, &options) => results,
        _ = cancel.cancelled() => anyhow::bail!("Interrupted"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_stream_checks(&target, &results);
    }

    Ok(())
}

fn print_stream_checks(target: &StreamTarget, checks: &StreamChecks) {
    println!("Stream: {}", target);

    match &checks.info {
        Check::Skipped => {}
        Check::Done(info) => {
            println!(
                "Video: {} {} @ {} fps",
                info.video_codec.as_deref().unwrap_or("none"),
                info.resolution().unwrap_or_else(|| "unknown".to_string()),
                info.frame_rate_label().unwrap_or_else(|| "?".to_string()),
            );
            if let Some(codec) = &info.audio_codec {
                print!("Audio: {}", codec);
                if let Some(channels) = info.audio_channels {
                    print!(" {}ch", channels);
                }
                println!();
            }
        }
        Check::Failed(e) => println!("Info: failed ({})", e),
    }

    match &checks.connection {
        Check::Skipped => {}
        Check::Done(conn) => {
            print!("Connection: {} ({})", conn.latency_label(), conn.status);
            if let Some(detail) = &conn.detail {
                print!(" - {}", detail);
            }
            println!();
        }
        Check::Failed(e) => println!("Connection: failed ({})", e),
    }

    match &checks.quality {
        Check::Skipped => {}
        Check::Done(q) => {
            println!("Stability: {} ({})", q.score_label(), q.grade);
            println!(
                "  {} samples over {:.1}s, {} frames",
                q.sample_count,
                q.duration_observed.as_secs_f64(),
                q.frames_observed
            );
            println!("  {}", q.summary());
        }
        Check::Failed(e) => println!("Stability: failed ({})", e),
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
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
            print!(" ({})", version.lines().next().unwrap_or(""));
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
        println!("Some tools are missing. Install them to enable stream checks.");
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
            Config::default()
        }
    };

    println!(
        "  Server: {}",
        config.catalog.server.as_deref().unwrap_or("(not set)")
    );
    println!("  Cache file: {}", config.catalog.cache_file.display());
    println!("  Jobs: {}", config.check.jobs);
    println!(
        "  Probe: {}s window, {}s timeout",
        config.probe.duration_secs, config.probe.timeout_secs
    );
    println!("  Connection timeout: {}s", config.connection.timeout_secs);

    Ok(())
}
