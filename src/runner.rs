//! Runs the requested checks for every channel with bounded parallelism.

use std::sync::Arc;
use std::time::Duration;

use iptv_core::StreamTarget;
use iptv_probe::{
    probe_stream_info, ConnectionAnalyzer, EventSource, ProcessSource, QualityMonitor,
    ToolRegistry,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Channel, XtreamClient};
use crate::config::Config;
use crate::report::{ChannelReport, Check, Columns, StreamChecks, CANCELLED};

/// Which checks run for each stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    pub info: bool,
    pub connection: bool,
    pub quality: bool,
    pub epg: bool,
}

impl CheckOptions {
    pub fn columns(&self) -> Columns {
        Columns {
            quality: self.quality,
            connection: self.connection,
        }
    }

    fn any_stream_check(&self) -> bool {
        self.info || self.connection || self.quality
    }
}

/// The analysis engine wired to one event source.
#[derive(Debug)]
pub struct Engine {
    tools: ToolRegistry,
    monitor: QualityMonitor,
    analyzer: ConnectionAnalyzer,
    info_timeout: Duration,
}

impl Engine {
    /// Discover ffmpeg/ffprobe and drive real processes.
    ///
    /// A missing ffmpeg is not fatal here: every stream check then fails to
    /// start and is reported on its own row.
    pub fn from_config(config: &Config) -> Self {
        let tools = ToolRegistry::discover(&config.tools);
        let source = match ProcessSource::from_registry(&tools) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("{}; stream checks will fail", e);
                ProcessSource::ffmpeg("ffmpeg")
            }
        };
        Self::with_source(tools, Arc::new(source), config)
    }

    pub fn with_source(tools: ToolRegistry, source: Arc<dyn EventSource>, config: &Config) -> Self {
        Self {
            monitor: QualityMonitor::new(
                source.clone(),
                config.probe.clone(),
                config.scoring.clone(),
            ),
            analyzer: ConnectionAnalyzer::new(source, config.probe.clone(), config.connection.clone()),
            tools,
            info_timeout: config.check.info_timeout(),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the requested checks one after another on a single stream.
    pub async fn check_stream(&self, target: &StreamTarget, options: &CheckOptions) -> StreamChecks {
        let mut checks = StreamChecks::default();

        if options.info {
            checks.info = Check::from_result(
                probe_stream_info(&self.tools, target, self.info_timeout).await,
            );
        }
        if options.connection {
            checks.connection = Check::from_result(self.analyzer.measure_default(target).await);
        }
        if options.quality {
            checks.quality = Check::from_result(self.monitor.check(target).await);
        }

        checks
    }
}

/// Checks a list of channels, `jobs` at a time.
pub struct Runner {
    engine: Arc<Engine>,
    client: Arc<XtreamClient>,
    options: CheckOptions,
    jobs: usize,
    epg_limit: u32,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(engine: Arc<Engine>, client: Arc<XtreamClient>, options: CheckOptions) -> Self {
        Self {
            engine,
            client,
            options,
            jobs: 4,
            epg_limit: 100,
            cancel: CancellationToken::new(),
        }
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn epg_limit(mut self, limit: u32) -> Self {
        self.epg_limit = limit;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// One report per channel, in input order.
    ///
    /// Checks still running when the token is cancelled are stopped (their
    /// probe processes are reaped) and reported as `cancelled`.
    pub async fn run(&self, channels: Vec<Channel>) -> Vec<ChannelReport> {
        if !self.options.any_stream_check() && !self.options.epg {
            return channels
                .iter()
                .map(|c| ChannelReport::new(c, Check::Skipped, StreamChecks::default()))
                .collect();
        }

        tracing::info!("Checking {} channels with {} jobs", channels.len(), self.jobs);
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut handles = Vec::with_capacity(channels.len());

        for channel in &channels {
            let sem = semaphore.clone();
            let engine = self.engine.clone();
            let client = self.client.clone();
            let options = self.options;
            let epg_limit = self.epg_limit;
            let cancel = self.cancel.clone();
            let channel = channel.clone();

            handles.push(tokio::spawn(async move {
                let work = async {
                    let _permit = sem.acquire().await.ok()?;
                    Some(check_channel(&engine, &client, &options, epg_limit, &channel).await)
                };
                let report = tokio::select! {
                    report = work => report,
                    _ = cancel.cancelled() => None,
                };
                report.unwrap_or_else(|| cancelled_report(&channel, &options))
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (handle, channel) in handles.into_iter().zip(&channels) {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(channel = %channel.name, "Channel check task failed: {}", e);
                    reports.push(failed_report(channel, &self.options, &e.to_string()));
                }
            }
        }
        reports
    }
}

async fn check_channel(
    engine: &Engine,
    client: &XtreamClient,
    options: &CheckOptions,
    epg_limit: u32,
    channel: &Channel,
) -> ChannelReport {
    let epg = if options.epg {
        match client.epg_count(channel.stream_id, epg_limit).await {
            Ok(n) => Check::Done(n),
            Err(e) => {
                tracing::warn!(channel = %channel.name, "EPG lookup failed: {:#}", e);
                Check::Failed(format!("{e:#}"))
            }
        }
    } else {
        Check::Skipped
    };

    let checks = if options.any_stream_check() {
        let target = StreamTarget::new(client.stream_url(channel.stream_id)).with_label(&channel.name);
        engine.check_stream(&target, options).await
    } else {
        StreamChecks::default()
    };

    tracing::debug!(channel = %channel.name, id = channel.stream_id, "channel checked");
    ChannelReport::new(channel, epg, checks)
}

fn failed_report(channel: &Channel, options: &CheckOptions, reason: &str) -> ChannelReport {
    fn failed_with<T>(reason: &str) -> Check<T> {
        Check::Failed(reason.to_string())
    }
    let mut checks = StreamChecks::default();
    if options.info {
        checks.info = failed_with(reason);
    }
    if options.connection {
        checks.connection = failed_with(reason);
    }
    if options.quality {
        checks.quality = failed_with(reason);
    }
    let epg = if options.epg { failed_with(reason) } else { Check::Skipped };
    ChannelReport::new(channel, epg, checks)
}

fn cancelled_report(channel: &Channel, options: &CheckOptions) -> ChannelReport {
    failed_report(channel, options, CANCELLED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_follow_options() {
        let options = CheckOptions {
            quality: true,
            ..CheckOptions::default()
        };
        assert_eq!(
            options.columns(),
            Columns {
                quality: true,
                connection: false
            }
        );
        assert!(options.any_stream_check());
        assert!(!CheckOptions::default().any_stream_check());
    }

    #[test]
    fn failed_report_marks_only_requested_checks() {
        let channel = Channel {
            stream_id: 1,
            name: "A".into(),
            category_id: None,
            category_name: None,
            tv_archive: false,
            epg_channel_id: None,
        };
        let options = CheckOptions {
            connection: true,
            epg: true,
            ..CheckOptions::default()
        };
        let report = cancelled_report(&channel, &options);
        assert_eq!(report.epg, Check::Failed(CANCELLED.to_string()));
        assert_eq!(report.checks.connection, Check::Failed(CANCELLED.to_string()));
        assert_eq!(report.checks.quality, Check::Skipped);
        assert_eq!(report.checks.info, Check::Skipped);
    }
}
