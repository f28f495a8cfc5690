//! Check runner tests with a scripted event source.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use common::{mount_epg, PASS, USER};
use iptv_core::{ConnectionStatus, SessionEnd, StabilityGrade};
use iptv_probe::{FakeEventSource, ToolRegistry};
use iptvcheck::catalog::{Channel, XtreamClient};
use iptvcheck::config::{apply_check_overrides, Config};
use iptvcheck::report::{write_csv, Check, CANCELLED};
use iptvcheck::runner::{CheckOptions, Engine, Runner};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

fn channels(n: u64) -> Vec<Channel> {
    (1..=n)
        .map(|i| Channel {
            stream_id: 100 + i,
            name: format!("Channel {i}"),
            category_id: Some("1".into()),
            category_name: Some("UK".into()),
            tv_archive: i % 2 == 0,
            epg_channel_id: None,
        })
        .collect()
}

fn steady() -> FakeEventSource {
    (1..=5).fold(FakeEventSource::new(), |fake, i| {
        fake.progress(Duration::from_secs(i), 25 * i, 0, i as f64, 1.0)
    })
}

fn engine(source: FakeEventSource, config: &Config) -> Arc<Engine> {
    Arc::new(Engine::with_source(
        ToolRegistry::default(),
        Arc::new(source),
        config,
    ))
}

fn offline_client() -> Arc<XtreamClient> {
    Arc::new(XtreamClient::new(
        "127.0.0.1:9",
        USER,
        PASS,
        Duration::from_millis(200),
    ))
}

#[tokio::test]
async fn reports_keep_catalog_order() {
    let options = CheckOptions {
        connection: true,
        quality: true,
        ..CheckOptions::default()
    };
    let runner = Runner::new(engine(steady(), &Config::default()), offline_client(), options).jobs(3);

    let reports = runner.run(channels(8)).await;

    let ids: Vec<u64> = reports.iter().map(|r| r.id).collect();
    assert_eq!(ids, (101..=108).collect::<Vec<_>>());
    for report in &reports {
        let quality = report.checks.quality.as_done().unwrap();
        assert_eq!(quality.stability_score, 100.0);
        assert_eq!(quality.grade, StabilityGrade::Excellent);
        assert_eq!(quality.end, SessionEnd::Completed);

        let connection = report.checks.connection.as_done().unwrap();
        assert_eq!(connection.status, ConnectionStatus::Good);
        assert_eq!(report.epg, Check::Skipped);
        assert_eq!(report.checks.info, Check::Skipped);
    }
}

#[tokio::test]
async fn setup_failure_is_recorded_per_channel() {
    let server = MockServer::start().await;
    mount_epg(&server, 101, 4).await;
    let client = Arc::new(XtreamClient::new(
        &server.uri(),
        USER,
        PASS,
        Duration::from_secs(5),
    ));
    let options = CheckOptions {
        quality: true,
        epg: true,
        ..CheckOptions::default()
    };
    let source = FakeEventSource::new().failing_to_start("No such file or directory");
    let runner = Runner::new(engine(source, &Config::default()), client, options);

    let reports = runner.run(channels(3)).await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].epg, Check::Done(4));
    // No EPG mock for the others: the panel answers 404.
    assert_matches!(&reports[1].epg, Check::Failed(reason) if reason.contains("404"));
    for report in &reports {
        assert_matches!(&report.checks.quality, Check::Failed(reason) if reason.contains("No such file"));
    }
}

#[tokio::test]
async fn stalled_channel_does_not_block_others() {
    let mut config = Config::default();
    config.probe.timeout_secs = 0.5;
    config.probe.grace_period_ms = 100;
    let options = CheckOptions {
        quality: true,
        ..CheckOptions::default()
    };
    let source = FakeEventSource::new()
        .progress(Duration::from_secs(1), 25, 0, 1.0, 1.0)
        .hang();
    let runner = Runner::new(engine(source, &config), offline_client(), options).jobs(4);

    let started = Instant::now();
    let reports = runner.run(channels(4)).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    for report in &reports {
        let quality = report.checks.quality.as_done().unwrap();
        assert_eq!(quality.end, SessionEnd::TimedOut);
        assert!(quality.insufficient_data);
        assert_eq!(quality.grade, StabilityGrade::Unmeasured);
    }
}

#[tokio::test]
async fn timeout_flag_bounds_connection_check() {
    let mut config = Config::default();
    config.probe.grace_period_ms = 100;
    apply_check_overrides(&mut config, None, Some(0.3));
    let options = CheckOptions {
        connection: true,
        quality: true,
        ..CheckOptions::default()
    };
    let runner = Runner::new(
        engine(FakeEventSource::new().hang(), &config),
        offline_client(),
        options,
    );

    let started = Instant::now();
    let reports = runner.run(channels(1)).await;

    // Well under the 10s connection default.
    assert!(started.elapsed() < Duration::from_secs(3));
    let connection = reports[0].checks.connection.as_done().unwrap();
    assert_eq!(connection.status, ConnectionStatus::Failed);
    assert_eq!(reports[0].checks.quality.as_done().unwrap().end, SessionEnd::TimedOut);
}

#[tokio::test]
async fn cancellation_stops_running_checks() {
    let mut config = Config::default();
    config.probe.timeout_secs = 60.0;
    config.probe.duration_secs = 30.0;
    let options = CheckOptions {
        quality: true,
        ..CheckOptions::default()
    };
    let token = CancellationToken::new();
    let runner = Runner::new(
        engine(FakeEventSource::new().hang(), &config),
        offline_client(),
        options,
    )
    .jobs(2)
    .with_cancellation(token.clone());

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = Instant::now();
    let reports = runner.run(channels(5)).await;
    cancel.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(reports.len(), 5);
    for report in &reports {
        assert_eq!(report.checks.quality, Check::Failed(CANCELLED.to_string()));
    }

    let mut csv = Vec::new();
    write_csv(&mut csv, &reports, options.columns()).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    for row in csv.lines().skip(1) {
        assert!(row.ends_with(",cancelled,cancelled"), "unexpected row: {row}");
        assert!(!row.contains("setup_failed"));
    }
}

#[tokio::test]
async fn nothing_requested_skips_everything() {
    let runner = Runner::new(
        engine(FakeEventSource::new().failing_to_start("unused"), &Config::default()),
        offline_client(),
        CheckOptions::default(),
    );
    let reports = runner.run(channels(2)).await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.epg == Check::Skipped
        && r.checks.quality == Check::Skipped
        && r.checks.connection == Check::Skipped));
}
