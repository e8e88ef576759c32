//! End-to-end probing over real HTTP

use std::sync::Arc;
use std::time::Duration;

use m3u_prober::config::Config;
use m3u_prober::fetch::HttpStreamFetcher;
use m3u_prober::models::{Candidate, ChannelKey, FailureReason, NoPassFallback};
use m3u_prober::services::BatchRunner;
use m3u_prober::sources::parse_source;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

fn playlist(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/vnd.apple.mpegurl")
        .set_body_string(body)
}

fn segment(bytes: usize, delay: Duration) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "video/mp2t")
        .set_body_bytes(vec![0x47u8; bytes])
        .set_delay(delay)
}

fn runner(config: Config) -> BatchRunner {
    let fetcher = HttpStreamFetcher::new(&config.http).expect("client builds");
    BatchRunner::with_fetcher(config, Arc::new(fetcher), None)
}

#[tokio::test]
async fn master_playlist_follows_highest_resolution_variant() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/live/master.m3u8",
        playlist(
            "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
low.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
high.m3u8\n",
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/live/low.m3u8"))
        .respond_with(playlist("#EXTM3U\n#EXTINF:6,\nsegA1.ts\n#EXTINF:6,\nsegA2.ts\n"))
        .expect(0)
        .mount(&server)
        .await;
    mount(
        &server,
        "/live/high.m3u8",
        playlist("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nsegB1.ts\n#EXTINF:6,\nsegB2.ts\n"),
    )
    .await;
    mount(&server, "/live/segB1.ts", segment(64 * 1024, Duration::ZERO)).await;
    mount(&server, "/live/segB2.ts", segment(64 * 1024, Duration::ZERO)).await;

    let url = format!("{}/live/master.m3u8", server.uri());
    let report = runner(Config::default())
        .run_candidates(vec![Candidate::new("央视频道", "CCTV-1综合", url.clone())].into_iter().collect())
        .await;

    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert!(result.passed, "{result:?}");
    assert_eq!((result.width, result.height), (1920, 1080));
    assert!(result.throughput_mbps > 0.0);
    assert_eq!(
        report.selected.get(&ChannelKey::new("央视频道", "CCTV-1综合")),
        Some(&[url][..])
    );
}

#[tokio::test]
async fn faster_endpoint_ranks_first() {
    let server = MockServer::start().await;
    for (name, delay) in [("fast", 100), ("slow", 800)] {
        mount(
            &server,
            &format!("/{name}/index.m3u8"),
            playlist("#EXTM3U\n#EXTINF:6,\n1.ts\n#EXTINF:6,\n2.ts\n"),
        )
        .await;
        for seg in ["1.ts", "2.ts"] {
            mount(
                &server,
                &format!("/{name}/{seg}"),
                segment(62_500, Duration::from_millis(delay)),
            )
            .await;
        }
    }

    let mut config = Config::default();
    config.probe.min_throughput_mbps = 0.1;
    config.selection.max_per_channel = 1;

    let source = format!(
        "央视频道,#genre#\nCCTV1,{base}/slow/index.m3u8\nCCTV-1,{base}/fast/index.m3u8\n",
        base = server.uri()
    );
    let report = runner(config).run(parse_source(&source, "test")).await;

    assert_eq!(report.stats.candidates, 2);
    assert_eq!(report.stats.passed, 2);
    let fast = report
        .results
        .iter()
        .find(|r| r.url().contains("/fast/"))
        .unwrap();
    let slow = report
        .results
        .iter()
        .find(|r| r.url().contains("/slow/"))
        .unwrap();
    assert!(fast.throughput_mbps > slow.throughput_mbps);
    assert_eq!(
        report.selected.get(&ChannelKey::new("央视频道", "CCTV-1综合")),
        Some(&[format!("{}/fast/index.m3u8", server.uri())][..])
    );
}

#[tokio::test]
async fn failing_candidates_are_classified() {
    let server = MockServer::start().await;
    mount(&server, "/gone.m3u8", ResponseTemplate::new(404)).await;
    mount(
        &server,
        "/short.m3u8",
        playlist("#EXTM3U\n#EXTINF:6,\nmissing1.ts\n#EXTINF:6,\nmissing2.ts\n"),
    )
    .await;

    let candidates = ["/gone.m3u8", "/short.m3u8"]
        .iter()
        .map(|p| Candidate::new("g", "c", format!("{}{p}", server.uri())))
        .chain([Candidate::new("g", "c", "rtsp://camera/live")])
        .collect();

    let mut config = Config::default();
    config.selection.no_pass_fallback = NoPassFallback::Drop;
    let report = runner(config).run_candidates(candidates).await;

    let reason = |suffix: &str| {
        report
            .results
            .iter()
            .find(|r| r.url().ends_with(suffix))
            .and_then(|r| r.failure_reason)
    };
    assert_eq!(reason("/gone.m3u8"), Some(FailureReason::UnresolvedManifest));
    assert_eq!(reason("/short.m3u8"), Some(FailureReason::SampleFailed));
    assert_eq!(reason("rtsp://camera/live"), Some(FailureReason::UnresolvedManifest));
    assert_eq!(report.stats.passed, 0);
    assert!(report.selected.is_empty());
}

#[tokio::test]
async fn per_probe_timeout_produces_timeout_result() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/stall.m3u8",
        playlist("#EXTM3U\n#EXTINF:6,\n1.ts\n").set_delay(Duration::from_secs(5)),
    )
    .await;

    let mut config = Config::default();
    config.probe.per_probe_timeout = Duration::from_millis(300);
    config.probe.fetch_timeout = Duration::from_secs(10);

    let report = runner(config)
        .run_candidates(
            vec![Candidate::new("g", "c", format!("{}/stall.m3u8", server.uri()))]
                .into_iter()
                .collect(),
        )
        .await;

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].failure_reason, Some(FailureReason::Timeout));
    assert_eq!(report.stats.timed_out, 1);
    assert!(!report.stats.partial);
}
