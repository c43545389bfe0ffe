//! Integration tests for the listing crawl against a mock listing site.

use harvester_core::crawl::{CrawlError, ListingCrawler, ListingProfile, merge_jobs, write_jobs};
use harvester_core::parser::{InputColumns, load_jobs};
use harvester_core::pipeline::FixedInterval;
use harvester_core::queue::Job;
use harvester_core::session::{HttpSessionFactory, PageProfile, SessionError, SessionGuard};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listing(rows: &[(&str, &str)], next: &str) -> String {
    let rows: String = rows
        .iter()
        .enumerate()
        .map(|(i, (name, href))| {
            format!("<tr><td>{i}</td><td><a href=\"{href}\">{name}</a></td><td>创业板</td></tr>")
        })
        .collect();
    format!(
        "<html><body><table><tbody class=\"projectdynamic-tbody-con\">{rows}</tbody></table>\
         <ul class=\"pagination\">{next}</ul></body></html>"
    )
}

fn next_link(href: &str) -> String {
    format!("<li class=\"next\" data-show=\"next\"><a href=\"{href}\">下一页</a></li>")
}

const LAST_PAGE_NEXT: &str =
    r#"<li class="next disabled" data-show="next"><a href="javascript:;">下一页</a></li>"#;

async fn mount(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Two pages: page 1 links to page 2, page 2's next control is disabled.
async fn two_page_listing() -> MockServer {
    let server = MockServer::start().await;
    mount(
        &server,
        "/ipo/list-1.html",
        listing(
            &[("甲公司", "/ipo/detail.html?id=1"), ("乙公司", "detail.html?id=2")],
            &next_link("/ipo/list-2.html"),
        ),
    )
    .await;
    mount(
        &server,
        "/ipo/list-2.html",
        listing(&[("丙公司", "/ipo/detail.html?id=3")], LAST_PAGE_NEXT),
    )
    .await;
    server
}

fn page_profile() -> PageProfile {
    PageProfile {
        navigation_timeout_secs: 2,
        poll_interval_ms: 50,
        ..PageProfile::default()
    }
}

async fn crawl(profile: &ListingProfile, start: &str) -> Result<harvester_core::CrawlSummary, CrawlError> {
    let crawler = ListingCrawler::new(profile).unwrap();
    let factory = HttpSessionFactory::new(&page_profile()).unwrap();
    let mut session = SessionGuard::open(&factory).await.unwrap();
    let result = crawler
        .crawl(&mut session, start, &FixedInterval::disabled())
        .await;
    session.close().await.unwrap();
    result
}

#[tokio::test]
async fn test_crawl_follows_next_links_until_disabled() {
    let server = two_page_listing().await;
    let uri = server.uri();

    let summary = crawl(&ListingProfile::default(), &format!("{uri}/ipo/list-1.html"))
        .await
        .unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.skipped_rows, 0);
    assert_eq!(
        summary.jobs,
        vec![
            Job::new("甲公司", format!("{uri}/ipo/detail.html?id=1")),
            Job::new("乙公司", format!("{uri}/ipo/detail.html?id=2")),
            Job::new("丙公司", format!("{uri}/ipo/detail.html?id=3")),
        ]
    );
}

#[tokio::test]
async fn test_crawl_stops_at_page_limit() {
    let server = two_page_listing().await;
    let profile = ListingProfile {
        max_pages: 1,
        ..ListingProfile::default()
    };

    let summary = crawl(&profile, &format!("{}/ipo/list-1.html", server.uri()))
        .await
        .unwrap();

    assert_eq!(summary.pages, 1);
    assert_eq!(summary.jobs.len(), 2);
}

#[tokio::test]
async fn test_crawl_stops_when_next_link_returns_to_collected_page() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a.html",
        listing(&[("A", "/d/a")], &next_link("/b.html")),
    )
    .await;
    mount(
        &server,
        "/b.html",
        listing(&[("B", "/d/b")], &next_link("/a.html")),
    )
    .await;

    let summary = crawl(&ListingProfile::default(), &format!("{}/a.html", server.uri()))
        .await
        .unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.jobs.len(), 2);
}

#[tokio::test]
async fn test_click_only_pagination_needs_rendering_backend() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/ipo/list.html",
        listing(
            &[("甲公司", "/ipo/detail.html?id=1")],
            r#"<li class="next" data-show="next"><a href="javascript:;">下一页</a></li>"#,
        ),
    )
    .await;

    let result = crawl(&ListingProfile::default(), &format!("{}/ipo/list.html", server.uri())).await;

    assert!(matches!(
        result,
        Err(CrawlError::Session(SessionError::Navigation { .. }))
    ));
}

#[tokio::test]
async fn test_crawled_list_merges_into_existing_job_file() {
    let server = two_page_listing().await;
    let uri = server.uri();
    let dir = TempDir::new().unwrap();
    let jobs_path = dir.path().join("jobs.csv");
    let columns = InputColumns::default();
    std::fs::write(
        &jobs_path,
        format!("公司名称,链接\n旧公司,{uri}/ipo/detail.html?id=0\n甲公司,{uri}/ipo/detail.html?id=1\n"),
    )
    .unwrap();

    let summary = crawl(&ListingProfile::default(), &format!("{uri}/ipo/list-1.html"))
        .await
        .unwrap();
    let prior = load_jobs(&jobs_path, &columns).unwrap();
    write_jobs(&jobs_path, &columns, &merge_jobs(prior, summary.jobs)).unwrap();

    let identifiers: Vec<String> = load_jobs(&jobs_path, &columns)
        .unwrap()
        .into_iter()
        .map(|job| job.identifier)
        .collect();
    assert_eq!(identifiers, vec!["旧公司", "甲公司", "乙公司", "丙公司"]);
}
