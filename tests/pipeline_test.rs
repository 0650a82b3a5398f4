//! 用内存门户驱动完整的提交 → 轮询 → 下载流程
//!
//! 所有测试都暂停时钟运行，等待和轮询不会真的花时间

mod common;

use std::collections::HashSet;
use std::path::Path;

use common::{test_config, work_items, FakeDriver};
use elab_report_fetch::config::{Config, ReportCategory};
use elab_report_fetch::infrastructure::{Condition, Locator, SessionDriver, StagingDir};
use elab_report_fetch::models::{ArtifactStatus, CategoryReport, Credentials};
use elab_report_fetch::orchestrator::{run_category, WorkerPlan};
use elab_report_fetch::processing::{load_table, run_post_processing};
use elab_report_fetch::utils::EventSink;
use elab_report_fetch::workflow::{BatchCtx, BatchFlow, BatchState};
use elab_report_fetch::DriverError;

fn category(config: &Config, id: &str) -> ReportCategory {
    config
        .reports
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .expect("默认配置里应该有这个类别")
}

async fn staging(root: &Path) -> StagingDir {
    StagingDir::create(root.join("staging")).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_two_batches_download_every_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(7);

    let mut driver = FakeDriver::new(config.layout.clone());
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.results.len(), 7);
    assert_eq!(report.submitted(), 7);
    assert_eq!(report.downloaded(), 7);
    assert_eq!(report.failed(), 0);

    // 每个车型一个编号，互不相同
    let ids: HashSet<_> = report
        .results
        .iter()
        .filter_map(|r| r.correlation_id.clone())
        .collect();
    assert_eq!(ids.len(), 7);

    for item in &items {
        assert!(plan.artifact_dir.join(format!("{}.csv", item.key)).is_file());
    }

    // 报表立即生成时，每批一次扫描就够了
    assert!(driver.listing_scans <= 4);
    assert_eq!(driver.stale_uses, 0);
    assert!(driver.date_param.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_partial_failures_are_reported_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(5);

    let mut driver = FakeDriver::new(config.layout.clone())
        .fail_confirmation(&items[1].label)
        .never_ready(&items[3].label);
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.submitted(), 4);
    assert_eq!(report.downloaded(), 3);
    assert_eq!(report.failed(), 2);

    let status_of = |key: &str| {
        report
            .results
            .iter()
            .find(|r| r.item.key == key)
            .map(|r| r.status)
    };
    assert_eq!(status_of(&items[1].key), Some(ArtifactStatus::SubmitFailed));
    assert_eq!(status_of(&items[3].key), Some(ArtifactStatus::TimedOut));
    assert_eq!(status_of(&items[0].key), Some(ArtifactStatus::Downloaded));

    // 确认失败的车型沿用了上一条消息，不能拿到重复的编号
    assert_eq!(driver.submissions.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_failed_download_does_not_break_next_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(2);

    let mut driver = FakeDriver::new(config.layout.clone()).fail_download(&items[0].label, 1);
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    assert_eq!(report.results[0].status, ArtifactStatus::DownloadFailed);
    assert_eq!(report.results[1].status, ArtifactStatus::Downloaded);
    // 每次都重新定位元素，从不使用失效的句柄
    assert_eq!(driver.stale_uses, 0);
    assert!(!plan.artifact_dir.join(format!("{}.csv", items[0].key)).exists());
    assert!(plan.artifact_dir.join(format!("{}.csv", items[1].key)).is_file());
}

#[tokio::test(start_paused = true)]
async fn test_batch_without_submissions_skips_polling() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(3);

    let mut driver = FakeDriver::new(config.layout.clone());
    driver.options = vec!["999 OUTRO MODELO".to_string()];

    let ctx = BatchCtx {
        batch_index: 1,
        total_batches: 1,
        form_url: &plan.portal_url,
        date_param: "4/18/2027".to_string(),
        staging: &staging,
        artifact_dir: &plan.artifact_dir,
        events: &events,
    };
    let outcome = BatchFlow::new(&config).run(&mut driver, &ctx, &items).await;

    assert_eq!(outcome.transitions, vec![BatchState::Submitting, BatchState::Done]);
    assert!(outcome.poll.is_none());
    assert!(outcome.fatal.is_none());
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.status == ArtifactStatus::SubmitFailed));
    assert_eq!(driver.listing_scans, 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_batch_walks_every_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "29");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(2);

    let mut driver = FakeDriver::new(config.layout.clone());
    let ctx = BatchCtx {
        batch_index: 1,
        total_batches: 1,
        form_url: &plan.portal_url,
        date_param: "4/18/2027".to_string(),
        staging: &staging,
        artifact_dir: &plan.artifact_dir,
        events: &events,
    };
    let outcome = BatchFlow::new(&config).run(&mut driver, &ctx, &items).await;

    assert_eq!(
        outcome.transitions,
        vec![
            BatchState::Submitting,
            BatchState::Polling,
            BatchState::Fetching,
            BatchState::Done
        ]
    );
    assert_eq!(outcome.downloaded(), 2);
    assert_eq!(driver.date_param.as_deref(), Some("4/18/2027"));
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_aborts_worker_but_reports_every_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(7);

    let mut driver = FakeDriver::new(config.layout.clone()).lose_session_after(2);
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    assert!(report.aborted.is_some());
    assert_eq!(report.results.len(), 7);
    assert_eq!(report.downloaded(), 0);
    assert_eq!(report.failed(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_missing_form_on_first_batch_aborts_worker() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(12);

    // 登录失效：页面能打开，但生成表单永远不出现
    let mut driver = FakeDriver::new(config.layout.clone());
    driver.form_missing = true;
    let started = tokio::time::Instant::now();
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    assert!(report.aborted.is_some());
    assert_eq!(report.results.len(), 12);
    assert_eq!(report.submitted(), 0);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == ArtifactStatus::SubmitFailed));
    // 后面两批不再打开表单，也不再各等一次超时
    assert_eq!(driver.form_navigations, 1);
    assert!(started.elapsed() <= config.wait_timeout + std::time::Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_response_aborts_worker() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(12);

    let mut driver = FakeDriver::new(config.layout.clone());
    driver.unauthorized = true;
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;

    let reason = report.aborted.clone().expect("401 应该中断 worker");
    assert!(reason.contains("401"));
    assert_eq!(report.results.len(), 12);
    assert_eq!(report.failed(), 12);
    assert_eq!(driver.form_navigations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_form_on_later_batch_only_skips_that_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "61");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(3);

    let mut driver = FakeDriver::new(config.layout.clone());
    driver.form_missing = true;
    let ctx = BatchCtx {
        batch_index: 2,
        total_batches: 3,
        form_url: &plan.portal_url,
        date_param: "4/18/2027".to_string(),
        staging: &staging,
        artifact_dir: &plan.artifact_dir,
        events: &events,
    };
    let outcome = BatchFlow::new(&config).run(&mut driver, &ctx, &items).await;

    assert!(outcome.fatal.is_none());
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.status == ArtifactStatus::SubmitFailed));
}

#[tokio::test(start_paused = true)]
async fn test_standard_report_downloads_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "32");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;

    let mut driver = FakeDriver::new(config.layout.clone());
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &[], &staging, &mut report).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.downloaded(), 1);
    assert!(plan
        .artifact_dir
        .join(format!("{}.csv", category.name))
        .is_file());
}

#[tokio::test(start_paused = true)]
async fn test_downloads_merge_into_single_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let category = category(&config, "29");
    let credentials = Credentials::new("user", "secret");
    let events = EventSink::disabled();
    let plan = WorkerPlan::new(&config, &category, &credentials, &events).unwrap();
    let staging = staging(dir.path()).await;
    let items = work_items(3);

    let mut driver = FakeDriver::new(config.layout.clone());
    let mut report = CategoryReport::new(category.worker_name());
    run_category(&mut driver, &plan, &items, &staging, &mut report).await;
    assert_eq!(report.downloaded(), 3);

    let summary = run_post_processing(&config, &items, &events).await;
    let merged = summary
        .merged
        .iter()
        .find(|m| m.output.ends_with("Todos Modelos_29.xlsx"))
        .expect("应该生成合并文件");
    assert_eq!(merged.files, 3);
    assert_eq!(merged.rows, 3);

    let bytes = std::fs::read(&merged.output).unwrap();
    assert!(bytes.starts_with(b"PK"));
    let table = load_table(&merged.output).await.unwrap();
    assert!(table.headers.iter().any(|h| h == "Model"));
    assert_eq!(table.rows.len(), 3);
    assert!(table.rows.iter().flatten().any(|v| v.contains("3001")));
}

#[tokio::test(start_paused = true)]
async fn test_fake_invalidates_handles_after_navigation() {
    let config = Config::default();
    let mut driver = FakeDriver::new(config.layout.clone()).on_listing();
    let id = driver.seed_submission("3001 MODEL 1");

    let row = driver
        .wait_for(
            &Condition::Present(Locator::row_containing(&config.layout.listing_table, &id)),
            config.wait_timeout,
        )
        .await
        .unwrap();
    tokio_test::assert_ok!(driver.refresh().await);

    let err = driver
        .find_within(&row, &Locator::xpath(&config.layout.status_cell))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::StaleElement(_)));
    assert_eq!(driver.stale_uses, 1);
}
