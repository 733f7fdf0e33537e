use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use uplink::api::{ApiError, Result as ApiResult};
use uplink::queue::{
    Half, JobRequest, JobStatus, QueueConfig, QueueEvent, TranscribeRequest, Transcript,
    TranscriptionBackend, TranscriptionQueue,
};

/// 内存版转写后端，记录调用顺序
struct MockBackend {
    delay: Duration,
    calls: Mutex<Vec<(String, Option<(u32, u32)>)>>,
    fail_files: HashSet<String>,
}

impl MockBackend {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Mutex::new(Vec::new()),
            fail_files: HashSet::new(),
        }
    }

    fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_files.insert(file_name.to_string());
        self
    }

    fn calls(&self) -> Vec<(String, Option<(u32, u32)>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionBackend for MockBackend {
    async fn transcribe(&self, request: &TranscribeRequest) -> ApiResult<Transcript> {
        tokio::time::sleep(self.delay).await;

        self.calls.lock().unwrap().push((
            request.file_name.clone(),
            request.part.map(|p| (p.index, p.total)),
        ));

        if self.fail_files.contains(&request.file_name) {
            return Err(ApiError::function_error(500, "injected transcription failure"));
        }

        Ok(Transcript {
            text: format!("transcript of {}", request.file_name),
            srt: Some("1\n00:00:00,000 --> 00:00:02,000\nKickoff\n".to_string()),
        })
    }
}

fn test_config() -> QueueConfig {
    QueueConfig {
        poll_interval: Duration::from_millis(10),
        secs_per_mb: 0.001,
        language: None,
    }
}

fn request(file_name: &str, size_mb: f64) -> JobRequest {
    JobRequest {
        video_url: format!("https://cdn.example.com/{}", file_name),
        file_name: file_name.to_string(),
        size_mb,
        match_id: Some("match-1".to_string()),
        video_id: None,
        half: Some(Half::First),
    }
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_fifo_end_to_end_with_splitting() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(10)));
    let queue = TranscriptionQueue::new(backend.clone(), test_config());
    let mut events = queue.subscribe_events();

    // 50MB 整体转写，350MB 切 2 份，900MB 切 4 份
    let small = queue.add_job(request("small.mp4", 50.0)).await;
    let medium = queue.add_job(request("medium.mp4", 350.0)).await;
    let large = queue.add_job(request("large.mp4", 900.0)).await;

    queue.start_processing().await;

    wait_for("all jobs terminal", || async {
        let progress = queue.queue_progress().await;
        progress.completed + progress.failed == 3
    })
    .await;

    let progress = queue.queue_progress().await;
    assert_eq!(progress.total, 3);
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.failed, 0);

    // 严格按入队顺序处理，分段调用按 part 顺序
    assert_eq!(
        backend.calls(),
        vec![
            ("small.mp4".to_string(), None),
            ("medium.mp4".to_string(), Some((1, 2))),
            ("medium.mp4".to_string(), Some((2, 2))),
            ("large.mp4".to_string(), Some((1, 4))),
            ("large.mp4".to_string(), Some((2, 4))),
            ("large.mp4".to_string(), Some((3, 4))),
            ("large.mp4".to_string(), Some((4, 4))),
        ]
    );

    // 每个任务恰好经历一次 Pending -> Transcribing -> Completed，且按入队顺序
    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::StatusChanged { job_id, from, to } = event {
            transitions.push((job_id, from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (small, JobStatus::Pending, JobStatus::Transcribing),
            (small, JobStatus::Transcribing, JobStatus::Completed),
            (medium, JobStatus::Pending, JobStatus::Transcribing),
            (medium, JobStatus::Transcribing, JobStatus::Completed),
            (large, JobStatus::Pending, JobStatus::Transcribing),
            (large, JobStatus::Transcribing, JobStatus::Completed),
        ]
    );

    let jobs = queue.jobs().await;
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert!(jobs.iter().all(|j| j.text.is_some() && j.srt.is_some()));
    assert_eq!(jobs[1].total_parts, Some(2));
    assert_eq!(jobs[2].total_parts, Some(4));
    // 完成后估算进度落到 100
    assert!(jobs.iter().all(|j| j.estimated_progress == 100.0));
}

#[tokio::test]
async fn test_remove_active_job_is_a_noop() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(100)));
    let queue = TranscriptionQueue::new(backend, test_config());

    let job_id = queue.add_job(request("slow.mp4", 50.0)).await;
    queue.start_processing().await;

    wait_for("job is transcribing", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.status == JobStatus::Transcribing
        )
    })
    .await;

    // 活动任务不能移除
    assert!(!queue.remove_job(job_id).await);
    assert!(queue.job(job_id).await.is_some());

    wait_for("job completes", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.status == JobStatus::Completed
        )
    })
    .await;
}

#[tokio::test]
async fn test_remove_pending_job() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(10)));
    let queue = TranscriptionQueue::new(backend, test_config());

    let first = queue.add_job(request("first.mp4", 50.0)).await;
    let second = queue.add_job(request("second.mp4", 50.0)).await;

    assert!(queue.remove_job(second).await);
    assert!(queue.job(second).await.is_none());
    assert!(queue.job(first).await.is_some());
    assert_eq!(queue.queue_progress().await.total, 1);

    // 不存在的 id
    assert!(!queue.remove_job(second).await);
}

#[tokio::test]
async fn test_one_failure_does_not_block_the_queue() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(5)).failing_on("bad.mp4"));
    let queue = TranscriptionQueue::new(backend.clone(), test_config());

    let bad = queue.add_job(request("bad.mp4", 50.0)).await;
    let good = queue.add_job(request("good.mp4", 50.0)).await;

    queue.start_processing().await;

    wait_for("both jobs terminal", || async {
        let progress = queue.queue_progress().await;
        progress.completed + progress.failed == 2
    })
    .await;

    let bad_job = queue.job(bad).await.unwrap();
    assert_eq!(bad_job.status, JobStatus::Failed);
    assert!(bad_job.error.unwrap().contains("injected"));

    let good_job = queue.job(good).await.unwrap();
    assert_eq!(good_job.status, JobStatus::Completed);

    let progress = queue.queue_progress().await;
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);
}

#[tokio::test]
async fn test_start_processing_twice_is_a_noop() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(30)));
    let queue = TranscriptionQueue::new(backend.clone(), test_config());

    queue.add_job(request("once.mp4", 50.0)).await;
    queue.start_processing().await;
    queue.start_processing().await;

    wait_for("job terminal", || async {
        let progress = queue.queue_progress().await;
        progress.completed + progress.failed == 1
    })
    .await;

    // 只有一个工作循环在处理，不会重复调用
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn test_clear_aborts_the_worker_loop() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(50)));
    let queue = TranscriptionQueue::new(backend.clone(), test_config());

    queue.add_job(request("a.mp4", 350.0)).await;
    queue.add_job(request("b.mp4", 50.0)).await;
    queue.add_job(request("c.mp4", 50.0)).await;

    queue.start_processing().await;

    wait_for("first call dispatched", || async { !backend.calls().is_empty() }).await;

    queue.clear().await;
    assert!(queue.jobs().await.is_empty());
    assert_eq!(queue.queue_progress().await.total, 0);

    // 在途调用自然结束，但循环不再往下走
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.calls().len() <= 2);

    // 清空后队列可以重新使用
    let fresh = queue.add_job(request("fresh.mp4", 50.0)).await;
    queue.start_processing().await;

    wait_for("fresh job completes", || async {
        matches!(
            queue.job(fresh).await,
            Some(job) if job.status == JobStatus::Completed
        )
    })
    .await;
}

#[tokio::test]
async fn test_estimated_progress_advances_during_transcription() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(150)));
    let config = QueueConfig {
        poll_interval: Duration::from_millis(10),
        // 估算按轮询次数线性爬升，权威结果落地前不会到 100
        secs_per_mb: 0.001,
        language: None,
    };
    let queue = TranscriptionQueue::new(backend, config);

    let job_id = queue.add_job(request("long.mp4", 50.0)).await;
    queue.start_processing().await;

    wait_for("estimate starts moving", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.status == JobStatus::Transcribing && job.estimated_progress > 0.0
        )
    })
    .await;

    // 权威结果落地前估算不会到 100
    let job = queue.job(job_id).await.unwrap();
    assert!(job.estimated_progress < 100.0);

    wait_for("job completes", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.status == JobStatus::Completed
        )
    })
    .await;

    assert_eq!(queue.job(job_id).await.unwrap().estimated_progress, 100.0);
}

#[tokio::test]
async fn test_split_job_reports_parts() {
    let backend = Arc::new(MockBackend::new(Duration::from_millis(40)));
    let queue = TranscriptionQueue::new(backend, test_config());

    let job_id = queue.add_job(request("split.mp4", 350.0)).await;
    queue.start_processing().await;

    wait_for("second part in flight", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.current_part == Some(2)
        )
    })
    .await;

    let job = queue.job(job_id).await.unwrap();
    assert_eq!(job.total_parts, Some(2));
    assert!(job.message.contains("part 2/2"));

    wait_for("job completes", || async {
        matches!(
            queue.job(job_id).await,
            Some(job) if job.status == JobStatus::Completed
        )
    })
    .await;

    // 两段文本拼接
    let job = queue.job(job_id).await.unwrap();
    let text = job.text.unwrap();
    assert_eq!(text.matches("transcript of split.mp4").count(), 2);
}
