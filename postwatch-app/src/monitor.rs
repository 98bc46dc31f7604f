//! The poll loop: fetch, drop what was already delivered, notify the rest.
use crate::discord::Notifier;
use crate::seen::SeenPosts;
use async_trait::async_trait;
use postwatch_common::PostwatchError;
use postwatch_config::PollSettings;
use postwatch_feed::{FeedClient, FeedError, Post};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Where a cycle gets its posts from.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError>;
}

#[async_trait]
impl PostSource for FeedClient {
    async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
        FeedClient::fetch_posts(self).await
    }
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Deliver what is already in the feed on the first cycle instead of
    /// only remembering it.
    pub notify_on_startup: bool,
    pub seen_capacity: usize,
}

impl From<&PollSettings> for MonitorSettings {
    fn from(poll: &PollSettings) -> Self {
        Self {
            interval: Duration::from_secs(poll.interval_secs),
            notify_on_startup: poll.notify_on_startup,
            seen_capacity: poll.seen_capacity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub seeded: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct Monitor {
    source: Arc<dyn PostSource>,
    notifier: Arc<dyn Notifier>,
    seen: SeenPosts,
    settings: MonitorSettings,
    primed: bool,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn PostSource>,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            seen: SeenPosts::new(settings.seen_capacity),
            primed: settings.notify_on_startup,
            settings,
        }
    }

    /// One fetch-and-deliver pass.
    ///
    /// Posts are delivered oldest first. A post whose delivery fails is not
    /// marked seen and will be offered again next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, PostwatchError> {
        let mut posts = self
            .source
            .fetch_posts()
            .await
            .map_err(|e| PostwatchError::Feed(e.to_string()))?;
        let mut report = CycleReport {
            fetched: posts.len(),
            ..CycleReport::default()
        };

        if !self.primed {
            // an empty first fetch (feed down) must not count as the baseline
            if posts.is_empty() {
                return Ok(report);
            }
            for post in &posts {
                if self.seen.insert(post.id.clone()) {
                    report.seeded += 1;
                }
            }
            self.primed = true;
            tracing::info!(seeded = report.seeded, "monitor.seeded");
            return Ok(report);
        }

        posts.sort_by_key(|post| post.timestamp);
        for post in &posts {
            if self.seen.contains(&post.id) {
                continue;
            }
            match self.notifier.notify(post).await {
                Ok(()) => {
                    self.seen.insert(post.id.clone());
                    report.delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %post.id, error = %err, "monitor.deliver.failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Poll until `cancel` fires. A cycle in progress is allowed to finish.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            "monitor.started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => tracing::info!(
                            fetched = report.fetched,
                            seeded = report.seeded,
                            delivered = report.delivered,
                            failed = report.failed,
                            "monitor.cycle"
                        ),
                        Err(err) => tracing::warn!(error = %err, "monitor.cycle.failed"),
                    }
                }
            }
        }
        tracing::info!(seen = self.seen.len(), "monitor.stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as TimeDelta};
    use postwatch_feed::SOURCE;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    fn post(id: &str, minutes: i64) -> Post {
        let base = DateTime::parse_from_rfc3339("2025-05-25T04:00:00+00:00").unwrap();
        Post {
            id: id.to_string(),
            content: format!("content of {id}"),
            timestamp: base + TimeDelta::minutes(minutes),
            formatted_time: String::new(),
            link: String::new(),
            image: None,
            source: SOURCE,
            guid: String::new(),
        }
    }

    #[derive(Default)]
    struct ScriptedSource(Mutex<VecDeque<Result<Vec<Post>, FeedError>>>);

    impl ScriptedSource {
        fn new(cycles: Vec<Result<Vec<Post>, FeedError>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(cycles.into())))
        }
    }

    #[async_trait]
    impl PostSource for ScriptedSource {
        async fn fetch_posts(&self) -> Result<Vec<Post>, FeedError> {
            self.0.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, post: &Post) -> Result<(), PostwatchError> {
            if self.failing.lock().unwrap().contains(&post.id) {
                return Err(PostwatchError::Notify("webhook returned 500".into()));
            }
            self.sent.lock().unwrap().push(post.id.clone());
            Ok(())
        }
    }

    fn settings(notify_on_startup: bool) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(10),
            notify_on_startup,
            seen_capacity: 100,
        }
    }

    #[tokio::test]
    async fn first_cycle_seeds_then_new_posts_are_delivered_oldest_first() {
        let source = ScriptedSource::new(vec![
            Ok(vec![post("b", 2), post("a", 1)]),
            Ok(vec![post("d", 4), post("c", 3), post("b", 2), post("a", 1)]),
        ]);
        let recorder = Arc::new(Recorder::default());
        let mut monitor = Monitor::new(source, recorder.clone(), settings(false));

        let first = monitor.run_cycle().await.unwrap();
        assert_eq!(first.seeded, 2);
        assert_eq!(first.delivered, 0);
        assert!(recorder.sent.lock().unwrap().is_empty());

        let second = monitor.run_cycle().await.unwrap();
        assert_eq!(second.fetched, 4);
        assert_eq!(second.delivered, 2);
        assert_eq!(*recorder.sent.lock().unwrap(), ["c", "d"]);
    }

    #[tokio::test]
    async fn notify_on_startup_delivers_immediately() {
        let source = ScriptedSource::new(vec![Ok(vec![post("b", 2), post("a", 1)])]);
        let recorder = Arc::new(Recorder::default());
        let mut monitor = Monitor::new(source, recorder.clone(), settings(true));

        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(*recorder.sent.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn failed_deliveries_are_retried_next_cycle() {
        let source = ScriptedSource::new(vec![
            Ok(vec![post("a", 1), post("b", 2)]),
            Ok(vec![post("a", 1), post("b", 2)]),
        ]);
        let recorder = Arc::new(Recorder::default());
        recorder.failing.lock().unwrap().insert("a".into());
        let mut monitor = Monitor::new(source, recorder.clone(), settings(true));

        let first = monitor.run_cycle().await.unwrap();
        assert_eq!((first.delivered, first.failed), (1, 1));

        recorder.failing.lock().unwrap().clear();
        let second = monitor.run_cycle().await.unwrap();
        assert_eq!((second.delivered, second.failed), (1, 0));
        assert_eq!(*recorder.sent.lock().unwrap(), ["b", "a"]);
    }

    #[tokio::test]
    async fn empty_or_failed_fetch_does_not_seed() {
        let source = ScriptedSource::new(vec![
            Ok(Vec::new()),
            Err(FeedError::Parse("truncated document".into())),
            Ok(vec![post("a", 1)]),
            Ok(vec![post("a", 1), post("b", 2)]),
        ]);
        let recorder = Arc::new(Recorder::default());
        let mut monitor = Monitor::new(source, recorder.clone(), settings(false));

        assert_eq!(monitor.run_cycle().await.unwrap().seeded, 0);
        let err = monitor.run_cycle().await.unwrap_err();
        assert!(matches!(err, PostwatchError::Feed(_)));
        assert_eq!(monitor.run_cycle().await.unwrap().seeded, 1);
        assert_eq!(monitor.run_cycle().await.unwrap().delivered, 1);
        assert_eq!(*recorder.sent.lock().unwrap(), ["b"]);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let source = ScriptedSource::new(vec![Ok(vec![post("a", 1)])]);
        let recorder = Arc::new(Recorder::default());
        let monitor = Monitor::new(source, recorder.clone(), settings(true));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));
        time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits")
            .expect("task joins");
        assert_eq!(*recorder.sent.lock().unwrap(), ["a"]);
    }
}
