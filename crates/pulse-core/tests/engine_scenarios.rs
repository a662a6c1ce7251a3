//! End-to-end engine scenarios against a scripted in-memory cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::time::Instant;

use pulse_core::{
    ConnectionPhase, Engine, EngineSettings, FetchError, IntervalPolicy, MonitorSettings,
    PollUpdate, Recovery, Request, RequestClient, Response, Transport,
};

/// In-memory cluster. While `down` is set every request fails at the
/// transport level.
#[derive(Default)]
struct FakeCluster {
    down: AtomicBool,
    down_urls: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, VecDeque<Value>>>,
    hits: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
}

impl FakeCluster {
    fn script(&self, url: &str, bodies: Vec<Value>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), bodies.into());
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn set_url_down(&self, url: &str, down: bool) {
        let mut urls = self.down_urls.lock().unwrap();
        urls.retain(|u| u != url);
        if down {
            urls.push(url.to_string());
        }
    }

    fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

struct ClusterTransport(Arc<FakeCluster>);

impl Transport for ClusterTransport {
    fn issue(&self, request: &Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        let cluster = Arc::clone(&self.0);
        let url = request.url.clone();
        Box::pin(async move {
            let latency = *cluster.latency.lock().unwrap();
            tokio::time::sleep(latency).await;
            cluster.hits.lock().unwrap().push(url.clone());

            let url_down = cluster.down_urls.lock().unwrap().contains(&url);
            if cluster.down.load(Ordering::SeqCst) || url_down {
                return Err(FetchError::connectivity("connection refused"));
            }
            let mut scripts = cluster.scripts.lock().unwrap();
            let body = match scripts.get_mut(&url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Value::Null),
                Some(queue) => queue.front().cloned().unwrap_or(Value::Null),
                None => Value::Null,
            };
            Ok(Response::ok(body))
        })
    }
}

/// Reloads the current view by fetching one URL through the engine's client.
struct ViewReload {
    client: RequestClient,
    url: String,
    hard_reloads: AtomicUsize,
    dismissed: AtomicUsize,
}

impl Recovery for ViewReload {
    fn dismiss_dialogs(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }

    fn reload_view(&self) -> BoxFuture<'static, Result<(), FetchError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move { client.get(&url).await.map(|_| ()) })
    }

    fn hard_reload(&self) {
        self.hard_reloads.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup(hard_reload: bool) -> (Engine, Arc<FakeCluster>) {
    let cluster = Arc::new(FakeCluster::default());
    let settings = EngineSettings {
        monitor: MonitorSettings {
            hard_reload,
            ..MonitorSettings::default()
        },
        ..EngineSettings::default()
    };
    let engine = Engine::new(settings, Arc::new(ClusterTransport(Arc::clone(&cluster))));
    (engine, cluster)
}

fn install_recovery(engine: &Engine, url: &str) -> Arc<ViewReload> {
    let recovery = Arc::new(ViewReload {
        client: engine.client().clone(),
        url: url.to_string(),
        hard_reloads: AtomicUsize::new(0),
        dismissed: AtomicUsize::new(0),
    });
    engine.set_recovery(recovery.clone());
    recovery
}

#[tokio::test(start_paused = true)]
async fn dynamic_interval_follows_most_recent_result() {
    let (engine, cluster) = setup(false);
    let url = "/pools/default/buckets/beer/stats";
    cluster.script(
        url,
        vec![
            json!({"status": "error"}),
            json!({"stats": {"nextReqAfter": 2500}}),
            json!({"stats": {"nextReqAfter": 2500}}),
        ],
    );

    let view = engine.view("app.admin.buckets").unwrap();
    let started = Arc::new(Mutex::new(Vec::new()));
    let s = started.clone();
    let client = engine.client().clone();
    let group = view.group().clone();
    let poller = engine.poller(&view, move |_previous: Option<Value>| {
        s.lock().unwrap().push(Instant::now());
        let client = client.clone();
        let request = Request::get(url).in_group(group.clone());
        async move { client.send(request).await.map(|resp| resp.body) }
    });
    poller
        .set_interval(IntervalPolicy::dynamic(|resp: &Value| {
            if resp.get("status").is_some() {
                Duration::from_millis(10_000)
            } else {
                Duration::from_millis(resp["stats"]["nextReqAfter"].as_u64().unwrap_or(10_000))
            }
        }))
        .cycle();

    tokio::time::sleep(Duration::from_millis(13_000)).await;

    let started = started.lock().unwrap();
    assert_eq!(started.len(), 3);
    assert_eq!(started[1] - started[0], Duration::from_millis(10_000));
    assert_eq!(started[2] - started[1], Duration::from_millis(2_500));
}

#[tokio::test(start_paused = true)]
async fn fetches_never_overlap() {
    let (engine, cluster) = setup(false);
    cluster.set_latency(Duration::from_millis(700));

    let view = engine.view("app.admin.overview").unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let (i, m) = (in_flight.clone(), max_in_flight.clone());
    let client = engine.client().clone();
    let poller = engine.poller(&view, move |_previous: Option<Value>| {
        let now = i.fetch_add(1, Ordering::SeqCst) + 1;
        m.fetch_max(now, Ordering::SeqCst);
        let client = client.clone();
        let i = i.clone();
        async move {
            let result = client.get("/pools/default").await.map(|r| r.body);
            i.fetch_sub(1, Ordering::SeqCst);
            result
        }
    });
    poller.set_interval(Duration::from_millis(200)).cycle();

    for _ in 0..20 {
        poller.reload();
        engine.events().emit("reloadTasks");
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert!(cluster.hits("/pools/default") > 3);
}

#[tokio::test(start_paused = true)]
async fn view_teardown_discards_in_flight_result() {
    let (engine, cluster) = setup(false);
    cluster.set_latency(Duration::from_secs(3));

    let view = engine.view("app.admin.indexes").unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));
    let d = delivered.clone();
    let client = engine.client().clone();
    let group = view.group().clone();
    let poller = engine.poller(&view, move |_previous: Option<Value>| {
        let client = client.clone();
        let request = Request::get("/indexStatus").in_group(group.clone());
        async move { client.send(request).await.map(|r| r.body) }
    });
    poller
        .set_interval(Duration::from_secs(1))
        .subscribe(move |_update| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .cycle();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.registry().len(), 1);

    view.teardown();
    view.teardown();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert!(engine.registry().is_empty());
    assert!(poller.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn pools_default_loss_and_recovery() {
    let (engine, cluster) = setup(false);
    let monitor = engine.monitor().clone();

    cluster.set_down(true);
    let err = engine.client().get("/pools/default").await.unwrap_err();
    assert!(err.is_connectivity());

    let snap = monitor.snapshot();
    assert_eq!(snap.phase, ConnectionPhase::Lost);
    assert_eq!(snap.countdown_secs, 60);

    cluster.set_down(false);
    engine.client().get("/pools/default").await.unwrap();
    assert_eq!(monitor.phase(), ConnectionPhase::Normal);
    assert!(!monitor.is_active());
}

#[tokio::test(start_paused = true)]
async fn success_on_other_url_does_not_clear_loss() {
    let (engine, cluster) = setup(false);
    let monitor = engine.monitor().clone();

    cluster.set_url_down("/pools/default", true);
    let _ = engine.client().get("/pools/default").await;
    assert!(monitor.is_active());

    engine.client().get("/pools/default/tasks").await.unwrap();
    assert!(monitor.is_active());

    cluster.set_url_down("/pools/default", false);
    engine.client().get("/pools/default").await.unwrap();
    assert!(!monitor.is_active());
}

#[tokio::test(start_paused = true)]
async fn application_errors_never_raise_the_banner() {
    struct Forbidden;
    impl Transport for Forbidden {
        fn issue(&self, _request: &Request) -> BoxFuture<'static, Result<Response, FetchError>> {
            Box::pin(async {
                Ok(Response {
                    status: 403,
                    body: json!({
                        "message": "Forbidden. User needs one of the following permissions"
                    }),
                })
            })
        }
    }

    let engine = Engine::new(EngineSettings::default(), Arc::new(Forbidden));
    let err = engine.client().get("/settings/rbac/users").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(engine.monitor().phase(), ConnectionPhase::Normal);
}

#[tokio::test(start_paused = true)]
async fn countdown_expiry_retries_until_cluster_returns() {
    let (engine, cluster) = setup(true);
    let recovery = install_recovery(&engine, "/pools/default");
    let monitor = engine.monitor().clone();

    cluster.set_down(true);
    let _ = engine.client().get("/pools/default").await;
    assert!(monitor.is_active());

    tokio::time::sleep(Duration::from_millis(60_500)).await;
    let snap = monitor.snapshot();
    assert_eq!(snap.phase, ConnectionPhase::Lost);
    assert_eq!(snap.countdown_secs, 60);
    assert_eq!(recovery.dismissed.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.hits("/pools/default"), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(monitor.phase(), ConnectionPhase::Lost);
    assert_eq!(cluster.hits("/pools/default"), 3);

    cluster.set_down(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    let snap = monitor.snapshot();
    assert_eq!(snap.phase, ConnectionPhase::Reloading);
    assert!(snap.is_reload);
    assert_eq!(recovery.hard_reloads.load(Ordering::SeqCst), 1);
    assert!(engine.monitor().allows_navigation());
}

#[tokio::test(start_paused = true)]
async fn manual_retry_failure_restarts_countdown() {
    let (engine, cluster) = setup(false);
    install_recovery(&engine, "/pools/default");
    let monitor = engine.monitor().clone();

    cluster.set_down(true);
    let _ = engine.client().get("/pools/default").await;
    tokio::time::sleep(Duration::from_millis(20_500)).await;
    assert_eq!(monitor.snapshot().countdown_secs, 40);

    monitor.retry_now().await;
    assert_eq!(monitor.snapshot().countdown_secs, 60);
    assert_eq!(monitor.phase(), ConnectionPhase::Lost);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(monitor.snapshot().countdown_secs, 59);

    cluster.set_down(false);
    monitor.retry_now().await;
    assert_eq!(monitor.phase(), ConnectionPhase::Normal);
}

#[tokio::test(start_paused = true)]
async fn compaction_cooldown_and_rollback() {
    let (engine, cluster) = setup(false);
    let url = "/pools/default/buckets/beer/controller/compactBucket";
    let rollbacks = Arc::new(AtomicUsize::new(0));

    let r = rollbacks.clone();
    let submitted = engine
        .actions()
        .register_triggered_and_submit(engine.client(), url, move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    assert!(submitted.is_some());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!engine.actions().can_trigger(url));
    let r = rollbacks.clone();
    let again = engine
        .actions()
        .register_triggered_and_submit(engine.client(), url, move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(cluster.hits(url), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(engine.actions().can_trigger(url));
    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn reload_event_reaches_only_live_pollers() {
    let (engine, _cluster) = setup(false);
    let live_view = engine.view("app.admin.servers").unwrap();
    let dead_view = engine.view("app.admin.logs").unwrap();

    let counts: Vec<Arc<AtomicUsize>> = (0..2).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for (view, count) in [(&live_view, &counts[0]), (&dead_view, &counts[1])] {
        let count = count.clone();
        let client = engine.client().clone();
        engine
            .poller(view, move |_previous: Option<Value>| {
                count.fetch_add(1, Ordering::SeqCst);
                let client = client.clone();
                async move { client.get("/pools/default/serverGroups").await.map(|r| r.body) }
            })
            .reload_on(engine.events(), "serverGroupsChanged", None)
            .cycle();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    dead_view.teardown();
    engine.events().emit("serverGroupsChanged");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(counts[0].load(Ordering::SeqCst), 2);
    assert_eq!(counts[1].load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn subscriber_receives_errors_and_loop_survives() {
    let (engine, cluster) = setup(false);
    let view = engine.view("app.admin.overview").unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let o = outcomes.clone();
    let client = engine.client().clone();
    let poller = engine.poller(&view, move |_previous: Option<Value>| {
        let client = client.clone();
        async move { client.get("/pools/default").await.map(|r| r.body) }
    });
    poller
        .set_interval(Duration::from_secs(3))
        .subscribe(move |update| {
            o.lock().unwrap().push(matches!(update, PollUpdate::Value { .. }));
        })
        .cycle();

    tokio::time::sleep(Duration::from_millis(500)).await;
    cluster.set_down(true);
    tokio::time::sleep(Duration::from_secs(3)).await;
    cluster.set_down(false);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(*outcomes.lock().unwrap(), vec![true, false, true]);
    assert!(!engine.monitor().is_active());
}
